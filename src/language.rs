//! Output-language directive.
//!
//! Detection is best effort: when the detector cannot decide, the configured fallback
//! language is used instead of failing the turn.

const CHINESE: &str = "Chinese";

/// Language used when detection fails.
pub const DEFAULT_FALLBACK_LANGUAGE: &str = CHINESE;

/// Decides which language the model is asked to answer in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageDirective {
    enabled: bool,
    fallback: String,
}

impl LanguageDirective {
    /// An enabled directive with the given fallback language.
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            enabled: true,
            fallback: fallback.into(),
        }
    }

    /// A directive that never produces an instruction.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            fallback: DEFAULT_FALLBACK_LANGUAGE.to_string(),
        }
    }

    /// True if an instruction is added to prompts.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The fallback language.
    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Returns the language to answer in, or `None` when the directive is disabled.
    pub fn language_for(&self, text: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        match detect_language(text) {
            Some(language) => Some(language.to_string()),
            None => {
                tracing::warn!(
                    fallback = %self.fallback,
                    "language detection failed; using fallback"
                );
                Some(self.fallback.clone())
            }
        }
    }

    /// Returns the suffix appended to the user's text, e.g. `", please output in Chinese."`.
    pub fn instruction_for(&self, text: &str) -> Option<String> {
        self.language_for(text)
            .map(|language| format!(", please output in {language}."))
    }
}

impl Default for LanguageDirective {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_LANGUAGE)
    }
}

/// Detects the language of `text`, returning its English name.
///
/// Returns `None` for empty input and for input the detector cannot classify.  Han script
/// always maps to Chinese; the statistical detector is unreliable on short CJK input.
pub fn detect_language(text: &str) -> Option<&'static str> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.chars().any(is_han) && !text.chars().any(is_kana) {
        return Some(CHINESE);
    }
    let info = whatlang::detect(text)?;
    if info.is_reliable() {
        Some(info.lang().eng_name())
    } else {
        None
    }
}

fn is_han(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' | '\u{F900}'..='\u{FAFF}')
}

fn is_kana(c: char) -> bool {
    matches!(c, '\u{3040}'..='\u{30FF}')
}
