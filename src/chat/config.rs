//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and the resolved configuration,
//! which layers command-line flags over environment variables over defaults.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use arrrg_derive::CommandLine;

use crate::catalog::{ProviderCatalog, ProviderSpec};
use crate::error::{Error, Result};
use crate::history::DEFAULT_HISTORY_PAIRS;
use crate::language::{DEFAULT_FALLBACK_LANGUAGE, LanguageDirective};
use crate::ocr::DEFAULT_OCR_LANGUAGES;
use crate::retriever::{DEFAULT_PASSAGE_WORDS, DEFAULT_TOP_K};
use crate::transport::DEFAULT_REGION;

/// Model used when neither `--model` nor `MODEL_ID` is given.
pub const DEFAULT_MODEL_ID: &str = "meta.llama3-70b-instruct-v1:0";

/// Environment variable naming the model.
pub const MODEL_ID_ENV: &str = "MODEL_ID";
/// Environment variable naming the region.
pub const REGION_ENV: &str = "AWS_REGION";
/// Environment variable overriding the runtime endpoint.
pub const ENDPOINT_ENV: &str = "BEDROCK_ENDPOINT";
/// Environment variable setting the log level.
pub const LOG_LEVEL_ENV: &str = "COLLOQUY_LOG";

/// How much diagnostic output to write to stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// No diagnostics.
    #[default]
    None,
    /// Turn summaries and warnings.
    Info,
    /// Everything, including request bodies.
    Debug,
}

impl LogLevel {
    /// The `tracing_subscriber::EnvFilter` directive for this level.
    pub fn filter_directive(&self) -> &'static str {
        match self {
            LogLevel::None => "off",
            LogLevel::Info => "colloquy=info",
            LogLevel::Debug => "colloquy=debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::None => "none",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        write!(f, "{s}")
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(LogLevel::None),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            other => Err(Error::configuration(format!(
                "unknown log level {other:?} (expected none, info or debug)"
            ))),
        }
    }
}

/// Command-line arguments for the colloquy-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model to use for chat.
    #[arrrg(optional, "Bedrock model id (default: $MODEL_ID or meta.llama3-70b-instruct-v1:0)", "MODEL")]
    pub model: Option<String>,

    /// AWS region.
    #[arrrg(optional, "AWS region (default: $AWS_REGION or us-east-1)", "REGION")]
    pub region: Option<String>,

    /// Runtime endpoint override.
    #[arrrg(optional, "Bedrock runtime endpoint URL (default: $BEDROCK_ENDPOINT)", "URL")]
    pub endpoint: Option<String>,

    /// Number of user/assistant pairs to keep.
    #[arrrg(optional, "Exchanges kept in history (default: 5)", "PAIRS")]
    pub history_pairs: Option<usize>,

    /// System prompt to set context for the conversation.
    #[arrrg(optional, "System prompt for the conversation", "PROMPT")]
    pub system: Option<String>,

    /// Teaching persona file.
    #[arrrg(optional, "YAML lesson description used as the system prompt", "FILE")]
    pub persona: Option<String>,

    /// Retrieval corpus.
    #[arrrg(optional, "UTF-8 text corpus for retrieval-augmented answers", "FILE")]
    pub corpus: Option<String>,

    /// Passages retrieved per turn.
    #[arrrg(optional, "Passages retrieved per turn (default: 1)", "K")]
    pub top_k: Option<usize>,

    /// Words per corpus passage.
    #[arrrg(optional, "Words per corpus passage (default: 100)", "WORDS")]
    pub passage_words: Option<usize>,

    /// Fallback output language.
    #[arrrg(optional, "Reply language when detection fails (default: Chinese)", "LANGUAGE")]
    pub language: Option<String>,

    /// Disable the output-language instruction.
    #[arrrg(flag, "Do not ask the model to answer in a specific language")]
    pub no_language: bool,

    /// Speech-to-text program.
    #[arrrg(optional, "Speech-to-text command; the audio path is appended", "COMMAND")]
    pub transcriber: Option<String>,

    /// Tesseract languages.
    #[arrrg(optional, "Tesseract languages for /image (default: chi_sim+eng)", "LANGS")]
    pub ocr_lang: Option<String>,

    /// Diagnostic verbosity.
    #[arrrg(optional, "Log level: none, info or debug (default: $COLLOQUY_LOG or none)", "LEVEL")]
    pub log_level: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing command-line
/// arguments and the environment with appropriate defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// The catalog model identifier.
    pub model_id: String,

    /// The AWS region.
    pub region: String,

    /// Explicit runtime endpoint, overriding the region's.
    pub endpoint: Option<String>,

    /// User/assistant pairs kept in history.
    pub history_pairs: usize,

    /// Optional system prompt to set conversation context.
    pub system_prompt: Option<String>,

    /// Teaching persona file, rendered into the system prompt.
    pub persona_path: Option<PathBuf>,

    /// Retrieval corpus.
    pub corpus_path: Option<PathBuf>,

    /// Passages retrieved per turn.
    pub top_k: usize,

    /// Words per corpus passage.
    pub passage_words: usize,

    /// Fallback output language; `None` disables the language instruction.
    pub language: Option<String>,

    /// Speech-to-text command line.
    pub transcriber: Option<String>,

    /// Tesseract language set.
    pub ocr_languages: String,

    /// Diagnostic verbosity.
    pub log_level: LogLevel,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    pub fn new() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            history_pairs: DEFAULT_HISTORY_PAIRS,
            system_prompt: None,
            persona_path: None,
            corpus_path: None,
            top_k: DEFAULT_TOP_K,
            passage_words: DEFAULT_PASSAGE_WORDS,
            language: Some(DEFAULT_FALLBACK_LANGUAGE.to_string()),
            transcriber: None,
            ocr_languages: DEFAULT_OCR_LANGUAGES.to_string(),
            log_level: LogLevel::None,
            use_color: true,
        }
    }

    /// Resolve arguments against the process environment.
    pub fn from_args(args: ChatArgs) -> Result<Self> {
        Self::resolve(args, |key| env::var(key).ok())
    }

    /// Resolve arguments against `lookup`; flags win over the environment, which wins over
    /// defaults.
    pub fn resolve(args: ChatArgs, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::new();

        let log_level = match args.log_level.or_else(|| lookup(LOG_LEVEL_ENV)) {
            Some(level) => level.parse()?,
            None => defaults.log_level,
        };
        let history_pairs = args.history_pairs.unwrap_or(defaults.history_pairs);
        if history_pairs == 0 {
            return Err(Error::configuration("--history-pairs must be at least 1"));
        }
        let passage_words = args.passage_words.unwrap_or(defaults.passage_words);
        if passage_words == 0 {
            return Err(Error::configuration("--passage-words must be at least 1"));
        }
        let language = if args.no_language {
            None
        } else {
            args.language.or(defaults.language)
        };

        Ok(Self {
            model_id: args
                .model
                .or_else(|| lookup(MODEL_ID_ENV))
                .unwrap_or(defaults.model_id),
            region: args
                .region
                .or_else(|| lookup(REGION_ENV))
                .unwrap_or(defaults.region),
            endpoint: args.endpoint.or_else(|| lookup(ENDPOINT_ENV)),
            history_pairs,
            system_prompt: args.system,
            persona_path: args.persona.map(PathBuf::from),
            corpus_path: args.corpus.map(PathBuf::from),
            top_k: args.top_k.unwrap_or(defaults.top_k),
            passage_words,
            language,
            transcriber: args.transcriber,
            ocr_languages: args.ocr_lang.unwrap_or(defaults.ocr_languages),
            log_level,
            use_color: !args.no_color,
        })
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Sets the system prompt.
    pub fn with_system_prompt(mut self, prompt: String) -> Self {
        self.system_prompt = Some(prompt);
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Looks the configured model up in the catalog.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownModel`], listing every valid identifier.
    pub fn provider_spec(&self) -> Result<&'static ProviderSpec> {
        ProviderCatalog::global().lookup(&self.model_id)
    }

    /// The runtime endpoint: the explicit override, or the region's default.
    pub fn endpoint_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://bedrock-runtime.{}.amazonaws.com/", self.region),
        }
    }

    /// The output-language directive.
    pub fn language_directive(&self) -> LanguageDirective {
        match &self.language {
            Some(language) => LanguageDirective::new(language.clone()),
            None => LanguageDirective::disabled(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}
