//! Image-to-text input.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::error::{Error, Result};

/// Default tesseract language set: simplified Chinese plus English.
pub const DEFAULT_OCR_LANGUAGES: &str = "chi_sim+eng";

/// Extracts text from an image file.
#[async_trait::async_trait]
pub trait OcrEngine: Send + Sync {
    /// Returns the text recognized in the image at `path`.
    async fn extract_text(&self, path: &Path) -> Result<String>;
}

/// Runs the `tesseract` command-line tool.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    program: PathBuf,
    languages: String,
}

impl TesseractOcr {
    /// Use `tesseract` from `PATH` with the given language set.
    pub fn new(languages: impl Into<String>) -> Self {
        Self {
            program: PathBuf::from("tesseract"),
            languages: languages.into(),
        }
    }

    /// Use a specific tesseract binary.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// The language set passed with `-l`.
    pub fn languages(&self) -> &str {
        &self.languages
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new(DEFAULT_OCR_LANGUAGES)
    }
}

#[async_trait::async_trait]
impl OcrEngine for TesseractOcr {
    async fn extract_text(&self, path: &Path) -> Result<String> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(Error::ocr(format!("image {} does not exist", path.display())));
        }
        let output = Command::new(&self.program)
            .arg(path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| {
                Error::ocr(format!(
                    "cannot run {}: {err}",
                    self.program.display()
                ))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ocr(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        tracing::debug!(image = %path.display(), chars = text.chars().count(), "ocr complete");
        Ok(text)
    }
}
