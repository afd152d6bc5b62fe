//! Voice input.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::error::{Error, Result};

/// Turns recorded speech into text.
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the audio file at `audio`.
    ///
    /// # Errors
    ///
    /// [`Error::NoSpeechDetected`] when the audio holds nothing recognizable, and
    /// [`Error::Transcription`] when the transcriber itself fails.
    async fn transcribe(&self, audio: &Path) -> Result<String>;
}

/// Runs an external speech-to-text program.
///
/// The program is invoked as `program [args...] <audio-file>` and must print the transcript
/// on stdout.
#[derive(Debug, Clone)]
pub struct CommandTranscriber {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandTranscriber {
    /// Create a transcriber that runs `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Build from a command line such as `"whisper-cli -l zh -nt -f"`.
    pub fn from_command_line(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            Error::configuration("transcriber command must name a program")
        })?;
        Ok(Self::new(program).with_args(parts.map(String::from)))
    }

    /// Arguments placed before the audio path.
    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }

    /// The program that will be run.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait::async_trait]
impl Transcriber for CommandTranscriber {
    async fn transcribe(&self, audio: &Path) -> Result<String> {
        if !tokio::fs::try_exists(audio).await.unwrap_or(false) {
            return Err(Error::transcription(format!(
                "audio {} does not exist",
                audio.display()
            )));
        }
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(audio)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| {
                Error::transcription(format!("cannot run {}: {err}", self.program.display()))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::transcription(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        let transcript = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if transcript.is_empty() {
            return Err(Error::NoSpeechDetected);
        }
        tracing::debug!(audio = %audio.display(), %transcript, "transcribed");
        Ok(transcript)
    }
}
