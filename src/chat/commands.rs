//! Command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`, plus the bare
//! `quit`/`exit` words, allowing users to control the chat session without sending messages
//! to the model.

/// Line that ends multi-line input.
pub const MULTILINE_TERMINATOR: &str = ".";

/// A parsed chat command.
///
/// These commands control the chat session and are not sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Clear the conversation history, keeping the system prompt.
    Clear,

    /// Set or clear the system prompt.
    /// `None` clears the current system prompt.
    System(Option<String>),

    /// Read lines until a lone `.` and send them as one turn.
    Multiline,

    /// Transcribe an audio file and send the transcript.
    Voice(String),

    /// Recognize the text in an image and send it, followed by optional typed text.
    Image {
        /// Path to the image.
        path: String,
        /// Text typed after the path.
        text: Option<String>,
    },

    /// Show the retained history.
    History,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it should be treated
/// as a regular message.
///
/// # Examples
///
/// ```
/// # use colloquy::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("quit").is_some());
/// assert!(parse_command("/image scan.png what does this say?").is_some());
/// assert!(parse_command("你好").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
        return Some(ChatCommand::Quit);
    }
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "clear" => ChatCommand::Clear,
        "system" => ChatCommand::System(argument.map(|s| s.to_string())),
        "multi" | "multiline" => ChatCommand::Multiline,
        "voice" => match argument {
            Some(path) => ChatCommand::Voice(path.to_string()),
            None => ChatCommand::Invalid("/voice requires an audio file".to_string()),
        },
        "image" => parse_image_command(argument),
        "history" => ChatCommand::History,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

fn parse_image_command(argument: Option<&str>) -> ChatCommand {
    let Some(arg) = argument else {
        return ChatCommand::Invalid("/image requires an image path".to_string());
    };
    let mut parts = arg.splitn(2, char::is_whitespace);
    let path = parts.next().unwrap_or(arg).to_string();
    let text = parts
        .next()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());
    ChatCommand::Image { path, text }
}

/// True for the line that ends multi-line input.
pub fn is_multiline_end(line: &str) -> bool {
    line.trim() == MULTILINE_TERMINATOR
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /clear                 Clear conversation history (keeps the system prompt)
  /system [prompt]       Set system prompt (no argument clears it)
  /multi                 Enter several lines; finish with a line holding only "."
  /voice <audio-file>    Transcribe speech and send it
  /image <path> [text]   Send the text found in an image, followed by [text]
  /history               Show the retained conversation
  /help                  Show this help message
  /quit                  Exit the chat (also: quit, exit, /exit, /q)

Ctrl-C stops a reply in progress; Ctrl-D exits."#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_quit_commands() {
        assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/exit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/q"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("  /quit  "), Some(ChatCommand::Quit));
        assert_eq!(parse_command("quit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("QUIT"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("exit"), Some(ChatCommand::Quit));
    }

    #[test]
    fn quit_inside_a_sentence_is_a_message() {
        assert_eq!(parse_command("how do I quit vim"), None);
    }

    #[test]
    fn parse_clear() {
        assert_eq!(parse_command("/clear"), Some(ChatCommand::Clear));
        assert_eq!(parse_command("/CLEAR"), Some(ChatCommand::Clear));
    }

    #[test]
    fn parse_system() {
        assert_eq!(
            parse_command("/system 你是一位老师"),
            Some(ChatCommand::System(Some("你是一位老师".to_string())))
        );
        assert_eq!(parse_command("/system"), Some(ChatCommand::System(None)));
    }

    #[test]
    fn parse_voice() {
        assert_eq!(
            parse_command("/voice question.wav"),
            Some(ChatCommand::Voice("question.wav".to_string()))
        );
        assert!(matches!(
            parse_command("/voice"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("audio")
        ));
    }

    #[test]
    fn parse_image() {
        assert_eq!(
            parse_command("/image scan.png"),
            Some(ChatCommand::Image {
                path: "scan.png".to_string(),
                text: None,
            })
        );
        assert_eq!(
            parse_command("/image scan.png   请翻译这段话 "),
            Some(ChatCommand::Image {
                path: "scan.png".to_string(),
                text: Some("请翻译这段话".to_string()),
            })
        );
        assert!(matches!(
            parse_command("/image"),
            Some(ChatCommand::Invalid(_))
        ));
    }

    #[test]
    fn parse_multiline_and_history() {
        assert_eq!(parse_command("/multi"), Some(ChatCommand::Multiline));
        assert_eq!(parse_command("/history"), Some(ChatCommand::History));
        assert_eq!(parse_command("/help"), Some(ChatCommand::Help));
        assert_eq!(parse_command("/?"), Some(ChatCommand::Help));
        assert!(is_multiline_end(" . "));
        assert!(!is_multiline_end(".."));
    }

    #[test]
    fn unknown_command() {
        assert_eq!(
            parse_command("/model x"),
            Some(ChatCommand::Invalid("Unknown command: /model".to_string()))
        );
    }

    #[test]
    fn non_commands() {
        assert_eq!(parse_command("Hello!"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("  "), None);
    }

    #[test]
    fn help_text_not_empty() {
        let help = help_text();
        assert!(help.contains("/quit"));
        assert!(help.contains("/clear"));
        assert!(help.contains("/multi"));
        assert!(help.contains("/voice"));
        assert!(help.contains("/image"));
    }
}
