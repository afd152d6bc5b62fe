//! Chat application module for interactive conversations.
//!
//! This module provides the pieces of the `colloquy-chat` REPL that are not the session
//! itself:
//!
//! - [`config`]: CLI argument parsing and configuration resolution
//! - [`commands`]: command parsing and help text

mod commands;
mod config;

pub use crate::render::{BufferRenderer, PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, MULTILINE_TERMINATOR, help_text, is_multiline_end, parse_command};
pub use config::{
    ChatArgs, ChatConfig, DEFAULT_MODEL_ID, ENDPOINT_ENV, LOG_LEVEL_ENV, LogLevel, MODEL_ID_ENV,
    REGION_ENV,
};
