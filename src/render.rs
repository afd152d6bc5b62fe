//! Output rendering for streamed replies.
//!
//! The session hands every text fragment to a [`Renderer`] as soon as it is decoded, so the
//! user sees the reply grow token by token.

use std::io::{self, Stdout, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// ANSI escape code for dim text (used for informational lines).
const ANSI_DIM: &str = "\x1b[2m";

/// Resets styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code for yellow text (used for interruptions).
const ANSI_YELLOW: &str = "\x1b[33m";

/// Where a conversation's output goes.
pub trait Renderer: Send {
    /// A reply is about to stream.  Interrupt requests made before this point are dropped.
    fn begin_response(&mut self) {}

    /// Print a chunk of response text.
    ///
    /// This is called incrementally as fragments are decoded from the stream.
    fn print_text(&mut self, text: &str);

    /// Reports a failed turn or command.
    fn print_error(&mut self, error: &str);

    /// Reports a status line (command feedback, recognized input).
    fn print_info(&mut self, info: &str);

    /// The reply streamed to completion.
    fn finish_response(&mut self);

    /// The user stopped the reply early.
    fn print_interrupted(&mut self);

    /// Polled between chunks; true stops the stream.
    fn should_interrupt(&self) -> bool {
        false
    }
}

/// Writes replies to stdout, optionally styled with ANSI escapes.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    interrupted: Option<Arc<AtomicBool>>,
}

impl PlainTextRenderer {
    /// Styled output.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Styled or plain output.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            interrupted: None,
        }
    }

    /// Interrupt when `interrupted` is set, e.g. from a Ctrl-C handler.
    pub fn with_interrupt(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(interrupted);
        self
    }

    /// Fragments arrive without newlines, so flush after each one.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn begin_response(&mut self) {
        if let Some(flag) = &self.interrupted {
            flag.store(false, Ordering::Relaxed);
        }
    }

    fn print_text(&mut self, text: &str) {
        print!("{text}");
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        self.flush();
        if self.use_color {
            eprintln!("\n{ANSI_RED}Error: {error}{ANSI_RESET}");
        } else {
            eprintln!("\nError: {error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        if self.use_color {
            println!("{ANSI_DIM}{info}{ANSI_RESET}");
        } else {
            println!("{info}");
        }
    }

    fn finish_response(&mut self) {
        println!();
        self.flush();
    }

    fn print_interrupted(&mut self) {
        if self.use_color {
            println!("\n{ANSI_YELLOW}[interrupted]{ANSI_RESET}");
        } else {
            println!("\n[interrupted]");
        }
        self.flush();
    }

    fn should_interrupt(&self) -> bool {
        self.interrupted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// A renderer that records everything it is asked to show.
#[derive(Debug, Default, Clone)]
pub struct BufferRenderer {
    /// Number of responses begun.
    pub started: usize,
    /// Every fragment passed to `print_text`, in order.
    pub fragments: Vec<String>,
    /// Every error message.
    pub errors: Vec<String>,
    /// Every informational message.
    pub infos: Vec<String>,
    /// Number of completed responses.
    pub finished: usize,
    /// Number of interrupted responses.
    pub interrupted: usize,
    /// Request an interrupt once this many fragments have been shown.
    pub interrupt_after: Option<usize>,
}

impl BufferRenderer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interrupt the stream after `fragments` text fragments.
    pub fn interrupt_after(fragments: usize) -> Self {
        Self {
            interrupt_after: Some(fragments),
            ..Self::default()
        }
    }

    /// The concatenation of every text fragment.
    pub fn text(&self) -> String {
        self.fragments.concat()
    }
}

impl Renderer for BufferRenderer {
    fn begin_response(&mut self) {
        self.started += 1;
    }

    fn print_text(&mut self, text: &str) {
        self.fragments.push(text.to_string());
    }

    fn print_error(&mut self, error: &str) {
        self.errors.push(error.to_string());
    }

    fn print_info(&mut self, info: &str) {
        self.infos.push(info.to_string());
    }

    fn finish_response(&mut self) {
        self.finished += 1;
    }

    fn print_interrupted(&mut self) {
        self.interrupted += 1;
    }

    fn should_interrupt(&self) -> bool {
        self.interrupt_after
            .is_some_and(|limit| self.fragments.len() >= limit)
    }
}
