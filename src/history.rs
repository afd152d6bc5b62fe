//! Rolling conversation history.
//!
//! A [`History`] keeps turns in dialogue order.  A leading system turn is pinned: trimming
//! only ever drops the oldest non-system turns.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default number of user/assistant pairs kept in the window.
pub const DEFAULT_HISTORY_PAIRS: usize = 5;

/// Speaker of a conversation turn.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person typing.
    User,
    /// The model.
    Assistant,
    /// The persona or system prompt.
    System,
}

impl Role {
    /// The speaker label used in flattened `speaker: content` transcripts.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One entry of the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who spoke.
    pub role: Role,
    /// What was said.
    pub content: String,
}

impl ConversationTurn {
    /// Create a new turn.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Bounded, insertion-ordered sequence of turns.
///
/// `max_entries` bounds the non-system turns; a leading system turn does not count against
/// it and is never evicted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    turns: Vec<ConversationTurn>,
    max_entries: usize,
}

impl History {
    /// Create an empty history holding at most `max_entries` non-system turns.
    pub fn new(max_entries: usize) -> Self {
        Self {
            turns: Vec::new(),
            max_entries,
        }
    }

    /// Create an empty history holding `pairs` user/assistant pairs.
    pub fn with_pairs(pairs: usize) -> Self {
        Self::new(pairs.saturating_mul(2))
    }

    /// The configured bound on non-system turns.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Installs, replaces or (with `None`) removes the leading system turn.
    pub fn set_system(&mut self, prompt: Option<String>) {
        if self.has_system() {
            self.turns.remove(0);
        }
        if let Some(prompt) = prompt {
            self.turns.insert(0, ConversationTurn::system(prompt));
        }
    }

    /// The leading system turn's content, if any.
    pub fn system(&self) -> Option<&str> {
        self.turns
            .first()
            .filter(|turn| turn.role == Role::System)
            .map(|turn| turn.content.as_str())
    }

    /// True if the first entry is a system turn.
    pub fn has_system(&self) -> bool {
        self.system().is_some()
    }

    /// Appends a completed exchange and enforces the bound.
    pub fn push_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.turns.push(ConversationTurn::user(user));
        self.turns.push(ConversationTurn::assistant(assistant));
        self.trim();
    }

    /// Appends one turn and enforces the bound.
    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
        self.trim();
    }

    /// Drops the oldest non-system turns until the bound holds.
    pub fn trim(&mut self) {
        let pinned = usize::from(self.has_system());
        let excess = self.dialogue_len().saturating_sub(self.max_entries);
        if excess > 0 {
            self.turns.drain(pinned..pinned + excess);
        }
    }

    /// Removes every turn except the pinned system turn.
    pub fn clear(&mut self) {
        let pinned = usize::from(self.has_system());
        self.turns.truncate(pinned);
    }

    /// All turns, system turn first.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The turns after the pinned system turn.
    pub fn dialogue(&self) -> &[ConversationTurn] {
        let pinned = usize::from(self.has_system());
        &self.turns[pinned..]
    }

    /// Number of non-system turns.
    pub fn dialogue_len(&self) -> usize {
        self.dialogue().len()
    }

    /// Total number of turns, including the system turn.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// True if there are no turns at all.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::with_pairs(DEFAULT_HISTORY_PAIRS)
    }
}
