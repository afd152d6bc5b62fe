//! Request adaptation.
//!
//! Turns one logical chat turn (the user's text, the rolling history and optional retrieved
//! passages) into the body a provider family expects.  Every request starts from a fresh
//! copy of the catalog template; only the fields a family owns are overwritten.

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::catalog::{ProviderFamily, ProviderSpec};
use crate::error::Result;
use crate::history::{ConversationTurn, History, Role};
use crate::language::LanguageDirective;

const LLAMA3_BEGIN: &str = "<|begin_of_text|>";
const LLAMA3_EOT: &str = "<|eot_id|>";
const INST_OPEN: &str = "<s>[INST] ";
const INST_CLOSE: &str = " [/INST]";
const SEQUENCE_END: &str = "</s>";

/// Passages retrieved for one query, in rank order.
///
/// Produced fresh for every turn and never stored in the history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrievedContext {
    passages: Vec<String>,
}

impl RetrievedContext {
    /// Wrap retrieved passages.
    pub fn new(passages: Vec<String>) -> Self {
        Self { passages }
    }

    /// The passages, best first.
    pub fn passages(&self) -> &[String] {
        &self.passages
    }

    /// True if nothing was retrieved.
    pub fn is_empty(&self) -> bool {
        self.passages.iter().all(|p| p.trim().is_empty())
    }

    /// The passages joined with newlines.
    pub fn joined(&self) -> String {
        self.passages.join("\n")
    }

    /// Prefixes `question` with the passages.
    pub fn frame(&self, question: &str) -> String {
        format!("Context:\n{}\n\nQuestion:\n{question}", self.joined())
    }
}

/// A provider-shaped request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Payload {
    body: Map<String, Value>,
}

impl Payload {
    /// The body fields.
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    /// One body field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }

    /// A string-valued body field.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.body.get(field).and_then(Value::as_str)
    }

    /// Serializes the body for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.body)?)
    }
}

/// Builds provider-specific payloads.
#[derive(Debug, Clone, Default)]
pub struct RequestAdapter {
    language: LanguageDirective,
}

impl RequestAdapter {
    /// Create an adapter with the given language directive.
    pub fn new(language: LanguageDirective) -> Self {
        Self { language }
    }

    /// The language directive in use.
    pub fn language(&self) -> &LanguageDirective {
        &self.language
    }

    /// Builds the request body for one turn.
    ///
    /// The history is read, never modified.  Retrieved passages, when present and non-empty,
    /// frame the new question for every family.
    pub fn build_payload(
        &self,
        spec: &ProviderSpec,
        user_text: &str,
        history: &History,
        context: Option<&RetrievedContext>,
    ) -> Result<Payload> {
        let question = match context {
            Some(context) if !context.is_empty() => context.frame(user_text),
            _ => user_text.to_string(),
        };
        let system = history.system();
        let dialogue = history.dialogue();

        let mut body = spec.fresh_body();
        match spec.family() {
            ProviderFamily::Amazon => {
                // the whole transcript, not only the new text, is the question
                let transcript = flatten_transcript(system, dialogue, user_text);
                let input = match context {
                    Some(context) if !context.is_empty() => context.frame(&transcript),
                    _ => transcript,
                };
                body.insert("inputText".to_string(), Value::String(input));
            }
            ProviderFamily::MetaLlama3 => {
                let directive = self.language.instruction_for(user_text);
                body.insert(
                    "prompt".to_string(),
                    Value::String(llama3_prompt(system, dialogue, &question, directive)),
                );
            }
            ProviderFamily::MetaLlama2 | ProviderFamily::Mistral => {
                let directive = self.language.instruction_for(user_text);
                body.insert(
                    "prompt".to_string(),
                    Value::String(instruction_prompt(system, dialogue, &question, directive)),
                );
            }
            ProviderFamily::AnthropicMessages => {
                let mut messages: Vec<Value> = dialogue
                    .iter()
                    .map(|turn| json!({"role": message_role(turn.role), "content": turn.content}))
                    .collect();
                messages.push(json!({"role": "user", "content": question}));
                body.insert("messages".to_string(), Value::Array(messages));
                if let Some(system) = system {
                    body.insert("system".to_string(), Value::String(system.to_string()));
                }
            }
            ProviderFamily::AnthropicCompletions => {
                body.insert(
                    "prompt".to_string(),
                    Value::String(human_assistant_prompt(system, dialogue, &question)),
                );
            }
            ProviderFamily::Cohere => {
                body.insert(
                    "prompt".to_string(),
                    Value::String(user_assistant_prompt(system, dialogue, &question)),
                );
            }
        }
        Ok(Payload { body })
    }
}

fn message_role(role: Role) -> &'static str {
    match role {
        Role::Assistant => "assistant",
        Role::User | Role::System => "user",
    }
}

/// `speaker: content` lines followed by the bare question.
fn flatten_transcript(system: Option<&str>, dialogue: &[ConversationTurn], question: &str) -> String {
    let mut lines: Vec<String> = Vec::with_capacity(dialogue.len() + 2);
    if let Some(system) = system {
        lines.push(format!("{}: {system}", Role::System.label()));
    }
    lines.extend(
        dialogue
            .iter()
            .map(|turn| format!("{}: {}", turn.role.label(), turn.content)),
    );
    lines.push(question.to_string());
    lines.join("\n")
}

fn llama3_block(role: &str, content: &str) -> String {
    format!("<|start_header_id|>{role}<|end_header_id|>\n\n{content}{LLAMA3_EOT}")
}

fn llama3_prompt(
    system: Option<&str>,
    dialogue: &[ConversationTurn],
    question: &str,
    directive: Option<String>,
) -> String {
    let mut prompt = String::from(LLAMA3_BEGIN);
    if let Some(system) = system {
        prompt.push_str(&llama3_block("system", system));
    }
    for turn in dialogue {
        let role = match turn.role {
            Role::Assistant => "assistant",
            Role::User | Role::System => "user",
        };
        prompt.push_str(&llama3_block(role, &turn.content));
    }
    let directive = directive.unwrap_or_default();
    prompt.push_str(&llama3_block("user", &format!("{question}{directive}")));
    prompt.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
    prompt
}

/// Llama 2 and Mistral: user turns inside `[INST]` delimiters, assistant turns bare.
fn instruction_prompt(
    system: Option<&str>,
    dialogue: &[ConversationTurn],
    question: &str,
    directive: Option<String>,
) -> String {
    let mut system_block = system.map(|system| format!("<<SYS>>\n{system}\n<</SYS>>\n\n"));
    let mut prompt = String::new();
    for turn in dialogue {
        match turn.role {
            Role::Assistant => {
                prompt.push(' ');
                prompt.push_str(&turn.content);
                prompt.push_str(SEQUENCE_END);
            }
            Role::User | Role::System => {
                prompt.push_str(INST_OPEN);
                if let Some(block) = system_block.take() {
                    prompt.push_str(&block);
                }
                prompt.push_str(&turn.content);
                prompt.push_str(INST_CLOSE);
            }
        }
    }
    prompt.push_str(INST_OPEN);
    if let Some(block) = system_block.take() {
        prompt.push_str(&block);
    }
    prompt.push_str(question);
    prompt.push_str(&directive.unwrap_or_default());
    prompt.push_str(INST_CLOSE);
    prompt
}

fn human_assistant_prompt(
    system: Option<&str>,
    dialogue: &[ConversationTurn],
    question: &str,
) -> String {
    let mut prompt = system.map(str::to_string).unwrap_or_default();
    for turn in dialogue {
        let speaker = match turn.role {
            Role::Assistant => "Assistant",
            Role::User | Role::System => "Human",
        };
        prompt.push_str(&format!("\n\n{speaker}: {}", turn.content));
    }
    prompt.push_str(&format!("\n\nHuman: {question}\n\nAssistant:"));
    prompt
}

fn user_assistant_prompt(
    system: Option<&str>,
    dialogue: &[ConversationTurn],
    question: &str,
) -> String {
    let mut lines: Vec<String> = Vec::with_capacity(dialogue.len() + 2);
    if let Some(system) = system {
        lines.push(format!("System: {system}"));
    }
    lines.extend(dialogue.iter().map(|turn| {
        let speaker = match turn.role {
            Role::Assistant => "Assistant",
            Role::User | Role::System => "User",
        };
        format!("{speaker}: {}", turn.content)
    }));
    lines.push(format!("User: {question}"));
    lines.join("\n")
}
