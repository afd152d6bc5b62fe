//! The provider catalog.
//!
//! A fixed table mapping Bedrock model identifiers to the provider family that serves them
//! and the request shape that family expects.  The table is built once and never mutated;
//! callers get a fresh copy of the body template for every request.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde_json::{Map, Value, json};

use crate::error::{Error, Result};

const JSON_MEDIA_TYPE: &str = "application/json";

/// An inference backend with its own request and response schema.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ProviderFamily {
    /// Amazon Titan text models (`inputText` / `outputText`).
    Amazon,
    /// Meta Llama 2 chat models (`[INST]` delimited prompt / `generation`).
    MetaLlama2,
    /// Meta Llama 3 instruct models (header-tagged prompt / `generation`).
    MetaLlama3,
    /// Anthropic text completions (`Human:`/`Assistant:` prompt / `completion`).
    AnthropicCompletions,
    /// Anthropic messages, the claude-3 family (`messages` / multiplexed events).
    AnthropicMessages,
    /// Cohere command models (`User:`/`Assistant:` prompt / `generations`).
    Cohere,
    /// Mistral models (`[INST]` delimited prompt / `outputs`).
    Mistral,
}

impl ProviderFamily {
    /// Every family, in catalog order.
    pub const ALL: [ProviderFamily; 7] = [
        ProviderFamily::Amazon,
        ProviderFamily::MetaLlama2,
        ProviderFamily::MetaLlama3,
        ProviderFamily::AnthropicCompletions,
        ProviderFamily::AnthropicMessages,
        ProviderFamily::Cohere,
        ProviderFamily::Mistral,
    ];

    /// The canonical name of the family.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderFamily::Amazon => "amazon",
            ProviderFamily::MetaLlama2 => "meta-llama2",
            ProviderFamily::MetaLlama3 => "meta-llama3",
            ProviderFamily::AnthropicCompletions => "anthropic-completions",
            ProviderFamily::AnthropicMessages => "anthropic-messages",
            ProviderFamily::Cohere => "cohere",
            ProviderFamily::Mistral => "mistral",
        }
    }

    /// Infers the family from a Bedrock model identifier.
    ///
    /// The vendor prefix (the text before the first `.`) selects the vendor; Meta and
    /// Anthropic are further split by model generation.
    pub fn infer(model_id: &str) -> Result<Self> {
        let (vendor, model) = model_id
            .split_once('.')
            .ok_or_else(|| Error::unsupported_provider(model_id))?;
        match vendor {
            "amazon" => Ok(ProviderFamily::Amazon),
            "meta" if model.contains("llama3") => Ok(ProviderFamily::MetaLlama3),
            "meta" => Ok(ProviderFamily::MetaLlama2),
            "anthropic" if model.contains("claude-3") => Ok(ProviderFamily::AnthropicMessages),
            "anthropic" => Ok(ProviderFamily::AnthropicCompletions),
            "cohere" => Ok(ProviderFamily::Cohere),
            "mistral" => Ok(ProviderFamily::Mistral),
            other => Err(Error::unsupported_provider(other)),
        }
    }
}

impl fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ProviderFamily::ALL
            .into_iter()
            .find(|family| family.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::unsupported_provider(s))
    }
}

/// One catalog entry: a model identifier and the request shape its family expects.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSpec {
    model_id: String,
    family: ProviderFamily,
    accept: String,
    content_type: String,
    template: Map<String, Value>,
}

impl ProviderSpec {
    fn new(model_id: &str, family: ProviderFamily, template: Value) -> Self {
        let template = match template {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            model_id: model_id.to_string(),
            family,
            accept: JSON_MEDIA_TYPE.to_string(),
            content_type: JSON_MEDIA_TYPE.to_string(),
            template,
        }
    }

    /// The model identifier, unique within the catalog.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// The provider family serving this model.
    pub fn family(&self) -> ProviderFamily {
        self.family
    }

    /// The `Accept` header to send with requests.
    pub fn accept(&self) -> &str {
        &self.accept
    }

    /// The `Content-Type` header to send with requests.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// The shared body template.  Read-only; see [`ProviderSpec::fresh_body`].
    pub fn template(&self) -> &Map<String, Value> {
        &self.template
    }

    /// Returns a private copy of the body template for one request.
    pub fn fresh_body(&self) -> Map<String, Value> {
        self.template.clone()
    }
}

/// The immutable table of known models.
#[derive(Debug, Clone)]
pub struct ProviderCatalog {
    entries: Vec<ProviderSpec>,
}

impl ProviderCatalog {
    /// Builds the table of Bedrock text models.
    pub fn bedrock() -> Self {
        let titan = json!({
            "inputText": "",
            "textGenerationConfig": {
                "maxTokenCount": 4096,
                "stopSequences": [],
                "temperature": 0,
                "topP": 1
            }
        });
        let llama = json!({
            "prompt": "",
            "max_gen_len": 512,
            "temperature": 0.5,
            "top_p": 0.9
        });
        let claude_completions = json!({
            "prompt": "",
            "max_tokens_to_sample": 4096,
            "temperature": 0.5,
            "top_k": 250,
            "top_p": 1,
            "stop_sequences": ["\n\nHuman:"]
        });
        let claude_messages = json!({
            "anthropic_version": "bedrock-2023-05-31",
            "max_tokens": 4096,
            "messages": [],
            "temperature": 0.5,
            "top_k": 250,
            "top_p": 1,
            "stop_sequences": ["\n\nHuman:"]
        });
        let cohere = json!({
            "prompt": "",
            "max_tokens": 400,
            "temperature": 0.5,
            "p": 0.9,
            "k": 0,
            "stop_sequences": [],
            "return_likelihoods": "NONE",
            "stream": true
        });
        let mistral = json!({
            "prompt": "",
            "max_tokens": 512,
            "temperature": 0.5,
            "top_p": 0.9,
            "top_k": 50
        });

        use ProviderFamily::*;
        let table = [
            ("amazon.titan-text-express-v1", Amazon, &titan),
            ("amazon.titan-text-lite-v1", Amazon, &titan),
            ("amazon.titan-text-premier-v1:0", Amazon, &titan),
            ("anthropic.claude-3-sonnet-20240229-v1:0", AnthropicMessages, &claude_messages),
            ("anthropic.claude-3-haiku-20240307-v1:0", AnthropicMessages, &claude_messages),
            ("anthropic.claude-3-opus-20240229-v1:0", AnthropicMessages, &claude_messages),
            ("anthropic.claude-instant-v1", AnthropicCompletions, &claude_completions),
            ("anthropic.claude-v2", AnthropicCompletions, &claude_completions),
            ("anthropic.claude-v2:1", AnthropicCompletions, &claude_completions),
            ("meta.llama2-13b-chat-v1", MetaLlama2, &llama),
            ("meta.llama2-70b-chat-v1", MetaLlama2, &llama),
            ("meta.llama3-8b-instruct-v1:0", MetaLlama3, &llama),
            ("meta.llama3-70b-instruct-v1:0", MetaLlama3, &llama),
            ("cohere.command-text-v14", Cohere, &cohere),
            ("cohere.command-light-text-v14", Cohere, &cohere),
            ("mistral.mistral-7b-instruct-v0:2", Mistral, &mistral),
            ("mistral.mixtral-8x7b-instruct-v0:1", Mistral, &mistral),
            ("mistral.mistral-large-2402-v1:0", Mistral, &mistral),
        ];
        let entries = table
            .into_iter()
            .map(|(model_id, family, template)| {
                ProviderSpec::new(model_id, family, template.clone())
            })
            .collect();
        Self { entries }
    }

    /// The process-wide catalog, built on first use.
    pub fn global() -> &'static ProviderCatalog {
        static CATALOG: OnceLock<ProviderCatalog> = OnceLock::new();
        CATALOG.get_or_init(ProviderCatalog::bedrock)
    }

    /// Looks up a model identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownModel`], carrying every valid identifier, when the model is not
    /// in the table.
    pub fn lookup(&self, model_id: &str) -> Result<&ProviderSpec> {
        self.entries
            .iter()
            .find(|spec| spec.model_id == model_id)
            .ok_or_else(|| Error::unknown_model(model_id, self.model_ids()))
    }

    /// Every model identifier, in table order.
    pub fn model_ids(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|spec| spec.model_id.clone())
            .collect()
    }

    /// Iterates over every entry.
    pub fn iter(&self) -> impl Iterator<Item = &ProviderSpec> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the catalog has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
