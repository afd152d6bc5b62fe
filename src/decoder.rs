//! Streaming response decoding.
//!
//! Each chunk delivered by the transport is one complete JSON document.  Its shape depends on
//! the provider family; [`extract_text`] pulls out the text fragment it carries, if any.

use bytes::Bytes;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::catalog::{ProviderFamily, ProviderSpec};
use crate::error::{Error, Result};

/// One unit of the streamed response, opaque until decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    bytes: Bytes,
}

impl StreamChunk {
    /// Wrap raw chunk bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for a zero-length chunk.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<&'static str> for StreamChunk {
    fn from(s: &'static str) -> Self {
        Self::new(Bytes::from_static(s.as_bytes()))
    }
}

impl From<Vec<u8>> for StreamChunk {
    fn from(v: Vec<u8>) -> Self {
        Self::new(v)
    }
}

#[derive(Debug, Deserialize)]
struct AmazonChunk {
    #[serde(rename = "outputText")]
    output_text: String,
}

#[derive(Debug, Deserialize)]
struct MetaChunk {
    generation: String,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    completion: String,
}

#[derive(Debug, Deserialize)]
struct CohereChunk {
    generations: Vec<CohereGeneration>,
}

#[derive(Debug, Deserialize)]
struct CohereGeneration {
    text: String,
}

#[derive(Debug, Deserialize)]
struct MistralChunk {
    outputs: Vec<MistralOutput>,
}

#[derive(Debug, Deserialize)]
struct MistralOutput {
    text: String,
}

/// The events multiplexed on an Anthropic messages stream.  Only text deltas carry text.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum MessagesEvent {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: MessagesDelta },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum MessagesDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

fn parse<T: DeserializeOwned>(family: ProviderFamily, chunk: &[u8]) -> Result<T> {
    serde_json::from_slice(chunk).map_err(|err| {
        Error::decode(
            format!("malformed {family} chunk: {err}"),
            Some(Box::new(err)),
        )
    })
}

/// Extracts the text fragment carried by one chunk.
///
/// Returns an empty string for chunks that legitimately carry no text, such as the start,
/// stop and metadata events of an Anthropic messages stream.
///
/// # Errors
///
/// Returns [`Error::Decode`] if the chunk is not a well-formed document of the family's
/// shape.
pub fn extract_text(spec: &ProviderSpec, chunk: &[u8]) -> Result<String> {
    let family = spec.family();
    match family {
        ProviderFamily::Amazon => Ok(parse::<AmazonChunk>(family, chunk)?.output_text),
        ProviderFamily::MetaLlama2 | ProviderFamily::MetaLlama3 => {
            Ok(parse::<MetaChunk>(family, chunk)?.generation)
        }
        ProviderFamily::AnthropicMessages => match parse::<MessagesEvent>(family, chunk)? {
            MessagesEvent::ContentBlockDelta {
                delta: MessagesDelta::TextDelta { text },
            } => Ok(text),
            _ => Ok(String::new()),
        },
        ProviderFamily::AnthropicCompletions => {
            Ok(parse::<CompletionChunk>(family, chunk)?.completion)
        }
        ProviderFamily::Cohere => {
            let chunk = parse::<CohereChunk>(family, chunk)?;
            Ok(chunk
                .generations
                .into_iter()
                .map(|generation| generation.text)
                .collect::<Vec<_>>()
                .join(" "))
        }
        ProviderFamily::Mistral => parse::<MistralChunk>(family, chunk)?
            .outputs
            .into_iter()
            .next()
            .map(|output| output.text)
            .ok_or_else(|| Error::decode("mistral chunk has no outputs", None)),
    }
}
