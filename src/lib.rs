//! Streaming multi-provider chat for Amazon Bedrock models.
//!
//! A [`ConversationSession`] turns each user input into a provider-shaped request through
//! the [`RequestAdapter`], streams the reply over an [`InferenceTransport`], decodes every
//! chunk with [`extract_text`] and keeps a bounded [`History`].

// Public modules
pub mod adapter;
pub mod catalog;
pub mod chat;
pub mod decoder;
pub mod error;
pub mod eventstream;
pub mod history;
pub mod language;
pub mod ocr;
pub mod persona;
pub mod render;
pub mod retriever;
pub mod session;
pub mod speech;
pub mod transport;

mod observability;

// Re-exports
pub use adapter::{Payload, RequestAdapter, RetrievedContext};
pub use catalog::{ProviderCatalog, ProviderFamily, ProviderSpec};
pub use decoder::{StreamChunk, extract_text};
pub use error::{Error, Result};
pub use history::{ConversationTurn, History, Role};
pub use language::LanguageDirective;
pub use observability::register_biometrics;
pub use ocr::{OcrEngine, TesseractOcr};
pub use persona::TeachingPrompt;
pub use render::{BufferRenderer, PlainTextRenderer, Renderer};
pub use retriever::{CorpusRetriever, Embedder, PassageRetriever};
#[cfg(feature = "fastembed-embeddings")]
pub use retriever::FastEmbedder;
pub use session::{ConversationSession, SessionState, TurnOutcome};
pub use speech::{CommandTranscriber, Transcriber};
pub use transport::{BedrockTransport, ChunkStream, InferenceTransport};
