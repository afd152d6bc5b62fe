//! The inference transport.
//!
//! A transport opens one streaming call for a prepared payload and hands back the raw
//! chunks.  It never interprets them; that is the decoder's job.

mod bedrock;

use std::pin::Pin;

use futures::Stream;

use crate::adapter::Payload;
use crate::catalog::ProviderSpec;
use crate::decoder::StreamChunk;
use crate::error::Result;

pub use bedrock::{BEARER_TOKEN_ENV, BedrockTransport, DEFAULT_REGION};

/// The chunks of one streamed response, in arrival order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Opens streaming inference calls.
#[async_trait::async_trait]
pub trait InferenceTransport: Send + Sync {
    /// Opens a streaming call for `payload` against the model described by `spec`, sending
    /// the spec's accept and content-type headers.
    ///
    /// # Errors
    ///
    /// Connection, authentication, quota and request errors are returned before any chunk is
    /// produced; failures after that point are yielded by the stream itself.
    async fn open_stream(&self, spec: &ProviderSpec, payload: &Payload) -> Result<ChunkStream>;
}
