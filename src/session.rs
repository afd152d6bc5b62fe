//! Conversation session management.
//!
//! A [`ConversationSession`] owns the rolling history and runs one turn at a time: it gathers
//! retrieved context, builds the provider payload, streams the reply through the decoder to a
//! [`Renderer`], and records the exchange once the stream is done.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;

use crate::adapter::{RequestAdapter, RetrievedContext};
use crate::catalog::ProviderSpec;
use crate::decoder::extract_text;
use crate::error::{Error, Result};
use crate::history::History;
use crate::observability::{
    RETRIEVAL_CALLS, RETRIEVAL_ERRORS, SESSION_TURN_DURATION, SESSION_TURN_FAILURES,
    SESSION_TURN_INTERRUPTS, SESSION_TURNS, STREAM_CHUNKS, STREAM_DECODE_ERRORS, STREAM_TTFT,
};
use crate::ocr::OcrEngine;
use crate::render::Renderer;
use crate::retriever::{DEFAULT_TOP_K, PassageRetriever};
use crate::speech::Transcriber;
use crate::transport::InferenceTransport;

/// Where a session is in its turn lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the next user input.
    Idle,
    /// Consuming the reply to the current turn.
    Streaming,
}

/// The result of a turn that produced a reply stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The concatenation of every text fragment shown to the user.
    pub reply: String,
    /// Number of chunks received from the transport.
    pub chunk_count: usize,
    /// True if the user stopped the stream early.
    pub interrupted: bool,
}

/// A single conversation against one model.
pub struct ConversationSession {
    spec: ProviderSpec,
    adapter: RequestAdapter,
    transport: Arc<dyn InferenceTransport>,
    retriever: Option<Arc<dyn PassageRetriever>>,
    top_k: usize,
    ocr: Option<Arc<dyn OcrEngine>>,
    transcriber: Option<Arc<dyn Transcriber>>,
    history: History,
    state: SessionState,
}

impl ConversationSession {
    /// Creates a session with an empty default-sized history.
    pub fn new(spec: ProviderSpec, transport: Arc<dyn InferenceTransport>) -> Self {
        Self {
            spec,
            adapter: RequestAdapter::default(),
            transport,
            retriever: None,
            top_k: DEFAULT_TOP_K,
            ocr: None,
            transcriber: None,
            history: History::default(),
            state: SessionState::Idle,
        }
    }

    /// Use a specific request adapter.
    pub fn with_adapter(mut self, adapter: RequestAdapter) -> Self {
        self.adapter = adapter;
        self
    }

    /// Replace the history, keeping any turns it already holds.
    pub fn with_history(mut self, history: History) -> Self {
        self.history = history;
        self
    }

    /// Install a leading system prompt.
    pub fn with_system(mut self, prompt: impl Into<String>) -> Self {
        self.history.set_system(Some(prompt.into()));
        self
    }

    /// Augment every turn with the `top_k` best passages from `retriever`.
    pub fn with_retriever(mut self, retriever: Arc<dyn PassageRetriever>, top_k: usize) -> Self {
        self.retriever = Some(retriever);
        self.top_k = top_k;
        self
    }

    /// Enable image input.
    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    /// Enable voice input.
    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    /// The model this session talks to.
    pub fn spec(&self) -> &ProviderSpec {
        &self.spec
    }

    /// The current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The rolling history.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Forget the dialogue, keeping the system prompt.
    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Sets or clears the system prompt.
    pub fn set_system(&mut self, prompt: Option<String>) {
        self.history.set_system(prompt);
    }

    /// True if image input is available.
    pub fn has_ocr(&self) -> bool {
        self.ocr.is_some()
    }

    /// True if voice input is available.
    pub fn has_transcriber(&self) -> bool {
        self.transcriber.is_some()
    }

    /// Turns an image, plus optional typed text, into the text of a turn.
    ///
    /// The recognized text comes first, followed by the typed text on its own line.
    pub async fn image_input(&self, path: &Path, typed: Option<&str>) -> Result<String> {
        let ocr = self
            .ocr
            .as_ref()
            .ok_or_else(|| Error::ocr("image input is not enabled"))?;
        let recognized = ocr.extract_text(path).await?;
        if recognized.trim().is_empty() {
            return Err(Error::ocr(format!(
                "no text recognized in {}",
                path.display()
            )));
        }
        match typed.map(str::trim).filter(|t| !t.is_empty()) {
            Some(typed) => Ok(format!("{recognized}\n{typed}")),
            None => Ok(recognized),
        }
    }

    /// Turns recorded speech into the text of a turn.
    pub async fn voice_input(&self, audio: &Path) -> Result<String> {
        let transcriber = self
            .transcriber
            .as_ref()
            .ok_or_else(|| Error::transcription("voice input is not enabled"))?;
        transcriber.transcribe(audio).await
    }

    async fn retrieve(&self, text: &str) -> Result<Option<RetrievedContext>> {
        let Some(retriever) = self.retriever.as_ref() else {
            return Ok(None);
        };
        RETRIEVAL_CALLS.click();
        let passages = retriever.retrieve(text, self.top_k).await.inspect_err(|_| {
            RETRIEVAL_ERRORS.click();
        })?;
        tracing::debug!(passages = passages.len(), "retrieved context");
        Ok(Some(RetrievedContext::new(passages)))
    }

    /// Runs one turn.
    ///
    /// Text is handed to `renderer` as it is decoded.  When the stream ends the exchange is
    /// appended to the history and the bound enforced.  If the stream fails or is interrupted
    /// part way, whatever text was shown is recorded as the reply.  A turn that produced no
    /// text, completed or not, leaves the history untouched.
    ///
    /// # Errors
    ///
    /// Retrieval, transport and decode failures abort the turn.  The session stays usable.
    pub async fn process_turn(
        &mut self,
        text: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<TurnOutcome> {
        SESSION_TURNS.click();
        let start = Instant::now();
        renderer.begin_response();
        self.state = SessionState::Streaming;
        let result = self.stream_turn(text, renderer, start).await;
        self.state = SessionState::Idle;
        SESSION_TURN_DURATION.add(start.elapsed().as_secs_f64());
        match &result {
            Ok(outcome) => {
                tracing::info!(
                    model_id = self.spec.model_id(),
                    chunks = outcome.chunk_count,
                    chars = outcome.reply.chars().count(),
                    interrupted = outcome.interrupted,
                    history = self.history.len(),
                    "turn complete"
                );
            }
            Err(err) => {
                SESSION_TURN_FAILURES.click();
                tracing::warn!(
                    model_id = self.spec.model_id(),
                    request_id = err.request_id(),
                    error = %err,
                    "turn failed"
                );
            }
        }
        result
    }

    async fn stream_turn(
        &mut self,
        text: &str,
        renderer: &mut dyn Renderer,
        start: Instant,
    ) -> Result<TurnOutcome> {
        let context = self.retrieve(text).await?;
        let payload =
            self.adapter
                .build_payload(&self.spec, text, &self.history, context.as_ref())?;
        tracing::debug!(model_id = self.spec.model_id(), payload = ?payload.body(), "request body");

        let mut stream = self.transport.open_stream(&self.spec, &payload).await?;

        let mut reply = String::new();
        let mut chunk_count = 0;
        let mut interrupted = false;
        let mut failure = None;
        loop {
            if renderer.should_interrupt() {
                interrupted = true;
                break;
            }
            let Some(chunk) = stream.next().await else {
                break;
            };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            };
            chunk_count += 1;
            STREAM_CHUNKS.click();
            match extract_text(&self.spec, chunk.as_bytes()) {
                Ok(fragment) if fragment.is_empty() => {}
                Ok(fragment) => {
                    if reply.is_empty() {
                        STREAM_TTFT.add(start.elapsed().as_secs_f64());
                    }
                    renderer.print_text(&fragment);
                    reply.push_str(&fragment);
                }
                Err(err) => {
                    STREAM_DECODE_ERRORS.click();
                    failure = Some(err);
                    break;
                }
            }
        }
        drop(stream);

        if interrupted {
            SESSION_TURN_INTERRUPTS.click();
            renderer.print_interrupted();
        } else if failure.is_none() {
            renderer.finish_response();
        }

        // an empty assistant turn would be rejected on every later request
        if !reply.is_empty() {
            self.history.push_exchange(text, reply.clone());
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(TurnOutcome {
                reply,
                chunk_count,
                interrupted,
            }),
        }
    }
}
