//! Token stream consumption
//!
//! One [`StreamCollector`] lives per in-flight request. It accumulates the
//! ordered text deltas of a response and mirrors the growing text onto the
//! display sink as a single updatable message. [`pump_tokens`] drives a
//! generation and drains its channel concurrently.

use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::engine::backend::{EngineError, StreamToken, TextEngine};
use crate::ui::gateway::UiGateway;

/// Accumulator for one streamed response
pub struct StreamCollector {
    gateway: Arc<dyn UiGateway>,
    id: Uuid,
    buffer: String,
    finished: bool,
}

impl StreamCollector {
    /// Start a fresh buffer and create its (empty) message on the sink
    pub fn begin(gateway: Arc<dyn UiGateway>) -> Self {
        let id = Uuid::new_v4();
        gateway.upsert_streaming(id, "");
        Self {
            gateway,
            id,
            buffer: String::new(),
            finished: false,
        }
    }

    /// Append one chunk and re-render the full buffer onto the same message
    pub fn append(&mut self, chunk: &str) {
        if self.finished {
            tracing::warn!("chunk received after stream end; ignored");
            return;
        }
        self.buffer.push_str(chunk);
        self.gateway.upsert_streaming(self.id, &self.buffer);
    }

    /// Mark the stream final. Idempotent; later appends are ignored.
    pub fn end(&mut self) {
        self.finished = true;
    }

    /// Whether the final chunk has arrived
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Accumulated text so far
    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// Consume the collector, yielding the full response text
    pub fn into_text(self) -> String {
        self.buffer
    }

    /// Id of the streaming message on the sink
    pub fn message_id(&self) -> Uuid {
        self.id
    }
}

/// Drive one generation, draining its token channel in arrival order.
///
/// Pending text is delivered to the collector before the engine's completion
/// is observed, so no trailing chunks are lost. Returns once the generation
/// has settled and the channel is fully drained.
pub async fn pump_tokens(
    engine: &mut dyn TextEngine,
    prompt: &str,
    collector: &mut StreamCollector,
) -> Result<(), EngineError> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut generation = engine.generate(prompt, tx);

    let mut outcome: Option<Result<(), EngineError>> = None;
    let mut drained = false;
    while !(drained && outcome.is_some()) {
        tokio::select! {
            biased;

            token = rx.recv(), if !drained => match token {
                Some(StreamToken::Delta(text)) => collector.append(&text),
                Some(StreamToken::Final(text)) => {
                    collector.append(&text);
                    collector.end();
                }
                None => drained = true,
            },
            result = &mut generation, if outcome.is_none() => outcome = Some(result),
        }
    }

    match outcome {
        Some(result) => result,
        // the loop cannot exit without an outcome
        None => Ok(()),
    }
}
