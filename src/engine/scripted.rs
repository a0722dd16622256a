//! Deterministic offline backend
//!
//! Backs the default build and the test suite without native dependencies.
//! Replies are scripted per prompt (unscripted prompts get a word-chunked
//! echo), failures are injectable per operation, and every lifecycle step is
//! recorded so ordering can be asserted from outside.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task;

use crate::engine::backend::{EngineBackend, EngineError, StreamToken, TextEngine, TokenSender};
use crate::types::config::EngineConfig;

/// Lifecycle event recorded by the scripted backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    ConstructStarted,
    ConstructCompleted,
    ConstructFailed,
    GenerateStarted,
    GenerateCompleted,
    GenerateFailed,
    CloseStarted,
    CloseCompleted,
    CloseFailed,
}

#[derive(Default)]
struct ScriptedState {
    replies: Mutex<HashMap<String, Vec<String>>>,
    fail_constructs: Mutex<VecDeque<String>>,
    fail_generates: Mutex<VecDeque<String>>,
    fail_closes: Mutex<VecDeque<String>>,
    history: Mutex<Vec<EngineEvent>>,
    live: AtomicUsize,
    max_live: AtomicUsize,
}

impl ScriptedState {
    fn record(&self, event: EngineEvent) {
        self.history.lock().push(event);
    }

    fn take_failure(queue: &Mutex<VecDeque<String>>) -> Option<String> {
        queue.lock().pop_front()
    }

    fn instance_up(&self) {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
    }

    fn instance_down(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Offline engine backend with scripted behavior
///
/// Clones share state, so a clone kept by a test observes everything the
/// session does with its own clone.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    state: Arc<ScriptedState>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the chunk sequence streamed for `prompt`.
    ///
    /// The last entry becomes the final chunk; an empty script streams a
    /// single empty final chunk.
    pub fn script_reply(&self, prompt: &str, chunks: &[&str]) {
        let chunks = chunks.iter().map(|c| c.to_string()).collect();
        self.state.replies.lock().insert(prompt.to_string(), chunks);
    }

    /// Fail the next engine construction with `reason`
    pub fn fail_next_construct(&self, reason: &str) {
        self.state
            .fail_constructs
            .lock()
            .push_back(reason.to_string());
    }

    /// Fail the next generation with `reason`
    pub fn fail_next_generate(&self, reason: &str) {
        self.state
            .fail_generates
            .lock()
            .push_back(reason.to_string());
    }

    /// Fail the next close with `reason`
    pub fn fail_next_close(&self, reason: &str) {
        self.state.fail_closes.lock().push_back(reason.to_string());
    }

    /// All lifecycle events recorded so far, in order
    pub fn history(&self) -> Vec<EngineEvent> {
        self.state.history.lock().clone()
    }

    /// Number of occurrences of `event` in the history
    pub fn count(&self, event: EngineEvent) -> usize {
        self.state.history.lock().iter().filter(|e| **e == event).count()
    }

    /// Engines currently holding resources
    pub fn live_instances(&self) -> usize {
        self.state.live.load(Ordering::SeqCst)
    }

    /// High-water mark of simultaneously live engines
    pub fn max_live_instances(&self) -> usize {
        self.state.max_live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineBackend for ScriptedBackend {
    async fn construct(&self, config: &EngineConfig) -> Result<Box<dyn TextEngine>, EngineError> {
        self.state.record(EngineEvent::ConstructStarted);
        // model loads are long in the real backend; stay a suspension point
        task::yield_now().await;

        if let Some(reason) = ScriptedState::take_failure(&self.state.fail_constructs) {
            self.state.record(EngineEvent::ConstructFailed);
            return Err(EngineError::Initialization(reason));
        }

        self.state.instance_up();
        self.state.record(EngineEvent::ConstructCompleted);
        Ok(Box::new(ScriptedEngine {
            state: Arc::clone(&self.state),
            config: config.clone(),
            closed: false,
        }))
    }
}

/// Live instance handed out by [`ScriptedBackend`]
struct ScriptedEngine {
    state: Arc<ScriptedState>,
    config: EngineConfig,
    closed: bool,
}

impl ScriptedEngine {
    fn chunks_for(&self, prompt: &str) -> Vec<String> {
        if let Some(chunks) = self.state.replies.lock().get(prompt) {
            return chunks.clone();
        }

        // unscripted prompts echo, flavored by the active adapter
        let persona = self
            .config
            .adapter_path
            .as_deref()
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().into_owned());
        let reply = match persona {
            Some(tag) => format!("({}) You said: {}", tag, prompt),
            None => format!("You said: {}", prompt),
        };

        let mut chunks: Vec<String> = reply.split_inclusive(' ').map(str::to_string).collect();
        chunks.push(String::new());
        chunks
    }
}

#[async_trait]
impl TextEngine for ScriptedEngine {
    async fn generate(&mut self, prompt: &str, tokens: TokenSender) -> Result<(), EngineError> {
        self.state.record(EngineEvent::GenerateStarted);
        if self.closed {
            self.state.record(EngineEvent::GenerateFailed);
            return Err(EngineError::NotReady);
        }
        if let Some(reason) = ScriptedState::take_failure(&self.state.fail_generates) {
            self.state.record(EngineEvent::GenerateFailed);
            return Err(EngineError::Inference(reason));
        }

        let chunks = self.chunks_for(prompt);
        if chunks.is_empty() {
            let _ = tokens.send(StreamToken::Final(String::new()));
        } else {
            let last = chunks.len() - 1;
            for (i, chunk) in chunks.into_iter().enumerate() {
                let token = if i == last {
                    StreamToken::Final(chunk)
                } else {
                    StreamToken::Delta(chunk)
                };
                let _ = tokens.send(token);
                task::yield_now().await;
            }
        }

        self.state.record(EngineEvent::GenerateCompleted);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        self.state.record(EngineEvent::CloseStarted);
        task::yield_now().await;

        if self.closed {
            tracing::debug!("scripted engine already closed");
            return Ok(());
        }
        self.closed = true;
        self.state.instance_down();

        if let Some(reason) = ScriptedState::take_failure(&self.state.fail_closes) {
            self.state.record(EngineEvent::CloseFailed);
            return Err(EngineError::Teardown(reason));
        }

        self.state.record(EngineEvent::CloseCompleted);
        Ok(())
    }
}

impl Drop for ScriptedEngine {
    fn drop(&mut self) {
        // dropped without close still releases its slot
        if !self.closed {
            self.closed = true;
            self.state.instance_down();
        }
    }
}
