//! Session lifecycle state machine
//!
//! [`SessionController`] owns the one session: boot, prompt turns, adapter
//! swaps, and the transcript. It is the single writer against the engine
//! handle; every lifecycle method takes `&mut self`, so overlapping
//! operations cannot be expressed, and the state guards reject the ones a
//! caller queues up anyway.

use std::sync::Arc;

use thiserror::Error;

use crate::engine::backend::{EngineBackend, EngineError};
use crate::engine::handle::EngineHandle;
use crate::session::stream::{pump_tokens, StreamCollector};
use crate::types::config::{AdapterRegistry, EngineConfig};
use crate::types::message::{Channel, ChatLine};
use crate::ui::gateway::UiGateway;

/// Lifecycle states of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created; boot not yet requested
    Uninitialized,
    /// First engine construction in progress
    Booting,
    /// Idle with a live engine; prompts and adapter changes accepted
    Online,
    /// A prompt is being answered
    Busy,
    /// An adapter swap is rebuilding the engine
    Reconfiguring,
    /// Unrecoverable; only a restart helps
    Failed,
}

/// Errors surfaced by session operations
///
/// By the time a method returns one of these the display sink has already
/// been told; callers need them only for logging and tests.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The submitted prompt was empty after trimming
    #[error("prompt is empty")]
    EmptyPrompt,
    /// The requested adapter is not in the registry
    #[error("no adapter named '{0}' is registered")]
    UnknownAdapter(String),
    /// The operation is not valid in the current state
    #[error("operation rejected in {0:?} state")]
    Rejected(SessionState),
    /// The engine failed underneath the operation
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// The one interactive session
pub struct SessionController {
    handle: EngineHandle,
    registry: AdapterRegistry,
    gateway: Arc<dyn UiGateway>,
    state: SessionState,
    base_config: EngineConfig,
    active_adapter: Option<String>,
    transcript: Vec<ChatLine>,
}

impl SessionController {
    pub fn new(
        backend: Arc<dyn EngineBackend>,
        base_config: EngineConfig,
        registry: AdapterRegistry,
        gateway: Arc<dyn UiGateway>,
    ) -> Self {
        Self {
            handle: EngineHandle::new(backend),
            registry,
            gateway,
            state: SessionState::Uninitialized,
            base_config,
            active_adapter: None,
            transcript: Vec::new(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Everything shown this session, oldest first
    pub fn transcript(&self) -> &[ChatLine] {
        &self.transcript
    }

    /// Name of the applied adapter, `None` when the base model is active
    pub fn active_adapter(&self) -> Option<&str> {
        self.active_adapter.as_deref()
    }

    /// Configuration of the live engine, if one is up
    pub fn engine_config(&self) -> Option<&EngineConfig> {
        self.handle.config()
    }

    /// The adapters this session can swap to
    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Record a line on the transcript and mirror it to the display sink
    fn post(&mut self, channel: Channel, text: impl Into<String>) {
        let line = ChatLine::new(channel, text);
        self.gateway.append_message(&line.to_string(), channel);
        self.transcript.push(line);
    }

    fn enter_online(&mut self) {
        self.state = SessionState::Online;
        self.gateway.set_input_enabled(true);
    }

    /// Terminal failure: announce it and latch the state
    fn fail(&mut self, error: &EngineError) {
        tracing::error!("session failed: {}", error);
        self.gateway.update_status("SYSTEM FAILURE", false);
        self.post(Channel::System, format!("[FATAL ERROR: {}]", error));
        self.state = SessionState::Failed;
    }

    /// Boot the session with the base configuration (no adapter)
    pub async fn boot(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Uninitialized {
            tracing::warn!(state = ?self.state, "boot rejected");
            self.post(Channel::System, "[Session already started. Boot ignored.]");
            return Err(SessionError::Rejected(self.state));
        }
        self.state = SessionState::Booting;
        self.gateway.set_input_enabled(false);
        self.gateway.update_status("BOOTING...", false);
        self.post(Channel::System, "[System booting...]");
        self.post(Channel::System, "[Loading text engine...]");

        match self.handle.construct(self.base_config.clone()).await {
            Ok(()) => {
                tracing::info!(
                    model = %self.base_config.base_path.display(),
                    "engine online"
                );
                self.post(Channel::SystemReady, "[Text engine ONLINE]");
                self.gateway.update_status("ONLINE", true);
                self.post(
                    Channel::SystemReady,
                    "[UltraLM operational. Awaiting input.]",
                );
                self.enter_online();
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                Err(e.into())
            }
        }
    }

    /// Answer one prompt, streaming the response to the display sink.
    ///
    /// The session is Busy until the stream settles, then Online again.
    /// Inference failures end the turn but not the session.
    pub async fn submit_prompt(&mut self, prompt: &str) -> Result<(), SessionError> {
        if self.state != SessionState::Online {
            tracing::warn!(state = ?self.state, "prompt rejected");
            self.post(Channel::System, "[Engine not ready. Prompt ignored.]");
            return Err(SessionError::Rejected(self.state));
        }
        let prompt = prompt.trim();
        if prompt.is_empty() {
            self.post(Channel::System, "[No prompt. Operation cancelled.]");
            return Err(SessionError::EmptyPrompt);
        }

        self.post(Channel::User, prompt);
        self.state = SessionState::Busy;
        self.gateway.set_input_enabled(false);
        tracing::debug!(chars = prompt.len(), "generation started");

        let mut collector = StreamCollector::begin(Arc::clone(&self.gateway));
        let result = match self.handle.engine_mut() {
            Ok(engine) => pump_tokens(engine, prompt, &mut collector).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                if !collector.is_finished() {
                    tracing::warn!("generation settled without a final chunk");
                }
                tracing::debug!(chars = collector.text().len(), "generation complete");
                // already on screen via the stream; record it for the transcript
                self.transcript
                    .push(ChatLine::new(Channel::Model, collector.into_text()));
                self.enter_online();
                Ok(())
            }
            Err(e) => {
                tracing::warn!("inference failed: {}", e);
                self.post(Channel::System, format!("[INFERENCE ERROR: {}]", e));
                self.enter_online();
                Err(e.into())
            }
        }
    }

    /// Swap the active adapter, or reset to the base model with "default".
    ///
    /// Always cycles the engine, even when the requested adapter is already
    /// active: the old instance settles its close before the replacement is
    /// constructed. On failure the previous configuration gets one recovery
    /// construction; if that fails too the session is failed.
    pub async fn change_adapter(&mut self, name: &str) -> Result<(), SessionError> {
        if self.state != SessionState::Online {
            tracing::warn!(state = ?self.state, "adapter change rejected");
            self.post(Channel::System, "[Engine offline. Cannot change adapter.]");
            return Err(SessionError::Rejected(self.state));
        }

        let adapter_path = if AdapterRegistry::is_base(name) {
            None
        } else {
            match self.registry.get(name) {
                Some(path) => Some(path.to_path_buf()),
                None => {
                    self.post(
                        Channel::System,
                        format!("[ADAPTER ERROR: no adapter named '{}' is registered]", name),
                    );
                    return Err(SessionError::UnknownAdapter(name.to_string()));
                }
            }
        };

        self.state = SessionState::Reconfiguring;
        self.gateway.set_input_enabled(false);
        self.post(Channel::System, format!("[Applying adapter: {}...]", name));

        let previous = self.handle.config().cloned();
        let next = EngineConfig {
            adapter_path: adapter_path.clone(),
            ..self.base_config.clone()
        };

        match self.handle.replace(next).await {
            Ok(()) => {
                if adapter_path.is_some() {
                    tracing::info!(adapter = name, "adapter applied");
                    self.active_adapter = Some(name.to_string());
                    self.post(
                        Channel::SystemReady,
                        format!("[{} adapter ONLINE]", name.to_uppercase()),
                    );
                } else {
                    tracing::info!("adapter reset to base model");
                    self.active_adapter = None;
                    self.post(Channel::SystemReady, "[Adapter reset to DEFAULT]");
                }
                self.enter_online();
                Ok(())
            }
            Err(e) => {
                tracing::warn!("adapter change failed: {}", e);
                self.post(Channel::System, format!("[ADAPTER ERROR: {}]", e));
                self.recover_previous(previous).await;
                Err(e.into())
            }
        }
    }

    /// One recovery construction with the configuration that was live before
    /// a failed swap. The old instance is already gone, so either this comes
    /// up or the session is failed outright.
    async fn recover_previous(&mut self, previous: Option<EngineConfig>) {
        let config = match previous {
            Some(config) => config,
            None => {
                // nothing to restore; only reachable without a prior boot
                self.fail(&EngineError::NotReady);
                return;
            }
        };

        match self.handle.construct(config).await {
            Ok(()) => {
                tracing::info!("previous engine configuration restored");
                self.post(
                    Channel::SystemReady,
                    "[Previous engine configuration restored]",
                );
                self.enter_online();
            }
            Err(e) => self.fail(&e),
        }
    }

    #[cfg(test)]
    pub(crate) fn force_state(&mut self, state: SessionState) {
        self.state = state;
    }
}
