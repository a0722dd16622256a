//! Engine instance ownership
//!
//! [`EngineHandle`] owns at most one live engine at a time and enforces the
//! teardown ordering for swaps: the old instance settles its close before a
//! new construction starts.

use std::sync::Arc;

use crate::engine::backend::{EngineBackend, EngineError, TextEngine};
use crate::types::config::EngineConfig;

/// Owner of the single live engine instance
pub struct EngineHandle {
    backend: Arc<dyn EngineBackend>,
    engine: Option<Box<dyn TextEngine>>,
    config: Option<EngineConfig>,
}

impl EngineHandle {
    /// Create an empty handle over `backend`
    pub fn new(backend: Arc<dyn EngineBackend>) -> Self {
        Self {
            backend,
            engine: None,
            config: None,
        }
    }

    /// Whether an engine instance is live
    pub fn is_ready(&self) -> bool {
        self.engine.is_some()
    }

    /// Configuration of the live instance, if any
    pub fn config(&self) -> Option<&EngineConfig> {
        self.config.as_ref()
    }

    /// Construct a new live instance from `config`.
    ///
    /// Fails if an instance is already live: callers close first so two
    /// engines never hold native resources at the same time.
    pub async fn construct(&mut self, config: EngineConfig) -> Result<(), EngineError> {
        if self.engine.is_some() {
            return Err(EngineError::Initialization(
                "an engine instance is already live".to_string(),
            ));
        }
        tracing::debug!(
            base = %config.base_path.display(),
            adapter = ?config.adapter_path,
            "constructing engine"
        );
        let engine = self.backend.construct(&config).await?;
        self.engine = Some(engine);
        self.config = Some(config);
        Ok(())
    }

    /// Close and drop the live instance.
    ///
    /// The slot is empty afterwards even when teardown reports an error; a
    /// failed close still drops the instance. Closing an empty handle is a
    /// no-op.
    pub async fn close(&mut self) -> Result<(), EngineError> {
        let mut engine = match self.engine.take() {
            Some(engine) => engine,
            None => {
                tracing::warn!("close requested with no live engine");
                return Ok(());
            }
        };
        self.config = None;
        let result = engine.close().await;
        drop(engine);
        if let Err(e) = &result {
            tracing::warn!("engine close failed: {}", e);
        }
        result
    }

    /// Replace the live instance: close, then construct, strictly in order.
    pub async fn replace(&mut self, config: EngineConfig) -> Result<(), EngineError> {
        self.close().await?;
        self.construct(config).await
    }

    /// Mutable access to the live engine for generation
    pub fn engine_mut(&mut self) -> Result<&mut dyn TextEngine, EngineError> {
        match self.engine.as_deref_mut() {
            Some(engine) => Ok(engine),
            None => Err(EngineError::NotReady),
        }
    }
}
