//! Engine library seam
//!
//! The contract between the session layer and whichever inference library
//! backs it. The session layer only ever talks to these traits; swapping the
//! library means providing another [`EngineBackend`].

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::config::EngineConfig;

/// Errors surfaced by engine backends
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine construction failed (bad weights, missing file, library fault)
    #[error("initialization failed: {0}")]
    Initialization(String),
    /// A generation failed after the engine was constructed
    #[error("inference failed: {0}")]
    Inference(String),
    /// Releasing engine resources failed
    #[error("engine teardown failed: {0}")]
    Teardown(String),
    /// An operation needed a live engine and none was available
    #[error("engine is not ready")]
    NotReady,
}

/// One element of a streamed response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamToken {
    /// Ordered text fragment of the response
    Delta(String),
    /// Last fragment, possibly empty. Exactly one closes each stream.
    Final(String),
}

/// Sender half of a generation's token channel
pub type TokenSender = mpsc::UnboundedSender<StreamToken>;

/// A live engine instance
///
/// Holds loaded weights (base model plus optional adapter) until closed.
#[async_trait]
pub trait TextEngine: Send {
    /// Stream a response to `prompt` through `tokens`.
    ///
    /// Deltas arrive in generation order, closed by exactly one
    /// [`StreamToken::Final`]. On error the stream may stop without a final
    /// token; the returned error is the authoritative outcome.
    async fn generate(&mut self, prompt: &str, tokens: TokenSender) -> Result<(), EngineError>;

    /// Release the engine's resources.
    ///
    /// Must settle before a replacement instance is constructed. Closing an
    /// already closed engine is a no-op.
    async fn close(&mut self) -> Result<(), EngineError>;
}

/// Factory for live engine instances
#[async_trait]
pub trait EngineBackend: Send + Sync {
    /// Construct a new engine from a frozen configuration.
    async fn construct(&self, config: &EngineConfig) -> Result<Box<dyn TextEngine>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let e = EngineError::Initialization("weights truncated".to_string());
        assert_eq!(e.to_string(), "initialization failed: weights truncated");
        assert_eq!(EngineError::NotReady.to_string(), "engine is not ready");
    }

    #[test]
    fn test_stream_token_equality() {
        assert_eq!(
            StreamToken::Delta("a".to_string()),
            StreamToken::Delta("a".to_string())
        );
        assert_ne!(
            StreamToken::Delta(String::new()),
            StreamToken::Final(String::new())
        );
    }
}
