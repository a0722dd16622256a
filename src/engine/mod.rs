//! Inference engine layer
//!
//! Everything that touches the engine library: the backend seam, the handle
//! owning the single live instance, and the bundled backends.

pub mod backend;
pub mod handle;
#[cfg(feature = "llama")]
pub mod llama;
pub mod scripted;

pub use backend::{EngineBackend, EngineError, StreamToken, TextEngine, TokenSender};
pub use handle::EngineHandle;
pub use scripted::{EngineEvent, ScriptedBackend};
