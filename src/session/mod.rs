//! Session lifecycle
//!
//! The state machine owning the one interactive session and the stream
//! plumbing underneath it.

pub mod controller;
pub mod stream;

pub use controller::{SessionController, SessionError, SessionState};
pub use stream::StreamCollector;
