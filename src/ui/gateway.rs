//! Display sink interface
//!
//! The narrow surface the session layer renders through. Implementations own
//! presentation; the session layer owns all state and ordering.

use uuid::Uuid;

use crate::types::message::Channel;

/// Sink for everything the session wants shown
pub trait UiGateway: Send + Sync {
    /// Append a finished line to the chat surface
    fn append_message(&self, text: &str, channel: Channel);

    /// Update the status indicator (label plus online light)
    fn update_status(&self, label: &str, online: bool);

    /// Enable or disable the input surface
    fn set_input_enabled(&self, enabled: bool);

    /// Create or grow the streaming response message identified by `id`.
    ///
    /// The first call for an `id` creates the message; later calls carry the
    /// full accumulated text so far, not a delta.
    fn upsert_streaming(&self, id: Uuid, text: &str);
}
