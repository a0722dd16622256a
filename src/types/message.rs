//! Transcript types
//!
//! Defines the display channels and chat transcript lines of one session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Display channel of a transcript line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    /// Neutral system notice
    System,
    /// Positive system notice (engine online, adapter applied)
    SystemReady,
    /// Prompt submitted by the user
    User,
    /// Streamed model response
    Model,
}

/// A single line of the in-memory transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatLine {
    /// Channel the line belongs to
    pub channel: Channel,
    /// Raw text without display prefixes
    pub text: String,
    /// When the line was recorded
    pub timestamp: DateTime<Utc>,
}

impl ChatLine {
    /// Create a new transcript line stamped with the current time
    pub fn new(channel: Channel, text: impl Into<String>) -> Self {
        Self {
            channel,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for ChatLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channel {
            Channel::User => write!(f, "[USER]: {}", self.text),
            Channel::Model => write!(f, "[MODEL]: {}", self.text),
            // System notices already carry their own bracketed form
            Channel::System | Channel::SystemReady => f.write_str(&self.text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_line_display() {
        let line = ChatLine::new(Channel::User, "hello");
        assert_eq!(line.to_string(), "[USER]: hello");
    }

    #[test]
    fn test_model_line_display() {
        let line = ChatLine::new(Channel::Model, "Hi there");
        assert_eq!(line.to_string(), "[MODEL]: Hi there");
    }

    #[test]
    fn test_system_lines_render_verbatim() {
        let line = ChatLine::new(Channel::System, "[System booting...]");
        assert_eq!(line.to_string(), "[System booting...]");
        let ready = ChatLine::new(Channel::SystemReady, "[Text engine ONLINE]");
        assert_eq!(ready.to_string(), "[Text engine ONLINE]");
    }

    #[test]
    fn test_line_serialization() {
        let line = ChatLine::new(Channel::Model, "streamed");
        let json = serde_json::to_string(&line).expect("serialize");
        let back: ChatLine = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.channel, Channel::Model);
        assert_eq!(back.text, "streamed");
    }
}
