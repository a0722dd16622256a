//! Shared type definitions
//!
//! This module contains all shared data types used across the application.

pub mod config;
pub mod message;

pub use config::{AdapterRegistry, EngineConfig, SessionSettings, SettingsError, BASE_ADAPTER};
pub use message::{Channel, ChatLine};
