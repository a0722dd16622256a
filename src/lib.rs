//! UltraLM Library
//!
//! Core library for the UltraLM terminal session client.

pub mod app;
pub mod engine;
pub mod session;
pub mod types;
pub mod ui;
