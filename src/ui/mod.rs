//! User interface
//!
//! The display sink trait the session renders through, plus the console
//! implementation used by the binary.

pub mod console;
pub mod gateway;

pub use console::ConsoleGateway;
pub use gateway::UiGateway;
