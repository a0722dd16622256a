//! Interactive terminal app
//!
//! Wires settings, backend, adapter registry and the console sink into one
//! [`SessionController`] and runs the line loop. Plain lines are prompt
//! submissions; slash commands stand in for the widgets of a graphical
//! surface.

use std::io::{self, Write};
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::engine::backend::EngineBackend;
use crate::session::controller::{SessionController, SessionError, SessionState};
use crate::types::config::{SessionSettings, BASE_ADAPTER};
use crate::ui::console::ConsoleGateway;
use crate::ui::gateway::UiGateway;

/// Errors that end the app
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// One parsed line of terminal input
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Prompt(String),
    ChangeAdapter(String),
    ListAdapters,
    Status,
    Help,
    Quit,
}

pub(crate) fn parse_line(line: &str) -> Command {
    let trimmed = line.trim();
    if let Some(rest) = trimmed.strip_prefix('/') {
        let mut parts = rest.splitn(2, char::is_whitespace);
        let verb = parts.next().unwrap_or("");
        let arg = parts.next().map(str::trim).unwrap_or("");
        return match verb {
            "adapter" if !arg.is_empty() => Command::ChangeAdapter(arg.to_string()),
            "adapters" => Command::ListAdapters,
            "status" => Command::Status,
            "quit" | "exit" => Command::Quit,
            _ => Command::Help,
        };
    }
    Command::Prompt(trimmed.to_string())
}

fn print_help() {
    println!("Commands:");
    println!("  /adapter <name>   swap the active adapter ('{}' resets)", BASE_ADAPTER);
    println!("  /adapters         list the available adapters");
    println!("  /status           show session state and engine configuration");
    println!("  /help             show this help");
    println!("  /quit             exit");
}

fn print_status(controller: &SessionController) {
    println!("State:    {:?}", controller.state());
    println!(
        "Adapter:  {}",
        controller.active_adapter().unwrap_or(BASE_ADAPTER)
    );
    match controller.engine_config() {
        Some(config) => {
            println!("Model:    {}", config.base_path.display());
            println!(
                "Params:   max_tokens={} temperature={} top_k={}",
                config.max_tokens, config.temperature, config.top_k
            );
        }
        None => println!("Model:    (no live engine)"),
    }
}

fn print_adapters(controller: &SessionController) {
    println!("Adapters:");
    println!("  {} (base model)", BASE_ADAPTER);
    for name in controller.registry().names() {
        if controller.active_adapter() == Some(name) {
            println!("  {} (active)", name);
        } else {
            println!("  {}", name);
        }
    }
}

fn prompt_marker() {
    print!("> ");
    let _ = io::stdout().flush();
}

#[cfg(feature = "llama")]
fn default_backend() -> Arc<dyn EngineBackend> {
    Arc::new(crate::engine::llama::LlamaCppBackend::new())
}

#[cfg(not(feature = "llama"))]
fn default_backend() -> Arc<dyn EngineBackend> {
    Arc::new(crate::engine::scripted::ScriptedBackend::new())
}

/// Run one interactive session until quit, end of input, or failure
pub async fn run(mut settings: SessionSettings) -> Result<(), AppError> {
    settings.validate();
    let gateway: Arc<dyn UiGateway> = Arc::new(ConsoleGateway::new());
    let mut controller = SessionController::new(
        default_backend(),
        settings.base_config(),
        settings.registry(),
        gateway,
    );

    controller.boot().await?;
    println!("Type a prompt, or /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt_marker();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            Command::Quit => break,
            Command::Help => print_help(),
            Command::Status => print_status(&controller),
            Command::ListAdapters => print_adapters(&controller),
            Command::ChangeAdapter(name) => {
                if let Err(e) = controller.change_adapter(&name).await {
                    tracing::debug!("adapter change rejected: {}", e);
                }
            }
            Command::Prompt(text) => {
                if let Err(e) = controller.submit_prompt(&text).await {
                    tracing::debug!("prompt rejected: {}", e);
                }
            }
        }
        if controller.state() == SessionState::Failed {
            tracing::error!("session failed; exiting");
            break;
        }
        prompt_marker();
    }
    println!();
    Ok(())
}
