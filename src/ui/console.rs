//! Terminal display sink
//!
//! Renders the session onto stdout. Streaming responses grow in place on one
//! line: each upsert prints only the suffix that is new since the last call.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::types::message::Channel;
use crate::ui::gateway::UiGateway;

/// Console implementation of the display sink
pub struct ConsoleGateway {
    // id of the open streaming line and how many bytes of it are printed
    stream: Mutex<Option<(Uuid, usize)>>,
    input_enabled: AtomicBool,
}

impl ConsoleGateway {
    pub fn new() -> Self {
        Self {
            stream: Mutex::new(None),
            input_enabled: AtomicBool::new(false),
        }
    }

    /// Whether the session currently accepts input
    pub fn input_enabled(&self) -> bool {
        self.input_enabled.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    fn stream_line_open(&self) -> bool {
        self.stream.lock().is_some()
    }

    fn finish_stream_line(slot: &mut Option<(Uuid, usize)>) {
        if slot.take().is_some() {
            println!();
        }
    }
}

impl Default for ConsoleGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl UiGateway for ConsoleGateway {
    fn append_message(&self, text: &str, channel: Channel) {
        let mut slot = self.stream.lock();
        Self::finish_stream_line(&mut slot);
        match channel {
            Channel::System => println!("{}", text.dimmed()),
            Channel::SystemReady => println!("{}", text.green()),
            Channel::User => println!("{}", text.cyan()),
            Channel::Model => println!("{}", text),
        }
    }

    fn update_status(&self, label: &str, online: bool) {
        let mut slot = self.stream.lock();
        Self::finish_stream_line(&mut slot);
        let light = if online { "●".green() } else { "○".red() };
        println!("{} {}", light, label.bold());
    }

    fn set_input_enabled(&self, enabled: bool) {
        self.input_enabled.store(enabled, Ordering::SeqCst);
        if enabled {
            // input re-arms only when a turn settles; terminate its stream line
            Self::finish_stream_line(&mut self.stream.lock());
        }
        tracing::trace!(enabled, "input surface toggled");
    }

    fn upsert_streaming(&self, id: Uuid, text: &str) {
        let mut slot = self.stream.lock();
        let printed = match *slot {
            Some((current, printed)) if current == id => printed,
            other => {
                if other.is_some() {
                    println!();
                }
                print!("{}", "[MODEL]: ".bold());
                0
            }
        };
        // snapshots only ever grow, so the printed prefix is stable
        if text.len() > printed {
            print!("{}", &text[printed..]);
        }
        let _ = io::stdout().flush();
        *slot = Some((id, text.len().max(printed)));
    }
}
