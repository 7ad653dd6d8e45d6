//! Delivery of CLI output to a chat thread.
//!
//! The supervisor sends [`RelayMessage`]s over a channel; a [`FlushScheduler`] thread applies
//! them to an [`OutputBuffer`], which decides when pending text is handed to the [`Poster`].

mod buffer;
mod invocation;
mod poster;
mod scheduler;

#[cfg(test)]
mod tests;

use std::time::Duration;

pub use buffer::OutputBuffer;
pub use invocation::{run_invocation, InvocationContext, InvocationOutcome, InvocationSpec};
pub use poster::{ChatClient, ChatDestination, ChatError, FileUpload, Poster};
pub use scheduler::FlushScheduler;

/// Output of a running invocation, in the order it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// Decoded stdout text.
    Text(String),
    /// The CLI produced its final answer; later text is the answer itself.
    Finalized,
    /// Stderr diagnostics or an `[ERROR]` report.
    Stderr(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Intermediate output is posted as it arrives.
    Incremental,
    /// Only progress notices and the final answer are posted.
    Quiet,
}

impl DeliveryMode {
    pub fn label(self) -> &'static str {
        match self {
            DeliveryMode::Incremental => "incremental",
            DeliveryMode::Quiet => "quiet",
        }
    }
}

/// When pending output is flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushSettings {
    pub interval: Duration,
    pub threshold_chars: usize,
    pub progress_interval: Duration,
    pub tick: Duration,
}

impl Default for FlushSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            threshold_chars: 3900,
            progress_interval: Duration::from_secs(10),
            tick: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    pub flush: FlushSettings,
    pub max_message_chars: usize,
    pub post_pacing: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            flush: FlushSettings::default(),
            max_message_chars: 39_000,
            post_pacing: Duration::from_millis(200),
        }
    }
}
