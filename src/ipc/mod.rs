//! JSON IPC mode for the chat adapter.
//!
//! The adapter owns the chat platform connection; the bridge owns the Claude CLI.
//!
//! Architecture:
//! - Stdin reader thread: reads JSON commands, sends to main loop via channel
//! - Main loop: routes mentions and reaps finished worker threads
//! - Workers: one per invocation or screenshot, posting back through stdout events
//!
//! Protocol:
//! - Each line is a JSON object
//! - Events (bridge → adapter): {"event": "...", ...}
//! - Commands (adapter → bridge): {"cmd": "...", ...}

mod protocol;
mod router;
mod session;


pub use protocol::{IpcCommand, IpcEvent};
pub use session::{run_ipc_mode, JsonLinesClient};
