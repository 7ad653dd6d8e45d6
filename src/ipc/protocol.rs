//! JSON-lines protocol spoken with the chat adapter.
//!
//! The adapter owns the chat platform connection: it forwards mentions as commands on our
//! stdin and performs the posts and uploads we emit as events on stdout.

use serde::{Deserialize, Serialize};

// ============================================================================
// IPC Events (bridge → adapter)
// ============================================================================

/// Serialized as JSON with an `"event"` tag field for type discrimination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum IpcEvent {
    /// Sent once on startup
    #[serde(rename = "ready")]
    Ready {
        version: String,
        claude_cmd: String,
        working_dir: String,
        screenshot_backend: String,
    },

    /// Post a message into a thread
    #[serde(rename = "post")]
    Post {
        channel: String,
        thread_ts: String,
        text: String,
    },

    /// Upload a local file into a thread
    #[serde(rename = "upload")]
    Upload {
        channel: String,
        thread_ts: String,
        path: String,
        filename: String,
        title: String,
        comment: String,
    },

    /// Error (recoverable or fatal)
    #[serde(rename = "error")]
    Error { message: String, recoverable: bool },
}

// ============================================================================
// IPC Commands (adapter → bridge)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "cmd")]
pub enum IpcCommand {
    /// The bot was mentioned
    #[serde(rename = "mention")]
    Mention {
        channel: String,
        /// Parent thread; absent for a top-level message
        #[serde(default)]
        thread_ts: Option<String>,
        ts: String,
        user: String,
        #[serde(default)]
        text: String,
    },

    /// Stop running invocations and exit
    #[serde(rename = "shutdown")]
    Shutdown,
}
