use crate::log_debug;
use crate::text::{chunk, sanitize, wrap_code_block};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// A chat thread: replies go to `thread_ts` inside `channel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatDestination {
    pub channel: String,
    pub thread_ts: String,
}

impl ChatDestination {
    pub fn new(channel: impl Into<String>, thread_ts: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            thread_ts: thread_ts.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub path: PathBuf,
    pub filename: String,
    pub title: String,
    pub comment: String,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat transport closed")]
    Closed,
    #[error("chat request rejected: {0}")]
    Rejected(String),
    #[error("chat transport I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// The chat platform as seen by the bridge.
pub trait ChatClient: Send + Sync {
    fn post_message(&self, dest: &ChatDestination, text: &str) -> Result<(), ChatError>;
    fn upload_file(&self, dest: &ChatDestination, upload: &FileUpload) -> Result<(), ChatError>;
}

/// Posts text into one thread: sanitized, optionally fenced, chunked and paced.
#[derive(Clone)]
pub struct Poster {
    client: Arc<dyn ChatClient>,
    dest: ChatDestination,
    max_chars: usize,
    pacing: Duration,
}

impl Poster {
    pub fn new(
        client: Arc<dyn ChatClient>,
        dest: ChatDestination,
        max_chars: usize,
        pacing: Duration,
    ) -> Self {
        Self {
            client,
            dest,
            max_chars,
            pacing,
        }
    }

    pub fn destination(&self) -> &ChatDestination {
        &self.dest
    }

    /// Post `text`, returning how many chunks were delivered.
    ///
    /// A failed chunk is logged and the remaining chunks are still attempted.
    pub fn post(&self, text: &str, wrap_as_code: bool) -> usize {
        let cleaned = sanitize(text);
        let body = if wrap_as_code {
            wrap_code_block(&cleaned)
        } else {
            cleaned
        };
        let mut delivered = 0;
        for part in chunk(&body, self.max_chars) {
            thread::sleep(self.pacing);
            match self.client.post_message(&self.dest, part) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    log_debug(&format!(
                        "Poster: post to {}/{} failed: {err}",
                        self.dest.channel, self.dest.thread_ts
                    ));
                    tracing::warn!(
                        channel = %self.dest.channel,
                        thread_ts = %self.dest.thread_ts,
                        error = %err,
                        "chat post failed"
                    );
                }
            }
        }
        delivered
    }

    pub fn upload(&self, upload: &FileUpload) -> Result<(), ChatError> {
        self.client.upload_file(&self.dest, upload)
    }
}
