//! Command-line parsing and validation helpers.

mod defaults;
#[cfg(test)]
mod tests;
mod validation;

use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

use defaults::{
    default_screenshot_os, DEFAULT_CLAUDE_CMD, DEFAULT_EDITOR_CMD, DEFAULT_PATH_PREFIXES,
    DEFAULT_STRIP_ENV,
};
pub use defaults::{
    DEFAULT_FLUSH_INTERVAL_MS, DEFAULT_FLUSH_THRESHOLD_CHARS, DEFAULT_MAX_MESSAGE_CHARS,
    DEFAULT_POST_PACING_MS, DEFAULT_PROGRESS_INTERVAL_SECS, DEFAULT_STDERR_CAPTURE_BYTES,
    DEFAULT_TICK_MS,
};

/// CLI options for the bridge. Validated values keep the spawned CLI safe.
#[derive(Debug, Parser, Clone)]
#[command(
    name = "threadbridge",
    about = "Bridge chat thread mentions to the Claude CLI over JSON lines",
    author,
    version
)]
pub struct AppConfig {
    /// Path to the Claude CLI binary
    #[arg(long = "claude-cmd", env = "CLAUDE_BIN", default_value = DEFAULT_CLAUDE_CMD)]
    pub claude_cmd: String,

    /// Extra arguments to pass to the Claude CLI (repeatable)
    #[arg(
        long = "claude-arg",
        action = ArgAction::Append,
        value_name = "ARG",
        allow_hyphen_values = true
    )]
    pub claude_args: Vec<String>,

    /// Working directory for the Claude CLI (defaults to the current directory)
    #[arg(long = "working-dir", env = "DEFAULT_CWD", value_name = "DIR")]
    pub working_dir: Option<PathBuf>,

    /// Directories prepended to PATH for the Claude CLI (repeatable, replaces the defaults)
    #[arg(
        long = "path-prefix",
        action = ArgAction::Append,
        value_name = "DIR",
        default_values = DEFAULT_PATH_PREFIXES
    )]
    pub path_prefixes: Vec<PathBuf>,

    /// Environment variables removed before spawning the Claude CLI (repeatable)
    #[arg(
        long = "strip-env",
        action = ArgAction::Append,
        value_name = "NAME",
        default_values = DEFAULT_STRIP_ENV
    )]
    pub strip_env: Vec<String>,

    /// Editor used for screenshots (code or cursor)
    #[arg(long = "editor-cmd", env = "EDITOR_CMD", default_value = DEFAULT_EDITOR_CMD)]
    pub editor_cmd: String,

    /// Screenshot backend
    #[arg(
        long = "screenshot-os",
        env = "SCREENSHOT_OS",
        value_enum,
        default_value_t = default_screenshot_os()
    )]
    pub screenshot_os: ScreenshotOs,

    /// Maximum characters per chat message
    #[arg(long = "max-message-chars", default_value_t = DEFAULT_MAX_MESSAGE_CHARS)]
    pub max_message_chars: usize,

    /// Flush pending streamed output after this long (milliseconds)
    #[arg(long = "flush-interval-ms", default_value_t = DEFAULT_FLUSH_INTERVAL_MS)]
    pub flush_interval_ms: u64,

    /// Flush pending streamed output once it reaches this many characters
    #[arg(
        long = "flush-threshold-chars",
        default_value_t = DEFAULT_FLUSH_THRESHOLD_CHARS
    )]
    pub flush_threshold_chars: usize,

    /// Interval between progress notices in quiet mode (seconds)
    #[arg(
        long = "progress-interval-secs",
        default_value_t = DEFAULT_PROGRESS_INTERVAL_SECS
    )]
    pub progress_interval_secs: u64,

    /// Background flush check interval (milliseconds)
    #[arg(long = "tick-ms", default_value_t = DEFAULT_TICK_MS)]
    pub tick_ms: u64,

    /// Delay before each posted chunk (milliseconds)
    #[arg(long = "post-pacing-ms", default_value_t = DEFAULT_POST_PACING_MS)]
    pub post_pacing_ms: u64,

    /// Bytes of stderr kept from the start of a run
    #[arg(long = "stderr-head-bytes", default_value_t = DEFAULT_STDERR_CAPTURE_BYTES)]
    pub stderr_head_bytes: usize,

    /// Bytes of stderr kept from the end of a run
    #[arg(long = "stderr-tail-bytes", default_value_t = DEFAULT_STDERR_CAPTURE_BYTES)]
    pub stderr_tail_bytes: usize,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "THREADBRIDGE_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "THREADBRIDGE_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging prompt/output snippets (debug log only)
    #[arg(
        long = "log-content",
        env = "THREADBRIDGE_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,

    /// Print environment diagnostics and exit
    #[arg(long = "doctor", default_value_t = false)]
    pub doctor: bool,
}

/// Platforms a screenshot backend can be selected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScreenshotOs {
    Macos,
    Windows,
    Linux,
}

impl ScreenshotOs {
    pub fn label(self) -> &'static str {
        match self {
            ScreenshotOs::Macos => "macos",
            ScreenshotOs::Windows => "windows",
            ScreenshotOs::Linux => "linux",
        }
    }
}
