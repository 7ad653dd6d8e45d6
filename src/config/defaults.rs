use super::ScreenshotOs;

pub(super) const DEFAULT_CLAUDE_CMD: &str = "claude";
pub(super) const DEFAULT_EDITOR_CMD: &str = "code";
pub(super) const DEFAULT_PATH_PREFIXES: [&str; 2] = ["/opt/homebrew/bin", "/usr/local/bin"];
pub(super) const DEFAULT_STRIP_ENV: [&str; 1] = ["ANTHROPIC_API_KEY"];

pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 39_000;
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_FLUSH_THRESHOLD_CHARS: usize = 3_900;
pub const DEFAULT_PROGRESS_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_TICK_MS: u64 = 500;
pub const DEFAULT_POST_PACING_MS: u64 = 200;
pub const DEFAULT_STDERR_CAPTURE_BYTES: usize = 2_048;

/// Chat platforms reject messages a little above 40k characters.
pub(super) const MAX_MESSAGE_CHARS_LIMIT: usize = 40_000;
pub(super) const MIN_MESSAGE_CHARS: usize = 100;
pub(super) const MAX_STDERR_CAPTURE_BYTES: usize = 64 * 1024;
pub(super) const MAX_CLAUDE_ARGS: usize = 64;
pub(super) const MAX_CLAUDE_ARG_BYTES: usize = 8 * 1024;

/// Screenshot backend matching the platform this binary was built for.
pub(super) fn default_screenshot_os() -> ScreenshotOs {
    if cfg!(target_os = "macos") {
        ScreenshotOs::Macos
    } else if cfg!(target_os = "windows") {
        ScreenshotOs::Windows
    } else {
        ScreenshotOs::Linux
    }
}
