//! Editor screenshots for the `screenshot <path> [--line N]` mention.

mod macos;

use crate::config::ScreenshotOs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;
use thiserror::Error;

pub use macos::MacosCapture;

#[derive(Debug, Error)]
pub enum ScreenshotError {
    #[error("screenshots are not supported on {0} yet")]
    Unsupported(&'static str),
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("invalid editor command '{0}'")]
    InvalidEditor(String),
    #[error("{step} could not be started: {source}")]
    Launch {
        step: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{step} failed ({status}): {stderr}")]
    Failed {
        step: &'static str,
        status: ExitStatus,
        stderr: String,
    },
    #[error("screen capture produced no image")]
    EmptyCapture,
}

/// Opens a file in the editor and captures its window as a PNG.
pub trait ScreenshotCapture: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Returns the path of the captured image; the caller owns the file.
    fn capture(&self, file: &Path, line: Option<u32>) -> Result<PathBuf, ScreenshotError>;
}

/// Stand-in for platforms without a capture implementation.
#[derive(Debug, Clone, Copy)]
pub struct UnsupportedCapture {
    os: ScreenshotOs,
}

impl UnsupportedCapture {
    pub fn new(os: ScreenshotOs) -> Self {
        Self { os }
    }
}

impl ScreenshotCapture for UnsupportedCapture {
    fn backend(&self) -> &'static str {
        "unsupported"
    }

    fn capture(&self, _file: &Path, _line: Option<u32>) -> Result<PathBuf, ScreenshotError> {
        Err(ScreenshotError::Unsupported(self.os.label()))
    }
}

/// Pick the capture implementation for the configured platform.
pub fn capture_backend(
    os: ScreenshotOs,
    editor_cmd: &str,
    working_dir: &Path,
) -> Arc<dyn ScreenshotCapture> {
    match os {
        ScreenshotOs::Macos => Arc::new(MacosCapture::new(editor_cmd, working_dir)),
        ScreenshotOs::Windows | ScreenshotOs::Linux => Arc::new(UnsupportedCapture::new(os)),
    }
}

/// Resolve `file` against `working_dir` and require that it exists.
pub(crate) fn resolve_target(file: &Path, working_dir: &Path) -> Result<PathBuf, ScreenshotError> {
    let path = if file.is_absolute() {
        file.to_path_buf()
    } else {
        working_dir.join(file)
    };
    if !path.exists() {
        return Err(ScreenshotError::FileNotFound(path));
    }
    Ok(path.canonicalize().unwrap_or(path))
}
