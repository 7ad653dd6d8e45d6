use super::{resolve_target, ScreenshotCapture, ScreenshotError};
use crate::log_debug;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

const EDITOR_STARTUP_WAIT: Duration = Duration::from_secs(3);
const ACTIVATE_WAIT: Duration = Duration::from_secs(2);
const RESIZE_WAIT: Duration = Duration::from_millis(1500);

static CAPTURE_SEQ: AtomicU64 = AtomicU64::new(0);

/// VS Code or Cursor driven through AppleScript, captured with `screencapture`.
#[derive(Debug, Clone)]
pub struct MacosCapture {
    program: String,
    program_args: Vec<String>,
    working_dir: PathBuf,
}

impl MacosCapture {
    pub fn new(editor_cmd: &str, working_dir: &Path) -> Self {
        let parts = shell_words::split(editor_cmd.trim()).unwrap_or_else(|_| {
            editor_cmd
                .split_whitespace()
                .map(str::to_string)
                .collect()
        });
        let (program, program_args) = match parts.split_first() {
            Some((program, rest)) => (program.clone(), rest.to_vec()),
            None => ("code".to_string(), Vec::new()),
        };
        Self {
            program,
            program_args,
            working_dir: working_dir.to_path_buf(),
        }
    }

    fn is_cursor(&self) -> bool {
        Path::new(&self.program)
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.eq_ignore_ascii_case("cursor"))
    }

    pub(crate) fn app_name(&self) -> &'static str {
        if self.is_cursor() {
            "Cursor"
        } else {
            "Visual Studio Code"
        }
    }

    pub(crate) fn process_name(&self) -> &'static str {
        if self.is_cursor() {
            "Cursor"
        } else {
            "Code"
        }
    }

    pub(crate) fn open_args(&self, target: &Path, line: Option<u32>) -> Vec<String> {
        let mut args = self.program_args.clone();
        args.push("--new-window".to_string());
        match line {
            Some(line) => {
                args.push("--goto".to_string());
                args.push(format!("{}:{line}", target.display()));
            }
            None => args.push(target.display().to_string()),
        }
        args
    }

    fn window_bounds(&self) -> Option<String> {
        let script = format!(
            r#"tell application "System Events"
    if not (exists process "{name}") then return "ERR"
    tell process "{name}"
        if (count of windows) < 1 then return "ERR"
        set p to position of window 1
        set s to size of window 1
        return ((item 1 of p) as text) & "," & ((item 2 of p) as text) & "," & ((item 1 of s) as text) & "," & ((item 2 of s) as text)
    end tell
end tell"#,
            name = self.process_name()
        );
        let output = osascript("window bounds", &script).ok()?;
        parse_bounds(&String::from_utf8_lossy(&output.stdout))
    }

    fn maximize_window(&self) {
        let script = format!(
            r#"tell application "System Events"
    tell process "{}"
        if exists window 1 then
            tell window 1
                set position to {{0, 23}}
                set size to {{1920, 1057}}
            end tell
        end if
    end tell
end tell"#,
            self.process_name()
        );
        if let Err(err) = osascript("maximize", &script) {
            log_debug(&format!("Screenshot: maximize failed: {err}"));
        }
    }

    fn close_window(&self) {
        let script = format!(
            r#"tell application "System Events"
    tell process "{}"
        if exists window 1 then
            set frontmost to true
            keystroke "w" using {{command down, shift down}}
        end if
    end tell
end tell"#,
            self.process_name()
        );
        if let Err(err) = osascript("close window", &script) {
            log_debug(&format!("Screenshot: close window failed: {err}"));
        }
    }
}

impl ScreenshotCapture for MacosCapture {
    fn backend(&self) -> &'static str {
        "macos"
    }

    fn capture(&self, file: &Path, line: Option<u32>) -> Result<PathBuf, ScreenshotError> {
        let target = resolve_target(file, &self.working_dir)?;
        let output_path = temp_png_path();

        let open_args = self.open_args(&target, line);
        log_debug(&format!(
            "Screenshot: opening {} {}",
            self.program,
            open_args.join(" ")
        ));
        run_step("editor", Command::new(&self.program).args(&open_args))?;
        thread::sleep(EDITOR_STARTUP_WAIT);

        let activate = format!(r#"tell application "{}" to activate"#, self.app_name());
        if let Err(err) = osascript("activate", &activate) {
            log_debug(&format!("Screenshot: activate failed: {err}"));
        }
        thread::sleep(ACTIVATE_WAIT);
        self.maximize_window();
        thread::sleep(RESIZE_WAIT);

        let mut capture = Command::new("screencapture");
        capture.args(["-x", "-o"]);
        if let Some(bounds) = self.window_bounds() {
            capture.args(["-R", bounds.as_str()]);
        }
        capture.arg(&output_path);
        let captured = run_step("screencapture", &mut capture);
        self.close_window();
        captured?;

        match fs::metadata(&output_path) {
            Ok(meta) if meta.len() > 0 => {
                tracing::info!(path = %output_path.display(), "screenshot captured");
                Ok(output_path)
            }
            _ => Err(ScreenshotError::EmptyCapture),
        }
    }
}

fn run_step(step: &'static str, command: &mut Command) -> Result<Output, ScreenshotError> {
    let output = command
        .output()
        .map_err(|source| ScreenshotError::Launch { step, source })?;
    if !output.status.success() {
        return Err(ScreenshotError::Failed {
            step,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}

fn osascript(step: &'static str, script: &str) -> Result<Output, ScreenshotError> {
    run_step(step, Command::new("osascript").arg("-e").arg(script))
}

fn temp_png_path() -> PathBuf {
    let seq = CAPTURE_SEQ.fetch_add(1, Ordering::Relaxed);
    env::temp_dir().join(format!(
        "threadbridge_screenshot_{}_{seq}.png",
        std::process::id()
    ))
}

/// `x,y,w,h` from AppleScript output, as the `-R` argument of `screencapture`.
pub(crate) fn parse_bounds(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.contains("ERR") {
        return None;
    }
    let values: Vec<i64> = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>().ok().map(|v| v as i64))
        .collect::<Option<Vec<_>>>()?;
    match values.as_slice() {
        [x, y, w, h] if *w > 0 && *h > 0 => Some(format!("{x},{y},{w},{h}")),
        _ => None,
    }
}
