use crate::config::AppConfig;
use crate::screenshot::capture_backend;
use crate::telemetry::tracing_log_path;
use crate::{crash_log_path, log_file_path};
use std::{env, fmt::Display, path::Path};

pub struct DoctorReport {
    lines: Vec<String>,
}

impl DoctorReport {
    pub fn new(title: &str) -> Self {
        Self {
            lines: vec![title.to_string()],
        }
    }

    pub fn section(&mut self, title: &str) {
        self.lines.push(String::new());
        self.lines.push(format!("{title}:"));
    }

    pub fn push_kv(&mut self, key: &str, value: impl Display) {
        self.lines.push(format!("  {key}: {value}"));
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

pub fn base_doctor_report(config: &AppConfig, binary_name: &str) -> DoctorReport {
    let mut report = DoctorReport::new("Threadbridge Doctor");
    report.push_kv("version", env!("CARGO_PKG_VERSION"));
    report.push_kv("binary", binary_name);
    report.push_kv("os", format!("{}/{}", env::consts::OS, env::consts::ARCH));

    let mut validated = config.clone();
    let validation_result = validated.validate();
    let resolved = validation_result
        .as_ref()
        .map(|_| &validated)
        .unwrap_or(config);

    report.section("Config");
    match &validation_result {
        Ok(()) => report.push_kv("validation", "ok"),
        Err(err) => report.push_kv("validation", format!("error: {err:#}")),
    }
    let logs_enabled = resolved.logs && !resolved.no_logs;
    report.push_kv("logs", if logs_enabled { "enabled" } else { "disabled" });
    report.push_kv(
        "log_content",
        if resolved.log_content { "enabled" } else { "disabled" },
    );
    report.push_kv("log_file", log_file_path().display());
    report.push_kv("crash_log", crash_log_path().display());
    report.push_kv("trace_log", tracing_log_path().display());

    report.section("Claude");
    report.push_kv("claude_cmd", &resolved.claude_cmd);
    report.push_kv("resolved", describe_binary(&resolved.claude_cmd));
    let working_dir = resolved.resolved_working_dir();
    report.push_kv("working_dir", working_dir.display());
    if !resolved.claude_args.is_empty() {
        report.push_kv("extra_args", resolved.claude_args.join(" "));
    }
    let prefixes: Vec<String> = resolved
        .path_prefixes
        .iter()
        .map(|dir| dir.display().to_string())
        .collect();
    report.push_kv("path_prefix", prefixes.join(":"));
    report.push_kv("strip_env", resolved.strip_env.join(","));

    report.section("Relay");
    report.push_kv("max_message_chars", resolved.max_message_chars);
    report.push_kv(
        "flush",
        format!(
            "{} ms / {} chars (tick {} ms)",
            resolved.flush_interval_ms, resolved.flush_threshold_chars, resolved.tick_ms
        ),
    );
    report.push_kv("progress_interval", format!("{} s", resolved.progress_interval_secs));
    report.push_kv("post_pacing", format!("{} ms", resolved.post_pacing_ms));

    report.section("Screenshot");
    report.push_kv("os", resolved.screenshot_os.label());
    report.push_kv("editor_cmd", &resolved.editor_cmd);
    let capture = capture_backend(resolved.screenshot_os, &resolved.editor_cmd, &working_dir);
    report.push_kv("backend", capture.backend());

    report
}

/// Where a bare binary name resolves on `PATH`, or whether a path exists.
fn describe_binary(cmd: &str) -> String {
    let path = Path::new(cmd);
    if path.is_absolute() {
        return if path.is_file() {
            "ok".to_string()
        } else {
            "missing".to_string()
        };
    }
    env::var_os("PATH")
        .and_then(|paths| {
            env::split_paths(&paths)
                .map(|dir| dir.join(cmd))
                .find(|candidate| candidate.is_file())
        })
        .map(|found| found.display().to_string())
        .unwrap_or_else(|| "not found on PATH".to_string())
}
