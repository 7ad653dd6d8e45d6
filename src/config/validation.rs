use super::defaults::{
    MAX_CLAUDE_ARGS, MAX_CLAUDE_ARG_BYTES, MAX_MESSAGE_CHARS_LIMIT, MAX_STDERR_CAPTURE_BYTES,
    MIN_MESSAGE_CHARS,
};
use super::AppConfig;
use crate::claude::{StderrCaps, SupervisorConfig};
use crate::relay::{FlushSettings, RelayConfig};
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize paths.
    pub fn validate(&mut self) -> Result<()> {
        if !(MIN_MESSAGE_CHARS..=MAX_MESSAGE_CHARS_LIMIT).contains(&self.max_message_chars) {
            bail!(
                "--max-message-chars must be between {MIN_MESSAGE_CHARS} and {MAX_MESSAGE_CHARS_LIMIT}, got {}",
                self.max_message_chars
            );
        }
        if !(100..=60_000).contains(&self.flush_interval_ms) {
            bail!(
                "--flush-interval-ms must be between 100 and 60000, got {}",
                self.flush_interval_ms
            );
        }
        if self.flush_threshold_chars == 0 || self.flush_threshold_chars > self.max_message_chars {
            bail!(
                "--flush-threshold-chars must be between 1 and --max-message-chars ({}), got {}",
                self.max_message_chars,
                self.flush_threshold_chars
            );
        }
        if !(1..=3_600).contains(&self.progress_interval_secs) {
            bail!(
                "--progress-interval-secs must be between 1 and 3600, got {}",
                self.progress_interval_secs
            );
        }
        if self.tick_ms < 50 || self.tick_ms > self.flush_interval_ms {
            bail!(
                "--tick-ms must be >=50 and <= --flush-interval-ms ({}), got {}",
                self.flush_interval_ms,
                self.tick_ms
            );
        }
        if self.post_pacing_ms > 5_000 {
            bail!(
                "--post-pacing-ms must be between 0 and 5000, got {}",
                self.post_pacing_ms
            );
        }
        for (flag, value) in [
            ("--stderr-head-bytes", self.stderr_head_bytes),
            ("--stderr-tail-bytes", self.stderr_tail_bytes),
        ] {
            if value > MAX_STDERR_CAPTURE_BYTES {
                bail!("{flag} must be at most {MAX_STDERR_CAPTURE_BYTES}, got {value}");
            }
        }

        self.claude_cmd = sanitize_binary(&self.claude_cmd, "--claude-cmd", &["claude"])?;

        // Avoid huge argument lists when forwarding to Claude.
        if self.claude_args.len() > MAX_CLAUDE_ARGS {
            bail!(
                "--claude-arg repeated too many times (max {MAX_CLAUDE_ARGS}, got {})",
                self.claude_args.len()
            );
        }
        let total_arg_bytes: usize = self.claude_args.iter().map(|arg| arg.len()).sum();
        if total_arg_bytes > MAX_CLAUDE_ARG_BYTES {
            bail!("combined --claude-arg length exceeds {MAX_CLAUDE_ARG_BYTES} bytes");
        }

        for name in &self.strip_env {
            if name.is_empty() || name.contains(['=', '\0']) {
                bail!("--strip-env '{name}' is not a valid environment variable name");
            }
        }

        if self.editor_cmd.trim().is_empty() {
            bail!("--editor-cmd must not be empty");
        }
        if shell_words::split(&self.editor_cmd).is_err() {
            bail!("--editor-cmd '{}' has unbalanced quotes", self.editor_cmd);
        }

        let working_dir = match &self.working_dir {
            Some(dir) => dir.clone(),
            None => env::current_dir().context("failed to read the current directory")?,
        };
        self.working_dir = Some(canonical_dir(&working_dir, "--working-dir")?);

        Ok(())
    }

    /// Working directory after validation, or the process's own when unset.
    pub fn resolved_working_dir(&self) -> PathBuf {
        self.working_dir
            .clone()
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Snapshot the settings the process supervisor needs.
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            claude_cmd: self.claude_cmd.clone(),
            extra_args: self.claude_args.clone(),
            working_dir: self.working_dir.clone(),
            path_prefixes: self.path_prefixes.clone(),
            strip_env: self.strip_env.clone(),
            stderr_caps: StderrCaps {
                head_bytes: self.stderr_head_bytes,
                tail_bytes: self.stderr_tail_bytes,
            },
            ..SupervisorConfig::default()
        }
    }

    /// Snapshot the buffering and posting settings.
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            flush: FlushSettings {
                interval: Duration::from_millis(self.flush_interval_ms),
                threshold_chars: self.flush_threshold_chars,
                progress_interval: Duration::from_secs(self.progress_interval_secs),
                tick: Duration::from_millis(self.tick_ms),
            },
            max_message_chars: self.max_message_chars,
            post_pacing: Duration::from_millis(self.post_pacing_ms),
        }
    }
}

/// Canonicalize a path and require that it is a directory.
pub(super) fn canonical_dir(path: &Path, flag: &str) -> Result<PathBuf> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("failed to canonicalize {flag} '{}'", path.display()))?;
    if !canonical.is_dir() {
        bail!("{flag} '{}' is not a directory", canonical.display());
    }
    Ok(canonical)
}

/// Allow either a known binary name or an existing executable path.
pub(super) fn sanitize_binary(value: &str, flag: &str, allowlist: &[&str]) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{flag} cannot be empty");
    }
    if let Some(allowed) = allowlist
        .iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(trimmed))
    {
        return Ok((*allowed).to_string());
    }

    let path = Path::new(trimmed);
    if path.is_absolute() || trimmed.contains(std::path::MAIN_SEPARATOR) {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("failed to canonicalize {flag} '{trimmed}'"))?;
        let metadata = fs::metadata(&canonical)
            .with_context(|| format!("failed to inspect {flag} '{}'", canonical.display()))?;
        if !metadata.is_file() {
            bail!("{flag} '{}' is not a file", canonical.display());
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = metadata.permissions().mode();
            if mode & 0o111 == 0 {
                bail!(
                    "{flag} '{}' exists but is not executable (mode {:o})",
                    canonical.display(),
                    mode
                );
            }
        }
        return canonical
            .to_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("{flag} must be valid UTF-8"));
    }

    bail!("{flag} must be one of {allowlist:?} or an existing binary path");
}
