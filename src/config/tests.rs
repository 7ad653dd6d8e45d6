use super::validation::{canonical_dir, sanitize_binary};
use super::{AppConfig, ScreenshotOs};
use clap::Parser;
use std::fs;
use std::path::Path;
use std::time::Duration;

fn parse(args: &[&str]) -> AppConfig {
    let mut argv = vec!["threadbridge", "--claude-cmd", "claude"];
    argv.extend_from_slice(args);
    AppConfig::parse_from(argv)
}

#[test]
fn defaults_validate() {
    let mut cfg = parse(&[]);
    cfg.validate().expect("defaults are valid");
    assert_eq!(cfg.claude_cmd, "claude");
    assert_eq!(cfg.max_message_chars, 39_000);
    assert_eq!(cfg.flush_threshold_chars, 3_900);
    assert!(cfg.working_dir.as_ref().is_some_and(|dir| dir.is_absolute()));
}

#[test]
fn path_prefix_and_strip_env_defaults() {
    let cfg = parse(&[]);
    assert_eq!(
        cfg.path_prefixes,
        vec![
            Path::new("/opt/homebrew/bin").to_path_buf(),
            Path::new("/usr/local/bin").to_path_buf()
        ]
    );
    assert_eq!(cfg.strip_env, vec!["ANTHROPIC_API_KEY".to_string()]);

    let cfg = parse(&["--path-prefix", "/srv/bin"]);
    assert_eq!(cfg.path_prefixes, vec![Path::new("/srv/bin").to_path_buf()]);
}

#[test]
fn rejects_message_size_out_of_bounds() {
    let mut cfg = parse(&["--max-message-chars", "50"]);
    assert!(cfg.validate().is_err());

    let mut cfg = parse(&["--max-message-chars", "40001"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_threshold_above_message_size() {
    let mut cfg = parse(&["--max-message-chars", "1000", "--flush-threshold-chars", "1001"]);
    assert!(cfg.validate().is_err());

    let mut cfg = parse(&["--flush-threshold-chars", "0"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_tick_slower_than_flush_interval() {
    let mut cfg = parse(&["--flush-interval-ms", "500", "--tick-ms", "600"]);
    assert!(cfg.validate().is_err());

    let mut cfg = parse(&["--tick-ms", "10"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_oversized_stderr_caps() {
    let mut cfg = parse(&["--stderr-tail-bytes", "1000000"]);
    let err = cfg.validate().expect_err("tail cap too big");
    assert!(err.to_string().contains("--stderr-tail-bytes"));
}

#[test]
fn rejects_too_many_claude_args() {
    let mut args = Vec::new();
    for _ in 0..65 {
        args.push("--claude-arg");
        args.push("x");
    }
    let mut cfg = parse(&args);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_bad_strip_env_name() {
    let mut cfg = parse(&["--strip-env", "A=B"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_unbalanced_editor_quotes() {
    let mut cfg = parse(&["--editor-cmd", "code \"--profile"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn working_dir_must_exist() {
    let mut cfg = parse(&["--working-dir", "/definitely/not/here"]);
    assert!(cfg.validate().is_err());

    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("file.txt");
    fs::write(&file, "x").expect("write");
    assert!(canonical_dir(&file, "--working-dir").is_err());
    assert!(canonical_dir(dir.path(), "--working-dir").is_ok());
}

#[test]
fn screenshot_os_parses_value_enum() {
    let cfg = parse(&["--screenshot-os", "windows"]);
    assert_eq!(cfg.screenshot_os, ScreenshotOs::Windows);
    assert_eq!(cfg.screenshot_os.label(), "windows");
}

#[test]
fn sanitize_binary_accepts_allowlisted_name() {
    assert_eq!(
        sanitize_binary("Claude", "--claude-cmd", &["claude"]).unwrap(),
        "claude"
    );
    assert!(sanitize_binary("  ", "--claude-cmd", &["claude"]).is_err());
    assert!(sanitize_binary("bash", "--claude-cmd", &["claude"]).is_err());
}

#[cfg(unix)]
#[test]
fn sanitize_binary_requires_executable_path() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let script = dir.path().join("claude-wrapper");
    fs::write(&script, "#!/bin/sh\n").expect("write");
    fs::set_permissions(&script, fs::Permissions::from_mode(0o644)).expect("chmod");
    let raw = script.to_string_lossy().to_string();
    assert!(sanitize_binary(&raw, "--claude-cmd", &["claude"]).is_err());

    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");
    let resolved = sanitize_binary(&raw, "--claude-cmd", &["claude"]).expect("executable");
    assert!(resolved.ends_with("claude-wrapper"));
}

#[test]
fn snapshots_carry_validated_values() {
    let mut cfg = parse(&[
        "--claude-arg",
        "--model",
        "--claude-arg",
        "opus",
        "--flush-interval-ms",
        "2000",
        "--tick-ms",
        "250",
        "--post-pacing-ms",
        "0",
        "--stderr-head-bytes",
        "512",
    ]);
    cfg.validate().expect("valid");

    let supervisor = cfg.supervisor_config();
    assert_eq!(supervisor.extra_args, vec!["--model", "opus"]);
    assert_eq!(supervisor.stderr_caps.head_bytes, 512);
    assert_eq!(supervisor.stderr_caps.tail_bytes, 2048);
    assert_eq!(supervisor.working_dir, cfg.working_dir);

    let relay = cfg.relay_config();
    assert_eq!(relay.flush.interval, Duration::from_millis(2000));
    assert_eq!(relay.flush.tick, Duration::from_millis(250));
    assert_eq!(relay.post_pacing, Duration::ZERO);
    assert_eq!(relay.max_message_chars, 39_000);
}
