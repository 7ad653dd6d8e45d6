//! Threadbridge entrypoint: loads configuration, then speaks JSON lines with the chat adapter.
//!
//! Stdout carries the IPC protocol; diagnostics go to the debug and trace log files.

use anyhow::Result;
use clap::Parser;
use std::env;
use std::panic;
use std::path::PathBuf;
use threadbridge::config::AppConfig;
use threadbridge::doctor::base_doctor_report;
use threadbridge::ipc::run_ipc_mode;
use threadbridge::{init_logging, init_tracing, log_debug, log_file_path, log_panic};

const DEFAULT_ENV_FILE: &str = "config/.env";

fn load_env_file() -> Option<PathBuf> {
    let path = env::var("THREADBRIDGE_ENV_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_ENV_FILE));
    dotenvy::from_path(&path).ok().map(|()| path)
}

fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        log_panic(info);
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        log_debug(&format!("panic at {location}"));
        previous(info);
    }));
}

fn main() -> Result<()> {
    let env_file = load_env_file();
    let mut config = AppConfig::parse();
    if config.doctor {
        let mut report = base_doctor_report(&config, "threadbridge");
        report.section("Environment");
        report.push_kv(
            "env_file",
            env_file
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "not loaded".to_string()),
        );
        println!("{}", report.render());
        return Ok(());
    }

    config.validate()?;
    init_logging(&config);
    init_tracing(&config);
    install_panic_hook();
    log_debug("=== Threadbridge Started ===");
    log_debug(&format!("Log file: {:?}", log_file_path()));
    if let Some(path) = &env_file {
        log_debug(&format!("Loaded environment from {}", path.display()));
    }

    run_ipc_mode(config)
}
