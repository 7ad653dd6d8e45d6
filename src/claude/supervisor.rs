use super::decoder::{DecoderSink, StreamDecoder};
use super::stderr::{spawn_stderr_drain, StderrCaps};
use crate::registry::{ProcessHandle, ProcessRegistry, RegistrationGuard};
use crate::relay::RelayMessage;
use crate::session::{ConversationId, SessionFlag};
use crate::text::safe_prefix;
use crate::{log_debug, log_debug_content};
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::env;
use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Fixed arguments for a non-interactive streaming run.
pub const CLAUDE_BASE_ARGS: [&str; 7] = [
    "--print",
    "--verbose",
    "--output-format",
    "stream-json",
    "--include-partial-messages",
    "--permission-mode",
    "bypassPermissions",
];

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub claude_cmd: String,
    pub extra_args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Prepended to `PATH` in this order.
    pub path_prefixes: Vec<PathBuf>,
    /// Removed from the child's environment.
    pub strip_env: Vec<String>,
    pub stderr_caps: StderrCaps,
    pub stderr_join_timeout: Duration,
    pub wait_poll: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            claude_cmd: "claude".to_string(),
            extra_args: Vec::new(),
            working_dir: None,
            path_prefixes: vec![
                PathBuf::from("/opt/homebrew/bin"),
                PathBuf::from("/usr/local/bin"),
            ],
            strip_env: vec!["ANTHROPIC_API_KEY".to_string()],
            stderr_caps: StderrCaps::default(),
            stderr_join_timeout: Duration::from_secs(5),
            wait_poll: Duration::from_millis(50),
        }
    }
}

/// One prompt to run against a conversation's CLI session.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub prompt: String,
    pub session: Option<SessionFlag>,
    pub conversation: ConversationId,
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("SpawnError: {0}")]
    Spawn(#[source] io::Error),
    #[error("PipeError: {0} was not captured")]
    MissingPipe(&'static str),
    #[error("ReadError: {0}")]
    Read(#[source] io::Error),
    #[error("WaitError: {0}")]
    Wait(#[source] io::Error),
}

/// Forwards decoder output onto the relay channel.
struct ChannelSink<'a> {
    tx: &'a Sender<RelayMessage>,
}

impl DecoderSink for ChannelSink<'_> {
    fn finalize(&mut self) {
        if self.tx.send(RelayMessage::Finalized).is_err() {
            log_debug("Supervisor: relay channel closed before finalize");
        }
    }

    fn emit(&mut self, text: String) {
        if self.tx.send(RelayMessage::Text(text)).is_err() {
            log_debug("Supervisor: relay channel closed, dropping output");
        }
    }
}

/// Runs the CLI for one prompt and streams its decoded output to a relay channel.
pub struct Supervisor {
    config: SupervisorConfig,
    registry: Arc<ProcessRegistry>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, registry: Arc<ProcessRegistry>) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    pub fn build_command(&self, request: &InvocationRequest) -> Command {
        let mut command = Command::new(&self.config.claude_cmd);
        command.args(CLAUDE_BASE_ARGS);
        if let Some(flag) = &request.session {
            command.args(flag.args());
        }
        command
            .args(&self.config.extra_args)
            .arg(&request.prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }
        for key in &self.config.strip_env {
            command.env_remove(key);
        }
        if let Some(path) = prefixed_path(&self.config.path_prefixes) {
            command.env("PATH", path);
        }
        command
    }

    /// Run to completion and return the exit code.
    ///
    /// Failures are reported on the channel as an `[ERROR]` stderr message and yield 1.
    pub fn run(&self, request: &InvocationRequest, tx: &Sender<RelayMessage>) -> i32 {
        match self.run_inner(request, tx) {
            Ok(code) => code,
            Err(err) => {
                log_debug(&format!(
                    "Supervisor: invocation for {} failed: {err}",
                    request.conversation
                ));
                tracing::warn!(
                    conversation = %request.conversation,
                    error = %err,
                    "claude invocation failed"
                );
                let _ = tx.send(RelayMessage::Stderr(format!("[ERROR] {err}\n")));
                1
            }
        }
    }

    fn run_inner(
        &self,
        request: &InvocationRequest,
        tx: &Sender<RelayMessage>,
    ) -> Result<i32, SupervisorError> {
        log_debug_content(
            &format!("Supervisor: starting claude for {}", request.conversation),
            safe_prefix(&request.prompt, 30),
        );
        let mut child = self
            .build_command(request)
            .spawn()
            .map_err(SupervisorError::Spawn)?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let guard = RegistrationGuard::register(
            &self.registry,
            request.conversation.clone(),
            ProcessHandle::new(child),
        );
        let handle = guard.handle();
        tracing::info!(
            conversation = %request.conversation,
            pid = handle.pid(),
            "claude spawned"
        );

        let (stdout, stderr) = match (stdout, stderr) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            (None, _) => {
                kill_quietly(handle);
                return Err(SupervisorError::MissingPipe("stdout"));
            }
            (_, None) => {
                kill_quietly(handle);
                return Err(SupervisorError::MissingPipe("stderr"));
            }
        };

        let drain_done = spawn_stderr_drain(stderr, self.config.stderr_caps, tx.clone());
        let mut decoder = StreamDecoder::new();
        let mut sink = ChannelSink { tx };
        if let Err(err) = pump(stdout, &mut decoder, &mut sink) {
            kill_quietly(handle);
            self.join_drain(&drain_done);
            return Err(SupervisorError::Read(err));
        }

        let status = match self.wait_for_exit(handle) {
            Ok(status) => status,
            Err(err) => {
                kill_quietly(handle);
                self.join_drain(&drain_done);
                return Err(SupervisorError::Wait(err));
            }
        };
        self.join_drain(&drain_done);

        let code = status.code().unwrap_or(0);
        log_debug(&format!(
            "Supervisor: pid {} exited with {status} ({} lines decoded, {} dropped, finalized: {})",
            handle.pid(),
            decoder.lines_decoded(),
            decoder.lines_dropped(),
            decoder.is_finalized()
        ));
        tracing::info!(
            conversation = %request.conversation,
            pid = handle.pid(),
            exit_code = code,
            "claude exited"
        );
        Ok(code)
    }

    /// Poll for exit so a kill from another thread is never blocked behind a wait.
    fn wait_for_exit(&self, handle: &ProcessHandle) -> io::Result<ExitStatus> {
        loop {
            if let Some(status) = handle.try_wait()? {
                return Ok(status);
            }
            thread::sleep(self.config.wait_poll);
        }
    }

    fn join_drain(&self, done: &crossbeam_channel::Receiver<()>) {
        match done.recv_timeout(self.config.stderr_join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                log_debug("Supervisor: stderr drain did not finish in time");
            }
        }
    }
}

/// Feed every stdout line to the decoder, in order, until EOF.
fn pump<R: Read>(
    stdout: R,
    decoder: &mut StreamDecoder,
    sink: &mut dyn DecoderSink,
) -> io::Result<()> {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        decoder.feed_line(&String::from_utf8_lossy(&buf), sink);
    }
}

fn kill_quietly(handle: &ProcessHandle) {
    if let Err(err) = handle.kill() {
        log_debug(&format!(
            "Supervisor: failed to kill pid {}: {err}",
            handle.pid()
        ));
    }
}

/// `PATH` with `prefixes` in front, or `None` when there is nothing to add.
fn prefixed_path(prefixes: &[PathBuf]) -> Option<OsString> {
    if prefixes.is_empty() {
        return None;
    }
    let current = env::var_os("PATH").unwrap_or_default();
    let joined = prefixes
        .iter()
        .cloned()
        .chain(env::split_paths(&current));
    match env::join_paths(joined) {
        Ok(path) => Some(path),
        Err(err) => {
            log_debug(&format!("Supervisor: could not extend PATH: {err}"));
            None
        }
    }
}
