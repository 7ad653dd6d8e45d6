use crate::claude::Supervisor;
use crate::config::AppConfig;
use crate::registry::ProcessRegistry;
use crate::relay::{
    ChatClient, ChatDestination, ChatError, FileUpload, InvocationContext, Poster,
};
use crate::screenshot::{capture_backend, ScreenshotCapture};
use crate::{log_debug, log_debug_content};
use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::io::{self, BufRead, BufReader, Write};
#[cfg(any(test, feature = "mutants"))]
use std::sync::{Mutex, OnceLock};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::protocol::{IpcCommand, IpcEvent};
use super::router::{handle_mention, Mention};

/// How long the loop waits for a command before reaping finished workers.
const REAP_INTERVAL: Duration = Duration::from_millis(200);

// ============================================================================
// IPC State
// ============================================================================

pub(super) struct IpcState {
    pub(super) ctx: InvocationContext,
    pub(super) client: Arc<dyn ChatClient>,
    pub(super) screenshot: Arc<dyn ScreenshotCapture>,
    workers: Vec<JoinHandle<()>>,
}

impl IpcState {
    pub(super) fn new(config: &AppConfig, client: Arc<dyn ChatClient>) -> Self {
        let registry = Arc::new(ProcessRegistry::new());
        let supervisor = Arc::new(Supervisor::new(config.supervisor_config(), registry));
        let ctx = InvocationContext {
            supervisor,
            relay: config.relay_config(),
        };
        let screenshot = capture_backend(
            config.screenshot_os,
            &config.editor_cmd,
            &config.resolved_working_dir(),
        );
        Self::with_parts(ctx, client, screenshot)
    }

    pub(super) fn with_parts(
        ctx: InvocationContext,
        client: Arc<dyn ChatClient>,
        screenshot: Arc<dyn ScreenshotCapture>,
    ) -> Self {
        Self {
            ctx,
            client,
            screenshot,
            workers: Vec::new(),
        }
    }

    pub(super) fn registry(&self) -> &Arc<ProcessRegistry> {
        self.ctx.supervisor.registry()
    }

    pub(super) fn poster_for(&self, mention: &Mention) -> Poster {
        Poster::new(
            Arc::clone(&self.client),
            mention.destination(),
            self.ctx.relay.max_message_chars,
            self.ctx.relay.post_pacing,
        )
    }

    /// Run `work` on its own thread; the handle is joined on reap or shutdown.
    pub(super) fn spawn_worker<F>(&mut self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match thread::Builder::new()
            .name("threadbridge-worker".to_string())
            .spawn(work)
        {
            Ok(handle) => self.workers.push(handle),
            Err(err) => {
                log_debug(&format!("IPC: failed to spawn worker: {err}"));
                send_event(&IpcEvent::Error {
                    message: format!("Failed to start worker: {err}"),
                    recoverable: true,
                });
            }
        }
    }

    #[cfg(test)]
    pub(super) fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Join workers that already finished.
    pub(super) fn reap_workers(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) = self
            .workers
            .drain(..)
            .partition(|handle| handle.is_finished());
        self.workers = running;
        for handle in finished {
            join_worker(handle);
        }
    }

    /// Stop every running or reserved conversation and wait for all workers.
    pub(super) fn shutdown(&mut self) {
        let stopped = self.registry().stop_all();
        if stopped > 0 {
            log_debug(&format!("IPC shutdown: stopped {stopped} running process(es)"));
        }
        for handle in self.workers.drain(..) {
            join_worker(handle);
        }
    }

    fn ready_event(&self) -> IpcEvent {
        let supervisor = self.ctx.supervisor.config();
        IpcEvent::Ready {
            version: env!("CARGO_PKG_VERSION").to_string(),
            claude_cmd: supervisor.claude_cmd.clone(),
            working_dir: supervisor
                .working_dir
                .as_ref()
                .map(|dir| dir.display().to_string())
                .unwrap_or_else(|| ".".to_string()),
            screenshot_backend: self.screenshot.backend().to_string(),
        }
    }
}

fn join_worker(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        log_debug("IPC: worker thread panicked");
        tracing::warn!("worker thread panicked");
    }
}

// ============================================================================
// Event Sending
// ============================================================================

pub(super) fn emit_event(event: &IpcEvent) -> io::Result<()> {
    #[cfg(any(test, feature = "mutants"))]
    if capture_test_event(event) {
        return Ok(());
    }
    let json = serde_json::to_string(event).map_err(io::Error::other)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}")?;
    stdout.flush()
}

pub(super) fn send_event(event: &IpcEvent) {
    if let Err(err) = emit_event(event) {
        log_debug(&format!("IPC: failed to write event: {err}"));
    }
}

#[cfg(any(test, feature = "mutants"))]
static EVENT_SINK: OnceLock<Mutex<Vec<IpcEvent>>> = OnceLock::new();

#[cfg(any(test, feature = "mutants"))]
fn capture_test_event(event: &IpcEvent) -> bool {
    if let Some(sink) = EVENT_SINK.get() {
        if let Ok(mut events) = sink.lock() {
            events.push(event.clone());
            return true;
        }
    }
    false
}

#[cfg(any(test, feature = "mutants"))]
#[allow(dead_code)]
pub(super) fn init_event_sink() {
    let _ = EVENT_SINK.get_or_init(|| Mutex::new(Vec::new()));
}

#[cfg(any(test, feature = "mutants"))]
#[allow(dead_code)]
pub(super) fn event_snapshot() -> usize {
    init_event_sink();
    EVENT_SINK
        .get()
        .and_then(|sink| sink.lock().ok().map(|events| events.len()))
        .unwrap_or(0)
}

#[cfg(any(test, feature = "mutants"))]
#[allow(dead_code)]
pub(super) fn events_since(start: usize) -> Vec<IpcEvent> {
    EVENT_SINK
        .get()
        .and_then(|sink| {
            sink.lock()
                .ok()
                .map(|events| events.iter().skip(start).cloned().collect())
        })
        .unwrap_or_default()
}

/// Chat client that hands posts and uploads to the adapter as stdout events.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLinesClient;

impl ChatClient for JsonLinesClient {
    fn post_message(&self, dest: &ChatDestination, text: &str) -> Result<(), ChatError> {
        emit_event(&IpcEvent::Post {
            channel: dest.channel.clone(),
            thread_ts: dest.thread_ts.clone(),
            text: text.to_string(),
        })?;
        Ok(())
    }

    fn upload_file(&self, dest: &ChatDestination, upload: &FileUpload) -> Result<(), ChatError> {
        emit_event(&IpcEvent::Upload {
            channel: dest.channel.clone(),
            thread_ts: dest.thread_ts.clone(),
            path: upload.path.display().to_string(),
            filename: upload.filename.clone(),
            title: upload.title.clone(),
            comment: upload.comment.clone(),
        })?;
        Ok(())
    }
}

// ============================================================================
// Stdin Reader Thread
// ============================================================================

pub(super) fn spawn_stdin_reader<R>(input: R, tx: Sender<IpcCommand>) -> JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || {
        for line in input.lines() {
            let line = match line {
                Ok(l) => l,
                Err(err) => {
                    log_debug(&format!("IPC: stdin read failed: {err}"));
                    break;
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<IpcCommand>(trimmed) {
                Ok(cmd) => {
                    if tx.send(cmd).is_err() {
                        break; // Main loop has exited
                    }
                }
                Err(e) => {
                    log_debug_content("IPC: rejected command line", trimmed);
                    send_event(&IpcEvent::Error {
                        message: format!("Invalid command: {e}"),
                        recoverable: true,
                    });
                }
            }
        }
        log_debug("IPC: stdin closed");
    })
}

// ============================================================================
// Main Event Loop
// ============================================================================

pub fn run_ipc_mode(config: AppConfig) -> Result<()> {
    log_debug("Starting JSON IPC mode");

    let client: Arc<dyn ChatClient> = Arc::new(JsonLinesClient);
    let mut state = IpcState::new(&config, client);
    send_event(&state.ready_event());
    tracing::info!(
        claude_cmd = %config.claude_cmd,
        screenshot_backend = state.screenshot.backend(),
        "ipc mode ready"
    );

    let (cmd_tx, cmd_rx) = unbounded();
    // Left detached: a blocked stdin read must not hold up shutdown.
    let _stdin_handle = spawn_stdin_reader(BufReader::new(io::stdin()), cmd_tx);
    run_ipc_loop(&mut state, &cmd_rx)
}

pub(super) fn run_ipc_loop(state: &mut IpcState, cmd_rx: &Receiver<IpcCommand>) -> Result<()> {
    loop {
        match cmd_rx.recv_timeout(REAP_INTERVAL) {
            Ok(IpcCommand::Mention {
                channel,
                thread_ts,
                ts,
                user,
                text,
            }) => {
                handle_mention(
                    state,
                    Mention {
                        channel,
                        thread_ts,
                        ts,
                        user,
                        text,
                    },
                );
            }
            Ok(IpcCommand::Shutdown) => {
                log_debug("IPC shutdown requested");
                break;
            }
            Err(RecvTimeoutError::Timeout) => state.reap_workers(),
            Err(RecvTimeoutError::Disconnected) => {
                log_debug("Command channel disconnected, exiting");
                break;
            }
        }
    }

    state.shutdown();
    tracing::info!("ipc mode finished");
    Ok(())
}
