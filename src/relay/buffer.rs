use super::poster::Poster;
use super::{DeliveryMode, FlushSettings};
use crate::claude::TOOL_MARKER;
use crate::lock_or_recover;
use crate::text::format_elapsed;
use crate::{log_debug, log_debug_content};
use std::sync::Mutex;
use std::time::Instant;

struct BufferState {
    stdout: Vec<String>,
    stdout_chars: usize,
    stderr: Vec<String>,
    /// Set when something becomes pending, cleared by every flush.
    window_start: Option<Instant>,
    last_progress: Instant,
    finalized: bool,
}

impl BufferState {
    fn window_elapsed(&self, now: Instant, settings: &FlushSettings) -> bool {
        self.window_start
            .is_some_and(|start| now.saturating_duration_since(start) >= settings.interval)
    }
}

/// Pending output of one invocation and the rules for posting it.
///
/// Append, flush and clear run under a single lock, and posting happens while it is held,
/// so chat messages keep the order output was produced in.
pub struct OutputBuffer {
    state: Mutex<BufferState>,
    poster: Poster,
    mode: DeliveryMode,
    settings: FlushSettings,
    started_at: Instant,
}

impl OutputBuffer {
    pub fn new(poster: Poster, mode: DeliveryMode, settings: FlushSettings) -> Self {
        Self::new_at(poster, mode, settings, Instant::now())
    }

    pub fn new_at(
        poster: Poster,
        mode: DeliveryMode,
        settings: FlushSettings,
        started_at: Instant,
    ) -> Self {
        Self {
            state: Mutex::new(BufferState {
                stdout: Vec::new(),
                stdout_chars: 0,
                stderr: Vec::new(),
                window_start: None,
                last_progress: started_at,
                finalized: false,
            }),
            poster,
            mode,
            settings,
            started_at,
        }
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn is_finalized(&self) -> bool {
        lock_or_recover(&self.state, "OutputBuffer::is_finalized").finalized
    }

    pub fn pending_chars(&self) -> usize {
        lock_or_recover(&self.state, "OutputBuffer::pending_chars").stdout_chars
    }

    pub fn append_stdout(&self, text: &str) {
        self.append_stdout_at(text, Instant::now());
    }

    pub fn append_stdout_at(&self, text: &str, now: Instant) {
        let mut state = lock_or_recover(&self.state, "OutputBuffer::append_stdout");
        if state.finalized {
            self.poster.post(text, false);
            return;
        }
        if self.mode == DeliveryMode::Quiet {
            log_debug_content("OutputBuffer: quiet mode dropped", text);
            return;
        }

        if state.window_start.is_none() {
            state.window_start = Some(now);
        }
        state.stdout_chars += text.chars().count();
        state.stdout.push(text.to_string());

        if text.contains(TOOL_MARKER)
            || state.window_elapsed(now, &self.settings)
            || state.stdout_chars >= self.settings.threshold_chars
        {
            self.flush_locked(&mut state);
        }
    }

    /// Queue stderr text. With nothing pending it goes out at once, otherwise it waits for
    /// the current window to elapse.
    pub fn append_stderr(&self, text: &str) {
        self.append_stderr_at(text, Instant::now());
    }

    pub fn append_stderr_at(&self, text: &str, now: Instant) {
        let mut state = lock_or_recover(&self.state, "OutputBuffer::append_stderr");
        state.stderr.push(text.to_string());
        match state.window_start {
            None => self.flush_locked(&mut state),
            Some(_) if state.window_elapsed(now, &self.settings) => {
                self.flush_locked(&mut state)
            }
            Some(_) => {}
        }
    }

    /// From now on stdout increments are the final answer and are posted unwrapped.
    ///
    /// Streamed text still pending is intermediate output, so it goes out wrapped first.
    pub fn mark_finalized(&self) {
        let mut state = lock_or_recover(&self.state, "OutputBuffer::mark_finalized");
        if state.finalized {
            return;
        }
        log_debug("OutputBuffer: finalized");
        self.post_stdout(&mut state);
        state.finalized = true;
    }

    pub fn flush(&self) {
        let mut state = lock_or_recover(&self.state, "OutputBuffer::flush");
        self.flush_locked(&mut state);
    }

    /// Drop everything pending without posting it.
    pub fn clear(&self) {
        let mut state = lock_or_recover(&self.state, "OutputBuffer::clear");
        state.stdout.clear();
        state.stdout_chars = 0;
        state.stderr.clear();
        state.window_start = None;
    }

    pub fn tick(&self) {
        self.tick_at(Instant::now());
    }

    /// Periodic check: time-based flush and, in quiet mode, progress notices.
    pub fn tick_at(&self, now: Instant) {
        let mut state = lock_or_recover(&self.state, "OutputBuffer::tick");
        if state.window_elapsed(now, &self.settings) {
            self.flush_locked(&mut state);
        }
        if self.mode == DeliveryMode::Quiet
            && !state.finalized
            && now.saturating_duration_since(state.last_progress) >= self.settings.progress_interval
        {
            state.last_progress = now;
            let elapsed = now.saturating_duration_since(self.started_at).as_secs();
            self.poster.post(
                &format!("Running... (elapsed: {})", format_elapsed(elapsed)),
                false,
            );
        }
    }

    fn flush_locked(&self, state: &mut BufferState) {
        self.post_stdout(state);
        if !state.stderr.is_empty() {
            let payload = state.stderr.concat();
            state.stderr.clear();
            self.poster.post(&format!("[STDERR]\n{payload}"), false);
        }
        state.window_start = None;
    }

    /// Post buffered stdout as a code block. Only output from before finalization is ever
    /// buffered.
    fn post_stdout(&self, state: &mut BufferState) {
        if state.stdout.is_empty() {
            return;
        }
        let payload = state.stdout.concat();
        state.stdout.clear();
        state.stdout_chars = 0;
        if state.stderr.is_empty() {
            state.window_start = None;
        }
        tracing::debug!(chars = payload.chars().count(), "flushing stdout");
        self.poster.post(&payload, true);
    }
}
