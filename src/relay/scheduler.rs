use super::buffer::OutputBuffer;
use super::RelayMessage;
use crate::log_debug;
use crossbeam_channel::{bounded, never, select, tick, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Background thread that owns the relay channel and the buffer's ticker.
pub struct FlushScheduler {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl FlushScheduler {
    pub fn spawn(
        buffer: Arc<OutputBuffer>,
        messages: Receiver<RelayMessage>,
        interval: Duration,
    ) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::spawn(move || run(&buffer, messages, &stop_rx, interval));
        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Apply whatever is still queued, then end the thread. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log_debug("FlushScheduler: worker thread panicked");
            }
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    buffer: &OutputBuffer,
    messages: Receiver<RelayMessage>,
    stop_rx: &Receiver<()>,
    interval: Duration,
) {
    let ticker = tick(interval);
    let closed = never();
    let mut open = true;
    loop {
        let inbox = if open { &messages } else { &closed };
        select! {
            recv(inbox) -> msg => match msg {
                Ok(msg) => apply(buffer, msg),
                // All senders are gone; keep ticking until asked to stop.
                Err(_) => open = false,
            },
            recv(ticker) -> _ => buffer.tick(),
            recv(stop_rx) -> _ => break,
        }
    }
    for msg in messages.try_iter() {
        apply(buffer, msg);
    }
}

fn apply(buffer: &OutputBuffer, msg: RelayMessage) {
    match msg {
        RelayMessage::Text(text) => buffer.append_stdout(&text),
        RelayMessage::Finalized => buffer.mark_finalized(),
        RelayMessage::Stderr(text) => buffer.append_stderr(&text),
    }
}
