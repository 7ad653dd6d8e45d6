use crate::relay::RelayMessage;
use crate::{log_debug, log_debug_content};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::thread;

/// Byte limits for the retained start and end of a process's stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StderrCaps {
    pub head_bytes: usize,
    pub tail_bytes: usize,
}

impl Default for StderrCaps {
    fn default() -> Self {
        Self {
            head_bytes: 2048,
            tail_bytes: 2048,
        }
    }
}

/// Bounded record of stderr: the first lines up to the head cap and a sliding tail window.
#[derive(Debug)]
pub struct StderrCapture {
    caps: StderrCaps,
    head: String,
    tail: VecDeque<String>,
    tail_len: usize,
}

impl StderrCapture {
    pub fn new(caps: StderrCaps) -> Self {
        Self {
            caps,
            head: String::new(),
            tail: VecDeque::new(),
            tail_len: 0,
        }
    }

    /// Record one line, including its trailing newline if it had one.
    ///
    /// Lines fill the head until it reaches its cap; only later lines enter the tail.
    pub fn push_line(&mut self, line: &str) {
        if self.head.len() < self.caps.head_bytes {
            self.head.push_str(line);
            return;
        }

        let line = tail_of(line, self.caps.tail_bytes);
        if line.is_empty() {
            return;
        }
        self.tail_len += line.len();
        self.tail.push_back(line.to_string());
        while self.tail_len > self.caps.tail_bytes {
            match self.tail.pop_front() {
                Some(dropped) => self.tail_len -= dropped.len(),
                None => break,
            }
        }
    }

    pub fn head(&self) -> &str {
        &self.head
    }

    pub fn tail(&self) -> String {
        self.tail.iter().map(String::as_str).collect()
    }

    /// Diagnostic reports for whatever was captured, head first.
    pub fn reports(&self) -> Vec<String> {
        let mut reports = Vec::new();
        if !self.head.is_empty() {
            reports.push(format!("[DEBUG] stderr head\n{}", self.head));
        }
        let tail = self.tail();
        if !tail.is_empty() {
            reports.push(format!("[DEBUG] stderr tail\n{tail}"));
        }
        reports
    }
}

/// Last `max_bytes` of `line`, moved forward to a char boundary.
fn tail_of(line: &str, max_bytes: usize) -> &str {
    if line.len() <= max_bytes {
        return line;
    }
    let mut start = line.len() - max_bytes;
    while !line.is_char_boundary(start) {
        start += 1;
    }
    &line[start..]
}

/// Drain `stderr` on its own thread and send the capture reports once the stream closes.
///
/// The returned receiver yields (or disconnects) when the drain is done, so callers can
/// bound how long they wait for it.
pub fn spawn_stderr_drain<R>(stderr: R, caps: StderrCaps, tx: Sender<RelayMessage>) -> Receiver<()>
where
    R: Read + Send + 'static,
{
    let (done_tx, done_rx) = bounded(1);
    thread::spawn(move || {
        let mut capture = StderrCapture::new(caps);
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    log_debug_content("stderr", &line);
                    capture.push_line(&line);
                }
                Err(err) => {
                    log_debug(&format!("stderr drain stopped: {err}"));
                    break;
                }
            }
        }
        for report in capture.reports() {
            if tx.send(RelayMessage::Stderr(report)).is_err() {
                break;
            }
        }
        let _ = done_tx.send(());
    });
    done_rx
}
