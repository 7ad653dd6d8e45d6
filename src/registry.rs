//! Conversation → running CLI process bookkeeping.
//!
//! Cross-thread state behind one lock: the process currently running for each
//! conversation, the conversations reserved by an accepted prompt whose process may not
//! exist yet, the conversations a user stopped (so the finishing invocation suppresses its
//! output), and the conversations whose CLI session already exists (so later prompts resume
//! it instead of creating it again).

use crate::lock_or_recover;
use crate::session::{ConversationId, SessionFlag};
use crate::log_debug;
use std::collections::{HashMap, HashSet};
use std::io;
use std::process::{Child, ExitStatus};
use std::sync::{Arc, Mutex};

/// Shared handle to a spawned CLI child.
///
/// The supervisor polls it for exit while stop requests kill it from other threads; the
/// child lock is only ever held for a non-blocking call.
#[derive(Clone)]
pub struct ProcessHandle {
    child: Arc<Mutex<Child>>,
    pid: u32,
}

impl ProcessHandle {
    pub fn new(child: Child) -> Self {
        let pid = child.id();
        Self {
            child: Arc::new(Mutex::new(child)),
            pid,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn try_wait(&self) -> io::Result<Option<ExitStatus>> {
        lock_or_recover(&self.child, "ProcessHandle::try_wait").try_wait()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.try_wait(), Ok(None))
    }

    /// Kill the child unless it has already exited.
    pub fn kill(&self) -> io::Result<()> {
        let mut child = lock_or_recover(&self.child, "ProcessHandle::kill");
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        child.kill()
    }

    pub fn same_process(&self, other: &ProcessHandle) -> bool {
        Arc::ptr_eq(&self.child, &other.child)
    }
}

#[derive(Default)]
struct RegistryState {
    active: HashMap<ConversationId, ProcessHandle>,
    reserved: HashSet<ConversationId>,
    stop_acks: HashSet<ConversationId>,
    sessions: HashSet<ConversationId>,
    shutting_down: bool,
}

impl RegistryState {
    fn running(&self, conversation: &ConversationId) -> Option<&ProcessHandle> {
        self.active
            .get(conversation)
            .filter(|handle| handle.is_running())
    }
}

/// What a stop request hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stopped {
    /// A running process was killed.
    Process(u32),
    /// The conversation was reserved but its process had not registered yet; it is killed
    /// as soon as it does.
    BeforeStart,
}

#[derive(Default)]
pub struct ProcessRegistry {
    state: Mutex<RegistryState>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the running process for a conversation, returning any handle it displaced.
    ///
    /// A reserved conversation that was stopped before its process existed gets the new
    /// process killed right away instead of recorded.
    pub fn register(
        &self,
        conversation: ConversationId,
        handle: ProcessHandle,
    ) -> Option<ProcessHandle> {
        {
            let mut state = lock_or_recover(&self.state, "ProcessRegistry::register");
            let cancelled =
                state.reserved.contains(&conversation) && state.stop_acks.contains(&conversation);
            if !cancelled {
                let previous = state.active.insert(conversation.clone(), handle);
                if previous.is_some() {
                    log_debug(&format!(
                        "ProcessRegistry: replaced existing process for {conversation}"
                    ));
                }
                return previous;
            }
        }
        log_debug(&format!(
            "ProcessRegistry: {conversation} was stopped before start, killing pid {}",
            handle.pid()
        ));
        if let Err(err) = handle.kill() {
            log_debug(&format!(
                "ProcessRegistry: kill of pid {} failed: {err}",
                handle.pid()
            ));
        }
        None
    }

    /// Claim a conversation for a new invocation.
    ///
    /// Returns `None` while another invocation holds it, while a process is still running
    /// for it, or once shutdown has begun. The claim lasts until the reservation is dropped.
    pub fn try_reserve(self: &Arc<Self>, conversation: &ConversationId) -> Option<Reservation> {
        let mut state = lock_or_recover(&self.state, "ProcessRegistry::try_reserve");
        if state.shutting_down
            || state.reserved.contains(conversation)
            || state.running(conversation).is_some()
        {
            return None;
        }
        state.reserved.insert(conversation.clone());
        state.stop_acks.remove(conversation);
        Some(Reservation {
            registry: Arc::clone(self),
            conversation: conversation.clone(),
        })
    }

    pub fn is_reserved(&self, conversation: &ConversationId) -> bool {
        lock_or_recover(&self.state, "ProcessRegistry::is_reserved")
            .reserved
            .contains(conversation)
    }

    fn release(&self, conversation: &ConversationId) {
        let mut state = lock_or_recover(&self.state, "ProcessRegistry::release");
        state.reserved.remove(conversation);
        state.stop_acks.remove(conversation);
    }

    pub fn get(&self, conversation: &ConversationId) -> Option<ProcessHandle> {
        let state = lock_or_recover(&self.state, "ProcessRegistry::get");
        state.active.get(conversation).cloned()
    }

    pub fn remove(&self, conversation: &ConversationId) -> Option<ProcessHandle> {
        let mut state = lock_or_recover(&self.state, "ProcessRegistry::remove");
        state.active.remove(conversation)
    }

    /// Remove the entry only while it still refers to `handle`.
    pub fn remove_if_same(&self, conversation: &ConversationId, handle: &ProcessHandle) -> bool {
        let mut state = lock_or_recover(&self.state, "ProcessRegistry::remove_if_same");
        match state.active.get(conversation) {
            Some(current) if current.same_process(handle) => {
                state.active.remove(conversation);
                true
            }
            _ => false,
        }
    }

    /// PID of the conversation's process if it is still alive.
    pub fn running_pid(&self, conversation: &ConversationId) -> Option<u32> {
        self.get(conversation)
            .filter(ProcessHandle::is_running)
            .map(|handle| handle.pid())
    }

    /// Kill the conversation's running process and acknowledge the stop.
    ///
    /// The entry is removed here rather than by the supervisor so a stopped conversation
    /// reads as idle immediately. A reserved conversation without a process yet is
    /// acknowledged too, so its process is killed when it registers.
    pub fn stop(&self, conversation: &ConversationId) -> Option<Stopped> {
        let handle = {
            let mut state = lock_or_recover(&self.state, "ProcessRegistry::stop");
            match state.running(conversation).cloned() {
                Some(handle) => {
                    state.stop_acks.insert(conversation.clone());
                    state.active.remove(conversation);
                    handle
                }
                None if state.reserved.contains(conversation) => {
                    state.stop_acks.insert(conversation.clone());
                    tracing::info!(conversation = %conversation, "stop before process start");
                    return Some(Stopped::BeforeStart);
                }
                None => return None,
            }
        };
        if let Err(err) = handle.kill() {
            log_debug(&format!(
                "ProcessRegistry: kill of pid {} failed: {err}",
                handle.pid()
            ));
        }
        tracing::info!(conversation = %conversation, pid = handle.pid(), "process stopped");
        Some(Stopped::Process(handle.pid()))
    }

    /// Refuse new reservations and stop every running or reserved conversation.
    /// Returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        let conversations: Vec<ConversationId> = {
            let mut state = lock_or_recover(&self.state, "ProcessRegistry::stop_all");
            state.shutting_down = true;
            state
                .active
                .keys()
                .chain(state.reserved.iter())
                .cloned()
                .collect::<HashSet<_>>()
                .into_iter()
                .collect()
        };
        conversations
            .iter()
            .filter_map(|conversation| self.stop(conversation))
            .count()
    }

    /// Consume the stop acknowledgement for a conversation, if one was recorded.
    pub fn take_stop_ack(&self, conversation: &ConversationId) -> bool {
        let mut state = lock_or_recover(&self.state, "ProcessRegistry::take_stop_ack");
        state.stop_acks.remove(conversation)
    }

    pub fn active_count(&self) -> usize {
        lock_or_recover(&self.state, "ProcessRegistry::active_count")
            .active
            .len()
    }

    /// Create the CLI session on first use, resume it afterwards.
    pub fn session_flag(&self, conversation: &ConversationId) -> SessionFlag {
        let state = lock_or_recover(&self.state, "ProcessRegistry::session_flag");
        let id = conversation.session_id();
        if state.sessions.contains(conversation) {
            SessionFlag::Resume(id)
        } else {
            SessionFlag::Create(id)
        }
    }

    pub fn mark_session_started(&self, conversation: &ConversationId) {
        let mut state = lock_or_recover(&self.state, "ProcessRegistry::mark_session_started");
        state.sessions.insert(conversation.clone());
    }
}

/// Holds a conversation for one invocation; dropping it frees the conversation and any
/// stop acknowledgement left behind.
pub struct Reservation {
    registry: Arc<ProcessRegistry>,
    conversation: ConversationId,
}

impl Reservation {
    pub fn conversation(&self) -> &ConversationId {
        &self.conversation
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.registry.release(&self.conversation);
    }
}

/// Removes a registry entry when dropped, on every exit path of an invocation.
pub struct RegistrationGuard<'a> {
    registry: &'a ProcessRegistry,
    conversation: ConversationId,
    handle: ProcessHandle,
}

impl<'a> RegistrationGuard<'a> {
    pub fn register(
        registry: &'a ProcessRegistry,
        conversation: ConversationId,
        handle: ProcessHandle,
    ) -> Self {
        registry.register(conversation.clone(), handle.clone());
        Self {
            registry,
            conversation,
            handle,
        }
    }

    pub fn handle(&self) -> &ProcessHandle {
        &self.handle
    }
}

impl Drop for RegistrationGuard<'_> {
    fn drop(&mut self) {
        self.registry
            .remove_if_same(&self.conversation, &self.handle);
    }
}
