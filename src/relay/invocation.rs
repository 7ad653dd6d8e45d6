use super::buffer::OutputBuffer;
use super::poster::Poster;
use super::scheduler::FlushScheduler;
use super::{DeliveryMode, RelayConfig};
use crate::claude::{InvocationRequest, Supervisor};
use crate::log_debug;
use crate::session::ConversationId;
use crossbeam_channel::unbounded;
use std::sync::Arc;
use std::time::Instant;

/// Long-lived pieces shared by every invocation.
#[derive(Clone)]
pub struct InvocationContext {
    pub supervisor: Arc<Supervisor>,
    pub relay: RelayConfig,
}

/// One mention to answer.
pub struct InvocationSpec {
    pub conversation: ConversationId,
    pub prompt: String,
    /// Chat user id mentioned in the closing notice.
    pub user: String,
    pub mode: DeliveryMode,
    pub poster: Poster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationOutcome {
    Completed { exit_code: i32 },
    /// Stopped by a user; nothing further was posted.
    Cancelled,
}

/// Run the CLI for one mention and deliver its output into the thread.
pub fn run_invocation(ctx: &InvocationContext, spec: InvocationSpec) -> InvocationOutcome {
    let registry = ctx.supervisor.registry();
    let started = Instant::now();
    let buffer = Arc::new(OutputBuffer::new(
        spec.poster.clone(),
        spec.mode,
        ctx.relay.flush,
    ));
    let (tx, rx) = unbounded();
    let mut scheduler = FlushScheduler::spawn(Arc::clone(&buffer), rx, ctx.relay.flush.tick);

    let request = InvocationRequest {
        prompt: spec.prompt,
        session: Some(registry.session_flag(&spec.conversation)),
        conversation: spec.conversation.clone(),
    };
    tracing::info!(
        conversation = %spec.conversation,
        mode = spec.mode.label(),
        "invocation started"
    );
    let exit_code = ctx.supervisor.run(&request, &tx);
    drop(tx);
    scheduler.stop();

    if registry.take_stop_ack(&spec.conversation) {
        buffer.clear();
        log_debug(&format!(
            "Invocation for {} was stopped, discarding pending output",
            spec.conversation
        ));
        tracing::info!(conversation = %spec.conversation, "invocation cancelled");
        return InvocationOutcome::Cancelled;
    }

    buffer.flush();
    let notice = if exit_code == 0 {
        registry.mark_session_started(&spec.conversation);
        format!("<@{}> Done!", spec.user)
    } else {
        format!("<@{}> Error occurred (code={exit_code})", spec.user)
    };
    spec.poster.post(&notice, false);
    tracing::info!(
        conversation = %spec.conversation,
        exit_code,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "invocation finished"
    );
    InvocationOutcome::Completed { exit_code }
}
