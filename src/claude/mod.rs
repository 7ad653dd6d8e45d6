//! Driving the `claude` CLI in streaming JSON mode.
//!
//! - `events`: one stdout line to a tagged [`Event`]
//! - `decoder`: per-invocation state turning events into chat text
//! - `stderr`: bounded capture of the process's stderr
//! - `supervisor`: spawn, registry bookkeeping, wait and cleanup

mod decoder;
mod events;
mod stderr;
mod supervisor;


pub use decoder::{preview_tool_output, DecoderSink, StreamDecoder, ToolCallAccumulator, TOOL_MARKER};
pub use events::{classify, decode_line, Event};
pub use stderr::{spawn_stderr_drain, StderrCapture, StderrCaps};
pub use supervisor::{
    InvocationRequest, Supervisor, SupervisorConfig, SupervisorError, CLAUDE_BASE_ARGS,
};
