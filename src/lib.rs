pub mod app;
pub mod claude;
pub mod config;
pub mod doctor;
pub mod ipc;
mod lock;
pub mod registry;
pub mod relay;
pub mod screenshot;
pub mod session;
mod telemetry;
pub mod text;

pub(crate) use lock::lock_or_recover;
pub use app::{
    crash_log_path, init_logging, log_debug, log_debug_content, log_file_path, log_panic,
};
pub use telemetry::{init_tracing, tracing_log_path};
