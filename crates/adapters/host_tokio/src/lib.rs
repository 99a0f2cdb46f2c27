//! Tokio host adapter.
//!
//! Implements the engine's host-side ports on top of a Tokio runtime:
//! [`TokioTimerHost`] for timer scheduling, [`TokioProcessHost`] for
//! external process execution and [`JsonConfigSource`] for reading JSON
//! configuration files from disk.

mod config;
mod process;
mod timer;

pub use config::JsonConfigSource;
pub use process::TokioProcessHost;
pub use timer::TokioTimerHost;
