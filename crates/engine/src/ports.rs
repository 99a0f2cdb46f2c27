//! Port definitions: traits that host adapters implement.
//!
//! Ports are the boundaries between the rule-evaluation core and the host
//! runtime that owns storage, transport, scheduling and process execution.
//! They are defined here so that both the engine and the adapter layer can
//! depend on them without creating circular dependencies.

pub mod cells;
pub mod config;
pub mod process;
pub mod rules;
pub mod timers;

pub use cells::CellBackend;
pub use config::ConfigSource;
pub use process::{ExitCallback, ProcessHost, SpawnOutcome, SpawnRequest};
pub use rules::RuleSink;
pub use timers::{TimerCallback, TimerHost};
