//! # cellhub-engine
//!
//! Rule-evaluation core: use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that host adapters must implement:
//!   - `CellBackend`: cell read/write/completeness primitive
//!   - `RuleSink`: registration sink for normalized rules
//!   - `TimerHost`: raw timer scheduling primitive
//!   - `ProcessHost`: process spawning with exit callbacks
//!   - `ConfigSource`: structured-config reader
//! - Provide the core components layered on those ports:
//!   - `CellStore`: lazy-memoized device/cell facade with completeness
//!     tracking
//!   - condition wrapping: strict-completeness mode and incomplete-cell
//!     short-circuiting
//!   - `RuleEngine`: rule definition, alias resolution, normalization
//!   - `RuleDispatcher`: in-process trigger evaluation per cell-change turn
//!   - `TimerService`: named and anonymous timers
//!   - `Notifier`: email submission and the FIFO-serialized SMS queue
//!   - `AlarmService`: threshold/expected-value monitoring with hysteresis
//!
//! ## Dependency rule
//! Depends on `cellhub-domain` only (plus `tracing` for logging).
//! Never imports adapter crates. Adapters depend on *this* crate, not the
//! reverse.
//!
//! ## Concurrency contract
//! The host delivers cell changes, timer firings and process completions as
//! discrete, non-overlapping turns; the engine performs no internal
//! parallelism. Shared state is mutex/atomic-guarded only so the library is
//! `Send + Sync` enough to embed in an async host.

pub mod alarms;
pub mod cell_store;
pub mod condition;
pub mod dispatcher;
pub mod notify;
pub mod ports;
pub mod rules;
pub mod timers;
