//! # cellhub-domain
//!
//! Pure domain model for the cellhub rule-evaluation core.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **cell references** (`"device/control"`) and dynamic **cell values**
//! - Define the **alarm configuration surface** (recipients, thresholds,
//!   ranges, re-notification intervals) and its load-time validation
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `engine`, adapters, or external IO
//! crates. All IO boundaries are expressed as traits in the `engine` crate
//! (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod alarm;
pub mod cell;
pub mod value;
