//! Core types for the timeclock device synchronization backend.
//!
//! This crate holds everything the other crates agree on: validated
//! identifiers, the canonical record structs both wire codecs decode into,
//! the date-range resolver used by every pull-direction fetch, and the
//! shared error taxonomy.

pub mod constants;
pub mod error;
pub mod range;
pub mod records;
pub mod types;

pub use error::{Error, Result};
pub use range::{DateRange, RangeToken, resolve_range};
pub use records::{OperationRecord, PunchRecord, TemplateKind, TemplateRecord, UserRecord};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
