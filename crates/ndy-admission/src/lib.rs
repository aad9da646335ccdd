//! ndy-admission
//!
//! Audited workflows around the evaluator:
//! - readiness (check-in / booking) for one member
//! - staff override creation with read-after-write re-evaluation
//! - booking path resolution for one class session
//!
//! Each call records exactly one audit event. `now` is injected.

mod booking;
mod context;
mod error;
mod overrides;
mod readiness;

pub use booking::{resolve_booking, BookingDecision};
pub use context::{AdmissionContext, AdmissionRules, SharedAudit};
pub use error::{BookingError, OverrideError, ReadinessError};
pub use overrides::{bound_reason, create_override, OverrideOutcome, OverrideRequest};
pub use readiness::{evaluate_readiness, Readiness, ReadinessRequest};
