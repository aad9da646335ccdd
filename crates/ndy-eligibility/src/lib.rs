//! ndy-eligibility
//!
//! Admission gate for check-in and class booking.
//!
//! Decides whether one member may be admitted at one tenant from a snapshot of
//! facts: tenant guardrails, waiver, membership, token wallet and an optional
//! staff override. Every caller (daemon, CLI, fixtures) goes through
//! [`evaluate`]; nobody re-derives the boolean locally.
//!
//! Deterministic, pure logic. No IO, no wall-clock: `now` is always supplied
//! by the caller.

mod booking;
mod engine;
mod normalize;
mod types;

pub use booking::{booking_paths, BookingBanner, BookingPaths};
pub use engine::{evaluate, override_is_active};
pub use normalize::{
    normalize, normalize_required_tokens, normalize_token_balance, resolve_session_cost,
    FactReading, RawFacts, DEFAULT_REQUIRED_TOKENS, UNKNOWN_SYSTEM_OF_RECORD,
};
pub use types::*;
