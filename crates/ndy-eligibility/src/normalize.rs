//! Fail-closed input normalisation.
//!
//! The fact layer reports every fact as a tri-state [`FactReading`]. This module
//! is the only place an `Unknown` turns into a concrete value, and it always
//! picks the most restrictive one: unsigned waiver, no membership, zero balance,
//! inactive override, non-authoritative tenant. Never `Unknown -> true`.

use serde::{Deserialize, Serialize};

use crate::{
    EligibilityInput, GateOperation, MembershipFact, MembershipStatus, OverrideFact,
    TenantGuardrails, WaiverFact,
};

/// Token cost when the caller does not specify one.
pub const DEFAULT_REQUIRED_TOKENS: u32 = 1;

/// `system_of_record` substituted when tenant guardrails could not be read.
pub const UNKNOWN_SYSTEM_OF_RECORD: &str = "unknown";

/// Tri-state result of fetching one fact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum FactReading<T> {
    Known(T),
    Unknown,
}

impl<T> FactReading<T> {
    pub fn is_known(&self) -> bool {
        matches!(self, FactReading::Known(_))
    }

    pub fn known(self) -> Option<T> {
        match self {
            FactReading::Known(v) => Some(v),
            FactReading::Unknown => None,
        }
    }
}

impl<T, E> From<Result<T, E>> for FactReading<T> {
    fn from(r: Result<T, E>) -> Self {
        match r {
            Ok(v) => FactReading::Known(v),
            Err(_) => FactReading::Unknown,
        }
    }
}

/// Facts exactly as the fact layer returned them.
#[derive(Clone, Debug, PartialEq)]
pub struct RawFacts {
    /// `Known(None)` = no tenant row.
    pub guardrails: FactReading<Option<TenantGuardrails>>,
    pub waiver_signed: FactReading<bool>,
    /// `Known(None)` = no membership row.
    pub membership: FactReading<Option<MembershipStatus>>,
    /// `Known(None)` = no wallet row.
    pub token_balance: FactReading<Option<i64>>,
    /// Latest override row, if any.
    pub override_fact: FactReading<Option<OverrideFact>>,
}

impl RawFacts {
    /// Every fact unknown. Normalises to a fully blocked input.
    pub fn all_unknown() -> Self {
        Self {
            guardrails: FactReading::Unknown,
            waiver_signed: FactReading::Unknown,
            membership: FactReading::Unknown,
            token_balance: FactReading::Unknown,
            override_fact: FactReading::Unknown,
        }
    }

    /// Names of facts that could not be determined (for logs / audit details).
    pub fn unknown_facts(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if !self.guardrails.is_known() {
            out.push("guardrails");
        }
        if !self.waiver_signed.is_known() {
            out.push("waiver");
        }
        if !self.membership.is_known() {
            out.push("membership");
        }
        if !self.token_balance.is_known() {
            out.push("token_balance");
        }
        if !self.override_fact.is_known() {
            out.push("override");
        }
        out
    }
}

/// Map raw readings to a concrete evaluator input, fail closed.
pub fn normalize(raw: RawFacts, operation: GateOperation, required_tokens: u32) -> EligibilityInput {
    let guardrails = raw
        .guardrails
        .known()
        .flatten()
        .unwrap_or_else(|| TenantGuardrails {
            system_of_record: UNKNOWN_SYSTEM_OF_RECORD.to_string(),
            kill_switch_disable_checkin: true,
            kill_switch_disable_booking: true,
        });

    let waiver = WaiverFact {
        signed: raw.waiver_signed.known().unwrap_or(false),
    };

    let membership = raw.membership.known().flatten().map(MembershipFact::new);

    let token_balance = raw
        .token_balance
        .known()
        .flatten()
        .and_then(|b| u64::try_from(b).ok())
        .unwrap_or(0);

    let override_fact = raw.override_fact.known().flatten();

    EligibilityInput {
        operation,
        guardrails,
        waiver,
        membership,
        token_balance,
        required_tokens,
        override_fact,
    }
}

/// Clamp a caller-supplied token cost.
///
/// - unspecified -> `default`
/// - negative or non-finite -> 0
/// - otherwise `floor(value)`, saturating at `u32::MAX`
pub fn normalize_required_tokens(raw: Option<f64>, default: u32) -> u32 {
    match raw {
        None => default,
        Some(v) if !v.is_finite() || v <= 0.0 => 0,
        // `as` saturates for floats; floor first so 2.9 -> 2.
        Some(v) => v.floor() as u32,
    }
}

/// Clamp a numeric wallet balance. Unknown, negative and non-finite become 0.
pub fn normalize_token_balance(raw: Option<f64>) -> u64 {
    match raw {
        Some(v) if v.is_finite() && v > 0.0 => v.floor() as u64,
        _ => 0,
    }
}

/// Token cost for a class session.
///
/// The session's own cost wins when it is a positive finite number; otherwise
/// the class type default (when finite); otherwise `fallback`.
pub fn resolve_session_cost(
    session_token_cost: Option<f64>,
    class_type_default: Option<f64>,
    fallback: u32,
) -> u32 {
    match session_token_cost {
        Some(c) if c.is_finite() && c > 0.0 => normalize_required_tokens(Some(c), fallback),
        _ => match class_type_default {
            Some(d) if d.is_finite() => normalize_required_tokens(Some(d), fallback),
            _ => fallback,
        },
    }
}
