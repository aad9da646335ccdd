use chrono::{DateTime, Utc};

use crate::{EligibilityInput, EligibilityPolicy, EligibilityResult, OverrideFact, ReasonCode};

/// `true` if the override is flagged active and not yet expired at `now`.
///
/// An override without `expires_at` stays active until superseded.
pub fn override_is_active(ov: Option<&OverrideFact>, now: DateTime<Utc>) -> bool {
    match ov {
        Some(o) => o.active && o.expires_at.map_or(true, |exp| exp > now),
        None => false,
    }
}

/// Main evaluator (pure deterministic logic; total over its typed inputs).
pub fn evaluate(
    policy: &EligibilityPolicy,
    inp: &EligibilityInput,
    now: DateTime<Utc>,
) -> EligibilityResult {
    // 1) Authority: a tenant run from another system of record is never admitted here.
    if !inp.guardrails.is_authoritative(&policy.authoritative_marker) {
        return EligibilityResult::short_circuit(
            ReasonCode::TenantNotAuthoritative,
            inp.required_tokens,
        );
    }

    // 2) Operation kill switch.
    if inp.guardrails.kill_switch_for(inp.operation) {
        return EligibilityResult::short_circuit(ReasonCode::DisabledByTenant, inp.required_tokens);
    }

    // 3) Independent evidentiary paths.
    let membership_eligible = inp
        .membership
        .as_ref()
        .map_or(false, |m| m.status.is_eligible());
    let tokens_eligible = inp.token_balance >= u64::from(inp.required_tokens);
    let override_active = override_is_active(inp.override_fact.as_ref(), now);

    // 4) Waiver gate is absolute. 5) Any one path suffices once it is passed.
    let waiver_signed = inp.waiver.signed;
    let reason = if !waiver_signed {
        ReasonCode::WaiverRequired
    } else if membership_eligible {
        ReasonCode::ClearedByMembership
    } else if tokens_eligible {
        ReasonCode::ClearedByTokens
    } else if override_active {
        ReasonCode::ClearedByOverride
    } else {
        ReasonCode::NoEligiblePath
    };

    EligibilityResult {
        cleared: waiver_signed && (membership_eligible || tokens_eligible || override_active),
        reason,
        waiver_signed,
        membership_eligible,
        tokens_eligible,
        override_active,
        membership_status: inp.membership.as_ref().map(|m| m.status.clone()),
        token_balance: inp.token_balance,
        required_tokens: inp.required_tokens,
    }
}
