use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use ndy_audit::{actions, AuditEntry};
use ndy_eligibility::{
    normalize_required_tokens, EligibilityResult, GateOperation, Subject, TenantId, UserId,
};
use ndy_facts::{FactError, NewOverride, OverrideRecord};

use crate::readiness::{decide, is_staff};
use crate::{AdmissionContext, OverrideError};

#[derive(Clone, Debug, PartialEq)]
pub struct OverrideRequest {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub reason: String,
    pub required_tokens: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OverrideOutcome {
    pub record: OverrideRecord,
    /// Check-in evaluation read back after the override was written.
    pub result: EligibilityResult,
    pub unknown_facts: Vec<&'static str>,
}

/// Trim and cut to at most `max_chars` characters.
pub fn bound_reason(raw: &str, max_chars: usize) -> String {
    raw.trim().chars().take(max_chars).collect::<String>().trim_end().to_string()
}

/// Staff override for one member's check-in.
///
/// Order: reason, staff role, tenant guardrails, audit, insert, re-evaluate.
/// Blocked guardrails are audited (`checkin_blocked`). The override is
/// audited (`checkin_override_created`) before its row is written, so a
/// failed audit write stores nothing; a failed insert is followed by
/// `checkin_override_failed` for the same id. The returned result is
/// evaluated from facts read after the insert, so it can still be blocked
/// (e.g. waiver unsigned).
pub async fn create_override(
    ctx: &AdmissionContext,
    req: OverrideRequest,
    actor: UserId,
    now: DateTime<Utc>,
) -> Result<OverrideOutcome, OverrideError> {
    let reason = bound_reason(&req.reason, ctx.rules.reason_max_chars);
    if reason.is_empty() {
        return Err(OverrideError::MissingFields);
    }

    let tenant = req.tenant_id;
    if !is_staff(ctx, tenant, actor)
        .await
        .map_err(OverrideError::Backend)?
    {
        warn!(tenant_id = %tenant, actor = %actor, "override by non-staff refused");
        return Err(OverrideError::Forbidden);
    }

    let guardrails = ctx
        .facts
        .tenant_guardrails(tenant)
        .await
        .map_err(OverrideError::Backend)?
        .ok_or(OverrideError::TenantNotFound)?;

    if !guardrails.is_authoritative(&ctx.policy.authoritative_marker) {
        blocked_event(
            ctx,
            tenant,
            actor,
            now,
            json!({
                "reason": "tenant_not_authoritative",
                "system_of_record": guardrails.system_of_record,
            }),
        )
        .await?;
        return Err(OverrideError::TenantNotAuthoritative {
            system_of_record: guardrails.system_of_record,
        });
    }

    if guardrails.kill_switch_disable_checkin {
        blocked_event(
            ctx,
            tenant,
            actor,
            now,
            json!({ "reason": "kill_switch_disable_checkin" }),
        )
        .await?;
        return Err(OverrideError::CheckinDisabled);
    }

    let new = NewOverride {
        override_id: Uuid::new_v4(),
        tenant_id: tenant,
        user_id: req.user_id,
        reason: reason.clone(),
        created_by: actor,
        created_at: now,
        expires_at: ctx.rules.override_ttl.map(|ttl| now + ttl),
    };

    ctx.record(
        AuditEntry::new(now, tenant.0, actions::CHECKIN_OVERRIDE_CREATED, "checkin_override")
            .actor(Some(actor.0))
            .entity(new.override_id)
            .details(json!({
                "subject_user_id": req.user_id,
                "reason": reason,
                "expires_at": new.expires_at,
            })),
    )
    .await
    .map_err(OverrideError::Audit)?;

    let override_id = new.override_id;
    let record = match ctx.overrides.insert_override(new).await {
        Ok(r) => r,
        Err(e) => {
            let detail = match e {
                FactError::InsertFailed(detail) => detail,
                other => other.to_string(),
            };
            insert_failed_event(ctx, tenant, actor, override_id, &detail, now).await;
            return Err(OverrideError::InsertFailed(detail));
        }
    };

    let subject = Subject {
        tenant_id: tenant,
        user_id: req.user_id,
    };
    let required = normalize_required_tokens(req.required_tokens, ctx.rules.default_required_tokens);
    let d = decide(ctx, &subject, GateOperation::Checkin, required, now).await;

    info!(
        tenant_id = %tenant,
        user_id = %req.user_id,
        actor = %actor,
        override_id = %record.override_id,
        cleared = d.result.cleared,
        reason = d.result.reason.as_str(),
        "check-in override created"
    );

    Ok(OverrideOutcome {
        record,
        result: d.result,
        unknown_facts: d.unknown_facts,
    })
}

/// Best effort: the insert error is what the caller sees either way.
async fn insert_failed_event(
    ctx: &AdmissionContext,
    tenant: TenantId,
    actor: UserId,
    override_id: Uuid,
    detail: &str,
    now: DateTime<Utc>,
) {
    let entry = AuditEntry::new(
        now,
        tenant.0,
        actions::CHECKIN_OVERRIDE_FAILED,
        "checkin_override",
    )
    .actor(Some(actor.0))
    .entity(override_id)
    .details(json!({ "error": detail }));
    if let Err(err) = ctx.record(entry).await {
        error!(
            override_id = %override_id,
            error = %format!("{err:#}"),
            "could not audit failed override insert"
        );
    }
}

async fn blocked_event(
    ctx: &AdmissionContext,
    tenant: TenantId,
    actor: UserId,
    now: DateTime<Utc>,
    details: serde_json::Value,
) -> Result<(), OverrideError> {
    warn!(tenant_id = %tenant, actor = %actor, details = %details, "override blocked by tenant guardrails");
    ctx.record(
        AuditEntry::new(now, tenant.0, actions::CHECKIN_BLOCKED, "tenant")
            .actor(Some(actor.0))
            .entity(tenant.0)
            .details(details),
    )
    .await
    .map(|_| ())
    .map_err(OverrideError::Audit)
}
