use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use ndy_audit::{actions, AuditEntry};
use ndy_eligibility::{
    evaluate, normalize, normalize_required_tokens, Denial, EligibilityResult, FactReading,
    GateOperation, Subject, TenantId, UserId,
};
use ndy_facts::{gather_raw_facts, FactError};

use crate::{AdmissionContext, ReadinessError};

#[derive(Clone, Debug, PartialEq)]
pub struct ReadinessRequest {
    pub subject: Subject,
    pub operation: GateOperation,
    /// Raw caller value; clamped before use.
    pub required_tokens: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Readiness {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub operation: GateOperation,
    #[serde(flatten)]
    pub result: EligibilityResult,
    pub denial: Option<Denial>,
    /// Facts that could not be read and were failed closed.
    pub unknown_facts: Vec<&'static str>,
    pub audit_event_id: Uuid,
}

/// One evaluation against freshly gathered facts.
pub(crate) struct Decision {
    pub result: EligibilityResult,
    pub unknown_facts: Vec<&'static str>,
    /// A membership row exists (any status).
    pub membership_exists: bool,
}

pub(crate) async fn decide(
    ctx: &AdmissionContext,
    subject: &Subject,
    operation: GateOperation,
    required_tokens: u32,
    now: DateTime<Utc>,
) -> Decision {
    let raw = gather_raw_facts(ctx.facts.as_ref(), subject).await;
    let unknown_facts = raw.unknown_facts();
    let membership_exists = matches!(raw.membership, FactReading::Known(Some(_)));

    let input = normalize(raw, operation, required_tokens);
    Decision {
        result: evaluate(&ctx.policy, &input, now),
        unknown_facts,
        membership_exists,
    }
}

/// `Ok(true)` iff the user holds an admin/staff role at the tenant.
pub(crate) async fn is_staff(
    ctx: &AdmissionContext,
    tenant: TenantId,
    user: UserId,
) -> Result<bool, FactError> {
    let role = ctx.facts.staff_role(tenant, user).await?;
    Ok(role.map_or(false, |r| r.is_staff()))
}

/// Evaluate readiness for one member and record exactly one audit event.
///
/// With `actor` set (desk path) the actor must be staff at the subject's
/// tenant; nothing is evaluated or recorded otherwise.
pub async fn evaluate_readiness(
    ctx: &AdmissionContext,
    req: ReadinessRequest,
    actor: Option<UserId>,
    now: DateTime<Utc>,
) -> Result<Readiness, ReadinessError> {
    let subject = req.subject;

    if let Some(actor) = actor {
        if !is_staff(ctx, subject.tenant_id, actor)
            .await
            .map_err(ReadinessError::Backend)?
        {
            warn!(tenant_id = %subject.tenant_id, actor = %actor, "readiness check by non-staff refused");
            return Err(ReadinessError::Forbidden);
        }
    }

    let required = normalize_required_tokens(req.required_tokens, ctx.rules.default_required_tokens);
    let d = decide(ctx, &subject, req.operation, required, now).await;

    let action = match (req.operation, d.result.cleared) {
        (GateOperation::Checkin, true) => actions::CHECKIN_CLEARED,
        (GateOperation::Checkin, false) => actions::CHECKIN_BLOCKED,
        (GateOperation::Booking, true) => actions::BOOKING_CLEARED,
        (GateOperation::Booking, false) => actions::BOOKING_BLOCKED,
    };

    let ev = ctx
        .record(
            AuditEntry::new(now, subject.tenant_id.0, action, req.operation.as_str())
                .actor(actor.map(|a| a.0))
                .entity(subject.user_id.0)
                .details(json!({
                    "subject_user_id": subject.user_id,
                    "reason": d.result.reason,
                    "required_tokens": d.result.required_tokens,
                    "unknown_facts": d.unknown_facts,
                })),
        )
        .await
        .map_err(ReadinessError::Audit)?;

    info!(
        tenant_id = %subject.tenant_id,
        user_id = %subject.user_id,
        operation = req.operation.as_str(),
        cleared = d.result.cleared,
        reason = d.result.reason.as_str(),
        "readiness evaluated"
    );

    Ok(Readiness {
        tenant_id: subject.tenant_id,
        user_id: subject.user_id,
        operation: req.operation,
        denial: d.result.denial(),
        result: d.result,
        unknown_facts: d.unknown_facts,
        audit_event_id: ev.event_id,
    })
}
