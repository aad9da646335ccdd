use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use ndy_audit::{actions, AuditEntry};
use ndy_eligibility::{
    booking_paths, resolve_session_cost, BookingPaths, ClassSessionId, EligibilityResult,
    GateOperation, Subject, UserId,
};
use ndy_facts::ClassSession;

use crate::readiness::decide;
use crate::{AdmissionContext, BookingError};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BookingDecision {
    pub session: ClassSession,
    pub user_id: UserId,
    pub result: EligibilityResult,
    pub paths: BookingPaths,
    pub banner_message: &'static str,
    pub unknown_facts: Vec<&'static str>,
    pub audit_event_id: Uuid,
}

/// Which booking paths a member has for one class session.
///
/// The tenant comes from the session row; the token cost from the session,
/// then its class type, then the configured default.
pub async fn resolve_booking(
    ctx: &AdmissionContext,
    class_session_id: ClassSessionId,
    user_id: UserId,
    now: DateTime<Utc>,
) -> Result<BookingDecision, BookingError> {
    let session = ctx
        .facts
        .class_session(class_session_id)
        .await
        .map_err(BookingError::Backend)?
        .ok_or(BookingError::SessionNotFound)?;

    let required = resolve_session_cost(
        session.token_cost,
        session.class_type_default_token_cost,
        ctx.rules.default_required_tokens,
    );
    let subject = Subject {
        tenant_id: session.tenant_id,
        user_id,
    };
    let d = decide(ctx, &subject, GateOperation::Booking, required, now).await;
    let paths = booking_paths(&d.result, d.membership_exists, &session.visibility);

    let action = if paths.membership_path || paths.token_path {
        actions::BOOKING_EVALUATED
    } else {
        actions::BOOKING_BLOCKED
    };
    let ev = ctx
        .record(
            AuditEntry::new(now, session.tenant_id.0, action, "class_session")
                .actor(Some(user_id.0))
                .entity(session.id.0)
                .details(json!({
                    "reason": d.result.reason,
                    "membership_path": paths.membership_path,
                    "token_path": paths.token_path,
                    "banner": paths.banner,
                    "required_tokens": required,
                    "unknown_facts": d.unknown_facts,
                })),
        )
        .await
        .map_err(BookingError::Audit)?;

    info!(
        tenant_id = %session.tenant_id,
        user_id = %user_id,
        class_session_id = %session.id,
        membership_path = paths.membership_path,
        token_path = paths.token_path,
        "booking paths resolved"
    );

    Ok(BookingDecision {
        banner_message: paths.banner.message(),
        session,
        user_id,
        result: d.result,
        paths,
        unknown_facts: d.unknown_facts,
        audit_event_id: ev.event_id,
    })
}
