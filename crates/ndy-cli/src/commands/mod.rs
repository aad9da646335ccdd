//! Command handler modules for ndy-cli.
//!
//! Shared parsing and wiring used by multiple command paths live here.

pub mod evaluate;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use ndy_admission::{AdmissionContext, AdmissionRules, SharedAudit};
use ndy_audit::{AuditWriter, MemoryAuditSink};
use ndy_eligibility::{Denial, EligibilityPolicy, GateOperation};
use ndy_facts::InMemoryFacts;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

pub fn parse_uuid(raw: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).with_context(|| format!("invalid {what} uuid: '{raw}'"))
}

/// Parse a CLI `--operation` string.
pub fn parse_operation(raw: &str) -> Result<GateOperation> {
    match raw.trim().to_lowercase().as_str() {
        "checkin" | "check-in" => Ok(GateOperation::Checkin),
        "booking" => Ok(GateOperation::Booking),
        other => anyhow::bail!(
            "invalid --operation '{}'. expected one of: checkin | booking",
            other
        ),
    }
}

/// `--at` as RFC 3339; defaults to the wall clock.
pub fn parse_at(raw: Option<&str>) -> Result<DateTime<Utc>> {
    match raw {
        None => Ok(Utc::now()),
        Some(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|d| d.with_timezone(&Utc))
            .with_context(|| format!("invalid --at timestamp '{s}' (expected RFC 3339)")),
    }
}

pub fn denial_code(d: &Denial) -> &'static str {
    match d {
        Denial::TenantNotAuthoritative => "tenant_not_authoritative",
        Denial::DisabledByTenant => "disabled_by_tenant",
        Denial::WaiverRequired => "waiver_required",
        Denial::UpdatePayment => "update_payment",
        Denial::MembershipRequired => "membership_required",
        Denial::InsufficientTokens { .. } => "insufficient_tokens",
    }
}

/// Offline context over a fixture file. Audit goes to `audit_path` when
/// given (chain resumed), else to memory and is discarded.
pub fn fixture_context(
    fixture: &str,
    audit_path: Option<&str>,
    marker: &str,
) -> Result<AdmissionContext> {
    let facts = Arc::new(InMemoryFacts::load(fixture)?);
    let audit: SharedAudit = match audit_path {
        Some(p) => Arc::new(Mutex::new(AuditWriter::resume(p, true)?)),
        None => Arc::new(Mutex::new(MemoryAuditSink::new(true))),
    };
    Ok(AdmissionContext::new(
        facts.clone(),
        facts,
        audit,
        EligibilityPolicy {
            authoritative_marker: marker.to_string(),
        },
        AdmissionRules::default(),
    ))
}
