//! Offline evaluation against a fixture file.
//!
//! Output is `key=value` lines followed by the full JSON breakdown, so
//! scripts can grep and humans can read.

use anyhow::{Context, Result};
use serde_json::json;

use ndy_admission::{evaluate_readiness, resolve_booking, ReadinessRequest};
use ndy_eligibility::{ClassSessionId, Subject, TenantId, UserId};

use super::{denial_code, fixture_context, parse_at, parse_operation, parse_uuid};

pub struct EvaluateArgs {
    pub fixture: String,
    pub tenant: String,
    pub user: String,
    pub operation: String,
    pub required_tokens: Option<f64>,
    pub at: Option<String>,
    pub audit: Option<String>,
    pub marker: String,
}

pub async fn run_evaluate(a: EvaluateArgs) -> Result<()> {
    let ctx = fixture_context(&a.fixture, a.audit.as_deref(), &a.marker)?;
    let req = ReadinessRequest {
        subject: Subject {
            tenant_id: TenantId(parse_uuid(&a.tenant, "--tenant")?),
            user_id: UserId(parse_uuid(&a.user, "--user")?),
        },
        operation: parse_operation(&a.operation)?,
        required_tokens: a.required_tokens,
    };
    let now = parse_at(a.at.as_deref())?;

    let r = evaluate_readiness(&ctx, req, None, now)
        .await
        .context("evaluate failed")?;

    println!("operation={}", r.operation.as_str());
    println!("cleared={}", r.result.cleared);
    println!("reason={}", r.result.reason.as_str());
    println!(
        "denial={}",
        r.denial.as_ref().map(denial_code).unwrap_or("none")
    );
    if let Some(d) = &r.denial {
        println!("message={}", d.message());
    }
    if !r.unknown_facts.is_empty() {
        println!("unknown_facts={}", r.unknown_facts.join(","));
    }
    println!("audit_event_id={}", r.audit_event_id);
    println!("{}", serde_json::to_string_pretty(&r)?);
    Ok(())
}

pub struct BookingArgs {
    pub fixture: String,
    pub session: String,
    pub user: String,
    pub at: Option<String>,
    pub audit: Option<String>,
    pub marker: String,
}

pub async fn run_booking(a: BookingArgs) -> Result<()> {
    let ctx = fixture_context(&a.fixture, a.audit.as_deref(), &a.marker)?;
    let session = ClassSessionId(parse_uuid(&a.session, "--session")?);
    let user = UserId(parse_uuid(&a.user, "--user")?);
    let now = parse_at(a.at.as_deref())?;

    let d = resolve_booking(&ctx, session, user, now)
        .await
        .context("booking resolution failed")?;

    println!("required_tokens={}", d.result.required_tokens);
    println!("membership_path={}", d.paths.membership_path);
    println!("token_path={}", d.paths.token_path);
    println!("banner={}", json!(d.paths.banner).as_str().unwrap_or(""));
    if !d.banner_message.is_empty() {
        println!("message={}", d.banner_message);
    }
    println!("{}", serde_json::to_string_pretty(&d)?);
    Ok(())
}
