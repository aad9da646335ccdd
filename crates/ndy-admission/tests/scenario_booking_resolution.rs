//! Scenario: booking paths resolved from the class session row.
//!
//! GREEN when:
//! - a past_due member with tokens gets the token path on a public session;
//! - members-only sessions never offer the token path;
//! - the session cost falls back to the class type default;
//! - the external tenant blocks both paths;
//! - a missing session is an error and writes nothing.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use ndy_admission::{resolve_booking, AdmissionContext, AdmissionRules, BookingError, SharedAudit};
use ndy_audit::{actions, MemoryAuditSink};
use ndy_eligibility::{BookingBanner, ClassSessionId, EligibilityPolicy, ReasonCode, UserId};
use ndy_facts::InMemoryFacts;

const HIIT_PUBLIC: &str = "cccccccc-0000-4000-8000-000000000001";
const MEMBERS_ONLY: &str = "cccccccc-0000-4000-8000-000000000002";
const LEGACY_SESSION: &str = "cccccccc-0000-4000-8000-000000000003";
const ACTIVE: &str = "bbbbbbbb-0000-4000-8000-000000000001";
const PAST_DUE: &str = "bbbbbbbb-0000-4000-8000-000000000002";
const DROP_IN: &str = "bbbbbbbb-0000-4000-8000-000000000004";
const LEGACY_MEMBER: &str = "bbbbbbbb-0000-4000-8000-000000000005";

fn setup() -> (AdmissionContext, Arc<InMemoryFacts>, Arc<Mutex<MemoryAuditSink>>) {
    let path = format!("{}/../../fixtures/demo_gym.yaml", env!("CARGO_MANIFEST_DIR"));
    let facts = Arc::new(InMemoryFacts::load(path).expect("demo fixture must load"));
    let sink = Arc::new(Mutex::new(MemoryAuditSink::new(true)));
    let audit: SharedAudit = sink.clone();
    let ctx = AdmissionContext::new(
        facts.clone(),
        facts.clone(),
        audit,
        EligibilityPolicy::default(),
        AdmissionRules::default(),
    );
    (ctx, facts, sink)
}

fn session(s: &str) -> ClassSessionId {
    ClassSessionId(Uuid::parse_str(s).unwrap())
}

fn user(s: &str) -> UserId {
    UserId(Uuid::parse_str(s).unwrap())
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 3, 12, 0, 0).unwrap()
}

#[tokio::test]
async fn past_due_member_books_public_session_with_tokens() {
    let (ctx, _facts, sink) = setup();

    let d = resolve_booking(&ctx, session(HIIT_PUBLIC), user(PAST_DUE), now())
        .await
        .unwrap();

    assert!(!d.paths.membership_path);
    assert!(d.paths.token_path);
    assert!(d.paths.show_update_payment);
    assert_eq!(d.paths.banner, BookingBanner::None);
    assert_eq!(d.result.required_tokens, 1);

    let sink = sink.lock().await;
    assert_eq!(sink.events().len(), 1);
    let ev = &sink.events()[0];
    assert_eq!(ev.action, actions::BOOKING_EVALUATED);
    assert_eq!(ev.entity_type, "class_session");
    assert_eq!(ev.entity_id, Some(session(HIIT_PUBLIC).0));
    assert_eq!(ev.details["token_path"], true);
}

#[tokio::test]
async fn active_member_uses_membership() {
    let (ctx, _facts, _sink) = setup();

    let d = resolve_booking(&ctx, session(HIIT_PUBLIC), user(ACTIVE), now())
        .await
        .unwrap();

    assert!(d.paths.membership_path);
    assert!(!d.paths.token_path);
    assert_eq!(d.paths.banner, BookingBanner::UseMembership);
    assert_eq!(d.banner_message, BookingBanner::UseMembership.message());
}

#[tokio::test]
async fn members_only_session_uses_class_type_cost_and_refuses_tokens() {
    let (ctx, _facts, sink) = setup();

    let d = resolve_booking(&ctx, session(MEMBERS_ONLY), user(PAST_DUE), now())
        .await
        .unwrap();

    assert_eq!(d.result.required_tokens, 2);
    assert!(d.result.tokens_eligible);
    assert!(!d.paths.token_path);
    assert!(!d.paths.membership_path);
    assert_eq!(d.paths.banner, BookingBanner::MembersOnlySession);
    assert_eq!(sink.lock().await.count_action(actions::BOOKING_BLOCKED), 1);
}

#[tokio::test]
async fn drop_in_without_tokens_has_no_path() {
    let (ctx, _facts, _sink) = setup();

    let d = resolve_booking(&ctx, session(HIIT_PUBLIC), user(DROP_IN), now())
        .await
        .unwrap();

    assert!(!d.paths.membership_path);
    assert!(!d.paths.token_path);
    assert_eq!(d.paths.banner, BookingBanner::NotEnoughTokens);
}

#[tokio::test]
async fn external_tenant_session_is_blocked() {
    let (ctx, _facts, _sink) = setup();

    let d = resolve_booking(&ctx, session(LEGACY_SESSION), user(LEGACY_MEMBER), now())
        .await
        .unwrap();

    assert_eq!(d.result.reason, ReasonCode::TenantNotAuthoritative);
    assert_eq!(d.paths.banner, BookingBanner::NotAuthoritative);
    assert!(!d.paths.membership_path && !d.paths.token_path);
}

#[tokio::test]
async fn missing_session_is_not_found() {
    let (ctx, _facts, sink) = setup();

    let err = resolve_booking(&ctx, ClassSessionId(Uuid::from_u128(1)), user(ACTIVE), now())
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::SessionNotFound));
    assert!(sink.lock().await.events().is_empty());
}

#[tokio::test]
async fn session_lookup_outage_is_backend_error() {
    let (ctx, facts, sink) = setup();
    facts.set_unavailable("class_session", true).unwrap();

    let err = resolve_booking(&ctx, session(HIIT_PUBLIC), user(ACTIVE), now())
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::Backend(_)));
    assert!(sink.lock().await.events().is_empty());
}
