//! Scenario: staff override workflow against the demo fixture.
//!
//! GREEN when:
//! - only staff of the subject's tenant can create an override;
//! - tenant guardrails refuse the override and record one `checkin_blocked`;
//! - the re-evaluation reads the override back (drop-in clears);
//! - an override never bypasses the waiver;
//! - a configured TTL sets `expires_at` and the override lapses after it;
//! - backend failures write nothing;
//! - the audit event is written before the override row: a failed audit
//!   write stores nothing, a failed insert is followed by `checkin_override_failed`.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use ndy_admission::{
    create_override, evaluate_readiness, AdmissionContext, AdmissionRules, OverrideError,
    OverrideRequest, ReadinessRequest, SharedAudit,
};
use ndy_audit::{actions, AuditEntry, AuditEvent, AuditSink, MemoryAuditSink};
use ndy_eligibility::{EligibilityPolicy, GateOperation, ReasonCode, Subject, TenantId, UserId};
use ndy_facts::InMemoryFacts;

const HARBOR: &str = "11111111-1111-4111-8111-111111111111";
const LEGACY: &str = "22222222-2222-4222-8222-222222222222";
const QUIET: &str = "33333333-3333-4333-8333-333333333333";
const DESK_HARBOR: &str = "aaaaaaaa-0000-4000-8000-000000000001";
const DESK_LEGACY: &str = "aaaaaaaa-0000-4000-8000-000000000002";
const DESK_QUIET: &str = "aaaaaaaa-0000-4000-8000-000000000003";
const ACTIVE: &str = "bbbbbbbb-0000-4000-8000-000000000001";
const NO_WAIVER: &str = "bbbbbbbb-0000-4000-8000-000000000003";
const DROP_IN: &str = "bbbbbbbb-0000-4000-8000-000000000004";
const LEGACY_MEMBER: &str = "bbbbbbbb-0000-4000-8000-000000000005";

struct Harness {
    ctx: AdmissionContext,
    facts: Arc<InMemoryFacts>,
    sink: Arc<Mutex<MemoryAuditSink>>,
}

fn harness(rules: AdmissionRules) -> Harness {
    let path = format!("{}/../../fixtures/demo_gym.yaml", env!("CARGO_MANIFEST_DIR"));
    let facts = Arc::new(InMemoryFacts::load(path).expect("demo fixture must load"));
    let sink = Arc::new(Mutex::new(MemoryAuditSink::new(true)));
    let audit: SharedAudit = sink.clone();
    let ctx = AdmissionContext::new(
        facts.clone(),
        facts.clone(),
        audit,
        EligibilityPolicy::default(),
        rules,
    );
    Harness { ctx, facts, sink }
}

fn t(s: &str) -> TenantId {
    TenantId(Uuid::parse_str(s).unwrap())
}

fn u(s: &str) -> UserId {
    UserId(Uuid::parse_str(s).unwrap())
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 6, 30, 0).unwrap()
}

fn request(tenant: &str, user: &str, reason: &str) -> OverrideRequest {
    OverrideRequest {
        tenant_id: t(tenant),
        user_id: u(user),
        reason: reason.to_string(),
        required_tokens: None,
    }
}

#[tokio::test]
async fn drop_in_is_cleared_by_override_read_back() {
    let h = harness(AdmissionRules::default());

    let out = create_override(&h.ctx, request(HARBOR, DROP_IN, "  free trial day  "), u(DESK_HARBOR), now())
        .await
        .unwrap();

    assert_eq!(out.record.reason, "free trial day");
    assert_eq!(out.record.created_by, u(DESK_HARBOR));
    assert_eq!(out.record.expires_at, None);
    assert!(out.result.cleared);
    assert_eq!(out.result.reason, ReasonCode::ClearedByOverride);
    assert!(out.unknown_facts.is_empty());

    let sink = h.sink.lock().await;
    assert_eq!(sink.events().len(), 1);
    assert_eq!(sink.count_action(actions::CHECKIN_OVERRIDE_CREATED), 1);
    assert_eq!(sink.events()[0].entity_id, Some(out.record.override_id));
    assert_eq!(h.facts.overrides().unwrap().len(), 1);
}

#[tokio::test]
async fn override_does_not_bypass_waiver() {
    let h = harness(AdmissionRules::default());

    let out = create_override(&h.ctx, request(HARBOR, NO_WAIVER, "forgot phone"), u(DESK_HARBOR), now())
        .await
        .unwrap();

    assert!(!out.result.cleared);
    assert!(out.result.override_active);
    assert_eq!(out.result.reason, ReasonCode::WaiverRequired);
}

#[tokio::test]
async fn non_staff_actor_is_forbidden_and_nothing_is_written() {
    let h = harness(AdmissionRules::default());

    // A member of the tenant, and staff of another tenant.
    for actor in [ACTIVE, DESK_LEGACY] {
        let err = create_override(&h.ctx, request(HARBOR, DROP_IN, "let them in"), u(actor), now())
            .await
            .unwrap_err();
        assert!(matches!(err, OverrideError::Forbidden));
        assert_eq!(err.code(), "forbidden");
    }

    assert!(h.facts.overrides().unwrap().is_empty());
    assert!(h.sink.lock().await.events().is_empty());
}

#[tokio::test]
async fn blank_reason_is_rejected_before_any_lookup() {
    let h = harness(AdmissionRules::default());
    h.facts.set_unavailable("staff_role", true).unwrap();

    let err = create_override(&h.ctx, request(HARBOR, DROP_IN, "   \n"), u(DESK_HARBOR), now())
        .await
        .unwrap_err();

    assert!(matches!(err, OverrideError::MissingFields));
    assert_eq!(err.code(), "missing_required_fields");
}

#[tokio::test]
async fn external_system_of_record_refuses_override() {
    let h = harness(AdmissionRules::default());

    let err = create_override(&h.ctx, request(LEGACY, LEGACY_MEMBER, "door stuck"), u(DESK_LEGACY), now())
        .await
        .unwrap_err();

    match &err {
        OverrideError::TenantNotAuthoritative { system_of_record } => {
            assert_eq!(system_of_record, "external")
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.code(), "tenant_not_authoritative");
    assert!(h.facts.overrides().unwrap().is_empty());

    let sink = h.sink.lock().await;
    assert_eq!(sink.events().len(), 1);
    let ev = &sink.events()[0];
    assert_eq!(ev.action, actions::CHECKIN_BLOCKED);
    assert_eq!(ev.entity_type, "tenant");
    assert_eq!(ev.details["reason"], "tenant_not_authoritative");
}

#[tokio::test]
async fn kill_switch_refuses_override() {
    let h = harness(AdmissionRules::default());

    let err = create_override(&h.ctx, request(QUIET, DROP_IN, "owner asked"), u(DESK_QUIET), now())
        .await
        .unwrap_err();

    assert!(matches!(err, OverrideError::CheckinDisabled));
    assert_eq!(err.code(), "checkin_disabled");
    assert!(h.facts.overrides().unwrap().is_empty());

    let sink = h.sink.lock().await;
    assert_eq!(sink.count_action(actions::CHECKIN_BLOCKED), 1);
    assert_eq!(sink.events()[0].details["reason"], "kill_switch_disable_checkin");
}

#[tokio::test]
async fn tenant_without_guardrails_row_is_not_found() {
    // Staff row exists but the tenant row does not.
    let facts = Arc::new(
        InMemoryFacts::from_yaml_str(
            r#"
members:
  - tenant_id: "44444444-4444-4444-8444-444444444444"
    user_id: "aaaaaaaa-0000-4000-8000-000000000009"
    role: "admin"
"#,
        )
        .unwrap(),
    );
    let sink = Arc::new(Mutex::new(MemoryAuditSink::new(true)));
    let audit: SharedAudit = sink.clone();
    let ctx = AdmissionContext::new(
        facts.clone(),
        facts.clone(),
        audit,
        EligibilityPolicy::default(),
        AdmissionRules::default(),
    );

    let req = request("44444444-4444-4444-8444-444444444444", DROP_IN, "new gym");
    let err = create_override(&ctx, req, u("aaaaaaaa-0000-4000-8000-000000000009"), now())
        .await
        .unwrap_err();

    assert!(matches!(err, OverrideError::TenantNotFound));
    assert_eq!(err.code(), "tenant_not_found");
    assert!(facts.overrides().unwrap().is_empty());
    assert!(sink.lock().await.events().is_empty());
}

#[tokio::test]
async fn ttl_sets_expiry_and_override_lapses() {
    let h = harness(AdmissionRules {
        override_ttl: Some(Duration::minutes(60)),
        ..AdmissionRules::default()
    });

    let out = create_override(&h.ctx, request(HARBOR, DROP_IN, "guest pass"), u(DESK_HARBOR), now())
        .await
        .unwrap();
    assert_eq!(out.record.expires_at, Some(now() + Duration::minutes(60)));
    assert!(out.result.cleared);

    let later = ReadinessRequest {
        subject: Subject {
            tenant_id: t(HARBOR),
            user_id: u(DROP_IN),
        },
        operation: GateOperation::Checkin,
        required_tokens: None,
    };
    let r = evaluate_readiness(&h.ctx, later, None, now() + Duration::hours(2))
        .await
        .unwrap();
    assert!(!r.result.cleared);
    assert!(!r.result.override_active);
    assert_eq!(r.result.reason, ReasonCode::NoEligiblePath);
}

#[tokio::test]
async fn role_lookup_outage_fails_closed_without_writes() {
    let h = harness(AdmissionRules::default());
    h.facts.set_unavailable("staff_role", true).unwrap();

    let err = create_override(&h.ctx, request(HARBOR, DROP_IN, "guest pass"), u(DESK_HARBOR), now())
        .await
        .unwrap_err();

    assert!(matches!(err, OverrideError::Backend(_)));
    assert_eq!(err.code(), "server_error");
    assert!(h.facts.overrides().unwrap().is_empty());
    assert!(h.sink.lock().await.events().is_empty());
}

#[tokio::test]
async fn insert_failure_is_reported_and_audited_as_failed() {
    let h = harness(AdmissionRules::default());
    h.facts.set_unavailable("insert_override", true).unwrap();

    let err = create_override(&h.ctx, request(HARBOR, DROP_IN, "guest pass"), u(DESK_HARBOR), now())
        .await
        .unwrap_err();

    assert!(matches!(err, OverrideError::InsertFailed(_)));
    assert_eq!(err.code(), "override_insert_failed");

    let sink = h.sink.lock().await;
    let evs = sink.events();
    assert_eq!(evs.len(), 2);
    assert_eq!(evs[0].action, actions::CHECKIN_OVERRIDE_CREATED);
    assert_eq!(evs[1].action, actions::CHECKIN_OVERRIDE_FAILED);
    assert_eq!(evs[0].entity_id, evs[1].entity_id);
    assert!(h.facts.overrides().unwrap().is_empty());
}

/// Sink whose every write fails, like a full disk.
struct BrokenSink;

impl AuditSink for BrokenSink {
    fn record(&mut self, _entry: AuditEntry) -> anyhow::Result<AuditEvent> {
        anyhow::bail!("disk full")
    }
}

#[tokio::test]
async fn failed_audit_write_stores_no_override() {
    let h = harness(AdmissionRules::default());
    let audit: SharedAudit = Arc::new(Mutex::new(BrokenSink));
    let ctx = AdmissionContext { audit, ..h.ctx.clone() };

    let err = create_override(&ctx, request(HARBOR, DROP_IN, "guest pass"), u(DESK_HARBOR), now())
        .await
        .unwrap_err();

    assert!(matches!(err, OverrideError::Audit(_)));
    assert_eq!(err.code(), "server_error");
    assert!(std::error::Error::source(&err).is_some());
    assert!(h.facts.overrides().unwrap().is_empty());

    // The member's next check-in is not cleared by a phantom override.
    let r = evaluate_readiness(
        &h.ctx,
        ReadinessRequest {
            subject: Subject {
                tenant_id: t(HARBOR),
                user_id: u(DROP_IN),
            },
            operation: GateOperation::Checkin,
            required_tokens: None,
        },
        None,
        now(),
    )
    .await
    .unwrap();
    assert!(!r.result.cleared);
    assert!(!r.result.override_active);
}

#[tokio::test]
async fn reason_is_cut_to_configured_length() {
    let h = harness(AdmissionRules {
        reason_max_chars: 10,
        ..AdmissionRules::default()
    });

    let out = create_override(
        &h.ctx,
        request(HARBOR, DROP_IN, "membership card left in the car"),
        u(DESK_HARBOR),
        now(),
    )
    .await
    .unwrap();

    assert_eq!(out.record.reason, "membership");
}
