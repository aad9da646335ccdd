//! Scenario: the fixture provider answers like a real backend.
//!
//! GREEN when:
//! - the shipped demo fixture loads and answers every fact;
//! - absent rows come back as `Ok(None)` / unsigned, not as errors;
//! - inserted overrides are visible to the next read (read-after-write);
//! - the newest override wins.

use chrono::{Duration, TimeZone, Utc};
use ndy_eligibility::{
    ClassSessionId, MembershipStatus, SessionVisibility, Subject, TenantId, UserId,
};
use ndy_facts::{FactProvider, InMemoryFacts, NewOverride, OverrideStore, TenantRole};
use uuid::Uuid;

fn demo() -> InMemoryFacts {
    let path = format!("{}/../../fixtures/demo_gym.yaml", env!("CARGO_MANIFEST_DIR"));
    InMemoryFacts::load(path).expect("demo fixture must load")
}

fn tenant(s: &str) -> TenantId {
    TenantId(Uuid::parse_str(s).unwrap())
}

fn user(s: &str) -> UserId {
    UserId(Uuid::parse_str(s).unwrap())
}

const HARBOR: &str = "11111111-1111-4111-8111-111111111111";
const LEGACY: &str = "22222222-2222-4222-8222-222222222222";
const PAST_DUE: &str = "bbbbbbbb-0000-4000-8000-000000000002";
const DESK: &str = "aaaaaaaa-0000-4000-8000-000000000001";

#[tokio::test]
async fn demo_fixture_answers_member_facts() {
    let facts = demo();
    let subject = Subject {
        tenant_id: tenant(HARBOR),
        user_id: user(PAST_DUE),
    };

    assert!(facts.waiver_signed(&subject).await.unwrap());
    assert_eq!(
        facts.membership_status(&subject).await.unwrap(),
        Some(MembershipStatus::PastDue)
    );
    assert_eq!(facts.token_balance(&subject).await.unwrap(), Some(3));
    assert_eq!(facts.latest_override(&subject).await.unwrap(), None);

    let g = facts.tenant_guardrails(tenant(LEGACY)).await.unwrap().unwrap();
    assert_eq!(g.system_of_record, "external");
}

#[tokio::test]
async fn absent_rows_are_not_errors() {
    let facts = demo();
    let stranger = Subject {
        tenant_id: tenant(HARBOR),
        user_id: UserId(Uuid::from_u128(99)),
    };

    assert!(!facts.waiver_signed(&stranger).await.unwrap());
    assert_eq!(facts.membership_status(&stranger).await.unwrap(), None);
    assert_eq!(facts.token_balance(&stranger).await.unwrap(), None);
    assert_eq!(facts.staff_role(stranger.tenant_id, stranger.user_id).await.unwrap(), None);
    assert_eq!(
        facts.tenant_guardrails(TenantId(Uuid::from_u128(5))).await.unwrap(),
        None
    );
    assert_eq!(facts.actor_for_token("nope").await.unwrap(), None);
}

#[tokio::test]
async fn roles_tokens_and_sessions_resolve() {
    let facts = demo();

    assert_eq!(
        facts.actor_for_token("demo-desk-harbor").await.unwrap(),
        Some(user(DESK))
    );
    assert_eq!(
        facts.staff_role(tenant(HARBOR), user(DESK)).await.unwrap(),
        Some(TenantRole::Staff)
    );

    let members_only = facts
        .class_session(ClassSessionId(
            Uuid::parse_str("cccccccc-0000-4000-8000-000000000002").unwrap(),
        ))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(members_only.visibility, SessionVisibility::MembersOnly);
    assert_eq!(members_only.token_cost, None);
    assert_eq!(members_only.class_type_default_token_cost, Some(2.0));
}

#[tokio::test]
async fn inserted_override_is_read_back_and_newest_wins() {
    let facts = demo();
    let subject = Subject {
        tenant_id: tenant(HARBOR),
        user_id: user(PAST_DUE),
    };
    let t0 = Utc.with_ymd_and_hms(2026, 2, 16, 6, 0, 0).unwrap();

    let first = facts
        .insert_override(NewOverride {
            override_id: Uuid::new_v4(),
            tenant_id: subject.tenant_id,
            user_id: subject.user_id,
            reason: "first".to_string(),
            created_by: user(DESK),
            created_at: t0,
            expires_at: Some(t0 + Duration::hours(1)),
        })
        .await
        .unwrap();
    let second = facts
        .insert_override(NewOverride {
            override_id: Uuid::new_v4(),
            tenant_id: subject.tenant_id,
            user_id: subject.user_id,
            reason: "second".to_string(),
            created_by: user(DESK),
            created_at: t0 + Duration::minutes(30),
            expires_at: None,
        })
        .await
        .unwrap();

    assert_ne!(first.override_id, second.override_id);
    let latest = facts.latest_override(&subject).await.unwrap().unwrap();
    assert_eq!(latest.reason, "second");
    assert!(latest.active);
    assert_eq!(latest.expires_at, None);
    assert_eq!(facts.overrides().unwrap().len(), 2);
}

#[test]
fn unknown_unavailable_fact_name_is_rejected() {
    let err = InMemoryFacts::from_yaml_str("unavailable_facts: [\"wavier\"]\n").unwrap_err();
    assert!(err.to_string().contains("wavier"), "{err}");
}
