//! Deterministic in-memory fact provider.
//!
//! Loaded from a YAML fixture for demos, QA and tests. Any fact can be marked
//! unavailable to exercise the fail-closed path without a real backend.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ndy_eligibility::{
    ClassSessionId, MembershipStatus, OverrideFact, SessionVisibility, Subject, TenantGuardrails,
    TenantId, UserId,
};

use crate::{
    ClassSession, FactError, FactProvider, NewOverride, OverrideRecord, OverrideStore, TenantRole,
};

/// Fact names accepted by `unavailable_facts`.
pub const FIXTURE_FACTS: &[&str] = &[
    "guardrails",
    "waiver",
    "membership",
    "token_balance",
    "override",
    "staff_role",
    "class_session",
    "actor",
    "insert_override",
];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureDoc {
    #[serde(default)]
    pub tenants: Vec<FixtureTenant>,
    #[serde(default)]
    pub members: Vec<FixtureMember>,
    #[serde(default)]
    pub class_sessions: Vec<FixtureSession>,
    #[serde(default)]
    pub api_tokens: Vec<FixtureToken>,
    #[serde(default)]
    pub overrides: Vec<OverrideRecord>,
    /// Facts that fail with a backend error on every read.
    #[serde(default)]
    pub unavailable_facts: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureTenant {
    pub id: TenantId,
    #[serde(default)]
    pub name: String,
    pub system_of_record: String,
    #[serde(default)]
    pub kill_switch_disable_checkin: bool,
    #[serde(default)]
    pub kill_switch_disable_booking: bool,
}

/// One user's row at one tenant. Staff are members with an admin/staff role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureMember {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    #[serde(default)]
    pub role: Option<TenantRole>,
    #[serde(default)]
    pub waiver_signed: bool,
    #[serde(default)]
    pub membership_status: Option<MembershipStatus>,
    #[serde(default)]
    pub token_balance: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FixtureSession {
    pub id: ClassSessionId,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub token_cost: Option<f64>,
    #[serde(default)]
    pub class_type_default_token_cost: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureToken {
    pub token: String,
    pub user_id: UserId,
}

#[derive(Debug)]
struct State {
    doc: FixtureDoc,
    unavailable: BTreeSet<String>,
}

#[derive(Debug)]
pub struct InMemoryFacts {
    state: RwLock<State>,
}

impl InMemoryFacts {
    pub fn from_doc(mut doc: FixtureDoc) -> Result<Self> {
        let unavailable: BTreeSet<String> = doc.unavailable_facts.drain(..).collect();
        for f in &unavailable {
            if !FIXTURE_FACTS.contains(&f.as_str()) {
                anyhow::bail!(
                    "fixture lists unknown fact '{}' as unavailable; expected one of {:?}",
                    f,
                    FIXTURE_FACTS
                );
            }
        }
        Ok(Self {
            state: RwLock::new(State { doc, unavailable }),
        })
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let doc: FixtureDoc = serde_yaml::from_str(raw).context("invalid fixture yaml")?;
        Self::from_doc(doc)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture: {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("fixture {}", path.display()))
    }

    /// Toggle a simulated backend outage for one fact.
    pub fn set_unavailable(&self, fact: &'static str, unavailable: bool) -> Result<(), FactError> {
        let mut st = self.write(fact)?;
        if unavailable {
            st.unavailable.insert(fact.to_string());
        } else {
            st.unavailable.remove(fact);
        }
        Ok(())
    }

    /// Every override written so far, in insertion order.
    pub fn overrides(&self) -> Result<Vec<OverrideRecord>, FactError> {
        Ok(self.read("override")?.doc.overrides.clone())
    }

    fn read(&self, fact: &'static str) -> Result<RwLockReadGuard<'_, State>, FactError> {
        let st = self
            .state
            .read()
            .map_err(|_| FactError::backend(fact, "fixture lock poisoned"))?;
        if st.unavailable.contains(fact) {
            return Err(FactError::backend(fact, "simulated outage"));
        }
        Ok(st)
    }

    fn write(&self, fact: &'static str) -> Result<RwLockWriteGuard<'_, State>, FactError> {
        self.state
            .write()
            .map_err(|_| FactError::backend(fact, "fixture lock poisoned"))
    }
}

impl State {
    fn member(&self, tenant: TenantId, user: UserId) -> Option<&FixtureMember> {
        self.doc
            .members
            .iter()
            .find(|m| m.tenant_id == tenant && m.user_id == user)
    }
}

#[async_trait]
impl FactProvider for InMemoryFacts {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn tenant_guardrails(
        &self,
        tenant: TenantId,
    ) -> Result<Option<TenantGuardrails>, FactError> {
        let st = self.read("guardrails")?;
        Ok(st.doc.tenants.iter().find(|t| t.id == tenant).map(|t| TenantGuardrails {
            system_of_record: t.system_of_record.clone(),
            kill_switch_disable_checkin: t.kill_switch_disable_checkin,
            kill_switch_disable_booking: t.kill_switch_disable_booking,
        }))
    }

    async fn waiver_signed(&self, subject: &Subject) -> Result<bool, FactError> {
        let st = self.read("waiver")?;
        Ok(st
            .member(subject.tenant_id, subject.user_id)
            .map_or(false, |m| m.waiver_signed))
    }

    async fn membership_status(
        &self,
        subject: &Subject,
    ) -> Result<Option<MembershipStatus>, FactError> {
        let st = self.read("membership")?;
        Ok(st
            .member(subject.tenant_id, subject.user_id)
            .and_then(|m| m.membership_status.clone()))
    }

    async fn token_balance(&self, subject: &Subject) -> Result<Option<i64>, FactError> {
        let st = self.read("token_balance")?;
        Ok(st
            .member(subject.tenant_id, subject.user_id)
            .and_then(|m| m.token_balance))
    }

    async fn latest_override(&self, subject: &Subject) -> Result<Option<OverrideFact>, FactError> {
        let st = self.read("override")?;
        Ok(st
            .doc
            .overrides
            .iter()
            .filter(|o| o.tenant_id == subject.tenant_id && o.user_id == subject.user_id)
            // later insert wins a created_at tie
            .enumerate()
            .max_by_key(|(i, o)| (o.created_at, *i))
            .map(|(_, o)| o.to_fact()))
    }

    async fn staff_role(
        &self,
        tenant: TenantId,
        user: UserId,
    ) -> Result<Option<TenantRole>, FactError> {
        let st = self.read("staff_role")?;
        Ok(st.member(tenant, user).and_then(|m| m.role.clone()))
    }

    async fn class_session(&self, id: ClassSessionId) -> Result<Option<ClassSession>, FactError> {
        let st = self.read("class_session")?;
        Ok(st
            .doc
            .class_sessions
            .iter()
            .find(|s| s.id == id)
            .map(|s| ClassSession {
                id: s.id,
                tenant_id: s.tenant_id,
                visibility: SessionVisibility::parse(s.visibility.as_deref()),
                token_cost: s.token_cost,
                class_type_default_token_cost: s.class_type_default_token_cost,
            }))
    }

    async fn actor_for_token(&self, token: &str) -> Result<Option<UserId>, FactError> {
        let st = self.read("actor")?;
        Ok(st
            .doc
            .api_tokens
            .iter()
            .find(|t| t.token == token)
            .map(|t| t.user_id))
    }
}

#[async_trait]
impl OverrideStore for InMemoryFacts {
    async fn insert_override(&self, new: NewOverride) -> Result<OverrideRecord, FactError> {
        let mut st = self.write("insert_override")?;
        if st.unavailable.contains("insert_override") {
            return Err(FactError::InsertFailed("simulated outage".to_string()));
        }
        let rec = OverrideRecord::from_new(new);
        st.doc.overrides.push(rec.clone());
        Ok(rec)
    }
}
