use async_trait::async_trait;
use thiserror::Error;

use ndy_eligibility::{
    ClassSessionId, MembershipStatus, OverrideFact, Subject, TenantGuardrails, TenantId, UserId,
};

use crate::{ClassSession, NewOverride, OverrideRecord, TenantRole};

#[derive(Debug, Error)]
pub enum FactError {
    #[error("fact backend failed reading {fact}: {detail}")]
    Backend { fact: &'static str, detail: String },

    #[error("fact backend returned an undecodable {fact}: {detail}")]
    Decode { fact: &'static str, detail: String },

    #[error("override insert failed: {0}")]
    InsertFailed(String),
}

impl FactError {
    pub fn backend(fact: &'static str, detail: impl ToString) -> Self {
        FactError::Backend {
            fact,
            detail: detail.to_string(),
        }
    }
}

/// Read side of the fact layer. Implementations report absence as `Ok(None)`
/// and reserve `Err` for "could not determine".
#[async_trait]
pub trait FactProvider: Send + Sync {
    /// Short name for logs and status (`fixture`, `postgres`).
    fn name(&self) -> &'static str;

    /// `Ok(None)` = no tenant row.
    async fn tenant_guardrails(&self, tenant: TenantId)
        -> Result<Option<TenantGuardrails>, FactError>;

    /// Whether the member signed the tenant's current waiver version.
    async fn waiver_signed(&self, subject: &Subject) -> Result<bool, FactError>;

    async fn membership_status(
        &self,
        subject: &Subject,
    ) -> Result<Option<MembershipStatus>, FactError>;

    /// Raw wallet balance (may be negative in a corrupt row).
    async fn token_balance(&self, subject: &Subject) -> Result<Option<i64>, FactError>;

    /// Most recent override for the member, expired or not.
    async fn latest_override(&self, subject: &Subject) -> Result<Option<OverrideFact>, FactError>;

    /// `Ok(None)` = the user has no role at the tenant.
    async fn staff_role(
        &self,
        tenant: TenantId,
        user: UserId,
    ) -> Result<Option<TenantRole>, FactError>;

    async fn class_session(&self, id: ClassSessionId) -> Result<Option<ClassSession>, FactError>;

    /// Resolve an opaque bearer token to the user it was issued to.
    async fn actor_for_token(&self, token: &str) -> Result<Option<UserId>, FactError>;
}

/// Write side: append-only override records.
#[async_trait]
pub trait OverrideStore: Send + Sync {
    async fn insert_override(&self, new: NewOverride) -> Result<OverrideRecord, FactError>;
}
