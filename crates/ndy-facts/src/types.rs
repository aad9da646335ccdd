use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ndy_eligibility::{ClassSessionId, OverrideFact, SessionVisibility, TenantId, UserId};

/// Role of a user within one tenant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TenantRole {
    Admin,
    Staff,
    Member,
    Other(String),
}

impl TenantRole {
    pub fn parse(s: &str) -> Self {
        match s {
            "admin" => TenantRole::Admin,
            "staff" => TenantRole::Staff,
            "member" => TenantRole::Member,
            other => TenantRole::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TenantRole::Admin => "admin",
            TenantRole::Staff => "staff",
            TenantRole::Member => "member",
            TenantRole::Other(s) => s,
        }
    }

    /// May issue overrides and run desk readiness checks.
    pub fn is_staff(&self) -> bool {
        matches!(self, TenantRole::Admin | TenantRole::Staff)
    }
}

impl From<String> for TenantRole {
    fn from(s: String) -> Self {
        TenantRole::parse(&s)
    }
}

impl From<TenantRole> for String {
    fn from(r: TenantRole) -> Self {
        r.as_str().to_string()
    }
}

/// Class session as seen by the booking fork.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassSession {
    pub id: ClassSessionId,
    pub tenant_id: TenantId,
    pub visibility: SessionVisibility,
    /// Raw numeric cost; normalised by `resolve_session_cost`.
    pub token_cost: Option<f64>,
    pub class_type_default_token_cost: Option<f64>,
}

/// Override row to insert. Append-only; there is no update or delete.
///
/// The id is chosen by the caller so the audit event can name the row
/// before it is written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOverride {
    pub override_id: Uuid,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub reason: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Persisted override.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideRecord {
    pub override_id: Uuid,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub reason: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl OverrideRecord {
    pub fn from_new(n: NewOverride) -> Self {
        Self {
            override_id: n.override_id,
            tenant_id: n.tenant_id,
            user_id: n.user_id,
            reason: n.reason,
            created_by: n.created_by,
            created_at: n.created_at,
            expires_at: n.expires_at,
        }
    }

    /// Evaluator view. Rows are never deactivated in place, so `active` is
    /// always set; expiry is left to the evaluator.
    pub fn to_fact(&self) -> OverrideFact {
        OverrideFact {
            active: true,
            created_by: self.created_by,
            reason: self.reason.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}
