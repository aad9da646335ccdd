use thiserror::Error;

use ndy_facts::FactError;

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("actor is not staff at this tenant")]
    Forbidden,
    #[error("staff lookup failed: {0}")]
    Backend(#[source] FactError),
    #[error("audit write failed: {0:#}")]
    Audit(#[source] anyhow::Error),
}

impl ReadinessError {
    pub fn code(&self) -> &'static str {
        match self {
            ReadinessError::Forbidden => "forbidden",
            ReadinessError::Backend(_) | ReadinessError::Audit(_) => "server_error",
        }
    }
}

#[derive(Debug, Error)]
pub enum OverrideError {
    #[error("tenant_id, user_id and a non-empty reason are required")]
    MissingFields,
    #[error("actor is not staff at this tenant")]
    Forbidden,
    #[error("tenant not found")]
    TenantNotFound,
    #[error("tenant is not authoritative (system_of_record={system_of_record})")]
    TenantNotAuthoritative { system_of_record: String },
    #[error("check-in disabled by tenant kill switch")]
    CheckinDisabled,
    #[error("fact backend failed: {0}")]
    Backend(#[source] FactError),
    #[error("override insert failed: {0}")]
    InsertFailed(String),
    #[error("audit write failed: {0:#}")]
    Audit(#[source] anyhow::Error),
}

impl OverrideError {
    /// Stable machine code, shared with the HTTP surface.
    pub fn code(&self) -> &'static str {
        match self {
            OverrideError::MissingFields => "missing_required_fields",
            OverrideError::Forbidden => "forbidden",
            OverrideError::TenantNotFound => "tenant_not_found",
            OverrideError::TenantNotAuthoritative { .. } => "tenant_not_authoritative",
            OverrideError::CheckinDisabled => "checkin_disabled",
            OverrideError::InsertFailed(_) => "override_insert_failed",
            OverrideError::Backend(_) | OverrideError::Audit(_) => "server_error",
        }
    }
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("class session not found")]
    SessionNotFound,
    #[error("fact backend failed: {0}")]
    Backend(#[source] FactError),
    #[error("audit write failed: {0:#}")]
    Audit(#[source] anyhow::Error),
}

impl BookingError {
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::SessionNotFound => "class_session_not_found",
            BookingError::Backend(_) | BookingError::Audit(_) => "server_error",
        }
    }
}
