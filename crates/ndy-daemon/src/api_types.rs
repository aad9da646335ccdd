//! Request and response types for all ndy-daemon HTTP endpoints.
//!
//! Request bodies are all-optional so a missing or malformed field becomes
//! `missing_required_fields` instead of an extractor rejection. No business
//! logic lives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ndy_eligibility::EligibilityResult;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// Error body (4xx / 5xx)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub ok: bool,
    /// Stable machine code, e.g. `forbidden`, `tenant_not_authoritative`.
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl ErrorResponse {
    pub fn new(error: &str) -> Self {
        Self {
            ok: false,
            error: error.to_string(),
            details: None,
            required: None,
        }
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn required(mut self, fields: &[&str]) -> Self {
        self.required = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }
}

// ---------------------------------------------------------------------------
// Success envelope
// ---------------------------------------------------------------------------

/// `{ "ok": true, ...body }`
#[derive(Debug, Clone, Serialize)]
pub struct OkResponse<T: Serialize> {
    pub ok: bool,
    #[serde(flatten)]
    pub body: T,
}

impl<T: Serialize> OkResponse<T> {
    pub fn new(body: T) -> Self {
        Self { ok: true, body }
    }
}

// ---------------------------------------------------------------------------
// POST /v1/checkin/readiness
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadinessBody {
    pub tenant_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub required_tokens: Option<f64>,
}

// ---------------------------------------------------------------------------
// POST /v1/checkin/override
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverrideBody {
    pub tenant_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub reason: Option<String>,
    pub required_tokens: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverrideResponse {
    pub override_id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub result: EligibilityResult,
    pub unknown_facts: Vec<&'static str>,
}

// ---------------------------------------------------------------------------
// POST /v1/booking/paths
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingBody {
    pub class_session_id: Option<Uuid>,
}
