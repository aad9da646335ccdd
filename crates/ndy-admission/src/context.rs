use std::sync::Arc;

use chrono::Duration;
use tokio::sync::Mutex;

use ndy_audit::{AuditEntry, AuditEvent, AuditSink};
use ndy_config::{AdmissionSettings, DEFAULT_REASON_MAX_CHARS};
use ndy_eligibility::{EligibilityPolicy, DEFAULT_REQUIRED_TOKENS};
use ndy_facts::{FactProvider, OverrideStore};

/// Audit sink shared by concurrent workflows. The lock keeps the chain linear.
pub type SharedAudit = Arc<Mutex<dyn AuditSink>>;

/// Workflow knobs that are not part of the evaluator rule itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdmissionRules {
    pub default_required_tokens: u32,
    pub reason_max_chars: usize,
    /// `None` = overrides stay active until superseded.
    pub override_ttl: Option<Duration>,
}

impl Default for AdmissionRules {
    fn default() -> Self {
        Self {
            default_required_tokens: DEFAULT_REQUIRED_TOKENS,
            reason_max_chars: DEFAULT_REASON_MAX_CHARS,
            override_ttl: None,
        }
    }
}

impl AdmissionRules {
    pub fn from_settings(s: &AdmissionSettings) -> Self {
        Self {
            default_required_tokens: s.default_required_tokens,
            reason_max_chars: s.reason_max_chars,
            override_ttl: s.override_ttl_minutes.map(Duration::minutes),
        }
    }
}

/// Everything a workflow needs. Cheap to clone.
#[derive(Clone)]
pub struct AdmissionContext {
    pub facts: Arc<dyn FactProvider>,
    pub overrides: Arc<dyn OverrideStore>,
    pub audit: SharedAudit,
    pub policy: EligibilityPolicy,
    pub rules: AdmissionRules,
}

impl AdmissionContext {
    pub fn new(
        facts: Arc<dyn FactProvider>,
        overrides: Arc<dyn OverrideStore>,
        audit: SharedAudit,
        policy: EligibilityPolicy,
        rules: AdmissionRules,
    ) -> Self {
        Self {
            facts,
            overrides,
            audit,
            policy,
            rules,
        }
    }

    /// Policy and rules straight from loaded settings.
    pub fn from_settings(
        facts: Arc<dyn FactProvider>,
        overrides: Arc<dyn OverrideStore>,
        audit: SharedAudit,
        settings: &AdmissionSettings,
    ) -> Self {
        Self::new(
            facts,
            overrides,
            audit,
            EligibilityPolicy {
                authoritative_marker: settings.authoritative_marker.clone(),
            },
            AdmissionRules::from_settings(settings),
        )
    }

    pub(crate) async fn record(&self, entry: AuditEntry) -> anyhow::Result<AuditEvent> {
        let mut sink = self.audit.lock().await;
        sink.record(entry)
    }
}
