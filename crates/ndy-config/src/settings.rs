use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use serde_json::Value;

use crate::FactSource;

/// Default bound on override reasons, in characters.
pub const DEFAULT_REASON_MAX_CHARS: usize = 280;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8899";
const DEFAULT_AUTHORITATIVE_MARKER: &str = "ndyra";
const DEFAULT_DATABASE_URL_ENV: &str = "NDY_DATABASE_URL";
const DEFAULT_AUDIT_PATH: &str = "var/audit/admission.jsonl";

/// Typed view over the merged config JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AdmissionSettings {
    pub bind_addr: String,
    pub fact_source: FactSource,
    /// Required when `fact_source == Fixture`.
    pub fixture_path: Option<String>,
    /// Env var NAME holding the Postgres URL.
    pub database_url_env: String,
    pub authoritative_marker: String,
    pub default_required_tokens: u32,
    pub reason_max_chars: usize,
    /// `None` = overrides never expire on their own.
    pub override_ttl_minutes: Option<i64>,
    pub audit_path: String,
    pub audit_hash_chain: bool,
}

impl AdmissionSettings {
    /// Build from canonical config JSON (produced by `load_layered_yaml*`).
    ///
    /// Required:
    /// - facts.source (`fixture` | `backend`)
    /// - facts.fixture_path when the source is `fixture`
    ///
    /// Everything else has a default.
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let source_raw = cfg
            .pointer("/facts/source")
            .and_then(Value::as_str)
            .context("config missing facts.source")?;
        let fact_source = FactSource::parse(source_raw)?;

        let fixture_path = opt_str(cfg, "/facts/fixture_path");
        if fact_source == FactSource::Fixture && fixture_path.is_none() {
            bail!("config missing facts.fixture_path (required when facts.source=fixture)");
        }

        let authoritative_marker = opt_str(cfg, "/tenancy/authoritative_marker")
            .unwrap_or_else(|| DEFAULT_AUTHORITATIVE_MARKER.to_string());

        let default_required_tokens = match cfg.pointer("/eligibility/default_required_tokens") {
            None | Some(Value::Null) => 1,
            Some(v) => v
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| {
                    anyhow!("eligibility.default_required_tokens must be a non-negative integer (got {v})")
                })?,
        };

        let reason_max_chars = match cfg.pointer("/overrides/reason_max_chars") {
            None | Some(Value::Null) => DEFAULT_REASON_MAX_CHARS,
            Some(v) => match v.as_u64() {
                Some(n) if n >= 1 => n as usize,
                _ => bail!("overrides.reason_max_chars must be an integer >= 1 (got {v})"),
            },
        };

        let override_ttl_minutes = match cfg.pointer("/overrides/ttl_minutes") {
            None | Some(Value::Null) => None,
            Some(v) => match v.as_i64() {
                Some(n) if n > 0 => Some(n),
                _ => bail!("overrides.ttl_minutes must be a positive integer or null (got {v})"),
            },
        };

        let audit_hash_chain = match cfg.pointer("/audit/hash_chain") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(b)) => *b,
            Some(v) => bail!("audit.hash_chain must be a boolean (got {v})"),
        };

        Ok(Self {
            bind_addr: opt_str(cfg, "/service/bind_addr")
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            fact_source,
            fixture_path,
            database_url_env: opt_str(cfg, "/facts/database_url_env")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL_ENV.to_string()),
            authoritative_marker,
            default_required_tokens,
            reason_max_chars,
            override_ttl_minutes,
            audit_path: opt_str(cfg, "/audit/path")
                .unwrap_or_else(|| DEFAULT_AUDIT_PATH.to_string()),
            audit_hash_chain,
        })
    }
}

fn opt_str(cfg: &Value, pointer: &str) -> Option<String> {
    let s = cfg.pointer(pointer)?.as_str()?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_fill_everything_but_the_source() {
        let s = AdmissionSettings::from_config_json(&json!({
            "facts": { "source": "backend" }
        }))
        .unwrap();

        assert_eq!(s.fact_source, FactSource::Backend);
        assert_eq!(s.authoritative_marker, "ndyra");
        assert_eq!(s.default_required_tokens, 1);
        assert_eq!(s.reason_max_chars, 280);
        assert_eq!(s.override_ttl_minutes, None);
        assert_eq!(s.database_url_env, "NDY_DATABASE_URL");
        assert!(s.audit_hash_chain);
    }

    #[test]
    fn fixture_source_requires_a_path() {
        let err = AdmissionSettings::from_config_json(&json!({
            "facts": { "source": "fixture" }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("facts.fixture_path"));
    }

    #[test]
    fn rejects_negative_required_tokens_and_zero_ttl() {
        let neg = AdmissionSettings::from_config_json(&json!({
            "facts": { "source": "backend" },
            "eligibility": { "default_required_tokens": -1 }
        }));
        assert!(neg.is_err());

        let ttl = AdmissionSettings::from_config_json(&json!({
            "facts": { "source": "backend" },
            "overrides": { "ttl_minutes": 0 }
        }));
        assert!(ttl.is_err());
    }
}
