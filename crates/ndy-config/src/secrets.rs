//! Runtime secret resolution.
//!
//! Config YAML stores only env var NAMES (e.g. `"NDY_DATABASE_URL"`). Binaries
//! call [`resolve_secrets`] once at startup and pass the result into
//! constructors. `Debug` redacts values; errors name the variable, never the
//! value.
//!
//! | Source    | Required            |
//! |-----------|---------------------|
//! | backend   | database URL        |
//! | fixture   | nothing             |

use anyhow::{bail, Result};
use serde_json::Value;

use crate::FactSource;

const DEFAULT_DATABASE_URL_ENV: &str = "NDY_DATABASE_URL";

/// Secrets resolved from the environment. **Values are redacted in `Debug`.**
#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Env var the database URL was read from.
    pub database_url_env: String,
    /// `None` if the named env var was absent or blank.
    pub database_url: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("database_url_env", &self.database_url_env)
            .field("database_url", &self.database_url.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve secrets for the configured fact source.
///
/// # Errors
/// `SECRETS_MISSING` naming the env var when the backend source has no URL.
pub fn resolve_secrets(config_json: &Value, source: FactSource) -> Result<ResolvedSecrets> {
    let database_url_env = read_str_at(config_json, "/facts/database_url_env")
        .unwrap_or_else(|| DEFAULT_DATABASE_URL_ENV.to_string());
    let database_url = resolve_env(&database_url_env);

    if source == FactSource::Backend && database_url.is_none() {
        bail!(
            "SECRETS_MISSING source=backend: required env var '{}' \
             (database url) is not set or empty",
            database_url_env,
        );
    }

    Ok(ResolvedSecrets {
        database_url_env,
        database_url,
    })
}
