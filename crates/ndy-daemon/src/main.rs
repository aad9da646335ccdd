//! ndy-daemon entry point.
//!
//! Thin on purpose: load layered config, pick the fact source, open the
//! audit log, wire middleware and serve. Handlers live in `routes.rs`;
//! shared state in `state.rs`.
//!
//! Config layers come from `NDY_CONFIG` (comma-separated YAML paths), default
//! `config/base.yaml,config/fixture.yaml`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use tokio::sync::Mutex;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

use ndy_admission::{AdmissionContext, SharedAudit};
use ndy_audit::AuditWriter;
use ndy_config::{
    load_layered_yaml, report_unused_keys, secrets::resolve_secrets, AdmissionSettings,
    FactSource, UnusedKeyPolicy,
};
use ndy_daemon::{routes, state};
use ndy_db::PgFacts;
use ndy_facts::{FactProvider, InMemoryFacts, OverrideStore};

const DEFAULT_CONFIG: &str = "config/base.yaml,config/fixture.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let raw_paths = std::env::var("NDY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    let paths: Vec<&str> = raw_paths
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    let loaded = load_layered_yaml(&paths).context("load config")?;
    let settings = AdmissionSettings::from_config_json(&loaded.config_json)?;

    let report = report_unused_keys(settings.fact_source, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !report.is_clean() {
        warn!(
            source = %report.source,
            unused = ?report.unused_leaf_pointers,
            "config has keys nothing reads"
        );
    }

    let (facts, overrides) = build_provider(&settings, &loaded.config_json).await?;

    let writer = AuditWriter::resume(&settings.audit_path, settings.audit_hash_chain)
        .with_context(|| format!("open audit log {}", settings.audit_path))?;
    let audit: SharedAudit = Arc::new(Mutex::new(writer));

    let ctx = AdmissionContext::from_settings(facts, overrides, audit, &settings);
    let shared = Arc::new(state::AppState::new(
        ctx,
        loaded.config_hash.clone(),
        settings.fact_source,
    ));

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr(&settings)?;
    info!(
        config_hash = %loaded.config_hash,
        fact_source = settings.fact_source.as_str(),
        "ndy-daemon listening on http://{}",
        addr
    );

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

type Provider = (Arc<dyn FactProvider>, Arc<dyn OverrideStore>);

async fn build_provider(
    settings: &AdmissionSettings,
    config_json: &serde_json::Value,
) -> Result<Provider> {
    match settings.fact_source {
        FactSource::Fixture => {
            let path = settings
                .fixture_path
                .as_deref()
                .context("facts.fixture_path is required for the fixture source")?;
            let facts = Arc::new(InMemoryFacts::load(path)?);
            info!(fixture = path, "using fixture facts");
            let reader: Arc<dyn FactProvider> = facts.clone();
            let store: Arc<dyn OverrideStore> = facts;
            Ok((reader, store))
        }
        FactSource::Backend => {
            let secrets = resolve_secrets(config_json, FactSource::Backend)?;
            let url = secrets
                .database_url
                .as_deref()
                .context("database url missing after secret resolution")?;
            let pool = ndy_db::connect(url).await?;
            let facts = Arc::new(PgFacts::new(pool));
            info!(env = %secrets.database_url_env, "using postgres facts");
            let reader: Arc<dyn FactProvider> = facts.clone();
            let store: Arc<dyn OverrideStore> = facts;
            Ok((reader, store))
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// `NDY_DAEMON_ADDR` wins over `service.bind_addr`.
fn bind_addr(settings: &AdmissionSettings) -> Result<SocketAddr> {
    let raw = std::env::var("NDY_DAEMON_ADDR").unwrap_or_else(|_| settings.bind_addr.clone());
    raw.parse()
        .with_context(|| format!("invalid bind address '{raw}'"))
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
        "http://localhost:8888",
        "http://127.0.0.1:8888",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
