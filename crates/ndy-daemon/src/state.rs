//! Shared runtime state for ndy-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The admission context
//! owns the fact provider, override store and audit sink; this module only
//! adds the SSE bus, counters and the clock.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use ndy_admission::AdmissionContext;
use ndy_config::FactSource;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Decision(DecisionEvent),
    LogLine { level: String, msg: String },
}

/// One admission decision, as streamed to desk screens.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionEvent {
    /// "readiness" | "override" | "booking"
    pub kind: String,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub cleared: bool,
    pub reason: String,
    pub audit_event_id: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// StatusSnapshot
// ---------------------------------------------------------------------------

/// Returned by GET /v1/status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    pub config_hash: String,
    /// "fixture" | "backend"
    pub fact_source: String,
    pub provider: String,
    pub authoritative_marker: String,
    pub decisions_total: u64,
    pub overrides_total: u64,
}

#[derive(Clone, Debug, Default)]
pub struct Counters {
    pub decisions_total: u64,
    pub overrides_total: u64,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub ctx: AdmissionContext,
    pub config_hash: String,
    pub fact_source: FactSource,
    pub counters: Arc<RwLock<Counters>>,
    /// Source of `now` for every evaluation.
    pub clock: Clock,
}

impl AppState {
    pub fn new(ctx: AdmissionContext, config_hash: String, fact_source: FactSource) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            bus,
            build: BuildInfo {
                service: "ndy-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            ctx,
            config_hash,
            fact_source,
            counters: Arc::new(RwLock::new(Counters::default())),
            clock: Arc::new(Utc::now),
        }
    }

    /// Pin the clock (tests, replays).
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        let c = self.counters.read().await.clone();
        StatusSnapshot {
            daemon_uptime_secs: uptime_secs(),
            config_hash: self.config_hash.clone(),
            fact_source: self.fact_source.as_str().to_string(),
            provider: self.ctx.facts.name().to_string(),
            authoritative_marker: self.ctx.policy.authoritative_marker.clone(),
            decisions_total: c.decisions_total,
            overrides_total: c.overrides_total,
        }
    }

    /// Count and broadcast one decision. A send with no subscribers is fine.
    pub async fn publish(&self, ev: DecisionEvent) {
        {
            let mut c = self.counters.write().await;
            c.decisions_total += 1;
            if ev.kind == "override" {
                c.overrides_total += 1;
            }
        }
        let _ = self.bus.send(BusMsg::Decision(ev));
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}
