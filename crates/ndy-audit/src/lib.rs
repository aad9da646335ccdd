//! Append-only admission audit log.
//!
//! One JSON line per decision or administrative action. With the hash chain
//! enabled each event carries `hash_prev` (the previous event's `hash_self`)
//! and `hash_self` (sha256 over the canonical event without `hash_self`), so a
//! removed, reordered or edited line is detected by [`verify_hash_chain`].

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Well-known action names.
pub mod actions {
    pub const CHECKIN_CLEARED: &str = "checkin_cleared";
    pub const CHECKIN_BLOCKED: &str = "checkin_blocked";
    pub const CHECKIN_OVERRIDE_CREATED: &str = "checkin_override_created";
    /// Follows a `checkin_override_created` whose row could not be stored.
    pub const CHECKIN_OVERRIDE_FAILED: &str = "checkin_override_failed";
    pub const BOOKING_CLEARED: &str = "booking_cleared";
    pub const BOOKING_BLOCKED: &str = "booking_blocked";
    pub const BOOKING_EVALUATED: &str = "booking_evaluated";
}

/// What the caller wants recorded. The sink adds id and chain fields.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub ts_utc: DateTime<Utc>,
    pub tenant_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub details: Value,
}

impl AuditEntry {
    pub fn new(
        ts_utc: DateTime<Utc>,
        tenant_id: Uuid,
        action: impl Into<String>,
        entity_type: impl Into<String>,
    ) -> Self {
        Self {
            ts_utc,
            tenant_id,
            actor_user_id: None,
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn actor(mut self, actor_user_id: Option<Uuid>) -> Self {
        self.actor_user_id = actor_user_id;
        self
    }

    pub fn entity(mut self, entity_id: Uuid) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub tenant_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub details: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// Destination for audit events. Implementations must be append-only.
pub trait AuditSink: Send {
    fn record(&mut self, entry: AuditEntry) -> Result<AuditEvent>;
}

/// Chain bookkeeping shared by every sink.
#[derive(Debug, Clone, Default)]
struct Chain {
    hash_chain: bool,
    last_hash: Option<String>,
    seq: u64,
}

impl Chain {
    fn seal(&mut self, entry: AuditEntry) -> Result<AuditEvent> {
        let mut ev = AuditEvent {
            event_id: Uuid::new_v4(),
            ts_utc: entry.ts_utc,
            tenant_id: entry.tenant_id,
            actor_user_id: entry.actor_user_id,
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            details: entry.details,
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            ev.hash_prev = self.last_hash.clone();
            let self_hash = compute_event_hash(&ev)?;
            ev.hash_self = Some(self_hash.clone());
            self.last_hash = Some(self_hash);
        }
        self.seq += 1;
        Ok(ev)
    }
}

/// JSONL file sink.
pub struct AuditWriter {
    path: PathBuf,
    chain: Chain,
}

impl AuditWriter {
    /// Creates the writer and ensures parent dirs exist. Starts a fresh chain.
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }
        Ok(Self {
            path,
            chain: Chain {
                hash_chain,
                ..Chain::default()
            },
        })
    }

    /// Open an existing log (if any) and continue its chain after the last line.
    pub fn resume(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let mut w = Self::new(path, hash_chain)?;
        if w.path.exists() {
            let content = fs::read_to_string(&w.path)
                .with_context(|| format!("read audit log {:?}", w.path))?;
            for (i, line) in content.lines().enumerate() {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let ev: AuditEvent = serde_json::from_str(trimmed)
                    .with_context(|| format!("parse audit event at line {}", i + 1))?;
                w.chain.last_hash = ev.hash_self;
                w.chain.seq += 1;
            }
        }
        Ok(w)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_hash(&self) -> Option<String> {
        self.chain.last_hash.clone()
    }

    /// Number of events in the log (including resumed ones).
    pub fn seq(&self) -> u64 {
        self.chain.seq
    }
}

impl AuditSink for AuditWriter {
    fn record(&mut self, entry: AuditEntry) -> Result<AuditEvent> {
        // Seal on a copy so a failed write leaves the chain where it was.
        let mut next = self.chain.clone();
        let ev = next.seal(entry)?;
        append_line(&self.path, &canonical_json_line(&ev)?)?;
        self.chain = next;
        Ok(ev)
    }
}

/// In-memory sink for tests and the fixture demo.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    chain: Chain,
    events: Vec<AuditEvent>,
}

impl MemoryAuditSink {
    pub fn new(hash_chain: bool) -> Self {
        Self {
            chain: Chain {
                hash_chain,
                ..Chain::default()
            },
            events: Vec::new(),
        }
    }

    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    pub fn count_action(&self, action: &str) -> usize {
        self.events.iter().filter(|e| e.action == action).count()
    }

    /// The same JSONL a file sink would have written.
    pub fn to_jsonl(&self) -> Result<String> {
        let mut out = String::new();
        for ev in &self.events {
            out.push_str(&canonical_json_line(ev)?);
            out.push('\n');
        }
        Ok(out)
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&mut self, entry: AuditEntry) -> Result<AuditEvent> {
        let ev = self.chain.seal(entry)?;
        self.events.push(ev.clone());
        Ok(ev)
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit log {:?}", path))?;
    f.write_all(line.as_bytes())
        .context("write audit line failed")?;
    f.write_all(b"\n").context("write newline failed")?;
    Ok(())
}

/// Sorted keys, compact. One event == one line.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize audit event failed")?;
    serde_json::to_string(&sort_keys(&raw)).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// sha256 over the canonical event with `hash_self` cleared.
pub fn compute_event_hash(ev: &AuditEvent) -> Result<String> {
    let mut clone = ev.clone();
    clone.hash_self = None;

    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Verify the hash chain of an audit log file.
pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit log {:?}", path.as_ref()))?;
    verify_hash_chain_str(&content)
}

/// Same as [`verify_hash_chain`] over in-memory JSONL.
pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut chained = false;
    let mut line_count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let ev: AuditEvent = serde_json::from_str(trimmed)
            .with_context(|| format!("parse audit event at line {}", i + 1))?;
        line_count += 1;

        if ev.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, ev.hash_prev
                ),
            });
        }

        // Once the chain has started, every later line must carry a hash.
        let Some(claimed_hash) = ev.hash_self.clone() else {
            if chained {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: "hash_self missing after the chain started".to_string(),
                });
            }
            continue;
        };

        let recomputed = compute_event_hash(&ev)?;
        if claimed_hash != recomputed {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_self mismatch: claimed {}, recomputed {}",
                    claimed_hash, recomputed
                ),
            });
        }

        chained = true;
        prev_hash = Some(claimed_hash);
    }

    Ok(VerifyResult::Valid { lines: line_count })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    /// First broken line (1-based).
    Broken { line: usize, reason: String },
}
