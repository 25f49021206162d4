//! Append-only audit trail for policy applies.
//!
//! One JSON line per event. With the hash chain enabled, every line carries
//! `hash_prev` (the previous line's `hash_self`) and `hash_self` (SHA-256 of
//! its own canonical JSON without `hash_self`), so any edit, insertion or
//! deletion is detectable by [`verify_hash_chain`].
//!
//! Canonical JSON relies on `serde_json::Map` being ordered by key (the
//! `preserve_order` feature stays off), so `to_value` then `to_string` is
//! already key-sorted and compact.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

mod sink;

pub use sink::{AuditSink, RBAC_TOPIC};

/// Namespace for deterministic event ids.
const EVENT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x7a3e_52c1_9b0d_4f6e_8c21_d4a7_03be_91f5);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub run_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub topic: String,
    pub event_type: String,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

impl AuditEvent {
    /// SHA-256 over the canonical JSON of this event with `hash_self` cleared.
    pub fn chain_hash(&self) -> Result<String> {
        let unsealed = AuditEvent {
            hash_self: None,
            ..self.clone()
        };
        let mut hasher = Sha256::new();
        hasher.update(canonical_json(&unsealed)?.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Append-only JSONL writer, optionally hash-chained.
pub struct AuditWriter {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Option<String>,
    /// Events already in the log; the next event's seq.
    seq: u64,
}

impl AuditWriter {
    /// Start a fresh log at `path`, creating parent directories.
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }
        Ok(Self {
            path,
            hash_chain,
            last_hash: None,
            seq: 0,
        })
    }

    /// Continue an existing log: `seq` resumes from its event count and the
    /// chain from its last `hash_self`. A missing file starts a fresh log.
    /// A chained log that no longer verifies is refused.
    pub fn resume(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let mut writer = Self::new(path, hash_chain)?;
        if !writer.path.exists() {
            return Ok(writer);
        }

        let content = fs::read_to_string(&writer.path)
            .with_context(|| format!("read audit log {:?}", writer.path))?;
        let mut cursor = ChainCursor::default();
        for (line, ev) in parse_log(&content)? {
            if hash_chain {
                if let Err(reason) = cursor.accept(&ev)? {
                    anyhow::bail!(
                        "cannot resume audit log {:?}: chain broken at line {line}: {reason}",
                        writer.path
                    );
                }
            }
            writer.seq += 1;
            writer.last_hash = ev.hash_self;
        }
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_hash(&self) -> Option<String> {
        self.last_hash.clone()
    }

    /// Equals the number of events in the log.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Append one event. The chain only advances once the line is on disk.
    pub fn append(
        &mut self,
        run_id: Uuid,
        topic: &str,
        event_type: &str,
        payload: Value,
    ) -> Result<AuditEvent> {
        let mut ev = AuditEvent {
            event_id: derive_event_id(run_id, self.last_hash.as_deref(), &payload, self.seq)?,
            run_id,
            ts_utc: Utc::now(),
            topic: topic.to_string(),
            event_type: event_type.to_string(),
            payload,
            hash_prev: None,
            hash_self: None,
        };
        if self.hash_chain {
            ev.hash_prev = self.last_hash.clone();
            ev.hash_self = Some(ev.chain_hash()?);
        }

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open audit log {:?}", self.path))?;
        writeln!(f, "{}", canonical_json(&ev)?)
            .with_context(|| format!("write audit log {:?}", self.path))?;

        self.seq += 1;
        if self.hash_chain {
            self.last_hash = ev.hash_self.clone();
        }
        Ok(ev)
    }
}

/// Deterministic event id: UUIDv5 over run id, chain position and payload.
///
/// Two events only share an id if they share all four inputs, which the
/// monotonically increasing `seq` rules out within one log.
pub fn derive_event_id(
    run_id: Uuid,
    prev_hash: Option<&str>,
    payload: &Value,
    seq: u64,
) -> Result<Uuid> {
    let material = format!(
        "{}|{}|{}|{}",
        run_id.as_simple(),
        prev_hash.unwrap_or("-"),
        seq,
        canonical_json(payload)?
    );
    Ok(Uuid::new_v5(&EVENT_ID_NAMESPACE, material.as_bytes()))
}

fn canonical_json<T: Serialize>(v: &T) -> Result<String> {
    let value = serde_json::to_value(v).context("serialize audit value")?;
    serde_json::to_string(&value).context("stringify audit value")
}

/// Non-blank lines of a JSONL log with their 1-based line numbers.
fn parse_log(content: &str) -> Result<Vec<(usize, AuditEvent)>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| {
            serde_json::from_str::<AuditEvent>(l.trim())
                .map(|ev| (i + 1, ev))
                .with_context(|| format!("parse audit event at line {}", i + 1))
        })
        .collect()
}

/// Walks a log event by event, tracking the expected `hash_prev`.
#[derive(Default)]
struct ChainCursor {
    prev: Option<String>,
    lines: usize,
}

impl ChainCursor {
    /// `Ok(Err(reason))` when `ev` does not continue the chain.
    fn accept(&mut self, ev: &AuditEvent) -> Result<std::result::Result<(), String>> {
        if ev.hash_prev != self.prev {
            return Ok(Err(format!(
                "hash_prev mismatch: expected {:?}, got {:?}",
                self.prev, ev.hash_prev
            )));
        }
        if let Some(claimed) = &ev.hash_self {
            let recomputed = ev.chain_hash()?;
            if *claimed != recomputed {
                return Ok(Err(format!(
                    "hash_self mismatch: claimed {claimed}, recomputed {recomputed}"
                )));
            }
        }
        self.prev = ev.hash_self.clone();
        self.lines += 1;
        Ok(Ok(()))
    }
}

/// Verify the hash chain of an audit log file.
pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let path = path.as_ref();
    let content =
        fs::read_to_string(path).with_context(|| format!("read audit log {:?}", path))?;
    verify_hash_chain_str(&content)
}

/// Same as [`verify_hash_chain`], on in-memory JSONL content.
pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut cursor = ChainCursor::default();
    for (line, ev) in parse_log(content)? {
        if let Err(reason) = cursor.accept(&ev)? {
            return Ok(VerifyResult::Broken { line, reason });
        }
    }
    Ok(VerifyResult::Valid {
        lines: cursor.lines,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    /// The chain is broken at the given (1-based) line.
    Broken { line: usize, reason: String },
}

impl VerifyResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResult::Valid { .. })
    }
}
