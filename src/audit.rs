//! Audit trail sinks. The engine hands every session event to an
//! [`AuditSink`]; what happens to it afterwards is the sink's business.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::rlm::quality::QualityScore;
use crate::rlm::session::{IterationRecord, StopReason, Strategy};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    Start {
        question: String,
        context_len: usize,
        strategy: Strategy,
        depth: u32,
    },
    Iteration(IterationRecord),
    Final {
        answer: String,
        iterations: u32,
        stop: StopReason,
        score: QualityScore,
        explored: usize,
        total_segments: usize,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AuditEvent,
}

pub trait AuditSink: Send + Sync {
    fn append(&self, session_id: &str, event: &AuditEvent) -> Result<()>;
}

/// Discards everything.
pub struct NullSink;

impl AuditSink for NullSink {
    fn append(&self, _session_id: &str, _event: &AuditEvent) -> Result<()> {
        Ok(())
    }
}

/// Keeps events in memory, in arrival order.
#[cfg(test)]
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<(String, AuditEvent)>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, AuditEvent)> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
impl AuditSink for MemorySink {
    fn append(&self, session_id: &str, event: &AuditEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| anyhow::anyhow!("audit buffer poisoned"))?
            .push((session_id.to_string(), event.clone()));
        Ok(())
    }
}

#[derive(Serialize)]
struct SessionLog<'a> {
    session_id: &'a str,
    events: &'a [AuditEntry],
}

/// Writes one pretty-printed JSON document per session to
/// `<dir>/rlm_session_<id>.json`, rewritten after every event.
pub struct JsonFileSink {
    dir: PathBuf,
    sessions: Mutex<HashMap<String, Vec<AuditEntry>>>,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("rlm_session_{session_id}.json"))
    }

    fn write(&self, path: &Path, session_id: &str, events: &[AuditEntry]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create log directory {}", self.dir.display()))?;
        let body = serde_json::to_string_pretty(&SessionLog { session_id, events })
            .context("Failed to serialize session log")?;
        std::fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))
    }
}

impl AuditSink for JsonFileSink {
    fn append(&self, session_id: &str, event: &AuditEvent) -> Result<()> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| anyhow::anyhow!("audit buffer poisoned"))?;
        let events = sessions.entry(session_id.to_string()).or_default();
        events.push(AuditEntry {
            timestamp: Utc::now(),
            event: event.clone(),
        });
        self.write(&self.path_for(session_id), session_id, events)?;

        // The session is over; the file already holds everything.
        if matches!(event, AuditEvent::Final { .. }) {
            sessions.remove(session_id);
        }
        Ok(())
    }
}
