//! Serializable types for fixture files.
//!
//! A fixture is one JSON object keyed by slot key; each value is the ordered
//! list of records captured for that slot.

use crate::errors::{MethodError, RockError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

// ── ErrorRecord ───────────────────────────────────────────────────────────────

/// Sanitized failure metadata. Never holds a live error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl From<&MethodError> for ErrorRecord {
    fn from(e: &MethodError) -> Self {
        Self {
            message: e.message.clone(),
            stack: e.stack.clone(),
            code: e.code.clone(),
        }
    }
}

impl From<ErrorRecord> for MethodError {
    fn from(r: ErrorRecord) -> Self {
        Self {
            message: r.message,
            stack: r.stack,
            code: r.code,
        }
    }
}

// ── Record ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    Success(Value),
    Error(ErrorRecord),
}

/// One settled call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
    pub outcome: Outcome,
}

impl Record {
    pub fn success(value: Value) -> Self {
        Self {
            started_at_ms: None,
            ended_at_ms: None,
            outcome: Outcome::Success(value),
        }
    }

    pub fn error(error: ErrorRecord) -> Self {
        Self {
            started_at_ms: None,
            ended_at_ms: None,
            outcome: Outcome::Error(error),
        }
    }

    pub fn timed(mut self, started_at_ms: u64, ended_at_ms: u64) -> Self {
        self.started_at_ms = Some(started_at_ms);
        self.ended_at_ms = Some(ended_at_ms);
        self
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    /// Recorded wall-clock duration, when both timestamps were captured.
    pub fn duration(&self) -> Option<Duration> {
        let (start, end) = (self.started_at_ms?, self.ended_at_ms?);
        Some(Duration::from_millis(end.saturating_sub(start)))
    }

    pub fn into_result(self) -> Result<Value, MethodError> {
        match self.outcome {
            Outcome::Success(value) => Ok(value),
            Outcome::Error(error) => Err(error.into()),
        }
    }
}

// ── FixtureDocument ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixtureDocument {
    pub slots: BTreeMap<String, Vec<Record>>,
}

impl FixtureDocument {
    pub fn parse(path: &Path, raw: &str) -> Result<Self, RockError> {
        serde_json::from_str(raw).map_err(|e| RockError::FixtureParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Pretty JSON indented with tabs, newline-terminated.
    pub fn render(&self) -> Result<String, RockError> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut serializer)
            .map_err(|e| RockError::Io(format!("serialize fixture: {e}")))?;
        out.push(b'\n');
        String::from_utf8(out).map_err(|e| RockError::Io(format!("serialize fixture: {e}")))
    }

    pub fn records(&self, slot: &str) -> &[Record] {
        self.slots.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total_records(&self) -> usize {
        self.slots.values().map(Vec::len).sum()
    }
}
