use crate::errors::RockError;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

/// Append-only JSONL journal of session lifecycle events.
#[derive(Debug, Clone)]
pub struct JsonlLogger {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub level: &'a str,
    pub event_type: &'a str,
    pub fixture: &'a str,
    pub payload: Value,
}

impl JsonlLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), RockError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| RockError::Io(e.to_string()))?;
        }
        let truncated = truncate_json(event.payload.clone(), self.max_payload_bytes);
        let line = serde_json::to_string(&LogEvent {
            payload: truncated,
            ..event.clone()
        })
        .map_err(|e| RockError::Io(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| RockError::Io(e.to_string()))?;
        file.write_all(line.as_bytes())
            .map_err(|e| RockError::Io(e.to_string()))?;
        file.write_all(b"\n")
            .map_err(|e| RockError::Io(e.to_string()))
    }
}

/// Session-scoped front for an optional [`JsonlLogger`].
#[derive(Debug, Clone)]
pub struct Journal {
    fixture: String,
    logger: Option<JsonlLogger>,
}

impl Journal {
    pub fn new(fixture: impl Into<String>, logger: Option<JsonlLogger>) -> Self {
        Self {
            fixture: fixture.into(),
            logger,
        }
    }

    pub fn disabled(fixture: impl Into<String>) -> Self {
        Self::new(fixture, None)
    }

    pub fn fixture(&self) -> &str {
        &self.fixture
    }

    pub fn append(&self, level: &str, event_type: &str, payload: Value) -> Result<(), RockError> {
        let Some(logger) = &self.logger else {
            return Ok(());
        };
        logger.append(&LogEvent {
            level,
            event_type,
            fixture: &self.fixture,
            payload,
        })
    }

    /// For call paths with no caller to hand the error to.
    pub fn append_or_warn(&self, level: &str, event_type: &str, payload: Value) {
        if let Err(error) = self.append(level, event_type, payload) {
            warn!(fixture = %self.fixture, event_type, %error, "event journal write failed");
        }
    }
}

fn truncate_json(value: Value, max_bytes: usize) -> Value {
    let rendered = serde_json::to_string(&value).unwrap_or_default();
    if rendered.len() <= max_bytes {
        return value;
    }
    let mut cut = max_bytes.saturating_sub(3);
    while cut > 0 && !rendered.is_char_boundary(cut) {
        cut -= 1;
    }
    Value::String(format!("{}...", &rendered[..cut]))
}

#[cfg(test)]
mod tests {
    use super::{truncate_json, JsonlLogger, LogEvent};
    use serde_json::{json, Value};

    #[test]
    fn logger_truncates_large_payloads_and_writes_jsonl() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logs/session.jsonl");
        let mut logger = JsonlLogger::new(&path);
        logger.max_payload_bytes = 20;

        logger
            .append(&LogEvent {
                level: "info",
                event_type: "call_recorded",
                fixture: "fetch",
                payload: json!({"value": "abcdefghijklmnopqrstuvwxyz"}),
            })
            .expect("append");
        logger
            .append(&LogEvent {
                level: "debug",
                event_type: "session_restored",
                fixture: "fetch",
                payload: json!({}),
            })
            .expect("append");

        let text = std::fs::read_to_string(&path).expect("read");
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"event_type\":\"call_recorded\""));
        assert!(lines[0].contains("..."));
        assert!(lines[1].contains("\"payload\":{}"));
    }

    #[test]
    fn disabled_journal_is_a_no_op() {
        let journal = super::Journal::disabled("fetch");
        journal
            .append("info", "session_setup", json!({"mode": "recording"}))
            .expect("no-op");
        assert_eq!(journal.fixture(), "fetch");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let value = json!("ééééééééé");
        let out = truncate_json(value, 8);
        let Value::String(text) = out else {
            panic!("expected string");
        };
        assert!(text.ends_with("..."));
    }
}
