use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RockError {
    #[error("io error: {0}")]
    Io(String),
    #[error("fixture parse error in {path}: {message}")]
    FixtureParse { path: String, message: String },
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("record not found: slot {slot} has {recorded} recorded call(s), call #{index} requested")]
    RecordNotFound {
        slot: String,
        index: usize,
        recorded: usize,
    },
    #[error("unknown method: {method}")]
    UnknownMethod { method: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("session closed: {0}")]
    SessionClosed(String),
    #[error(transparent)]
    Method(#[from] MethodError),
}

impl RockError {
    /// Stable variant tag, used as the `code` when this error is recorded.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "IO",
            Self::FixtureParse { .. } => "FIXTURE_PARSE",
            Self::ConfigParse(_) => "CONFIG_PARSE",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::RecordNotFound { .. } => "RECORD_NOT_FOUND",
            Self::UnknownMethod { .. } => "UNKNOWN_METHOD",
            Self::Decode(_) => "DECODE",
            Self::SessionClosed(_) => "SESSION_CLOSED",
            Self::Method(_) => "METHOD",
        }
    }
}

/// Failure produced by an async method.
///
/// This is the only error shape that survives a fixture round-trip, so it
/// carries plain text rather than a live error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl MethodError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Flattens an error and its `source()` chain into a `MethodError`.
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let message = error.to_string();
        let mut stack = message.clone();
        let mut source = error.source();
        while let Some(cause) = source {
            stack.push_str("\ncaused by: ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }
        Self {
            message,
            stack: Some(stack),
            code: None,
        }
    }
}

impl fmt::Display for MethodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for MethodError {}

impl From<std::io::Error> for MethodError {
    fn from(error: std::io::Error) -> Self {
        let code = format!("{:?}", error.kind());
        Self::from_error(&error).with_code(code)
    }
}

impl From<RockError> for MethodError {
    fn from(error: RockError) -> Self {
        match error {
            RockError::Method(inner) => inner,
            other => Self::new(other.to_string()).with_code(other.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("request failed")]
    struct Outer {
        #[source]
        inner: std::io::Error,
    }

    #[test]
    fn from_error_walks_source_chain() {
        let err = Outer {
            inner: std::io::Error::new(std::io::ErrorKind::Other, "socket closed"),
        };
        let method = MethodError::from_error(&err);
        assert_eq!(method.message, "request failed");
        assert_eq!(
            method.stack.as_deref(),
            Some("request failed\ncaused by: socket closed")
        );
        assert!(method.code.is_none());
    }

    #[test]
    fn io_errors_carry_kind_as_code() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let method = MethodError::from(err);
        assert_eq!(method.code.as_deref(), Some("NotFound"));
        assert_eq!(method.to_string(), "gone (NotFound)");
    }

    #[test]
    fn rock_errors_convert_with_variant_code() {
        let method = MethodError::from(RockError::Decode("arguments: bad".to_string()));
        assert_eq!(method.message, "decode error: arguments: bad");
        assert_eq!(method.code.as_deref(), Some("DECODE"));

        let inner = MethodError::new("boom").with_code("E1");
        assert_eq!(MethodError::from(RockError::Method(inner.clone())), inner);
    }

    #[test]
    fn record_not_found_message_names_slot_and_index() {
        let err = RockError::RecordNotFound {
            slot: "fetch-0".to_string(),
            index: 2,
            recorded: 2,
        };
        let text = err.to_string();
        assert!(text.contains("fetch-0"));
        assert!(text.contains("#2"));
    }
}
