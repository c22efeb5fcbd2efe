//! Parser diagnostics and typed error conditions.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// How bad a diagnostic is.
///
/// None of these stop the read loop; only transport failure does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// The line was odd but processing carried on.
    Warning,
    /// Recoverable misbehaviour: bad ISUPPORT value, handler failure.
    Error,
    /// State may now be out of sync with the server.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
        })
    }
}

/// A diagnostic delivered through [`crate::event::Event::ErrorInfo`].
#[derive(Debug, Clone, Serialize)]
pub struct ParserError {
    pub severity: Severity,
    pub message: String,
    /// The raw line being processed when this was raised, if any.
    pub line: Option<String>,
    #[serde(skip)]
    pub cause: Option<Arc<anyhow::Error>>,
}

impl ParserError {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            line: None,
            cause: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, message)
    }

    pub fn with_line(mut self, line: impl Into<String>) -> Self {
        self.line = Some(line.into());
        self
    }

    pub fn with_cause(mut self, cause: anyhow::Error) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }
}

impl fmt::Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

/// Malformed ISUPPORT values. The registry falls back to defaults.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IsupportError {
    #[error("CHANMODES needs 4 comma-separated groups, got {groups}: {value:?}")]
    ChanModes { value: String, groups: usize },
    #[error("malformed PREFIX value: {0:?}")]
    Prefix(String),
}

/// Conditions raised while routing a single line.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("{command}: expected at least {expected} tokens, got {got}")]
    ShortLine {
        command: String,
        expected: usize,
        got: usize,
    },
    #[error("no processor for {0}")]
    ProcessorNotFound(String),
    #[error("broken modes: {mode} on {target} requires a parameter")]
    MissingModeParameter { target: String, mode: char },
}

impl ProcessError {
    pub fn severity(&self) -> Severity {
        match self {
            Self::ShortLine { .. } | Self::ProcessorNotFound(_) => Severity::Warning,
            Self::MissingModeParameter { .. } => Severity::Fatal,
        }
    }
}

/// Failures of the remote [`crate::client::ClientHandle`].
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("connection task has stopped")]
    Closed,
    #[error("refusing to send: {0}")]
    Rejected(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_cause() {
        let e = ParserError::error("handler failed").with_cause(anyhow::anyhow!("boom"));
        assert_eq!(e.to_string(), "[error] handler failed: boom");
    }

    #[test]
    fn severities_are_ordered() {
        assert!(Severity::Fatal > Severity::Error);
        assert!(Severity::Error > Severity::Warning);
    }

    #[test]
    fn process_error_severity() {
        let e = ProcessError::MissingModeParameter { target: "#c".into(), mode: 'k' };
        assert_eq!(e.severity(), Severity::Fatal);
        assert_eq!(e.to_string(), "broken modes: k on #c requires a parameter");
    }
}
