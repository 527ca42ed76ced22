//! Result envelope returned by imperative lifecycle commands.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a [`Status`].
///
/// The numeric codes are part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Severity {
    /// The command succeeded.
    Ok,
    /// The command succeeded with a caveat.
    Warning,
    /// The command failed.
    Error,
    /// The command was refused because it conflicts with the current state.
    Cancel,
}

impl Severity {
    /// Returns the wire code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Warning => 2,
            Self::Error => 4,
            Self::Cancel => 8,
        }
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> Self {
        severity.code()
    }
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, String> {
        match code {
            0 => Ok(Self::Ok),
            2 => Ok(Self::Warning),
            4 => Ok(Self::Error),
            8 => Ok(Self::Cancel),
            other => Err(format!("unknown status severity: {other}")),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Cancel => "CANCEL",
        })
    }
}

/// Result of an imperative command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    severity: Severity,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cause: Option<String>,
}

impl Status {
    /// Message carried by every successful command.
    pub const OK_MESSAGE: &'static str = "ok";

    /// Creates a status.
    #[must_use]
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            cause: None,
        }
    }

    /// The canonical success status.
    #[must_use]
    pub fn ok() -> Self {
        Self::new(Severity::Ok, Self::OK_MESSAGE)
    }

    /// An `ERROR` status.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// A `CANCEL` status.
    #[must_use]
    pub fn cancel(message: impl Into<String>) -> Self {
        Self::new(Severity::Cancel, message)
    }

    /// Attaches the text of the underlying cause.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Returns the severity.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the cause text, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }

    /// Returns whether the severity is [`Severity::Ok`].
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.severity == Severity::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}: {}", self.severity, self.message)
    }
}
