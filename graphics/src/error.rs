//! Graphics error types.
//!
//! Every fallible scheduler operation returns a [`GraphicsError`]: a
//! structured value carrying the subsystem that raised it, the kind of
//! failure, a severity and a human-readable message. Errors are values,
//! never panics; panics are reserved for programmer errors such as an
//! invalid handle passed to a pass builder.

use std::fmt;

/// Subsystem that raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facility {
    /// Render graph construction, build or execution.
    Graph,
    /// Resource table and handle validation.
    Resource,
    /// Backend capabilities (pools, queues, device).
    Backend,
    /// Per-frame orchestrator.
    Orchestrator,
    /// Frame pacing controller.
    Pipeline,
}

impl Facility {
    fn as_str(self) -> &'static str {
        match self {
            Self::Graph => "graph",
            Self::Resource => "resource",
            Self::Backend => "backend",
            Self::Orchestrator => "orchestrator",
            Self::Pipeline => "pipeline",
        }
    }
}

impl fmt::Display for Facility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or out-of-range argument (bad handle, index, kind mismatch).
    InvalidArg,
    /// Protocol violation (read before write, cycle, pool exhaustion, wrong state).
    InvalidState,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArg => f.write_str("invalid argument"),
            Self::InvalidState => f.write_str("invalid state"),
        }
    }
}

/// Severity of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Severity {
    /// The operation failed but the caller may continue normally.
    Warning,
    /// The operation failed and its result must be discarded.
    #[default]
    Error,
}

/// Structured error returned by the graphics scheduler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{facility}: {kind}: {message}")]
pub struct GraphicsError {
    facility: Facility,
    kind: ErrorKind,
    severity: Severity,
    message: String,
}

impl GraphicsError {
    /// Create an error of the given kind.
    pub fn new(facility: Facility, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            facility,
            kind,
            severity: Severity::Error,
            message: message.into(),
        }
    }

    /// Create an [`ErrorKind::InvalidArg`] error.
    pub fn invalid_arg(facility: Facility, message: impl Into<String>) -> Self {
        Self::new(facility, ErrorKind::InvalidArg, message)
    }

    /// Create an [`ErrorKind::InvalidState`] error.
    pub fn invalid_state(facility: Facility, message: impl Into<String>) -> Self {
        Self::new(facility, ErrorKind::InvalidState, message)
    }

    /// Override the severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn facility(&self) -> Facility {
        self.facility
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Numeric error code.
    ///
    /// Layout: bit 31 is set for [`Severity::Error`], bits 16..24 hold the
    /// facility, the low bits hold the kind.
    pub fn code(&self) -> u32 {
        let severity = match self.severity {
            Severity::Warning => 0,
            Severity::Error => 1 << 31,
        };
        let facility = (self.facility as u32 + 1) << 16;
        let kind = match self.kind {
            ErrorKind::InvalidArg => 1,
            ErrorKind::InvalidState => 2,
        };
        severity | facility | kind
    }

    /// Returns true if this is an [`ErrorKind::InvalidArg`] error.
    pub fn is_invalid_arg(&self) -> bool {
        self.kind == ErrorKind::InvalidArg
    }

    /// Returns true if this is an [`ErrorKind::InvalidState`] error.
    pub fn is_invalid_state(&self) -> bool {
        self.kind == ErrorKind::InvalidState
    }
}

/// Result type used throughout the graphics crate.
pub type GraphicsResult<T> = Result<T, GraphicsError>;
