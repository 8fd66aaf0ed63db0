//! Error Types
//!
//! Two levels of failure:
//! - [`TableError`] ends one table's stream; other tables keep flowing and
//!   the error is collected into the session report.
//! - [`MuxError`] ends the whole session.

use crate::execution::Cancelled;
use crate::handler::HandlerError;
use crate::protocol::{DecodeError, TableId};
use crate::types::SchemaError;
use std::fmt;
use thiserror::Error;

/// Result alias for session-level operations
pub type MuxResult<T> = Result<T, MuxError>;

/// Failure scoped to a single table
#[derive(Debug, Error)]
pub enum TableError {
    #[error("Invalid schema: {0}")]
    Schema(#[from] SchemaError),

    #[error("Table '{table}' was rejected by the muxer")]
    Rejected { table: String },

    #[error("Muxer failed to resolve table '{table}': {source}")]
    Resolve {
        table: String,
        #[source]
        source: HandlerError,
    },

    #[error("Handler init failed: {0}")]
    Init(#[source] HandlerError),

    #[error("Handler failed on row {row}: {source}")]
    Record {
        row: u64,
        #[source]
        source: HandlerError,
    },

    #[error("Handler done failed: {0}")]
    Done(#[source] HandlerError),

    #[error("Batch decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Stream ended before the table was closed")]
    Incomplete,

    #[error("Table worker failed: {0}")]
    WorkerFailed(String),
}

impl TableError {
    /// Short name for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            TableError::Schema(_) => "schema",
            TableError::Rejected { .. } => "rejected",
            TableError::Resolve { .. } => "resolve",
            TableError::Init(_) => "init",
            TableError::Record { .. } => "record",
            TableError::Done(_) => "done",
            TableError::Decode(_) => "decode",
            TableError::Incomplete => "incomplete",
            TableError::WorkerFailed(_) => "worker_failed",
        }
    }
}

/// How a table's events arrived out of order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// A batch for a table that was never opened
    BatchBeforeOpen,
    /// A close for a table that was never opened
    CloseBeforeOpen,
    /// A second open for a table id already in use
    DuplicateOpen,
    /// Any event for a table that has already closed
    EventAfterClose,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Violation::BatchBeforeOpen => "row batch before table was opened",
            Violation::CloseBeforeOpen => "close before table was opened",
            Violation::DuplicateOpen => "table opened twice",
            Violation::EventAfterClose => "event after table was closed",
        };
        f.write_str(s)
    }
}

/// Failure reported by the event transport
#[derive(Debug, Error)]
#[error("Transport error: {message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<std::io::Error>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        TransportError {
            message: message.into(),
            source: None,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError {
            message: e.to_string(),
            source: Some(e),
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::new(format!("malformed event: {e}"))
    }
}

/// Failure that ends the whole session
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("Protocol violation on table '{table_id}': {violation}")]
    ProtocolViolation {
        table_id: TableId,
        violation: Violation,
    },

    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl MuxError {
    pub fn violation(table_id: &TableId, violation: Violation) -> Self {
        MuxError::ProtocolViolation {
            table_id: table_id.clone(),
            violation,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MuxError::Cancelled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_table_error_messages() {
        let err = TableError::Record {
            row: 3,
            source: HandlerError::new("bad row"),
        };
        assert_eq!(err.to_string(), "Handler failed on row 3: bad row");
        assert!(err.source().is_some());
        assert_eq!(err.kind(), "record");

        let err = TableError::Rejected {
            table: "http".to_string(),
        };
        assert_eq!(err.to_string(), "Table 'http' was rejected by the muxer");
    }

    #[test]
    fn test_protocol_violation_message() {
        let err = MuxError::violation(&TableId::from("t9"), Violation::BatchBeforeOpen);
        assert_eq!(
            err.to_string(),
            "Protocol violation on table 't9': row batch before table was opened"
        );
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_transport_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err = MuxError::from(TransportError::from(io));
        assert_eq!(err.to_string(), "Transport error: eof");
    }
}
