//! Table handler contracts
//!
//! A [`TableMuxer`] is asked once per table which [`TableRecordHandler`]
//! should consume it. The chosen handler then sees that table's lifecycle
//! in strict order:
//!
//! ```text
//! handle_init(metadata) ──► handle_record(record)* ──► handle_done()
//! ```
//!
//! `handle_done` is skipped when the table's stream ends abnormally
//! (init failure, decode failure, fatal record failure, cancellation, or a
//! transport that stops before the table is closed).
//!
//! ## Example
//!
//! ```rust,ignore
//! use tablemux::handler::{HandlerError, TableMuxer, TableRecordHandler};
//! use tablemux::types::{Record, TableMetadata};
//!
//! struct RowCounter(u64);
//!
//! #[async_trait::async_trait]
//! impl TableRecordHandler for RowCounter {
//!     async fn handle_record(&mut self, _record: &Record) -> Result<(), HandlerError> {
//!         self.0 += 1;
//!         Ok(())
//!     }
//! }
//! ```

use crate::types::{Record, TableMetadata};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::error::Error as StdError;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

/// Failure reported by a handler or muxer callback
#[derive(Debug)]
pub struct HandlerError {
    message: String,
    fatal: bool,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl HandlerError {
    /// Recoverable failure: the table keeps streaming under the default policy
    pub fn new(message: impl Into<String>) -> Self {
        HandlerError {
            message: message.into(),
            fatal: false,
            source: None,
        }
    }

    /// Failure that stops delivery to this table
    pub fn fatal(message: impl Into<String>) -> Self {
        HandlerError {
            message: message.into(),
            fatal: true,
            source: None,
        }
    }

    /// Attach an underlying cause
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl StdError for HandlerError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(e: std::io::Error) -> Self {
        HandlerError::new("I/O error").with_source(e)
    }
}

/// Consumer of one table's stream
#[async_trait]
pub trait TableRecordHandler: Send {
    /// Called exactly once, before any record, with the table's schema
    async fn handle_init(&mut self, _metadata: &TableMetadata) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Called once per row, in wire order
    async fn handle_record(&mut self, record: &Record) -> Result<(), HandlerError>;

    /// Called exactly once after the last record of a cleanly closed table
    async fn handle_done(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Resolver that picks a handler for each newly opened table
#[async_trait]
pub trait TableMuxer: Send {
    /// Return the handler for this table, or `None` to reject it.
    async fn accept_table(
        &mut self,
        metadata: &TableMetadata,
    ) -> Result<Option<Box<dyn TableRecordHandler>>, HandlerError>;
}

/// Closure-backed [`TableMuxer`]
pub struct FnMuxer<F>(pub F);

#[async_trait]
impl<F> TableMuxer for FnMuxer<F>
where
    F: FnMut(&TableMetadata) -> Option<Box<dyn TableRecordHandler>> + Send,
{
    async fn accept_table(
        &mut self,
        metadata: &TableMetadata,
    ) -> Result<Option<Box<dyn TableRecordHandler>>, HandlerError> {
        Ok((self.0)(metadata))
    }
}

/// Writes every record as one line of space-separated values
pub struct TablePrinter<W> {
    out: Arc<Mutex<W>>,
    header: bool,
}

impl<W: Write + Send> TablePrinter<W> {
    pub fn new(out: Arc<Mutex<W>>) -> Self {
        TablePrinter { out, header: false }
    }

    /// Print the table schema on init
    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }
}

#[async_trait]
impl<W: Write + Send> TableRecordHandler for TablePrinter<W> {
    async fn handle_init(&mut self, metadata: &TableMetadata) -> Result<(), HandlerError> {
        if self.header {
            writeln!(self.out.lock(), "{metadata}")?;
        }
        Ok(())
    }

    async fn handle_record(&mut self, record: &Record) -> Result<(), HandlerError> {
        writeln!(self.out.lock(), "{record}")?;
        Ok(())
    }

    async fn handle_done(&mut self) -> Result<(), HandlerError> {
        self.out.lock().flush()?;
        Ok(())
    }
}

/// Muxer that gives every table a [`TablePrinter`] over one shared writer
pub struct PrintingMuxer<W> {
    out: Arc<Mutex<W>>,
    header: bool,
}

impl<W: Write + Send + 'static> PrintingMuxer<W> {
    pub fn new(writer: W) -> Self {
        PrintingMuxer {
            out: Arc::new(Mutex::new(writer)),
            header: true,
        }
    }

    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    /// Shared writer, e.g. to inspect output after the session
    pub fn writer(&self) -> Arc<Mutex<W>> {
        Arc::clone(&self.out)
    }
}

#[async_trait]
impl<W: Write + Send + 'static> TableMuxer for PrintingMuxer<W> {
    async fn accept_table(
        &mut self,
        _metadata: &TableMetadata,
    ) -> Result<Option<Box<dyn TableRecordHandler>>, HandlerError> {
        let printer = TablePrinter::new(Arc::clone(&self.out)).with_header(self.header);
        Ok(Some(Box::new(printer)))
    }
}
