//! # tablemux
//!
//! Push-based demultiplexer for streaming multi-table query results.
//!
//! A single transport stream carries events for many result tables,
//! interleaved. The dispatcher asks a caller-supplied [`TableMuxer`] which
//! handler should consume each table, then drives that handler through a
//! strict per-table lifecycle while the stream flows.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Transport (Stream<StreamEvent>)
//!     ↓
//! [StreamSession]               → cancellation, end-of-stream handling
//!     ↓
//! [TableDispatcher]             → per-table routing + protocol checks
//!     ├── RawSchema::decode     → TableMetadata (Arc, shared read-only)
//!     ├── TableMuxer            → Box<dyn TableRecordHandler>
//!     └── RowBatch::decode      → Record per row
//!     ↓
//! handle_init → handle_record* → handle_done   (per table)
//!     ↓
//! SessionReport
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use futures_util::stream;
//! use tablemux::{Config, PrintingMuxer, StreamSession};
//!
//! let muxer = PrintingMuxer::new(std::io::stdout());
//! let session = StreamSession::new(muxer, stream::iter(events), &Config::load()?);
//! let report = session.stream().await?;
//!
//! for (table_id, error) in &report.table_errors {
//!     eprintln!("{table_id}: {error}");
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `types` | Data types, metadata, datums, records |
//! | `protocol` | Stream events, wire schemas, columnar batches, Arrow input |
//! | `handler` | Handler and muxer traits, built-in printers |
//! | `dispatch` | Per-table routing and worker tasks |
//! | `session` | Stream-driven session loop |
//! | `execution` | Cancellation and deadlines |
//! | `config` | Hierarchical configuration |

pub mod config;
pub mod dispatch;
pub mod error;
pub mod execution;
pub mod handler;
pub mod protocol;
pub mod session;
pub mod types;

pub use config::{Config, DispatchConfig, DispatchMode, RecordErrorPolicy, RejectPolicy};
pub use dispatch::{SessionReport, TableDispatcher};
pub use error::{MuxError, MuxResult, TableError, TransportError, Violation};
pub use execution::{CancelHandle, CancelSignal, Cancelled};
pub use handler::{
    FnMuxer, HandlerError, PrintingMuxer, TableMuxer, TablePrinter, TableRecordHandler,
};
pub use protocol::{RawColumnSchema, RawSchema, RowBatch, StreamEvent, TableId};
pub use session::StreamSession;
pub use types::{
    ColumnSchema, DataType, Datum, Record, SchemaError, SemanticType, TableMetadata,
    COLUMN_NOT_FOUND,
};
