//! Stream Protocol
//!
//! The event sequence a transport delivers to the dispatcher, and the
//! decoding of raw schemas and columnar batches into the record model.
//!
//! # Event Order (per table)
//!
//! ```text
//! TableOpened(id, schema) ──► RowBatch(id, rows)* ──► TableClosed(id)
//! ```
//!
//! Events for different tables may interleave freely.
//!
//! # Module Structure
//!
//! - `wire` - Event, schema and row batch types (`StreamEvent`, `RawSchema`, `RowBatch`)
//! - `arrow_convert` - Building wire schemas and batches from Arrow `RecordBatch`es

pub mod arrow_convert;
pub mod wire;

pub use arrow_convert::SEMANTIC_TYPE_METADATA_KEY;
pub use wire::{
    read_json_lines, DecodeError, DecodedBatch, RawColumnSchema, RawSchema, RowBatch,
    StreamEvent, TableId, WireColumn, WireUint128,
};
