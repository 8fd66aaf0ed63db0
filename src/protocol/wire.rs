//! Wire Format Types
//!
//! The abstract event sequence delivered by the transport: table opened,
//! row batches, table closed. Schemas arrive as raw type codes and rows
//! arrive column-major, one typed array per column; this module decodes
//! both into the crate's checked [`TableMetadata`] and [`Record`] types.

use crate::types::{ColumnSchema, DataType, Datum, Record, SchemaError, SemanticType, TableMetadata};
use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::BufRead;
use std::sync::Arc;

// ============================================================================
// Table Identity
// ============================================================================

/// Stable identifier of one logical table within a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(String);

impl TableId {
    pub fn new(id: impl Into<String>) -> Self {
        TableId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TableId {
    fn from(id: &str) -> Self {
        TableId(id.to_string())
    }
}

impl From<String> for TableId {
    fn from(id: String) -> Self {
        TableId(id)
    }
}

impl std::borrow::Borrow<str> for TableId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Raw Schema
// ============================================================================

/// Column description as it arrives on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawColumnSchema {
    pub name: String,
    pub type_code: i32,
    #[serde(default)]
    pub semantic_code: i32,
}

impl RawColumnSchema {
    pub fn new(name: impl Into<String>, data_type: DataType, semantic_type: SemanticType) -> Self {
        RawColumnSchema {
            name: name.into(),
            type_code: data_type.wire_code(),
            semantic_code: semantic_type.wire_code(),
        }
    }

    /// Column with no semantic tag
    pub fn plain(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, data_type, SemanticType::None)
    }
}

/// Table schema as it arrives on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSchema {
    pub name: String,
    pub columns: Vec<RawColumnSchema>,
}

impl RawSchema {
    pub fn new(name: impl Into<String>, columns: Vec<RawColumnSchema>) -> Self {
        RawSchema {
            name: name.into(),
            columns,
        }
    }

    /// Encode existing metadata back into wire form
    pub fn from_metadata(metadata: &TableMetadata) -> Self {
        RawSchema {
            name: metadata.name().to_string(),
            columns: metadata
                .columns()
                .iter()
                .map(|c| RawColumnSchema::new(c.name.clone(), c.data_type, c.semantic_type))
                .collect(),
        }
    }

    /// Map wire codes onto the closed type set and build checked metadata.
    pub fn decode(&self) -> Result<TableMetadata, SchemaError> {
        let columns = self
            .columns
            .iter()
            .map(|raw| {
                let data_type = DataType::from_wire_code(raw.type_code).ok_or_else(|| {
                    SchemaError::UnknownTypeCode {
                        table: self.name.clone(),
                        column: raw.name.clone(),
                        code: raw.type_code,
                    }
                })?;
                Ok(ColumnSchema::new(
                    raw.name.clone(),
                    data_type,
                    SemanticType::from_wire_code(raw.semantic_code),
                ))
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;
        TableMetadata::new(self.name.clone(), columns)
    }
}

// ============================================================================
// Columnar Row Batch
// ============================================================================

/// 128-bit value split into halves, as carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireUint128 {
    pub high: u64,
    pub low: u64,
}

impl From<u128> for WireUint128 {
    fn from(v: u128) -> Self {
        WireUint128 {
            high: (v >> 64) as u64,
            low: v as u64,
        }
    }
}

impl From<WireUint128> for u128 {
    fn from(v: WireUint128) -> Self {
        (u128::from(v.high) << 64) | u128::from(v.low)
    }
}

/// One column of a row batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values")]
pub enum WireColumn {
    Boolean(Vec<bool>),
    Int64(Vec<i64>),
    Uint128(Vec<WireUint128>),
    Float64(Vec<f64>),
    String(Vec<String>),
    Time64Ns(Vec<i64>),
}

impl WireColumn {
    /// Empty column of the given type
    pub fn empty(data_type: DataType) -> Self {
        Self::with_capacity(data_type, 0)
    }

    fn with_capacity(data_type: DataType, capacity: usize) -> Self {
        match data_type {
            DataType::Boolean => WireColumn::Boolean(Vec::with_capacity(capacity)),
            DataType::Int64 => WireColumn::Int64(Vec::with_capacity(capacity)),
            DataType::Uint128 => WireColumn::Uint128(Vec::with_capacity(capacity)),
            DataType::Float64 => WireColumn::Float64(Vec::with_capacity(capacity)),
            DataType::String => WireColumn::String(Vec::with_capacity(capacity)),
            DataType::Time64Ns => WireColumn::Time64Ns(Vec::with_capacity(capacity)),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            WireColumn::Boolean(_) => DataType::Boolean,
            WireColumn::Int64(_) => DataType::Int64,
            WireColumn::Uint128(_) => DataType::Uint128,
            WireColumn::Float64(_) => DataType::Float64,
            WireColumn::String(_) => DataType::String,
            WireColumn::Time64Ns(_) => DataType::Time64Ns,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            WireColumn::Boolean(v) => v.len(),
            WireColumn::Int64(v) | WireColumn::Time64Ns(v) => v.len(),
            WireColumn::Uint128(v) => v.len(),
            WireColumn::Float64(v) => v.len(),
            WireColumn::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `row`, or `None` past the end
    pub fn datum(&self, row: usize) -> Option<Datum> {
        match self {
            WireColumn::Boolean(v) => v.get(row).map(|b| Datum::Boolean(*b)),
            WireColumn::Int64(v) => v.get(row).map(|i| Datum::Int64(*i)),
            WireColumn::Uint128(v) => v.get(row).map(|u| Datum::Uint128((*u).into())),
            WireColumn::Float64(v) => v.get(row).map(|x| Datum::Float64(*x)),
            WireColumn::String(v) => v.get(row).map(|s| Datum::string(s)),
            WireColumn::Time64Ns(v) => v.get(row).map(|t| Datum::Time64Ns(*t)),
        }
    }

    /// Append a datum; `false` if its type does not match the column
    fn push(&mut self, datum: &Datum) -> bool {
        match (self, datum) {
            (WireColumn::Boolean(v), Datum::Boolean(b)) => v.push(*b),
            (WireColumn::Int64(v), Datum::Int64(i)) => v.push(*i),
            (WireColumn::Uint128(v), Datum::Uint128(u)) => v.push((*u).into()),
            (WireColumn::Float64(v), Datum::Float64(x)) => v.push(*x),
            (WireColumn::String(v), Datum::String(s)) => v.push(s.to_string()),
            (WireColumn::Time64Ns(v), Datum::Time64Ns(t)) => v.push(*t),
            _ => return false,
        }
        true
    }
}

/// Errors decoding a row batch against its table's schema
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Batch has {got} columns, schema has {expected}")]
    ColumnCount { expected: usize, got: usize },
    #[error("Column '{column}' is {got} in batch, schema declares {expected}")]
    ColumnType {
        column: String,
        expected: DataType,
        got: DataType,
    },
    #[error("Column '{column}' has {got} values, batch declares {expected} rows")]
    ColumnLength {
        column: String,
        expected: usize,
        got: usize,
    },
    #[error("Row {row} has {got} values, expected {expected}")]
    RowArity { row: usize, expected: usize, got: usize },
    #[error("Row {row} column {column}: expected {expected}, got {got}")]
    RowType {
        row: usize,
        column: usize,
        expected: DataType,
        got: DataType,
    },
    #[error("Column '{column}' row {row} is null")]
    NullValue { column: String, row: usize },
    #[error("Unsupported Arrow type for column '{column}': {arrow_type}")]
    UnsupportedArrowType { column: String, arrow_type: String },
}

/// Column-major batch of rows for one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowBatch {
    pub columns: Vec<WireColumn>,
    pub num_rows: usize,
}

impl RowBatch {
    /// Batch from columns; the row count is taken from the first column.
    pub fn new(columns: Vec<WireColumn>) -> Self {
        let num_rows = columns.first().map_or(0, WireColumn::len);
        RowBatch { columns, num_rows }
    }

    /// Batch with no rows and no columns
    pub fn empty() -> Self {
        RowBatch {
            columns: Vec::new(),
            num_rows: 0,
        }
    }

    /// Transpose row-major values into a columnar batch.
    pub fn from_rows(column_types: &[DataType], rows: &[Vec<Datum>]) -> Result<Self, DecodeError> {
        let mut columns: Vec<WireColumn> = column_types
            .iter()
            .map(|dt| WireColumn::with_capacity(*dt, rows.len()))
            .collect();

        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(DecodeError::RowArity {
                    row: row_idx,
                    expected: columns.len(),
                    got: row.len(),
                });
            }
            for (col_idx, (column, datum)) in columns.iter_mut().zip(row).enumerate() {
                if !column.push(datum) {
                    return Err(DecodeError::RowType {
                        row: row_idx,
                        column: col_idx,
                        expected: column.data_type(),
                        got: datum.data_type(),
                    });
                }
            }
        }

        Ok(RowBatch {
            columns,
            num_rows: rows.len(),
        })
    }

    /// Check the batch against `metadata` and bind them together.
    ///
    /// A zero-column schema accepts any row count with no columns.
    pub fn decode(self, metadata: &Arc<TableMetadata>) -> Result<DecodedBatch, DecodeError> {
        if self.columns.len() != metadata.num_columns() {
            return Err(DecodeError::ColumnCount {
                expected: metadata.num_columns(),
                got: self.columns.len(),
            });
        }
        for (schema, column) in metadata.columns().iter().zip(&self.columns) {
            if column.data_type() != schema.data_type {
                return Err(DecodeError::ColumnType {
                    column: schema.name.clone(),
                    expected: schema.data_type,
                    got: column.data_type(),
                });
            }
            if column.len() != self.num_rows {
                return Err(DecodeError::ColumnLength {
                    column: schema.name.clone(),
                    expected: self.num_rows,
                    got: column.len(),
                });
            }
        }
        Ok(DecodedBatch {
            columns: self.columns,
            num_rows: self.num_rows,
            metadata: Arc::clone(metadata),
        })
    }
}

/// A row batch verified against its table's schema
#[derive(Debug, Clone)]
pub struct DecodedBatch {
    columns: Vec<WireColumn>,
    num_rows: usize,
    metadata: Arc<TableMetadata>,
}

impl DecodedBatch {
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn metadata(&self) -> &Arc<TableMetadata> {
        &self.metadata
    }

    /// Record for one row
    pub fn record(&self, row: usize) -> Option<Record> {
        if row >= self.num_rows {
            return None;
        }
        let data = self
            .columns
            .iter()
            .map(|c| c.datum(row))
            .collect::<Option<Vec<_>>>()?;
        Some(Record::from_checked(Arc::clone(&self.metadata), data))
    }

    /// Records in batch order, built one at a time
    pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
        (0..self.num_rows).filter_map(move |row| self.record(row))
    }
}

// ============================================================================
// Stream Events
// ============================================================================

/// One table-scoped event from the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    TableOpened { table_id: TableId, schema: RawSchema },
    RowBatch { table_id: TableId, batch: RowBatch },
    TableClosed { table_id: TableId },
}

impl StreamEvent {
    pub fn opened(table_id: impl Into<TableId>, schema: RawSchema) -> Self {
        StreamEvent::TableOpened {
            table_id: table_id.into(),
            schema,
        }
    }

    pub fn batch(table_id: impl Into<TableId>, batch: RowBatch) -> Self {
        StreamEvent::RowBatch {
            table_id: table_id.into(),
            batch,
        }
    }

    pub fn closed(table_id: impl Into<TableId>) -> Self {
        StreamEvent::TableClosed {
            table_id: table_id.into(),
        }
    }

    pub fn table_id(&self) -> &TableId {
        match self {
            StreamEvent::TableOpened { table_id, .. }
            | StreamEvent::RowBatch { table_id, .. }
            | StreamEvent::TableClosed { table_id } => table_id,
        }
    }

    /// Short event name for logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::TableOpened { .. } => "table_opened",
            StreamEvent::RowBatch { .. } => "row_batch",
            StreamEvent::TableClosed { .. } => "table_closed",
        }
    }
}

/// Read one JSON-encoded event per line, skipping blank lines.
pub fn read_json_lines<R: BufRead>(
    reader: R,
) -> impl Iterator<Item = Result<StreamEvent, TransportError>> {
    reader.lines().filter_map(|line| match line {
        Ok(line) if line.trim().is_empty() => None,
        Ok(line) => Some(serde_json::from_str(&line).map_err(TransportError::from)),
        Err(e) => Some(Err(TransportError::from(e))),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn two_column_metadata() -> Arc<TableMetadata> {
        Arc::new(
            RawSchema::new(
                "t",
                vec![
                    RawColumnSchema::plain("name", DataType::String),
                    RawColumnSchema::plain("count", DataType::Int64),
                ],
            )
            .decode()
            .unwrap(),
        )
    }

    #[test]
    fn test_raw_schema_decode() {
        let raw = RawSchema::new(
            "http_events",
            vec![
                RawColumnSchema::new("upid", DataType::Uint128, SemanticType::Upid),
                RawColumnSchema::plain("http_req_path", DataType::String),
            ],
        );
        let metadata = raw.decode().unwrap();
        assert_eq!(metadata.name(), "http_events");
        assert_eq!(metadata.columns()[0].semantic_type, SemanticType::Upid);
        assert_eq!(RawSchema::from_metadata(&metadata), raw);
    }

    #[test]
    fn test_unknown_type_code() {
        let raw = RawSchema::new(
            "t",
            vec![RawColumnSchema {
                name: "x".to_string(),
                type_code: 99,
                semantic_code: 0,
            }],
        );
        assert_eq!(
            raw.decode().unwrap_err(),
            SchemaError::UnknownTypeCode {
                table: "t".to_string(),
                column: "x".to_string(),
                code: 99
            }
        );
    }

    #[test]
    fn test_uint128_halves() {
        let v: u128 = (7u128 << 64) | 9;
        let wire = WireUint128::from(v);
        assert_eq!(wire, WireUint128 { high: 7, low: 9 });
        assert_eq!(u128::from(wire), v);
    }

    #[test]
    fn test_from_rows_and_records_preserve_order() {
        let metadata = two_column_metadata();
        let rows = vec![
            vec![Datum::from("a"), Datum::from(1i64)],
            vec![Datum::from("b"), Datum::from(2i64)],
            vec![Datum::from("c"), Datum::from(3i64)],
        ];
        let batch = RowBatch::from_rows(&metadata.data_types(), &rows).unwrap();
        assert_eq!(batch.num_rows, 3);

        let decoded = batch.decode(&metadata).unwrap();
        let got: Vec<Vec<Datum>> = decoded.records().map(Record::into_data).collect();
        assert_eq!(got, rows);
    }

    #[test]
    fn test_from_rows_type_error() {
        let err = RowBatch::from_rows(
            &[DataType::Int64],
            &[vec![Datum::from(1i64)], vec![Datum::from("x")]],
        )
        .unwrap_err();
        assert_eq!(
            err,
            DecodeError::RowType {
                row: 1,
                column: 0,
                expected: DataType::Int64,
                got: DataType::String
            }
        );
    }

    #[test]
    fn test_decode_rejects_ragged_columns() {
        let metadata = two_column_metadata();
        let batch = RowBatch {
            columns: vec![
                WireColumn::String(vec!["a".into(), "b".into()]),
                WireColumn::Int64(vec![1]),
            ],
            num_rows: 2,
        };
        assert!(matches!(
            batch.decode(&metadata),
            Err(DecodeError::ColumnLength { expected: 2, got: 1, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_type_and_count() {
        let metadata = two_column_metadata();
        let wrong_type = RowBatch::new(vec![
            WireColumn::String(vec!["a".into()]),
            WireColumn::Float64(vec![1.0]),
        ]);
        assert!(matches!(
            wrong_type.decode(&metadata),
            Err(DecodeError::ColumnType { .. })
        ));

        let wrong_count = RowBatch::new(vec![WireColumn::String(vec!["a".into()])]);
        assert_eq!(
            wrong_count.decode(&metadata).unwrap_err(),
            DecodeError::ColumnCount { expected: 2, got: 1 }
        );
    }

    #[test]
    fn test_event_json_shape() {
        let event = StreamEvent::closed("t1");
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"event":"table_closed","table_id":"t1"}"#);

        let batch = StreamEvent::batch("t1", RowBatch::new(vec![WireColumn::Int64(vec![4, 5])]));
        let back: StreamEvent = serde_json::from_str(&serde_json::to_string(&batch).unwrap()).unwrap();
        assert_eq!(back, batch);
        assert_eq!(back.kind(), "row_batch");
        assert_eq!(back.table_id().as_str(), "t1");
    }

    #[test]
    fn test_read_json_lines() {
        let input = concat!(
            r#"{"event":"table_opened","table_id":"t","schema":{"name":"t","columns":[]}}"#,
            "\n\n",
            r#"{"event":"table_closed","table_id":"t"}"#,
            "\n",
            "not json\n",
        );
        let events: Vec<_> = read_json_lines(input.as_bytes()).collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].as_ref().unwrap().kind(), "table_opened");
        assert_eq!(events[1].as_ref().unwrap(), &StreamEvent::closed("t"));
        assert!(events[2].is_err());
    }

    #[test]
    fn test_uint128_column_json_roundtrip() {
        let original = StreamEvent::batch(
            "t2",
            RowBatch::new(vec![
                WireColumn::Uint128(vec![WireUint128 { high: 1, low: 2 }]),
                WireColumn::Time64Ns(vec![1_000]),
            ]),
        );

        let json = serde_json::to_string(&original).unwrap();
        assert!(json.contains(r#""type":"Uint128""#));
        let restored: StreamEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(original, restored);
    }
}
