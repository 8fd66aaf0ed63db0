//! Records: one row of a result table.

use super::{ColumnSchema, DataType, Datum, TableMetadata};
use std::fmt;
use std::sync::Arc;

/// A row whose values do not line up with its table's schema
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordShapeError {
    #[error("Record has {got} values but table '{table}' has {expected} columns")]
    Arity {
        table: String,
        expected: usize,
        got: usize,
    },
    #[error("Column '{column}' expects {expected}, got {got}")]
    ColumnType {
        column: String,
        expected: DataType,
        got: DataType,
    },
}

/// One row of a table, aligned to the table's shared metadata.
///
/// Records are immutable snapshots. A handler receives each record by
/// reference for the duration of one call; clone it to keep it longer.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    data: Vec<Datum>,
    metadata: Arc<TableMetadata>,
}

impl Record {
    /// Build a record, checking arity and per-column types against the metadata.
    pub fn new(metadata: Arc<TableMetadata>, data: Vec<Datum>) -> Result<Self, RecordShapeError> {
        if data.len() != metadata.num_columns() {
            return Err(RecordShapeError::Arity {
                table: metadata.name().to_string(),
                expected: metadata.num_columns(),
                got: data.len(),
            });
        }
        for (column, datum) in metadata.columns().iter().zip(&data) {
            if datum.data_type() != column.data_type {
                return Err(RecordShapeError::ColumnType {
                    column: column.name.clone(),
                    expected: column.data_type,
                    got: datum.data_type(),
                });
            }
        }
        Ok(Record { data, metadata })
    }

    /// Build a record whose shape the caller has already verified column by column.
    pub(crate) fn from_checked(metadata: Arc<TableMetadata>, data: Vec<Datum>) -> Self {
        debug_assert_eq!(data.len(), metadata.num_columns());
        Record { data, metadata }
    }

    /// Values in column order
    pub fn data(&self) -> &[Datum] {
        &self.data
    }

    /// Schema of the table this record belongs to
    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    /// Shared handle to the table schema
    pub fn metadata_arc(&self) -> &Arc<TableMetadata> {
        &self.metadata
    }

    /// Value of the named column.
    ///
    /// Returns `None` only when the table has no such column; values are
    /// never absent for a column that exists.
    pub fn get_datum(&self, column: &str) -> Option<&Datum> {
        self.metadata.position(column).map(|idx| &self.data[idx])
    }

    /// Value at a column position.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of range. Use [`Record::try_get_datum_by_idx`]
    /// when the index is not known to be valid.
    pub fn get_datum_by_idx(&self, idx: usize) -> &Datum {
        &self.data[idx]
    }

    pub fn try_get_datum_by_idx(&self, idx: usize) -> Option<&Datum> {
        self.data.get(idx)
    }

    /// Number of values (equal to the table's column count)
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate `(column, value)` pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (&ColumnSchema, &Datum)> {
        self.metadata.columns().iter().zip(&self.data)
    }

    /// Take ownership of the values
    pub fn into_data(self) -> Vec<Datum> {
        self.data
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, datum) in self.data.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{datum}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SemanticType;

    fn metadata() -> Arc<TableMetadata> {
        Arc::new(
            TableMetadata::new(
                "conn_stats",
                vec![
                    ColumnSchema::new("remote_addr", DataType::String, SemanticType::IpAddress),
                    ColumnSchema::plain("bytes_sent", DataType::Int64),
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_get_datum_by_name_and_index() {
        let record = Record::new(metadata(), vec!["10.0.0.1".into(), 512i64.into()]).unwrap();
        assert_eq!(record.get_datum("bytes_sent"), Some(&Datum::Int64(512)));
        assert_eq!(record.get_datum_by_idx(0).as_str(), Ok("10.0.0.1"));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_missing_column_is_none() {
        let record = Record::new(metadata(), vec!["10.0.0.1".into(), 1i64.into()]).unwrap();
        assert!(record.get_datum("nonexistent").is_none());
        assert!(record.try_get_datum_by_idx(2).is_none());
    }

    #[test]
    #[should_panic]
    fn test_index_out_of_range_panics() {
        let record = Record::new(metadata(), vec!["a".into(), 1i64.into()]).unwrap();
        let _ = record.get_datum_by_idx(5);
    }

    #[test]
    fn test_shape_checked() {
        let err = Record::new(metadata(), vec!["a".into()]).unwrap_err();
        assert!(matches!(err, RecordShapeError::Arity { expected: 2, got: 1, .. }));

        let err = Record::new(metadata(), vec!["a".into(), 1.0.into()]).unwrap_err();
        assert_eq!(
            err,
            RecordShapeError::ColumnType {
                column: "bytes_sent".to_string(),
                expected: DataType::Int64,
                got: DataType::Float64,
            }
        );
    }

    #[test]
    fn test_display_space_separated() {
        let record = Record::new(metadata(), vec!["10.0.0.1".into(), 7i64.into()]).unwrap();
        assert_eq!(record.to_string(), "10.0.0.1 7");
    }

    #[test]
    fn test_iter_pairs_columns() {
        let record = Record::new(metadata(), vec!["h".into(), 3i64.into()]).unwrap();
        let names: Vec<&str> = record.iter().map(|(c, _)| c.name.as_str()).collect();
        assert_eq!(names, vec!["remote_addr", "bytes_sent"]);
    }
}
