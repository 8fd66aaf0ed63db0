//! Arrow Conversion Utilities
//!
//! Builds wire schemas and row batches from Arrow `RecordBatch`es, for
//! producers that already hold query results in columnar Arrow form.
//!
//! Type mapping:
//!
//! | Arrow                          | DataType   |
//! |--------------------------------|------------|
//! | `Boolean`                      | `Boolean`  |
//! | `Int64`                        | `Int64`    |
//! | `Float64`                      | `Float64`  |
//! | `Utf8`, `LargeUtf8`            | `String`   |
//! | `FixedSizeBinary(16)` (BE)     | `Uint128`  |
//! | `Timestamp(Nanosecond, _)`     | `Time64Ns` |
//!
//! A field's semantic type is read from its metadata under
//! [`SEMANTIC_TYPE_METADATA_KEY`] (the numeric wire code).

use super::wire::{DecodeError, RawColumnSchema, RawSchema, RowBatch, WireColumn, WireUint128};
use crate::types::{DataType, SemanticType};
use arrow::array::{
    Array, BooleanArray, FixedSizeBinaryArray, Float64Array, Int64Array, LargeStringArray,
    StringArray, TimestampNanosecondArray,
};
use arrow::datatypes::{DataType as ArrowDataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;

/// Arrow field metadata key carrying the semantic wire code
pub const SEMANTIC_TYPE_METADATA_KEY: &str = "tablemux.semantic_type";

fn unsupported(field: &Field) -> DecodeError {
    DecodeError::UnsupportedArrowType {
        column: field.name().clone(),
        arrow_type: field.data_type().to_string(),
    }
}

/// Map an Arrow field type onto the closed type set
pub fn data_type_from_arrow(field: &Field) -> Result<DataType, DecodeError> {
    match field.data_type() {
        ArrowDataType::Boolean => Ok(DataType::Boolean),
        ArrowDataType::Int64 => Ok(DataType::Int64),
        ArrowDataType::Float64 => Ok(DataType::Float64),
        ArrowDataType::Utf8 | ArrowDataType::LargeUtf8 => Ok(DataType::String),
        ArrowDataType::FixedSizeBinary(16) => Ok(DataType::Uint128),
        ArrowDataType::Timestamp(TimeUnit::Nanosecond, _) => Ok(DataType::Time64Ns),
        _ => Err(unsupported(field)),
    }
}

fn semantic_type_from_field(field: &Field) -> SemanticType {
    field
        .metadata()
        .get(SEMANTIC_TYPE_METADATA_KEY)
        .and_then(|code| code.parse::<i32>().ok())
        .map_or(SemanticType::None, SemanticType::from_wire_code)
}

fn downcast<'a, T: 'static>(field: &Field, array: &'a dyn Array) -> Result<&'a T, DecodeError> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| unsupported(field))
}

fn column_from_arrow(field: &Field, array: &dyn Array) -> Result<WireColumn, DecodeError> {
    if array.null_count() > 0 {
        let row = (0..array.len()).find(|&i| array.is_null(i)).unwrap_or(0);
        return Err(DecodeError::NullValue {
            column: field.name().clone(),
            row,
        });
    }

    let column = match data_type_from_arrow(field)? {
        DataType::Boolean => {
            let arr = downcast::<BooleanArray>(field, array)?;
            WireColumn::Boolean((0..arr.len()).map(|i| arr.value(i)).collect())
        }
        DataType::Int64 => {
            WireColumn::Int64(downcast::<Int64Array>(field, array)?.values().to_vec())
        }
        DataType::Float64 => {
            WireColumn::Float64(downcast::<Float64Array>(field, array)?.values().to_vec())
        }
        DataType::Time64Ns => WireColumn::Time64Ns(
            downcast::<TimestampNanosecondArray>(field, array)?
                .values()
                .to_vec(),
        ),
        DataType::String => match field.data_type() {
            ArrowDataType::LargeUtf8 => {
                let arr = downcast::<LargeStringArray>(field, array)?;
                WireColumn::String((0..arr.len()).map(|i| arr.value(i).to_string()).collect())
            }
            _ => {
                let arr = downcast::<StringArray>(field, array)?;
                WireColumn::String((0..arr.len()).map(|i| arr.value(i).to_string()).collect())
            }
        },
        DataType::Uint128 => {
            let arr = downcast::<FixedSizeBinaryArray>(field, array)?;
            let values = (0..arr.len())
                .map(|i| {
                    <[u8; 16]>::try_from(arr.value(i))
                        .map(|bytes| WireUint128::from(u128::from_be_bytes(bytes)))
                        .map_err(|_| unsupported(field))
                })
                .collect::<Result<Vec<_>, _>>()?;
            WireColumn::Uint128(values)
        }
    };
    Ok(column)
}

impl RawSchema {
    /// Wire schema for an Arrow schema
    pub fn from_arrow(name: impl Into<String>, schema: &Schema) -> Result<Self, DecodeError> {
        let columns = schema
            .fields()
            .iter()
            .map(|field| {
                Ok(RawColumnSchema::new(
                    field.name().clone(),
                    data_type_from_arrow(field)?,
                    semantic_type_from_field(field),
                ))
            })
            .collect::<Result<Vec<_>, DecodeError>>()?;
        Ok(RawSchema::new(name, columns))
    }
}

impl RowBatch {
    /// Columnar row batch from an Arrow `RecordBatch`.
    ///
    /// Null values are rejected: the record model has no null datum.
    pub fn from_arrow(batch: &RecordBatch) -> Result<Self, DecodeError> {
        let schema = batch.schema();
        let columns = schema
            .fields()
            .iter()
            .zip(batch.columns())
            .map(|(field, array)| column_from_arrow(field, array.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RowBatch {
            columns,
            num_rows: batch.num_rows(),
        })
    }
}
