//! # Table Data Model
//!
//! Column schemas, table metadata, and the type-erased values carried by
//! every record of a result table.
//!
//! ## Design Decisions
//!
//! - **Closed physical types**: [`DataType`] is a fixed set of primitive kinds.
//!   Every [`Datum`] variant corresponds to exactly one of them.
//! - **Open semantic tags**: [`SemanticType`] layers meaning (an address, a
//!   duration, a pod name) on top of the physical type without changing it.
//!   Codes this crate does not know are kept as [`SemanticType::Unknown`].
//! - **Checked metadata**: [`TableMetadata`] is validated once at construction
//!   and then shared read-only (`Arc`) by every record of the table.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tablemux::types::{ColumnSchema, DataType, SemanticType, TableMetadata};
//!
//! let metadata = TableMetadata::new(
//!     "http_events",
//!     vec![
//!         ColumnSchema::new("upid", DataType::Uint128, SemanticType::Upid),
//!         ColumnSchema::new("http_req_path", DataType::String, SemanticType::None),
//!     ],
//! )?;
//!
//! assert_eq!(metadata.index_of("http_req_path"), 1);
//! assert_eq!(metadata.index_of("missing"), -1);
//! ```

pub mod datum;
pub mod record;

pub use datum::{Datum, TypeMismatch};
pub use record::{Record, RecordShapeError};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Index returned by [`TableMetadata::index_of`] for a column that does not exist.
pub const COLUMN_NOT_FOUND: i64 = -1;

/// Physical representation of a column's values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int64,
    /// 128-bit unsigned integer (process and agent identifiers)
    Uint128,
    Float64,
    String,
    /// Nanoseconds since the Unix epoch
    Time64Ns,
}

impl DataType {
    /// Map a wire type code onto the closed type set.
    ///
    /// Code `0` is the wire's "unknown" marker and is rejected like any other
    /// unrecognized code.
    pub fn from_wire_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(DataType::Boolean),
            2 => Some(DataType::Int64),
            3 => Some(DataType::Uint128),
            4 => Some(DataType::Float64),
            5 => Some(DataType::String),
            6 => Some(DataType::Time64Ns),
            _ => None,
        }
    }

    /// The wire type code for this type
    pub fn wire_code(self) -> i32 {
        match self {
            DataType::Boolean => 1,
            DataType::Int64 => 2,
            DataType::Uint128 => 3,
            DataType::Float64 => 4,
            DataType::String => 5,
            DataType::Time64Ns => 6,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Int64 => write!(f, "INT64"),
            DataType::Uint128 => write!(f, "UINT128"),
            DataType::Float64 => write!(f, "FLOAT64"),
            DataType::String => write!(f, "STRING"),
            DataType::Time64Ns => write!(f, "TIME64NS"),
        }
    }
}

/// Domain meaning of a column, independent of its physical type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SemanticType {
    Unspecified,
    #[default]
    None,
    TimeNs,
    AgentUid,
    Asid,
    Upid,
    ServiceName,
    PodName,
    PodPhase,
    PodStatus,
    NodeName,
    ContainerName,
    ContainerState,
    ContainerStatus,
    NamespaceName,
    Bytes,
    Percent,
    DurationNs,
    ThroughputPerNs,
    ThroughputBytesPerNs,
    Quantiles,
    DurationNsQuantiles,
    IpAddress,
    Port,
    HttpReqMethod,
    HttpRespStatus,
    HttpRespMessage,
    ScriptReference,
    /// A semantic code this crate has no name for
    ///
    /// Build it through [`SemanticType::from_wire_code`]; `Unknown` holding a
    /// named code (e.g. `Unknown(200)`) decodes back as the named variant.
    Unknown(i32),
}

impl SemanticType {
    /// Map a wire semantic code. Never fails: unrecognized codes are preserved.
    pub fn from_wire_code(code: i32) -> Self {
        match code {
            0 => SemanticType::Unspecified,
            1 => SemanticType::None,
            2 => SemanticType::TimeNs,
            100 => SemanticType::AgentUid,
            101 => SemanticType::Asid,
            200 => SemanticType::Upid,
            300 => SemanticType::ServiceName,
            400 => SemanticType::PodName,
            401 => SemanticType::PodPhase,
            402 => SemanticType::PodStatus,
            500 => SemanticType::NodeName,
            600 => SemanticType::ContainerName,
            601 => SemanticType::ContainerState,
            602 => SemanticType::ContainerStatus,
            700 => SemanticType::NamespaceName,
            800 => SemanticType::Bytes,
            900 => SemanticType::Percent,
            901 => SemanticType::DurationNs,
            902 => SemanticType::ThroughputPerNs,
            903 => SemanticType::ThroughputBytesPerNs,
            1000 => SemanticType::Quantiles,
            1001 => SemanticType::DurationNsQuantiles,
            1100 => SemanticType::IpAddress,
            1200 => SemanticType::Port,
            1300 => SemanticType::HttpReqMethod,
            1400 => SemanticType::HttpRespStatus,
            1500 => SemanticType::HttpRespMessage,
            3000 => SemanticType::ScriptReference,
            other => SemanticType::Unknown(other),
        }
    }

    /// The wire semantic code for this tag
    pub fn wire_code(self) -> i32 {
        match self {
            SemanticType::Unspecified => 0,
            SemanticType::None => 1,
            SemanticType::TimeNs => 2,
            SemanticType::AgentUid => 100,
            SemanticType::Asid => 101,
            SemanticType::Upid => 200,
            SemanticType::ServiceName => 300,
            SemanticType::PodName => 400,
            SemanticType::PodPhase => 401,
            SemanticType::PodStatus => 402,
            SemanticType::NodeName => 500,
            SemanticType::ContainerName => 600,
            SemanticType::ContainerState => 601,
            SemanticType::ContainerStatus => 602,
            SemanticType::NamespaceName => 700,
            SemanticType::Bytes => 800,
            SemanticType::Percent => 900,
            SemanticType::DurationNs => 901,
            SemanticType::ThroughputPerNs => 902,
            SemanticType::ThroughputBytesPerNs => 903,
            SemanticType::Quantiles => 1000,
            SemanticType::DurationNsQuantiles => 1001,
            SemanticType::IpAddress => 1100,
            SemanticType::Port => 1200,
            SemanticType::HttpReqMethod => 1300,
            SemanticType::HttpRespStatus => 1400,
            SemanticType::HttpRespMessage => 1500,
            SemanticType::ScriptReference => 3000,
            SemanticType::Unknown(code) => code,
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SemanticType::Unspecified => "unspecified",
            SemanticType::None => "none",
            SemanticType::TimeNs => "time_ns",
            SemanticType::AgentUid => "agent_uid",
            SemanticType::Asid => "asid",
            SemanticType::Upid => "upid",
            SemanticType::ServiceName => "service_name",
            SemanticType::PodName => "pod_name",
            SemanticType::PodPhase => "pod_phase",
            SemanticType::PodStatus => "pod_status",
            SemanticType::NodeName => "node_name",
            SemanticType::ContainerName => "container_name",
            SemanticType::ContainerState => "container_state",
            SemanticType::ContainerStatus => "container_status",
            SemanticType::NamespaceName => "namespace_name",
            SemanticType::Bytes => "bytes",
            SemanticType::Percent => "percent",
            SemanticType::DurationNs => "duration_ns",
            SemanticType::ThroughputPerNs => "throughput_per_ns",
            SemanticType::ThroughputBytesPerNs => "throughput_bytes_per_ns",
            SemanticType::Quantiles => "quantiles",
            SemanticType::DurationNsQuantiles => "duration_ns_quantiles",
            SemanticType::IpAddress => "ip_address",
            SemanticType::Port => "port",
            SemanticType::HttpReqMethod => "http_req_method",
            SemanticType::HttpRespStatus => "http_resp_status",
            SemanticType::HttpRespMessage => "http_resp_message",
            SemanticType::ScriptReference => "script_reference",
            SemanticType::Unknown(code) => return write!(f, "unknown({code})"),
        };
        f.write_str(name)
    }
}

/// Errors raised while building table metadata
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Table name is empty
    #[error("Table name must not be empty")]
    EmptyTableName,
    /// A column has an empty name
    #[error("Column {index} of table '{table}' has an empty name")]
    EmptyColumnName { table: String, index: usize },
    /// Two columns share a name
    #[error("Duplicate column name '{column}' in table '{table}'")]
    DuplicateColumn { table: String, column: String },
    /// Wire type code outside the known set
    #[error("Column '{column}' of table '{table}' has unknown type code {code}")]
    UnknownTypeCode {
        table: String,
        column: String,
        code: i32,
    },
}

/// Per-column schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name
    pub name: String,
    /// Physical type of the column's values
    pub data_type: DataType,
    /// Domain meaning of the column
    #[serde(default)]
    pub semantic_type: SemanticType,
}

impl ColumnSchema {
    /// Create a column schema
    pub fn new(name: impl Into<String>, data_type: DataType, semantic_type: SemanticType) -> Self {
        ColumnSchema {
            name: name.into(),
            data_type,
            semantic_type,
        }
    }

    /// Create a column schema with no semantic tag
    pub fn plain(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, data_type, SemanticType::None)
    }
}

impl fmt::Display for ColumnSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.semantic_type {
            SemanticType::None | SemanticType::Unspecified => {
                write!(f, "{}:{}", self.name, self.data_type)
            }
            st => write!(f, "{}:{}({})", self.name, self.data_type, st),
        }
    }
}

/// Immutable schema of one result table.
///
/// Holds the ordered columns and a name→index map computed once at
/// construction, so lookups by name are O(1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    name: String,
    columns: Vec<ColumnSchema>,
    index_by_name: HashMap<String, usize>,
}

impl TableMetadata {
    /// Build table metadata, rejecting empty names and duplicate columns.
    ///
    /// A table with zero columns is legal.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSchema>) -> Result<Self, SchemaError> {
        let name = name.into();
        if name.is_empty() {
            return Err(SchemaError::EmptyTableName);
        }

        let mut index_by_name = HashMap::with_capacity(columns.len());
        for (index, column) in columns.iter().enumerate() {
            if column.name.is_empty() {
                return Err(SchemaError::EmptyColumnName {
                    table: name,
                    index,
                });
            }
            if index_by_name.insert(column.name.clone(), index).is_some() {
                return Err(SchemaError::DuplicateColumn {
                    table: name,
                    column: column.name.clone(),
                });
            }
        }

        Ok(TableMetadata {
            name,
            columns,
            index_by_name,
        })
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Columns in wire order
    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    /// Column at `index`, if any
    pub fn column(&self, index: usize) -> Option<&ColumnSchema> {
        self.columns.get(index)
    }

    /// Number of columns
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Position of a column, or [`COLUMN_NOT_FOUND`] (`-1`) if absent.
    pub fn index_of(&self, column: &str) -> i64 {
        self.position(column).map_or(COLUMN_NOT_FOUND, |i| i as i64)
    }

    /// Position of a column as an `Option`
    pub fn position(&self, column: &str) -> Option<usize> {
        self.index_by_name.get(column).copied()
    }

    /// Column names in wire order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Physical types in wire order
    pub fn data_types(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.data_type).collect()
    }
}

impl fmt::Display for TableMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{column}")?;
        }
        write!(f, ")")
    }
}
