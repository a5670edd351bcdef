//! Fixed target schemas and typed cell values

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Logical column type guaranteed by a [`FixedSchema`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    /// UTF-8 string
    Utf8,
    /// 64-bit signed integer
    Int64,
    /// 64-bit float
    Float64,
    /// Timestamp normalized to UTC
    TimestampUtc,
}

impl LogicalType {
    /// DuckDB column type used when creating the store table
    pub fn duckdb_type(&self) -> &'static str {
        match self {
            LogicalType::Utf8 => "VARCHAR",
            LogicalType::Int64 => "BIGINT",
            LogicalType::Float64 => "DOUBLE",
            LogicalType::TimestampUtc => "TIMESTAMPTZ",
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogicalType::Utf8 => "string",
            LogicalType::Int64 => "int64",
            LogicalType::Float64 => "float64",
            LogicalType::TimestampUtc => "timestamp[utc]",
        };
        write!(f, "{s}")
    }
}

impl FromStr for LogicalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" | "utf8" | "varchar" | "text" => Ok(LogicalType::Utf8),
            "int64" | "bigint" | "number" | "integer" => Ok(LogicalType::Int64),
            "float64" | "double" | "float" => Ok(LogicalType::Float64),
            "timestamp" | "timestamp[utc]" | "timestamp_ntz" | "timestamp_tz" | "timestamptz" => {
                Ok(LogicalType::TimestampUtc)
            }
            _ => Err(format!("Invalid logical type: {s}")),
        }
    }
}

/// One column of a fixed schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name as returned by the query API and stored in the database
    pub name: &'static str,
    /// Logical type the raw cell is cast to
    pub logical_type: LogicalType,
}

impl ColumnDef {
    /// Declare a column
    pub const fn new(name: &'static str, logical_type: LogicalType) -> Self {
        Self { name, logical_type }
    }
}

/// Static description of the table every ingestion run must produce.
///
/// Column order here is the column order of the assembled table, the
/// intermediate Parquet file and the store table, independent of what the
/// query API returns.
#[derive(Debug, PartialEq, Eq)]
pub struct FixedSchema {
    /// Store table name
    pub table: &'static str,
    /// Ordered column definitions
    pub columns: &'static [ColumnDef],
    /// Timestamp column the assembled table is sorted by
    pub sort_column: &'static str,
    /// Primary key of the store table
    pub primary_key: &'static [&'static str],
}

impl FixedSchema {
    /// Position of a column in the schema
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Whether a column belongs to the schema
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Whether a column is part of the primary key
    pub fn is_primary_key(&self, name: &str) -> bool {
        self.primary_key.contains(&name)
    }

    /// Column names in schema order
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    /// Check that the sort column and key columns exist with usable types
    pub fn validate(&self) -> Result<(), String> {
        match self.columns.iter().find(|c| c.name == self.sort_column) {
            Some(col) if col.logical_type == LogicalType::TimestampUtc => {}
            Some(col) => {
                return Err(format!(
                    "Sort column '{}' must be a timestamp, found {}",
                    col.name, col.logical_type
                ))
            }
            None => {
                return Err(format!(
                    "Sort column '{}' is not part of schema '{}'",
                    self.sort_column, self.table
                ))
            }
        }

        if self.primary_key.is_empty() {
            return Err(format!("Schema '{}' has no primary key", self.table));
        }

        for key in self.primary_key {
            if !self.contains(key) {
                return Err(format!(
                    "Primary key column '{}' is not part of schema '{}'",
                    key, self.table
                ));
            }
        }

        Ok(())
    }
}

/// Solana token transfers, keyed by (block, transaction, intra-transaction index)
pub static TRANSFERS: FixedSchema = FixedSchema {
    table: "transfers",
    columns: &[
        ColumnDef::new("fact_transfers_id", LogicalType::Utf8),
        ColumnDef::new("block_timestamp", LogicalType::TimestampUtc),
        ColumnDef::new("block_id", LogicalType::Int64),
        ColumnDef::new("tx_id", LogicalType::Utf8),
        ColumnDef::new("index", LogicalType::Utf8),
        ColumnDef::new("tx_from", LogicalType::Utf8),
        ColumnDef::new("tx_to", LogicalType::Utf8),
        ColumnDef::new("amount", LogicalType::Float64),
        ColumnDef::new("mint", LogicalType::Utf8),
        ColumnDef::new("inserted_timestamp", LogicalType::TimestampUtc),
        ColumnDef::new("modified_timestamp", LogicalType::TimestampUtc),
    ],
    sort_column: "block_timestamp",
    primary_key: &["block_id", "tx_id", "index"],
};

/// A typed cell of an assembled table
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing value
    Null,
    /// String value
    Utf8(String),
    /// Integer value
    Int64(i64),
    /// Float value
    Float64(f64),
    /// UTC timestamp
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Whether the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Timestamp payload, if any
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Utf8(s) => write!(f, "{s}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}
