//! Table assembly: raw page rows → typed, schema-conformant, time-ordered table
//!
//! The query API reports its own column list and ordering and may add
//! bookkeeping columns (for example `__row_index`). [`assemble`] maps raw rows
//! onto a [`FixedSchema`] so the output shape depends only on the schema:
//!
//! 1. Label raw cells with the declared API columns
//! 2. Drop columns the schema does not know
//! 3. Cast every schema column to its [`LogicalType`]
//! 4. Normalize timestamps to UTC
//! 5. Sort ascending by the schema's timestamp column

pub mod cast;
pub mod schema;

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::RawRow;
pub use cast::{cast_cell, parse_timestamp_utc};
pub use schema::{ColumnDef, FixedSchema, LogicalType, Value, TRANSFERS};

/// Table assembly errors
#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    /// Schema definition is unusable
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// A schema column is absent from the API response
    #[error("column '{0}' missing from query result columns")]
    MissingColumn(String),

    /// A raw row does not line up with the declared columns
    #[error("row {row} has {actual} cells, expected {expected}")]
    RowWidth {
        /// Row position in the buffer
        row: usize,
        /// Declared column count
        expected: usize,
        /// Cells found
        actual: usize,
    },

    /// A value could not be cast to its schema type
    #[error("cannot cast value {value:?} in column '{column}' (row {row}) to {logical_type}")]
    SchemaCast {
        /// Column name
        column: String,
        /// Row position in the buffer
        row: usize,
        /// Raw cell text
        value: String,
        /// Target type
        logical_type: LogicalType,
    },

    /// A primary key column holds a null
    #[error("null primary key column '{column}' at row {row}")]
    NullPrimaryKey {
        /// Column name
        column: String,
        /// Row position in the buffer
        row: usize,
    },
}

/// Result type for assembly operations
pub type AssembleResult<T> = Result<T, AssembleError>;

/// Typed rows conforming to a fixed schema, sorted by its timestamp column
#[derive(Debug, Clone)]
pub struct AssembledTable {
    schema: &'static FixedSchema,
    rows: Vec<Vec<Value>>,
    duplicates_dropped: usize,
}

impl AssembledTable {
    /// Schema the table conforms to
    pub fn schema(&self) -> &'static FixedSchema {
        self.schema
    }

    /// Column names in output order
    pub fn column_names(&self) -> Vec<&'static str> {
        self.schema.column_names()
    }

    /// Number of rows
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Typed rows in sorted order
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Values of one column in row order
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value> + '_> {
        let idx = self.schema.position(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Rows dropped because their primary key already appeared in this run
    pub fn duplicates_dropped(&self) -> usize {
        self.duplicates_dropped
    }
}

/// Build an [`AssembledTable`] from the accumulated row buffer
///
/// # Arguments
/// * `rows` - Raw rows in any order, aligned to `declared_columns`
/// * `declared_columns` - Column labels as returned by the query API
/// * `schema` - Target schema
///
/// # Errors
/// Any cast failure, missing schema column, misaligned row or null key is fatal.
pub fn assemble(
    rows: Vec<RawRow>,
    declared_columns: &[String],
    schema: &'static FixedSchema,
) -> AssembleResult<AssembledTable> {
    schema.validate().map_err(AssembleError::InvalidSchema)?;

    // Source index for every schema column, in schema order
    let mut source_index = Vec::with_capacity(schema.columns.len());
    for col in schema.columns {
        let idx = declared_columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(col.name))
            .ok_or_else(|| AssembleError::MissingColumn(col.name.to_string()))?;
        source_index.push(idx);
    }

    let dropped: Vec<&str> = declared_columns
        .iter()
        .filter(|c| !schema.columns.iter().any(|s| c.eq_ignore_ascii_case(s.name)))
        .map(String::as_str)
        .collect();
    if !dropped.is_empty() {
        debug!(columns = ?dropped, "Dropping columns not in schema '{}'", schema.table);
    }

    let mut typed = Vec::with_capacity(rows.len());
    for (row_pos, raw) in rows.into_iter().enumerate() {
        if raw.len() != declared_columns.len() {
            return Err(AssembleError::RowWidth {
                row: row_pos,
                expected: declared_columns.len(),
                actual: raw.len(),
            });
        }

        let mut out = Vec::with_capacity(schema.columns.len());
        for (col, &idx) in schema.columns.iter().zip(&source_index) {
            let cell = raw[idx].as_deref();
            let value = cast_cell(cell, col.logical_type).ok_or_else(|| {
                AssembleError::SchemaCast {
                    column: col.name.to_string(),
                    row: row_pos,
                    value: cell.unwrap_or_default().to_string(),
                    logical_type: col.logical_type,
                }
            })?;

            if value.is_null() && schema.is_primary_key(col.name) {
                return Err(AssembleError::NullPrimaryKey {
                    column: col.name.to_string(),
                    row: row_pos,
                });
            }
            out.push(value);
        }
        typed.push(out);
    }

    // Stable sort; None orders before Some, so null timestamps lead
    let sort_idx = schema
        .position(schema.sort_column)
        .ok_or_else(|| AssembleError::MissingColumn(schema.sort_column.to_string()))?;
    typed.sort_by_key(|row| row[sort_idx].as_timestamp());

    let before = typed.len();
    let typed = dedup_primary_key(typed, schema);
    let duplicates_dropped = before - typed.len();
    if duplicates_dropped > 0 {
        warn!(
            duplicates = duplicates_dropped,
            "Dropped rows with repeated primary keys"
        );
    }

    Ok(AssembledTable {
        schema,
        rows: typed,
        duplicates_dropped,
    })
}

/// Keep the first row for each primary key tuple, preserving order
fn dedup_primary_key(rows: Vec<Vec<Value>>, schema: &FixedSchema) -> Vec<Vec<Value>> {
    let key_idx: Vec<usize> = schema
        .primary_key
        .iter()
        .filter_map(|k| schema.position(k))
        .collect();

    let mut seen = HashSet::with_capacity(rows.len());
    rows.into_iter()
        .filter(|row| {
            let key: Vec<String> = key_idx.iter().map(|&i| row[i].to_string()).collect();
            seen.insert(key)
        })
        .collect()
}
