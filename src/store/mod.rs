//! DuckDB store for assembled tables
//!
//! Loads go through the intermediate Parquet file with
//! `INSERT ... ON CONFLICT DO NOTHING`, so a row whose primary key is already
//! present is skipped rather than rejected. Loading the same file twice leaves
//! the table unchanged.

use duckdb::Connection;
use std::path::Path;
use tracing::{debug, info};

use crate::table::FixedSchema;

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// DuckDB error
    #[error("duckdb error: {0}")]
    Duckdb(#[from] duckdb::Error),

    /// Schema unusable as a store table
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Path cannot be passed to DuckDB
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of one idempotent load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    /// Rows present in the source file
    pub rows_offered: u64,
    /// Rows newly inserted
    pub rows_inserted: u64,
    /// Rows skipped because their key already existed
    pub rows_skipped: u64,
}

/// Handle on a DuckDB database file
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        debug!("Opening DuckDB database: {}", path.display());
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Create the table for `schema` if it does not exist
    pub fn create_table(&self, schema: &FixedSchema) -> StoreResult<()> {
        self.conn.execute_batch(&create_table_sql(schema)?)?;
        info!("Table '{}' ready", schema.table);
        Ok(())
    }

    /// Insert every row of a Parquet file, skipping existing primary keys
    ///
    /// Runs in one transaction; the report is derived from the table's row
    /// count before and after the insert.
    pub fn load_parquet(
        &mut self,
        schema: &FixedSchema,
        parquet_path: impl AsRef<Path>,
    ) -> StoreResult<LoadReport> {
        let parquet_path = parquet_path.as_ref();
        let source = parquet_path
            .to_str()
            .ok_or_else(|| StoreError::InvalidPath(parquet_path.display().to_string()))?;
        let source = format!("read_parquet({})", quote_literal(source));
        let table = quote_ident(schema.table);
        let columns = schema
            .columns
            .iter()
            .map(|c| quote_ident(c.name))
            .collect::<Vec<_>>()
            .join(", ");

        let tx = self.conn.transaction()?;

        let count_sql = format!("SELECT count(*) FROM {table}");
        let before: i64 = tx.query_row(&count_sql, [], |row| row.get(0))?;
        let offered: i64 =
            tx.query_row(&format!("SELECT count(*) FROM {source}"), [], |row| row.get(0))?;

        tx.execute(
            &format!(
                "INSERT INTO {table} ({columns}) SELECT {columns} FROM {source} ON CONFLICT DO NOTHING"
            ),
            [],
        )?;

        let after: i64 = tx.query_row(&count_sql, [], |row| row.get(0))?;
        tx.commit()?;

        let rows_offered = offered.max(0) as u64;
        let rows_inserted = (after - before).max(0) as u64;
        let report = LoadReport {
            rows_offered,
            rows_inserted,
            rows_skipped: rows_offered.saturating_sub(rows_inserted),
        };
        info!(
            table = schema.table,
            offered = report.rows_offered,
            inserted = report.rows_inserted,
            skipped = report.rows_skipped,
            "Loaded Parquet into store"
        );
        Ok(report)
    }

    /// Rows currently in the schema's table
    pub fn row_count(&self, schema: &FixedSchema) -> StoreResult<u64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT count(*) FROM {}", quote_ident(schema.table)),
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Most frequent values of a column with their row counts
    pub fn top_values(
        &self,
        schema: &FixedSchema,
        column: &str,
        limit: usize,
    ) -> StoreResult<Vec<(Option<String>, i64)>> {
        if !schema.contains(column) {
            return Err(StoreError::InvalidSchema(format!(
                "column '{column}' is not part of '{}'",
                schema.table
            )));
        }
        let column = quote_ident(column);
        let sql = format!(
            "SELECT CAST({column} AS VARCHAR), count(*) FROM {} \
             GROUP BY {column} ORDER BY count(*) DESC, 1 LIMIT {limit}",
            quote_ident(schema.table)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Row counts per hour of the schema's sort column, newest first
    ///
    /// Hours are UTC regardless of the host's zone.
    pub fn hourly_counts(&self, schema: &FixedSchema) -> StoreResult<Vec<(String, i64)>> {
        // Only registered when ICU is loaded; without it casts are already UTC
        if let Err(e) = self.conn.execute_batch("SET TimeZone = 'UTC'") {
            debug!("TimeZone setting unavailable: {}", e);
        }
        let ts = quote_ident(schema.sort_column);
        let sql = format!(
            "SELECT strftime(date_trunc('hour', CAST({ts} AS TIMESTAMP)), '%Y-%m-%d %H:00') AS ts_hour, \
             count(*) FROM {} WHERE {ts} IS NOT NULL GROUP BY ts_hour ORDER BY ts_hour DESC",
            quote_ident(schema.table)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

/// `CREATE TABLE IF NOT EXISTS` statement for a fixed schema
pub fn create_table_sql(schema: &FixedSchema) -> StoreResult<String> {
    schema.validate().map_err(StoreError::InvalidSchema)?;

    let mut defs: Vec<String> = schema
        .columns
        .iter()
        .map(|c| {
            let not_null = if schema.is_primary_key(c.name) {
                " NOT NULL"
            } else {
                ""
            };
            format!(
                "    {} {}{}",
                quote_ident(c.name),
                c.logical_type.duckdb_type(),
                not_null
            )
        })
        .collect();
    let key = schema
        .primary_key
        .iter()
        .map(|k| quote_ident(k))
        .collect::<Vec<_>>()
        .join(", ");
    defs.push(format!("    PRIMARY KEY ({key})"));

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
        quote_ident(schema.table),
        defs.join(",\n")
    ))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
