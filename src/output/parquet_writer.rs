//! Parquet writer for assembled tables
//!
//! Timestamps are written as microsecond precision with a `UTC` zone so they
//! load into DuckDB as `TIMESTAMPTZ` without reinterpretation.

use arrow::array::{
    ArrayRef, Float64Builder, Int64Builder, StringBuilder, TimestampMicrosecondBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::{WriterProperties, WriterVersion};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::{OutputError, OutputResult, TableWriter, WriteSummary};
use crate::table::{AssembledTable, FixedSchema, LogicalType, Value};

/// Rows per Parquet row group
const DEFAULT_ROW_GROUP_SIZE: usize = 100_000;

/// Arrow schema for a fixed schema; key columns are non-nullable
pub fn arrow_schema(schema: &FixedSchema) -> SchemaRef {
    let fields: Vec<Field> = schema
        .columns
        .iter()
        .map(|col| {
            let data_type = match col.logical_type {
                LogicalType::Utf8 => DataType::Utf8,
                LogicalType::Int64 => DataType::Int64,
                LogicalType::Float64 => DataType::Float64,
                LogicalType::TimestampUtc => {
                    DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
                }
            };
            Field::new(col.name, data_type, !schema.is_primary_key(col.name))
        })
        .collect();
    Arc::new(Schema::new(fields))
}

/// Convert an assembled table into a single record batch
pub fn to_record_batch(table: &AssembledTable) -> OutputResult<RecordBatch> {
    let schema = table.schema();
    let num_rows = table.num_rows();

    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(schema.columns.len());
    for (idx, col) in schema.columns.iter().enumerate() {
        let values = table.rows().iter().map(|row| &row[idx]);
        let array: ArrayRef = match col.logical_type {
            LogicalType::Utf8 => {
                let mut builder = StringBuilder::with_capacity(num_rows, num_rows * 16);
                for v in values {
                    match v {
                        Value::Utf8(s) => builder.append_value(s),
                        Value::Null => builder.append_null(),
                        other => return Err(type_mismatch(col.name, other)),
                    }
                }
                Arc::new(builder.finish())
            }
            LogicalType::Int64 => {
                let mut builder = Int64Builder::with_capacity(num_rows);
                for v in values {
                    match v {
                        Value::Int64(i) => builder.append_value(*i),
                        Value::Null => builder.append_null(),
                        other => return Err(type_mismatch(col.name, other)),
                    }
                }
                Arc::new(builder.finish())
            }
            LogicalType::Float64 => {
                let mut builder = Float64Builder::with_capacity(num_rows);
                for v in values {
                    match v {
                        Value::Float64(f) => builder.append_value(*f),
                        Value::Null => builder.append_null(),
                        other => return Err(type_mismatch(col.name, other)),
                    }
                }
                Arc::new(builder.finish())
            }
            LogicalType::TimestampUtc => {
                let mut builder =
                    TimestampMicrosecondBuilder::with_capacity(num_rows).with_timezone("UTC");
                for v in values {
                    match v {
                        Value::Timestamp(ts) => builder.append_value(ts.timestamp_micros()),
                        Value::Null => builder.append_null(),
                        other => return Err(type_mismatch(col.name, other)),
                    }
                }
                Arc::new(builder.finish())
            }
        };
        arrays.push(array);
    }

    RecordBatch::try_new(arrow_schema(schema), arrays)
        .map_err(|e| OutputError::ArrowError(e.to_string()))
}

fn type_mismatch(column: &str, value: &Value) -> OutputError {
    OutputError::ArrowError(format!(
        "value {value:?} does not match the type of column '{column}'"
    ))
}

/// Writes assembled tables to Parquet files
#[derive(Debug, Clone)]
pub struct ParquetTableWriter {
    max_row_group_size: usize,
}

impl ParquetTableWriter {
    /// Create a writer with the default row group size
    pub fn new() -> Self {
        Self {
            max_row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }

    /// Override the row group size
    pub fn with_row_group_size(mut self, max_row_group_size: usize) -> Self {
        self.max_row_group_size = max_row_group_size.max(1);
        self
    }

    fn writer_properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_writer_version(WriterVersion::PARQUET_2_0)
            .set_compression(Compression::SNAPPY)
            .set_max_row_group_size(self.max_row_group_size)
            .build()
    }
}

impl Default for ParquetTableWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl TableWriter for ParquetTableWriter {
    fn write_table(&self, table: &AssembledTable, path: &Path) -> OutputResult<WriteSummary> {
        info!("Creating Parquet file: path={}", path.display());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| OutputError::IoError(format!("Failed to create directory: {e}")))?;
        }

        let batch = to_record_batch(table)?;
        let file = File::create(path)
            .map_err(|e| OutputError::IoError(format!("Failed to create file: {e}")))?;

        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(self.writer_properties()))
            .map_err(|e| OutputError::ParquetError(e.to_string()))?;
        writer
            .write(&batch)
            .map_err(|e| OutputError::ParquetError(e.to_string()))?;
        writer
            .close()
            .map_err(|e| OutputError::ParquetError(e.to_string()))?;

        let bytes_written = std::fs::metadata(path).ok().map(|m| m.len());
        debug!(rows = batch.num_rows(), bytes = ?bytes_written, "Parquet file closed");

        Ok(WriteSummary {
            rows: batch.num_rows(),
            bytes_written,
        })
    }
}
