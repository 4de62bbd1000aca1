//! Partition file writing.
//!
//! Turns one partition's records into a single Parquet file with ZSTD
//! compression and column statistics. The file schema is driven by the
//! catalog, never by the batch: every catalog column is present in every
//! file, and attributes without a catalog column are dropped (they were
//! already reported to reconcile by the time we get here).

use crate::error::ExportError;
use crate::export::partition::PartitionId;
use crate::record::Record;
use crate::schema::catalog::{Catalog, ColumnOrigin};
use crate::schema::infer::ColumnType;
use arrow::array::{ArrayRef, Float64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const ZSTD_LEVEL: i32 = 3;

/// Arrow schema for a data file: every catalog column, nullable, in
/// catalog order. Partition columns live in the path, not here.
pub fn file_schema(catalog: &Catalog) -> SchemaRef {
    let fields: Vec<Field> = catalog
        .columns()
        .map(|col| {
            let data_type = match col.column_type {
                ColumnType::Double => DataType::Float64,
                ColumnType::String => DataType::Utf8,
            };
            Field::new(&col.name, data_type, true)
        })
        .collect();
    Arc::new(Schema::new(fields))
}

enum ColBuilder {
    Str(StringBuilder),
    Num(Float64Builder),
}

/// Write one partition's records to `path`, replacing any existing file.
/// Returns the number of rows written.
pub fn write_partition_file(
    path: &Path,
    catalog: &Catalog,
    partition: PartitionId,
    records: &[Record],
) -> Result<u64, ExportError> {
    let schema = file_schema(catalog);
    let iso_date = partition.iso_date();

    let mut builders: Vec<ColBuilder> = catalog
        .columns()
        .map(|col| match col.column_type {
            ColumnType::Double => ColBuilder::Num(Float64Builder::new()),
            ColumnType::String => ColBuilder::Str(StringBuilder::new()),
        })
        .collect();

    for record in records {
        for (col, builder) in catalog.columns().zip(builders.iter_mut()) {
            // The derived date column is filled from the partition, not
            // from record attributes.
            if col.origin == ColumnOrigin::ExtraDate {
                match builder {
                    ColBuilder::Str(b) => b.append_value(&iso_date),
                    ColBuilder::Num(_) => unreachable!("date column is string-typed"),
                }
                continue;
            }

            let value = record.get_ci(&col.name);
            match builder {
                // Coerce to the catalog type; unconvertible values are null
                ColBuilder::Num(b) => match value.and_then(|v| v.as_f64()) {
                    Some(n) => b.append_value(n),
                    None => b.append_null(),
                },
                ColBuilder::Str(b) => match value.and_then(|v| v.display_string()) {
                    Some(s) => b.append_value(s),
                    None => b.append_null(),
                },
            }
        }
    }

    let columns: Vec<ArrayRef> = builders
        .iter_mut()
        .map(|builder| match builder {
            ColBuilder::Str(b) => Arc::new(b.finish()) as ArrayRef,
            ColBuilder::Num(b) => Arc::new(b.finish()) as ArrayRef,
        })
        .collect();
    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, Some(writer_properties()?))?;
    writer.write(&batch)?;
    writer.close()?;

    debug!(
        partition = %partition,
        rows = records.len(),
        path = %path.display(),
        "Wrote partition file"
    );
    Ok(records.len() as u64)
}

fn writer_properties() -> Result<WriterProperties, ExportError> {
    let zstd_level = ZstdLevel::try_new(ZSTD_LEVEL)?;
    Ok(WriterProperties::builder()
        .set_compression(Compression::ZSTD(zstd_level))
        .set_statistics_enabled(parquet::file::properties::EnabledStatistics::Chunk)
        .build())
}
