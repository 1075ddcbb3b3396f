//! Streaming `;`-separated export.
//!
//! The header is one chunk, then each row is its own chunk. Batches are pulled
//! from the execution stream on demand, so dropping the consumer stops the
//! query.

use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::record_batch::RecordBatch;
use arrow::compute::cast;
use arrow::csv::WriterBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use bytes::Bytes;
use datafusion::physical_plan::SendableRecordBatchStream;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::catalog::ColumnCatalog;
use crate::store::StoreError;

/// Default maximum number of exported rows.
pub const EXPORT_ROW_CAP: usize = 100_000;

pub const DELIMITER: u8 = b';';

pub type ExportStream = BoxStream<'static, Result<Bytes, StoreError>>;

/// Header chunk followed by one chunk per row of `batches`.
pub fn csv_stream(catalog: &ColumnCatalog, batches: SendableRecordBatchStream) -> ExportStream {
    let header = header_chunk(catalog);
    let rows = batches
        .map_err(StoreError::from)
        .map_ok(|batch| stream::iter(row_chunks(&batch)))
        .try_flatten();
    stream::once(async move { header }).chain(rows).boxed()
}

fn text_schema(catalog: &ColumnCatalog) -> Arc<Schema> {
    let fields: Vec<Field> = catalog
        .default_columns
        .iter()
        .map(|name| Field::new(*name, DataType::Utf8, true))
        .collect();
    Arc::new(Schema::new(fields))
}

fn header_chunk(catalog: &ColumnCatalog) -> Result<Bytes, StoreError> {
    let empty = RecordBatch::new_empty(text_schema(catalog));
    Ok(encode(&empty, true)?)
}

fn row_chunks(batch: &RecordBatch) -> Vec<Result<Bytes, StoreError>> {
    let batch = match as_text(batch) {
        Ok(batch) => batch,
        Err(e) => return vec![Err(e.into())],
    };
    (0..batch.num_rows())
        .map(|i| encode(&batch.slice(i, 1), false).map_err(StoreError::from))
        .collect()
}

/// Cast every column to Utf8 so values render exactly as stored.
fn as_text(batch: &RecordBatch) -> Result<RecordBatch, ArrowError> {
    let columns = batch
        .columns()
        .iter()
        .map(|c| match c.data_type() {
            DataType::Utf8 => Ok(Arc::clone(c)),
            _ => cast(c, &DataType::Utf8),
        })
        .collect::<Result<Vec<ArrayRef>, _>>()?;
    let fields: Vec<Field> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| Field::new(f.name(), DataType::Utf8, true))
        .collect();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
}

fn encode(batch: &RecordBatch, header: bool) -> Result<Bytes, ArrowError> {
    let mut writer = WriterBuilder::new()
        .with_header(header)
        .with_delimiter(DELIMITER)
        .build(Vec::new());
    writer.write(batch)?;
    Ok(Bytes::from(writer.into_inner()))
}
