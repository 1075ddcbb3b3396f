//! Parquet output for staged parts and built tables.

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use datafusion::dataframe::DataFrame;
use futures::StreamExt;
use parquet::arrow::{ArrowWriter, AsyncArrowWriter};
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

use super::IngestError;

pub const ROW_GROUP_SIZE: usize = 100_000;

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .set_max_row_group_size(ROW_GROUP_SIZE)
        .build()
}

/// Write one batch as a standalone Parquet file.
pub fn write_batch(batch: &RecordBatch, path: &Path) -> Result<(), IngestError> {
    let mut writer = ArrowWriter::try_new(File::create(path)?, batch.schema(), Some(writer_properties()))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

/// Execute `df` and stream its batches to `path` via a temporary sibling,
/// then rename into place. Returns the number of rows written.
pub async fn write_dataframe(df: DataFrame, path: &Path) -> Result<usize, IngestError> {
    let tmp = sibling(path, "tmp");
    let result = match stream_to(df, &tmp).await {
        Ok(rows) => tokio::fs::rename(&tmp, path).await.map(|_| rows).map_err(IngestError::from),
        Err(e) => Err(e),
    };
    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result
}

async fn stream_to(df: DataFrame, path: &Path) -> Result<usize, IngestError> {
    let mut batches = df.execute_stream().await?;
    let file = tokio::fs::File::create(path).await?;
    let mut writer = AsyncArrowWriter::try_new(file, batches.schema(), Some(writer_properties()))?;
    let mut rows = 0;
    while let Some(batch) = batches.next().await {
        let batch = batch?;
        rows += batch.num_rows();
        writer.write(&batch).await?;
    }
    writer.close().await?;
    Ok(rows)
}

/// `<path>.<suffix>`, e.g. `cig.parquet.bak`.
pub fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
