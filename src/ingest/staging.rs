//! Raw records staged as Parquet parts.
//!
//! Readers push rows into a [`Stager`], which flushes every [`CHUNK_ROWS`]
//! rows to a numbered part file, so a source never sits in memory whole.
//! Every column is nullable Utf8. A trailing [`ORDINAL`] column records the
//! global read order so ranking ties can keep the earliest record.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use super::parquet_io::write_batch;
use super::IngestError;

/// Read-order column appended to every staged part.
pub const ORDINAL: &str = "__ordinal";

/// Rows buffered before a part is written.
pub const CHUNK_ROWS: usize = 16_384;

/// A raw value: text, or null for empty/missing fields.
pub type Cell = Option<String>;

/// A finished staging directory.
#[derive(Debug, Clone)]
pub struct StagedTable {
    pub dir: PathBuf,
    pub rows: usize,
}

pub struct Stager {
    dir: PathBuf,
    columns: Vec<String>,
    index: HashMap<String, usize>,
    pending: Vec<Vec<Cell>>,
    ordinal: i64,
    parts: usize,
    rows: usize,
}

impl Stager {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, IngestError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            columns: Vec::new(),
            index: HashMap::new(),
            pending: Vec::new(),
            ordinal: 0,
            parts: 0,
            rows: 0,
        })
    }

    /// Start a file with a fixed header and return the slot of each name.
    /// Pending rows are flushed first so a part never mixes headers.
    pub fn begin_file(&mut self, headers: &[String]) -> Result<Vec<usize>, IngestError> {
        self.flush()?;
        self.columns.clear();
        self.index.clear();
        Ok(headers.iter().map(|h| self.slot(h)).collect())
    }

    /// Append a row whose values line up with `slots`.
    pub fn push_row(
        &mut self,
        slots: &[usize],
        values: impl IntoIterator<Item = Cell>,
    ) -> Result<(), IngestError> {
        let mut row = vec![None; self.columns.len()];
        for (slot, value) in slots.iter().zip(values) {
            row[*slot] = value;
        }
        self.push(row)
    }

    /// Append a record by column name; unseen names become new columns.
    pub fn push_record(
        &mut self,
        fields: impl IntoIterator<Item = (String, Cell)>,
    ) -> Result<(), IngestError> {
        let mut row = Vec::new();
        for (name, value) in fields {
            let slot = self.slot(&name);
            if row.len() <= slot {
                row.resize(slot + 1, None);
            }
            row[slot] = value;
        }
        self.push(row)
    }

    /// Flush what is left. `None` when nothing, not even a header, was seen.
    pub fn finish(mut self) -> Result<Option<StagedTable>, IngestError> {
        if self.parts == 0 && self.pending.is_empty() && !self.columns.is_empty() {
            // Header only: an empty part keeps the columns resolvable.
            self.write_part()?;
        } else {
            self.flush()?;
        }
        if self.parts == 0 {
            return Ok(None);
        }
        Ok(Some(StagedTable {
            dir: self.dir,
            rows: self.rows,
        }))
    }

    fn slot(&mut self, name: &str) -> usize {
        if let Some(slot) = self.index.get(name) {
            return *slot;
        }
        self.columns.push(name.to_string());
        self.index.insert(name.to_string(), self.columns.len() - 1);
        self.columns.len() - 1
    }

    fn push(&mut self, row: Vec<Cell>) -> Result<(), IngestError> {
        self.pending.push(row);
        self.ordinal += 1;
        if self.pending.len() >= CHUNK_ROWS {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), IngestError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.write_part()
    }

    fn write_part(&mut self) -> Result<(), IngestError> {
        let batch = self.pending_batch()?;
        let path = self.dir.join(format!("part-{:05}.parquet", self.parts));
        write_batch(&batch, &path)?;
        self.parts += 1;
        self.rows += self.pending.len();
        self.pending.clear();
        Ok(())
    }

    fn pending_batch(&self) -> Result<RecordBatch, IngestError> {
        let mut fields: Vec<Field> = self
            .columns
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect();
        fields.push(Field::new(ORDINAL, DataType::Int64, false));

        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(fields.len());
        for column in 0..self.columns.len() {
            let mut builder = StringBuilder::new();
            for row in &self.pending {
                builder.append_option(row.get(column).and_then(|v| v.as_deref()));
            }
            arrays.push(Arc::new(builder.finish()));
        }
        let first = self.ordinal - self.pending.len() as i64;
        arrays.push(Arc::new(Int64Array::from_iter_values(first..self.ordinal)));

        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
    }
}

/// Every staged row back as JSON maps, parts in order.
#[cfg(test)]
pub(super) fn staged_rows(staged: &StagedTable) -> Vec<crate::store::Row> {
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    let mut parts: Vec<PathBuf> = fs::read_dir(&staged.dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    parts.sort();
    let mut batches = Vec::new();
    for part in parts {
        let reader = ParquetRecordBatchReaderBuilder::try_new(fs::File::open(part).unwrap())
            .unwrap()
            .build()
            .unwrap();
        for batch in reader {
            batches.push(batch.unwrap());
        }
    }
    crate::store::batches_to_rows(&batches).unwrap()
}
