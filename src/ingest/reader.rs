//! Tolerant readers for the raw sources.
//!
//! Rows stream into a [`Stager`]. Malformed rows are dropped and counted;
//! only I/O failures abort a read.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use csv::{ByteRecord, ReaderBuilder};
use serde_json::{Map, Value};

use super::staging::{Cell, Stager};
use super::IngestError;

/// Delimiter of the OpenCUP extracts.
pub const EXTRACT_DELIMITER: u8 = b';';

/// Stage a quoted, header-first delimited file. Every value is text; empty
/// fields are null. Returns the number of dropped rows.
pub fn read_delimited(path: &Path, delimiter: u8, stager: &mut Stager) -> Result<usize, IngestError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .quote(b'"')
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let headers: Vec<String> = reader
        .byte_headers()?
        .iter()
        .map(|h| {
            String::from_utf8_lossy(h)
                .trim_start_matches('\u{feff}')
                .trim()
                .to_string()
        })
        .collect();
    let slots = stager.begin_file(&headers)?;

    let mut record = ByteRecord::new();
    let mut dropped = 0;
    loop {
        match reader.read_byte_record(&mut record) {
            Ok(false) => break,
            Ok(true) if record.len() == slots.len() => {
                stager.push_row(&slots, record.iter().map(text_cell))?;
            }
            Ok(true) => dropped += 1,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => return Err(e.into()),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "dropping malformed row");
                dropped += 1;
            }
        }
    }
    if dropped > 0 {
        tracing::warn!(path = %path.display(), dropped, "dropped malformed rows");
    }
    Ok(dropped)
}

fn text_cell(field: &[u8]) -> Cell {
    if field.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(field).into_owned())
    }
}

/// Stage the objects of a line-delimited JSON file.
///
/// Keys are lower-cased; lines that are not JSON objects are dropped.
/// Returns the number of dropped lines.
pub fn read_ndjson(path: &Path, stager: &mut Stager) -> Result<usize, IngestError> {
    let reader = BufReader::new(File::open(path)?);
    let mut dropped = 0;
    for line in reader.split(b'\n') {
        let line = line?;
        let line = line.trim_ascii();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_slice::<Map<String, Value>>(line) {
            Ok(object) => stager.push_record(
                object
                    .into_iter()
                    .map(|(key, value)| (key.to_lowercase(), json_cell(value))),
            )?,
            Err(_) => dropped += 1,
        }
    }
    if dropped > 0 {
        tracing::warn!(path = %path.display(), dropped, "dropped malformed JSON lines");
    }
    Ok(dropped)
}

/// Text form of a JSON value: numbers and booleans as written, nested
/// values as compact JSON.
fn json_cell(value: Value) -> Cell {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        nested => Some(nested.to_string()),
    }
}
