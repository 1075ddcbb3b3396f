//! Per-stage working area: staged sources registered in a bounded session.
//!
//! Deduplication, joins and ordering run as SQL over the staged Parquet
//! parts, so they stay inside the engine's memory pool and spill to disk
//! instead of growing without bound.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use datafusion::prelude::{ParquetReadOptions, SessionContext};
use tempfile::TempDir;

use crate::store::{self, EngineOptions};

use super::parquet_io::write_dataframe;
use super::reader::{read_delimited, read_ndjson, EXTRACT_DELIMITER};
use super::sources::extract_archives;
use super::staging::{Stager, ORDINAL};
use super::IngestError;

/// Typed null for a column a source does not carry.
pub const NULL_TEXT: &str = "CAST(NULL AS VARCHAR)";

const RANK: &str = "__rank";

/// Double-quoted SQL identifier.
pub fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `source` reduced to one row per `partition` key: the first under
/// `order`, ties going to the earliest read. `source` is a table name or a
/// parenthesized query carrying the ordinal column.
pub fn first_per(source: &str, partition: &[String], order: &[String]) -> String {
    let mut keys: Vec<String> = order.to_vec();
    keys.push(format!("{} ASC", ident(ORDINAL)));
    format!(
        "(SELECT * FROM (SELECT *, ROW_NUMBER() OVER (PARTITION BY {} ORDER BY {}) AS {rank} \
         FROM {source} ranked_source) ranked WHERE ranked.{rank} = 1)",
        partition.join(", "),
        keys.join(", "),
        rank = ident(RANK),
    )
}

/// `TRY_CAST(column AS BIGINT) DESC NULLS LAST`, if `relation` has it.
pub fn integer_desc(relation: &Relation, column: &str) -> Option<String> {
    relation
        .has(column)
        .then(|| format!("TRY_CAST({} AS BIGINT) DESC NULLS LAST", ident(column)))
}

/// A registered source and the columns it resolved to.
#[derive(Debug, Clone)]
pub struct Relation {
    name: String,
    columns: Vec<String>,
}

impl Relation {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Source columns, without the ordinal.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .map(String::as_str)
            .filter(|c| *c != ORDINAL)
    }

    /// `alias."column"`, or a typed null when the source lacks it.
    pub fn column_or_null(&self, alias: &str, column: &str) -> String {
        if self.has(column) {
            format!("{alias}.{}", ident(column))
        } else {
            NULL_TEXT.to_string()
        }
    }

    /// This relation reduced to one row per `key`.
    pub fn first_per(&self, key: &str, order: &[String]) -> String {
        first_per(&self.name, &[ident(key)], order)
    }

    #[cfg(test)]
    pub(super) fn for_tests(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Keep `relation` only if it can be joined on `key`.
pub fn joinable(relation: Option<Relation>, key: &str, what: &str) -> Option<Relation> {
    match relation {
        Some(relation) if relation.has(key) => Some(relation),
        Some(_) => {
            tracing::warn!(table = what, key, "source lacks its join key, columns left empty");
            None
        }
        None => {
            tracing::warn!(table = what, "source not found or empty, columns left empty");
            None
        }
    }
}

pub struct Scratch {
    ctx: SessionContext,
    dir: TempDir,
}

impl Scratch {
    /// Scratch space next to `out`, with a session bounded by `engine`.
    pub fn new(out: &Path, engine: &EngineOptions) -> Result<Self, IngestError> {
        let parent = match out.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let dir = tempfile::Builder::new()
            .prefix(".opencup_staging_")
            .tempdir_in(parent)?;
        Ok(Self {
            ctx: store::session(engine)?,
            dir,
        })
    }

    /// Stage rows produced by `read` on the blocking pool and register the
    /// result as `name`. Returns the relation (absent when nothing was read)
    /// and the reader's dropped-row count.
    pub async fn stage<F>(&self, name: &str, read: F) -> Result<(Option<Relation>, usize), IngestError>
    where
        F: FnOnce(&mut Stager) -> Result<usize, IngestError> + Send + 'static,
    {
        let dir = self.dir.path().join(name);
        let (staged, dropped) = tokio::task::spawn_blocking(move || {
            let mut stager = Stager::new(dir)?;
            let dropped = read(&mut stager)?;
            Ok::<_, IngestError>((stager.finish()?, dropped))
        })
        .await??;

        let Some(staged) = staged else {
            return Ok((None, dropped));
        };
        tracing::info!(table = name, rows = staged.rows, dropped, "staged source");
        let location = format!("{}{}", staged.dir.display(), MAIN_SEPARATOR);
        let relation = self.register(name, &location, ".parquet").await?;
        Ok((Some(relation), dropped))
    }

    /// Register an existing Parquet file as `name`, whatever its extension.
    pub async fn register_file(&self, name: &str, path: &Path) -> Result<Relation, IngestError> {
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        self.register(name, &path.display().to_string(), &extension).await
    }

    async fn register(&self, name: &str, location: &str, extension: &str) -> Result<Relation, IngestError> {
        let options = ParquetReadOptions::default().file_extension(extension);
        self.ctx.register_parquet(name, location, options).await?;
        let columns = self
            .ctx
            .table(name)
            .await?
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        Ok(Relation {
            name: name.to_string(),
            columns,
        })
    }

    /// Rows of `relation` sharing a `key` with an earlier row.
    pub async fn duplicates(&self, relation: &Relation, key: &str) -> Result<usize, IngestError> {
        let sql = format!(
            "SELECT CAST(COUNT(*) - COUNT(DISTINCT {}) AS BIGINT) AS n FROM {}",
            ident(key),
            relation.name()
        );
        let rows = store::batches_to_rows(&store::plan(&self.ctx, &sql, &[]).await?.collect().await?)?;
        Ok(rows
            .first()
            .and_then(|r| r.get("n"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize)
    }

    /// Run `sql` and write its result to `out`. Returns the rows written.
    pub async fn write(&self, sql: &str, out: &Path) -> Result<usize, IngestError> {
        let df = store::plan(&self.ctx, sql, &[]).await?;
        write_dataframe(df, out).await
    }

    #[cfg(test)]
    pub(super) fn context(&self) -> &SessionContext {
        &self.ctx
    }
}

/// Stage delimited extracts, one header per file.
pub fn delimited_files(
    paths: Vec<PathBuf>,
) -> impl FnOnce(&mut Stager) -> Result<usize, IngestError> + Send + 'static {
    move |stager| {
        let mut dropped = 0;
        for path in &paths {
            dropped += read_delimited(path, EXTRACT_DELIMITER, stager)?;
            tracing::info!(file = %path.display(), "read extract");
        }
        Ok(dropped)
    }
}

/// Stage line-delimited JSON files.
pub fn ndjson_files(
    paths: Vec<PathBuf>,
) -> impl FnOnce(&mut Stager) -> Result<usize, IngestError> + Send + 'static {
    move |stager| {
        let mut dropped = 0;
        for path in &paths {
            dropped += read_ndjson(path, stager)?;
        }
        Ok(dropped)
    }
}

/// Stage every JSON entry of a set of zip archives.
pub fn ndjson_archives(
    archives: Vec<PathBuf>,
) -> impl FnOnce(&mut Stager) -> Result<usize, IngestError> + Send + 'static {
    move |stager| {
        let extracted = extract_archives(&archives)?;
        let mut dropped = 0;
        for file in extracted.files() {
            dropped += read_ndjson(file, stager)?;
        }
        tracing::info!(archives = archives.len(), "read archives");
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    use crate::store::Row;

    fn snapshot(cig: &str, anno: Option<&str>, data: &str) -> Vec<(String, Option<String>)> {
        vec![
            ("cig".to_string(), Some(cig.to_string())),
            ("anno_pubblicazione".to_string(), anno.map(str::to_string)),
            ("data_pubblicazione".to_string(), Some(data.to_string())),
        ]
    }

    async fn query(scratch: &Scratch, sql: &str) -> Vec<Row> {
        let batches = store::plan(scratch.context(), sql, &[])
            .await
            .unwrap()
            .collect()
            .await
            .unwrap();
        store::batches_to_rows(&batches).unwrap()
    }

    #[test]
    fn test_ident_escapes_quotes() {
        assert_eq!(ident("CUP"), "\"CUP\"");
        assert_eq!(ident("a\"b"), "\"a\"\"b\"");
    }

    #[tokio::test]
    async fn test_first_per_ranks_then_keeps_earliest() {
        let dir = tempdir().unwrap();
        let scratch = Scratch::new(&dir.path().join("cig.parquet"), &EngineOptions::default()).unwrap();
        let (snapshots, _) = scratch
            .stage("snapshots", |stager| {
                stager.push_record(snapshot("G1", Some("2021"), "2021-03-01"))?;
                stager.push_record(snapshot("G1", Some("2022"), "2022-01-10"))?;
                stager.push_record(snapshot("G1", Some("2022"), "2022-01-15"))?;
                stager.push_record(snapshot("G2", None, "2020-01-01"))?;
                stager.push_record(snapshot("G2", Some("n.d."), "2019-01-01"))?;
                stager.push_record(snapshot("G3", Some("2020"), "2020-01-01"))?;
                stager.push_record(snapshot("G3", Some("2020"), "2020-01-01"))?;
                Ok(0)
            })
            .await
            .unwrap();
        let snapshots = snapshots.unwrap();

        let order: Vec<String> = integer_desc(&snapshots, "anno_pubblicazione")
            .into_iter()
            .chain(Some(format!("{} DESC NULLS LAST", ident("data_pubblicazione"))))
            .collect();
        let sql = format!(
            "SELECT \"cig\", \"data_pubblicazione\", \"{ORDINAL}\" FROM {} latest ORDER BY \"cig\"",
            snapshots.first_per("cig", &order)
        );
        let rows = query(&scratch, &sql).await;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["data_pubblicazione"], "2022-01-15");
        // Year unparsable or missing on both: the later date wins.
        assert_eq!(rows[1]["data_pubblicazione"], "2020-01-01");
        // Exact tie: the earliest read.
        assert_eq!(rows[2][ORDINAL], 5);

        assert_eq!(scratch.duplicates(&snapshots, "cig").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_parts_with_different_columns_merge() {
        let dir = tempdir().unwrap();
        let scratch = Scratch::new(&dir.path().join("out.parquet"), &EngineOptions::default()).unwrap();
        let (relation, dropped) = scratch
            .stage("merged", |stager| {
                let slots = stager.begin_file(&["CUP".to_string()])?;
                stager.push_row(&slots, [Some("C1".to_string())])?;
                let slots = stager.begin_file(&["CUP".to_string(), "REGIONE".to_string()])?;
                stager.push_row(&slots, [Some("C2".to_string()), Some("LAZIO".to_string())])?;
                Ok(3)
            })
            .await
            .unwrap();
        let relation = relation.unwrap();
        assert_eq!(dropped, 3);
        assert!(relation.has("REGIONE"));
        assert_eq!(relation.columns().collect::<Vec<_>>(), ["CUP", "REGIONE"]);
        assert_eq!(relation.column_or_null("m", "COMUNE"), NULL_TEXT);

        let rows = query(&scratch, "SELECT \"CUP\", \"REGIONE\" FROM merged ORDER BY \"CUP\"").await;
        assert_eq!(rows[0]["REGIONE"], serde_json::Value::Null);
        assert_eq!(rows[1]["REGIONE"], "LAZIO");
    }

    #[tokio::test]
    async fn test_nothing_staged_registers_nothing() {
        let dir = tempdir().unwrap();
        let scratch = Scratch::new(&dir.path().join("out.parquet"), &EngineOptions::default()).unwrap();
        let (relation, _) = scratch.stage("empty", |_| Ok(0)).await.unwrap();
        assert!(relation.is_none());
        assert!(joinable(relation, "CUP", "location").is_none());
    }
}
