//! Store access layer.
//!
//! One long-lived DataFusion session over the immutable Parquet files the
//! ingestion pipeline writes. Serving never mutates it; every request shares
//! the same handle behind an `Arc`.

mod rows;
mod statistics;

use std::path::{Path, PathBuf};

use datafusion::dataframe::DataFrame;
use datafusion::error::DataFusionError;
use datafusion::execution::runtime_env::RuntimeEnvBuilder;
use datafusion::prelude::{ParquetReadOptions, SessionConfig, SessionContext};
use datafusion::scalar::ScalarValue;
use thiserror::Error;

use crate::catalog::{AWARDEE_TABLE, PROCUREMENTS, PROJECTS};

pub use rows::{batches_to_rows, Row};
pub use statistics::{compute_statistics, read_statistics, write_statistics, Statistics, Totals};

pub const PROJECTS_FILE: &str = "progetti.parquet";
pub const PROCUREMENTS_FILE: &str = "cig.parquet";
pub const AWARDEES_FILE: &str = "aggiudicatari.parquet";
pub const STATS_FILE: &str = "stats.json";

/// Errors from the store layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store file unavailable: {}: {reason}", path.display())]
    Unavailable { path: PathBuf, reason: String },

    #[error("query failed: {0}")]
    DataFusion(#[from] DataFusionError),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Locations of the store artifacts under the data directory.
#[derive(Debug, Clone)]
pub struct StorePaths {
    data_dir: PathBuf,
}

impl StorePaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn projects(&self) -> PathBuf {
        self.data_dir.join(PROJECTS_FILE)
    }

    pub fn procurements(&self) -> PathBuf {
        self.data_dir.join(PROCUREMENTS_FILE)
    }

    pub fn awardees(&self) -> PathBuf {
        self.data_dir.join(AWARDEES_FILE)
    }

    pub fn stats(&self) -> PathBuf {
        self.data_dir.join(STATS_FILE)
    }
}

/// Engine resource limits.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Memory pool size in bytes; unbounded when `None`.
    pub memory_limit: Option<usize>,
    /// Execution parallelism; DataFusion picks the core count when `None`.
    pub target_partitions: Option<usize>,
}

/// Build a session honoring the engine options.
pub fn session(options: &EngineOptions) -> Result<SessionContext, StoreError> {
    let mut config = SessionConfig::new();
    if let Some(partitions) = options.target_partitions.filter(|n| *n > 0) {
        config = config.with_target_partitions(partitions);
    }
    // Keep Utf8 columns as written; row conversion expects plain strings.
    config.options_mut().execution.parquet.schema_force_view_types = false;

    let mut runtime = RuntimeEnvBuilder::new();
    if let Some(limit) = options.memory_limit {
        runtime = runtime.with_memory_limit(limit, 1.0);
    }
    let runtime = runtime.build_arc()?;
    Ok(SessionContext::new_with_config_rt(config, runtime))
}

/// Register one Parquet file as a table.
pub async fn register(ctx: &SessionContext, table: &str, path: &Path) -> Result<(), StoreError> {
    let unavailable = |reason: String| StoreError::Unavailable {
        path: path.to_path_buf(),
        reason,
    };
    if !path.is_file() {
        return Err(unavailable("file not found".to_string()));
    }
    let location = path
        .to_str()
        .ok_or_else(|| unavailable("path is not valid UTF-8".to_string()))?;
    ctx.register_parquet(table, location, ParquetReadOptions::default())
        .await
        .map_err(|e| unavailable(e.to_string()))
}

/// Read-only handle to the columnar store.
pub struct Store {
    ctx: SessionContext,
    paths: StorePaths,
    has_awardees: bool,
}

impl Store {
    /// Open the store. The project and procurement tables are mandatory;
    /// the awardee table is registered only if it was built.
    pub async fn open(paths: StorePaths, options: &EngineOptions) -> Result<Self, StoreError> {
        let ctx = session(options)?;
        register(&ctx, PROJECTS.table, &paths.projects()).await?;
        register(&ctx, PROCUREMENTS.table, &paths.procurements()).await?;

        let awardees = paths.awardees();
        let has_awardees = awardees.is_file();
        if has_awardees {
            register(&ctx, AWARDEE_TABLE, &awardees).await?;
        } else {
            tracing::warn!(path = %awardees.display(), "awardee table not found, drill-down disabled");
        }

        tracing::info!(
            data_dir = %paths.data_dir().display(),
            memory_limit = ?options.memory_limit,
            "store opened"
        );
        Ok(Self {
            ctx,
            paths,
            has_awardees,
        })
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    pub fn has_awardees(&self) -> bool {
        self.has_awardees
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Plan `sql` with positional `$n` parameters bound.
    pub async fn sql(&self, sql: &str, params: &[ScalarValue]) -> Result<DataFrame, StoreError> {
        plan(&self.ctx, sql, params).await
    }

    /// Run `sql` and collect the result as JSON rows.
    pub async fn rows(&self, sql: &str, params: &[ScalarValue]) -> Result<Vec<Row>, StoreError> {
        let batches = self.sql(sql, params).await?.collect().await?;
        Ok(batches_to_rows(&batches)?)
    }
}

pub(crate) async fn plan(
    ctx: &SessionContext,
    sql: &str,
    params: &[ScalarValue],
) -> Result<DataFrame, StoreError> {
    tracing::debug!(sql, params = params.len(), "executing query");
    let df = ctx.sql(sql).await?;
    if params.is_empty() {
        Ok(df)
    } else {
        Ok(df.with_param_values(params.to_vec())?)
    }
}
