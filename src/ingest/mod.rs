//! Ingestion pipeline: raw OpenCUP/ANAC sources to the Parquet store.
//!
//! Stages run in a fixed order. Before each one the driver checks its inputs
//! against what is on disk: a stage runs when its sources are present, is
//! skipped when they are absent but its output already exists (or the source
//! is optional), and fails with [`IngestError::SourceMissing`] otherwise. A
//! failed stage never stops the stages after it.
//!
//! Sources are read on the blocking pool into staged Parquet parts; the
//! relational work of every stage runs in a DataFusion session bounded by
//! [`EngineOptions`].

mod awardees;
mod parquet_io;
mod procurements;
mod projects;
mod reader;
mod scratch;
mod sources;
mod staging;

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::catalog::PROJECTS;
use crate::store::{self, compute_statistics, write_statistics, EngineOptions, StoreError, StorePaths};

pub use awardees::AWARDEE_COLUMNS;
pub use parquet_io::{write_batch, ROW_GROUP_SIZE};
pub use procurements::backup_path;
pub use reader::{read_delimited, read_ndjson, EXTRACT_DELIMITER};
pub use sources::{extract_archives, ExtractedArchives, SourceLayout, Sources};
pub use staging::{Cell, StagedTable, Stager};

/// Errors that abort a single stage.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("required source missing: {0}")]
    SourceMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("query failed: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("stage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Projects,
    Procurements,
    Enrichment,
    Awardees,
    Statistics,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Projects,
        Stage::Procurements,
        Stage::Enrichment,
        Stage::Awardees,
        Stage::Statistics,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Projects => "projects",
            Stage::Procurements => "procurements",
            Stage::Enrichment => "enrichment",
            Stage::Awardees => "awardees",
            Stage::Statistics => "statistics",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rows written and malformed source rows dropped by a stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageCounts {
    pub rows: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StageOutcome {
    Completed { rows: usize, dropped: usize },
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    #[serde(flatten)]
    pub outcome: StageOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub stages: Vec<StageReport>,
}

impl PipelineReport {
    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stages
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| &r.outcome)
    }

    pub fn all_failed(&self) -> bool {
        !self.stages.is_empty()
            && self
                .stages
                .iter()
                .all(|r| matches!(r.outcome, StageOutcome::Failed { .. }))
    }

    pub fn failures(&self) -> usize {
        self.stages
            .iter()
            .filter(|r| matches!(r.outcome, StageOutcome::Failed { .. }))
            .count()
    }
}

/// Decision for one stage against the current artifact set.
#[derive(Debug, PartialEq)]
enum Plan {
    Run,
    Skip(String),
    Missing(&'static str),
}

pub struct Pipeline {
    layout: SourceLayout,
    paths: StorePaths,
    engine: EngineOptions,
}

impl Pipeline {
    pub fn new(layout: SourceLayout, paths: StorePaths, engine: EngineOptions) -> Self {
        Self {
            layout,
            paths,
            engine,
        }
    }

    /// Run every stage. Only failing to prepare the data directory or to list
    /// the sources is an error; stage failures are reported.
    pub async fn run(&self) -> Result<PipelineReport, IngestError> {
        tokio::fs::create_dir_all(self.paths.data_dir()).await?;
        let sources = self.layout.discover()?;
        tracing::info!(
            source_dir = %self.layout.source_dir.display(),
            cig_dir = %self.layout.cig_dir.display(),
            extracts = sources.project_extracts.len(),
            detail_archives = sources.detail_archives.len(),
            award_archives = sources.award_archives.len(),
            awardee_archives = sources.awardee_archives.len(),
            "discovered sources"
        );

        let mut report = PipelineReport::default();
        for stage in Stage::ALL {
            let outcome = match plan(stage, &sources, &self.paths) {
                Plan::Skip(reason) => {
                    tracing::info!(%stage, %reason, "stage skipped");
                    StageOutcome::Skipped { reason }
                }
                Plan::Missing(artifact) => {
                    let error = IngestError::SourceMissing(artifact.to_string());
                    tracing::error!(%stage, %error, "stage cannot run");
                    StageOutcome::Failed {
                        error: error.to_string(),
                    }
                }
                Plan::Run => match self.execute(stage, &sources).await {
                    Ok(StageCounts { rows, dropped }) => {
                        tracing::info!(%stage, rows, dropped, "stage completed");
                        StageOutcome::Completed { rows, dropped }
                    }
                    Err(error) => {
                        tracing::error!(%stage, %error, "stage failed");
                        StageOutcome::Failed {
                            error: error.to_string(),
                        }
                    }
                },
            };
            report.stages.push(StageReport { stage, outcome });
        }
        Ok(report)
    }

    async fn execute(&self, stage: Stage, sources: &Sources) -> Result<StageCounts, IngestError> {
        let engine = &self.engine;
        match stage {
            Stage::Projects => projects::build_projects(sources, &self.paths.projects(), engine).await,
            Stage::Procurements => {
                procurements::build_procurements(sources, &self.paths.procurements(), engine).await
            }
            Stage::Enrichment => {
                procurements::enrich_procurements(sources, &self.paths.procurements(), engine).await
            }
            Stage::Awardees => awardees::build_awardees(sources, &self.paths.awardees(), engine).await,
            Stage::Statistics => build_statistics(&self.paths, engine).await,
        }
    }
}

fn plan(stage: Stage, sources: &Sources, paths: &StorePaths) -> Plan {
    match stage {
        Stage::Projects => {
            if !sources.project_extracts.is_empty() {
                Plan::Run
            } else if paths.projects().is_file() {
                Plan::Skip("no project extracts, keeping existing table".into())
            } else {
                Plan::Missing("OpenCup_Progetti*.csv")
            }
        }
        Stage::Procurements => {
            if sources.mapping.is_some() {
                Plan::Run
            } else if paths.procurements().is_file() {
                Plan::Skip("no procurement mapping, enrichment path".into())
            } else {
                Plan::Missing("cup_json.json")
            }
        }
        Stage::Enrichment => {
            if sources.mapping.is_some() {
                Plan::Skip("procurement table rebuilt from mapping".into())
            } else if !paths.procurements().is_file() {
                Plan::Skip("no procurement table to enrich".into())
            } else if sources.award_archives.is_empty() {
                Plan::Skip("no award archives".into())
            } else {
                if !sources.detail_archives.is_empty() {
                    tracing::warn!("detail archives ignored without a procurement mapping");
                }
                Plan::Run
            }
        }
        Stage::Awardees => {
            if !sources.awardee_archives.is_empty() {
                Plan::Run
            } else if paths.awardees().is_file() {
                Plan::Skip("no awardee archives, keeping existing table".into())
            } else {
                Plan::Skip("no awardee archives".into())
            }
        }
        Stage::Statistics => {
            if paths.projects().is_file() {
                Plan::Run
            } else {
                Plan::Missing("progetti.parquet")
            }
        }
    }
}

/// Stage 5: totals over the freshly written project table.
async fn build_statistics(
    paths: &StorePaths,
    engine: &EngineOptions,
) -> Result<StageCounts, IngestError> {
    let ctx = store::session(engine)?;
    store::register(&ctx, PROJECTS.table, &paths.projects()).await?;
    let stats = compute_statistics(&ctx).await?;
    write_statistics(&paths.stats(), &stats).await?;
    tracing::info!(
        progetti = stats.totals.progetti,
        cup_unici = stats.totals.cup_unici,
        "statistics written"
    );
    Ok(StageCounts {
        rows: stats.totals.progetti as usize,
        dropped: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn sources_with_mapping() -> Sources {
        Sources {
            mapping: Some(PathBuf::from("cup_json.json")),
            award_archives: vec![PathBuf::from("aggiudicazioni_json_1.zip")],
            ..Default::default()
        }
    }

    #[test]
    fn test_plan_fresh_store_without_sources() {
        let dir = tempdir().unwrap();
        let paths = StorePaths::new(dir.path());
        let none = Sources::default();
        assert_eq!(plan(Stage::Projects, &none, &paths), Plan::Missing("OpenCup_Progetti*.csv"));
        assert_eq!(plan(Stage::Procurements, &none, &paths), Plan::Missing("cup_json.json"));
        assert!(matches!(plan(Stage::Enrichment, &none, &paths), Plan::Skip(_)));
        assert!(matches!(plan(Stage::Awardees, &none, &paths), Plan::Skip(_)));
        assert_eq!(plan(Stage::Statistics, &none, &paths), Plan::Missing("progetti.parquet"));
    }

    #[test]
    fn test_procurement_and_enrichment_are_exclusive() {
        let dir = tempdir().unwrap();
        let paths = StorePaths::new(dir.path());
        std::fs::write(paths.procurements(), b"").unwrap();

        let with_mapping = sources_with_mapping();
        assert_eq!(plan(Stage::Procurements, &with_mapping, &paths), Plan::Run);
        assert!(matches!(plan(Stage::Enrichment, &with_mapping, &paths), Plan::Skip(_)));

        let awards_only = Sources {
            mapping: None,
            ..sources_with_mapping()
        };
        assert!(matches!(plan(Stage::Procurements, &awards_only, &paths), Plan::Skip(_)));
        assert_eq!(plan(Stage::Enrichment, &awards_only, &paths), Plan::Run);
    }

    #[test]
    fn test_report_all_failed() {
        let mut report = PipelineReport::default();
        assert!(!report.all_failed());
        report.stages.push(StageReport {
            stage: Stage::Projects,
            outcome: StageOutcome::Failed { error: "x".into() },
        });
        assert!(report.all_failed());
        report.stages.push(StageReport {
            stage: Stage::Awardees,
            outcome: StageOutcome::Skipped { reason: "y".into() },
        });
        assert!(!report.all_failed());
        assert_eq!(report.failures(), 1);
        assert_eq!(
            serde_json::to_value(&report.stages[0]).unwrap(),
            serde_json::json!({"stage": "projects", "status": "failed", "error": "x"})
        );
    }
}
