//! Stages 2 and 3: the procurement table and its award-outcome enrichment.

use std::path::{Path, PathBuf};

use crate::catalog::{AWARD_COLUMNS, DETAIL_FIELDS, PROCUREMENTS};
use crate::store::EngineOptions;

use super::parquet_io::sibling;
use super::scratch::{
    ident, integer_desc, joinable, ndjson_archives, ndjson_files, Relation, Scratch, NULL_TEXT,
};
use super::sources::Sources;
use super::{IngestError, StageCounts};

/// Procurement code field in the raw JSON sources (keys are lower-cased).
const RAW_CIG: &str = "cig";
const RAW_CUP: &str = "cup";

/// Build the procurement table from the mapping, detail snapshots and award
/// outcomes.
pub async fn build_procurements(
    sources: &Sources,
    out: &Path,
    engine: &EngineOptions,
) -> Result<StageCounts, IngestError> {
    let mapping_path = sources
        .mapping
        .as_ref()
        .ok_or_else(|| IngestError::SourceMissing("cup_json.json".to_string()))?;
    let scratch = Scratch::new(out, engine)?;

    let (mapping, mut dropped) = scratch
        .stage("mapping", ndjson_files(vec![mapping_path.clone()]))
        .await?;
    let mapping = mapping
        .filter(|m| m.has(RAW_CIG))
        .ok_or_else(|| IngestError::SourceMissing(format!("{} (no cig records)", mapping_path.display())))?;

    let details = if sources.detail_archives.is_empty() {
        tracing::warn!("no detail archives, procurement table keeps the mapping only");
        None
    } else {
        let (details, bad) = scratch
            .stage("dettagli", ndjson_archives(sources.detail_archives.clone()))
            .await?;
        dropped += bad;
        joinable(details, RAW_CIG, "detail")
    };
    if let Some(details) = &details {
        let duplicates = scratch.duplicates(details, RAW_CIG).await?;
        tracing::info!(duplicates, "keeping the latest detail snapshot per procurement");
    }

    let (awards, bad) = stage_awards(&scratch, &sources.award_archives).await?;
    dropped += bad;

    let mut from = format!("{} m", mapping.name());
    if let Some(d) = &details {
        let order: Vec<String> = integer_desc(d, "anno_pubblicazione")
            .into_iter()
            .chain(
                d.has("data_pubblicazione")
                    .then(|| format!("{} DESC NULLS LAST", ident("data_pubblicazione"))),
            )
            .collect();
        from.push_str(&format!(
            " LEFT JOIN {} d ON m.{cig} = d.{cig}",
            d.first_per(RAW_CIG, &order),
            cig = ident(RAW_CIG)
        ));
    }
    if let Some(a) = &awards {
        from.push_str(&award_join("m", RAW_CIG, a));
    }

    let columns: Vec<String> = PROCUREMENTS
        .all
        .iter()
        .map(|column| {
            let source = match *column {
                "CIG" => Some(mapping.column_or_null("m", RAW_CIG)),
                "CUP" => Some(mapping.column_or_null("m", RAW_CUP)),
                _ => match DETAIL_FIELDS.iter().find(|(out, _)| out == column) {
                    Some((_, raw)) => details.as_ref().map(|d| d.column_or_null("d", raw)),
                    None => award_source(awards.as_ref(), column),
                },
            };
            select_item(source, column)
        })
        .collect();

    let sql = format!("SELECT {} FROM {from}", columns.join(", "));
    let rows = scratch.write(&sql, out).await?;
    Ok(StageCounts { rows, dropped })
}

/// Replace the award-outcome columns of an existing procurement table.
///
/// The table is backed up first; the backup is restored if the rewrite fails
/// and removed once it succeeds.
pub async fn enrich_procurements(
    sources: &Sources,
    path: &Path,
    engine: &EngineOptions,
) -> Result<StageCounts, IngestError> {
    let backup = backup_path(path);
    tokio::fs::copy(path, &backup).await?;

    match rewrite_awards(sources, path, &backup, engine).await {
        Ok(counts) => {
            tokio::fs::remove_file(&backup).await?;
            Ok(counts)
        }
        Err(e) => {
            tracing::warn!(error = %e, "enrichment failed, restoring backup");
            if let Err(restore) = tokio::fs::rename(&backup, path).await {
                tracing::error!(error = %restore, backup = %backup.display(), "could not restore backup");
            }
            Err(e)
        }
    }
}

pub fn backup_path(path: &Path) -> PathBuf {
    sibling(path, "bak")
}

/// Read the backup, swap in fresh award columns, write over `path`.
/// Re-applying the same source yields the same table.
async fn rewrite_awards(
    sources: &Sources,
    path: &Path,
    backup: &Path,
    engine: &EngineOptions,
) -> Result<StageCounts, IngestError> {
    let scratch = Scratch::new(path, engine)?;
    let current = scratch.register_file("cig_corrente", backup).await?;
    let (awards, dropped) = stage_awards(&scratch, &sources.award_archives).await?;

    let mut from = format!("{} c", current.name());
    if let Some(a) = &awards {
        from.push_str(&award_join("c", PROCUREMENTS.key, a));
    }
    let columns: Vec<String> = PROCUREMENTS
        .all
        .iter()
        .map(|column| {
            let source = if AWARD_COLUMNS.contains(column) {
                award_source(awards.as_ref(), column)
            } else {
                Some(current.column_or_null("c", column))
            };
            select_item(source, column)
        })
        .collect();

    let sql = format!("SELECT {} FROM {from}", columns.join(", "));
    let rows = scratch.write(&sql, path).await?;
    Ok(StageCounts { rows, dropped })
}

/// Stage the award archives, if any.
async fn stage_awards(
    scratch: &Scratch,
    archives: &[PathBuf],
) -> Result<(Option<Relation>, usize), IngestError> {
    if archives.is_empty() {
        tracing::info!("no award archives, award columns left empty");
        return Ok((None, 0));
    }
    let (awards, dropped) = scratch
        .stage("aggiudicazioni", ndjson_archives(archives.to_vec()))
        .await?;
    let awards = joinable(awards, RAW_CIG, "award");
    if let Some(awards) = &awards {
        let duplicates = scratch.duplicates(awards, RAW_CIG).await?;
        tracing::info!(duplicates, "keeping the highest award per procurement");
    }
    Ok((awards, dropped))
}

/// Left join of the highest award identifier per procurement code.
fn award_join(alias: &str, key: &str, awards: &Relation) -> String {
    let order: Vec<String> = integer_desc(awards, "id_aggiudicazione").into_iter().collect();
    format!(
        " LEFT JOIN {} a ON {alias}.{} = a.{}",
        awards.first_per(RAW_CIG, &order),
        ident(key),
        ident(RAW_CIG)
    )
}

fn award_source(awards: Option<&Relation>, column: &str) -> Option<String> {
    if AWARD_COLUMNS.contains(&column) {
        awards.map(|a| a.column_or_null("a", column))
    } else {
        None
    }
}

fn select_item(source: Option<String>, column: &str) -> String {
    format!("{} AS {}", source.as_deref().unwrap_or(NULL_TEXT), ident(column))
}
