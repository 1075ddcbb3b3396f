//! Stage 1: project extracts enriched with location and subject data.

use std::path::Path;

use crate::catalog::{LOCATION_COLUMNS, PROJECTS, SUBJECT_COLUMNS};
use crate::store::EngineOptions;

use super::scratch::{delimited_files, ident, joinable, Relation, Scratch, NULL_TEXT};
use super::sources::Sources;
use super::{IngestError, StageCounts};

/// Fiscal code of the project titleholder, the subject join key.
const SUBJECT_KEY: &str = "PIVA_CODFISCALE_SOG_TITOLARE";

pub async fn build_projects(
    sources: &Sources,
    out: &Path,
    engine: &EngineOptions,
) -> Result<StageCounts, IngestError> {
    if sources.project_extracts.is_empty() {
        return Err(IngestError::SourceMissing("OpenCup_Progetti*.csv".to_string()));
    }
    let scratch = Scratch::new(out, engine)?;

    let (projects, mut dropped) = scratch
        .stage("progetti", delimited_files(sources.project_extracts.clone()))
        .await?;
    let projects = projects
        .ok_or_else(|| IngestError::SourceMissing("OpenCup_Progetti*.csv with a header".to_string()))?;

    let (locations, bad) = scratch
        .stage("localizzazione", delimited_files(sources.locations.iter().cloned().collect()))
        .await?;
    dropped += bad;
    let locations = reference(&scratch, locations, PROJECTS.key, "location").await?;

    let (subjects, bad) = scratch
        .stage("soggetti", delimited_files(sources.subjects.iter().cloned().collect()))
        .await?;
    dropped += bad;
    let subjects = reference(&scratch, subjects, SUBJECT_KEY, "subject")
        .await?
        .filter(|_| {
            let joinable = projects.has(SUBJECT_KEY);
            if !joinable {
                tracing::warn!(key = SUBJECT_KEY, "extracts lack the subject key, columns left empty");
            }
            joinable
        });

    let sql = projects_sql(&projects, locations.as_ref(), subjects.as_ref());
    let rows = scratch.write(&sql, out).await?;
    Ok(StageCounts { rows, dropped })
}

/// A joinable reference table, with its duplicate keys logged. The first
/// occurrence in file order wins at join time.
async fn reference(
    scratch: &Scratch,
    relation: Option<Relation>,
    key: &str,
    what: &str,
) -> Result<Option<Relation>, IngestError> {
    let Some(relation) = joinable(relation, key, what) else {
        return Ok(None);
    };
    let duplicates = scratch.duplicates(&relation, key).await?;
    tracing::info!(table = what, duplicates, "reference table staged");
    Ok(Some(relation))
}

/// Catalog columns in order, then any other extract column. Joined columns
/// come only from the reference tables.
fn projects_sql(projects: &Relation, locations: Option<&Relation>, subjects: Option<&Relation>) -> String {
    let mut from = format!("{} p", projects.name());
    if let Some(l) = locations {
        from.push_str(&format!(
            " LEFT JOIN {} l ON p.{key} = l.{key}",
            l.first_per(PROJECTS.key, &[]),
            key = ident(PROJECTS.key)
        ));
    }
    if let Some(s) = subjects {
        from.push_str(&format!(
            " LEFT JOIN {} s ON p.{key} = s.{key}",
            s.first_per(SUBJECT_KEY, &[]),
            key = ident(SUBJECT_KEY)
        ));
    }

    let mut columns: Vec<String> = PROJECTS
        .all
        .iter()
        .map(|column| {
            let source = if LOCATION_COLUMNS.contains(column) {
                locations.map(|l| l.column_or_null("l", column))
            } else if SUBJECT_COLUMNS.contains(column) {
                subjects.map(|s| s.column_or_null("s", column))
            } else {
                Some(projects.column_or_null("p", column))
            };
            format!("{} AS {}", source.as_deref().unwrap_or(NULL_TEXT), ident(column))
        })
        .collect();
    // Extract columns outside the catalog ride along after it.
    columns.extend(
        projects
            .columns()
            .filter(|c| !PROJECTS.all.contains(c))
            .map(|c| format!("p.{} AS {}", ident(c), ident(c))),
    );

    format!("SELECT {} FROM {from}", columns.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joined_columns_come_from_references_only() {
        let projects = Relation::for_tests("progetti", &["CUP", "REGIONE", SUBJECT_KEY, "NOTE", "__ordinal"]);
        let locations = Relation::for_tests("localizzazione", &["CUP", "REGIONE", "__ordinal"]);
        let sql = projects_sql(&projects, Some(&locations), None);

        assert!(sql.contains("l.\"REGIONE\" AS \"REGIONE\""));
        assert!(sql.contains("CAST(NULL AS VARCHAR) AS \"COMUNE\""));
        assert!(sql.contains("CAST(NULL AS VARCHAR) AS \"CATEGORIA_SOGGETTO\""));
        assert!(sql.contains("p.\"CUP\" AS \"CUP\""));
        assert!(sql.contains("PARTITION BY \"CUP\" ORDER BY \"__ordinal\" ASC"));
        assert!(sql.contains(" l ON p.\"CUP\" = l.\"CUP\""));
        assert!(!sql.contains(" s ON "));
        assert!(sql.contains("p.\"NOTE\" AS \"NOTE\" FROM"));
        assert!(!sql.contains("p.\"REGIONE\""));
    }
}
