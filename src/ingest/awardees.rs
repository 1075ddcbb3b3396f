//! Stage 4: awardees, one row per (procurement code, fiscal code).

use std::path::Path;

use crate::store::EngineOptions;

use super::scratch::{first_per, ident, ndjson_archives, Relation, Scratch, NULL_TEXT};
use super::sources::Sources;
use super::staging::ORDINAL;
use super::{IngestError, StageCounts};

/// Leading output columns; every other field follows in first-seen order.
pub const AWARDEE_COLUMNS: &[&str] = &[
    "CIG",
    "ruolo",
    "codice_fiscale",
    "denominazione",
    "tipo_soggetto",
    "id_aggiudicazione",
];

/// Identity columns, compared after trimming.
const IDENTITY_COLUMNS: &[&str] = &["CIG", "codice_fiscale", "denominazione"];

pub async fn build_awardees(
    sources: &Sources,
    out: &Path,
    engine: &EngineOptions,
) -> Result<StageCounts, IngestError> {
    let scratch = Scratch::new(out, engine)?;
    let (raw, dropped) = scratch
        .stage("aggiudicatari", ndjson_archives(sources.awardee_archives.clone()))
        .await?;
    let raw = raw.ok_or_else(|| IngestError::SourceMissing("awardee records".to_string()))?;

    let sql = awardees_sql(&raw);
    let rows = scratch.write(&sql, out).await?;
    tracing::info!(rows, "awardees deduplicated");
    Ok(StageCounts { rows, dropped })
}

fn awardees_sql(raw: &Relation) -> String {
    let extras: Vec<&str> = raw
        .columns()
        .filter(|c| *c != "cig" && !AWARDEE_COLUMNS.contains(c))
        .collect();
    let output: Vec<&str> = AWARDEE_COLUMNS.iter().copied().chain(extras).collect();

    let normalized: Vec<String> = output
        .iter()
        .map(|column| {
            let source = if *column == "CIG" { "cig" } else { *column };
            let value = if raw.has(source) {
                if IDENTITY_COLUMNS.contains(column) {
                    format!("TRIM({})", ident(source))
                } else {
                    ident(source)
                }
            } else {
                NULL_TEXT.to_string()
            };
            format!("{value} AS {}", ident(column))
        })
        .chain(std::iter::once(ident(ORDINAL)))
        .collect();
    let trimmed = format!("(SELECT {} FROM {})", normalized.join(", "), raw.name());

    // The normalized id column always exists, possibly as a typed null.
    let order = [format!("TRY_CAST({} AS BIGINT) DESC NULLS LAST", ident("id_aggiudicazione"))];
    let latest = first_per(&trimmed, &[ident("CIG"), ident("codice_fiscale")], &order);

    let projection: Vec<String> = output.iter().map(|c| ident(c)).collect();
    format!(
        "SELECT {} FROM {latest} latest ORDER BY {} ASC NULLS LAST, {} ASC NULLS LAST, {} ASC NULLS LAST",
        projection.join(", "),
        ident("CIG"),
        ident("ruolo"),
        ident("denominazione"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_trims_identity_and_keeps_extra_fields() {
        let raw = Relation::for_tests(
            "aggiudicatari",
            &["cig", "ruolo", "codice_fiscale", "denominazione", "id_aggiudicazione", "nazione", ORDINAL],
        );
        let sql = awardees_sql(&raw);
        assert!(sql.contains("TRIM(\"cig\") AS \"CIG\""));
        assert!(sql.contains("TRIM(\"codice_fiscale\") AS \"codice_fiscale\""));
        assert!(sql.contains("CAST(NULL AS VARCHAR) AS \"tipo_soggetto\""));
        assert!(sql.contains("\"ruolo\" AS \"ruolo\""));
        assert!(sql.contains(
            "PARTITION BY \"CIG\", \"codice_fiscale\" ORDER BY TRY_CAST(\"id_aggiudicazione\" AS BIGINT) DESC NULLS LAST"
        ));
        assert!(sql.starts_with(
            "SELECT \"CIG\", \"ruolo\", \"codice_fiscale\", \"denominazione\", \"tipo_soggetto\", \
             \"id_aggiudicazione\", \"nazione\" FROM"
        ));
        assert!(sql.ends_with("ORDER BY \"CIG\" ASC NULLS LAST, \"ruolo\" ASC NULLS LAST, \"denominazione\" ASC NULLS LAST"));
    }
}
