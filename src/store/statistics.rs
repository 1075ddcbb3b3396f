//! Pre-aggregated project totals (`stats.json`).

use std::path::Path;

use datafusion::prelude::SessionContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{batches_to_rows, plan, StoreError};
use crate::catalog::PROJECTS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub totals: Totals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub progetti: u64,
    pub cup_unici: u64,
    pub costo_totale: Option<f64>,
    pub finanziamento_totale: Option<f64>,
}

/// Compute the totals over the registered project table.
pub async fn compute_statistics(ctx: &SessionContext) -> Result<Statistics, StoreError> {
    let sql = format!(
        "SELECT COUNT(*) AS progetti, COUNT(DISTINCT \"CUP\") AS cup_unici, \
         SUM(TRY_CAST(\"COSTO_PROGETTO\" AS DOUBLE)) AS costo_totale, \
         SUM(TRY_CAST(\"FINANZIAMENTO_PROGETTO\" AS DOUBLE)) AS finanziamento_totale \
         FROM {}",
        PROJECTS.table
    );
    let batches = plan(ctx, &sql, &[]).await?.collect().await?;
    let rows = batches_to_rows(&batches)?;
    let row = rows.first();
    let field = |name: &str| row.and_then(|r| r.get(name)).cloned().unwrap_or(Value::Null);

    Ok(Statistics {
        totals: Totals {
            progetti: field("progetti").as_u64().unwrap_or(0),
            cup_unici: field("cup_unici").as_u64().unwrap_or(0),
            costo_totale: field("costo_totale").as_f64(),
            finanziamento_totale: field("finanziamento_totale").as_f64(),
        },
    })
}

/// Read `stats.json`; `None` if it was never written.
pub async fn read_statistics(path: &Path) -> Result<Option<Statistics>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write `stats.json` through a temporary sibling.
pub async fn write_statistics(path: &Path, stats: &Statistics) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, serde_json::to_vec_pretty(stats)?).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
