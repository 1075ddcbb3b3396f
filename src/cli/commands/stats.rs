//! Dataset totals command.

use std::sync::Arc;

use crate::config::Settings;
use crate::query::QueryEngine;
use crate::store::Store;

/// Print the totals as JSON, from `stats.json` or computed on the fly.
pub async fn cmd_stats(settings: &Settings) -> anyhow::Result<()> {
    let store = Store::open(settings.store_paths(), &settings.engine_options()).await?;
    let engine = QueryEngine::new(Arc::new(store));
    let stats = engine.statistics().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
