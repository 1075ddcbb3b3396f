//! Ingestion command.

use console::style;

use crate::config::Settings;
use crate::ingest::{Pipeline, PipelineReport, StageOutcome};

/// Run the pipeline and print a per-stage summary.
///
/// Fails only when every stage failed; partial runs leave the previous
/// artifacts of the failed stages in place.
pub async fn cmd_ingest(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let layout = settings.source_layout();
    println!(
        "{} Ingesting {} into {}",
        style("→").cyan(),
        layout.source_dir.display(),
        settings.data_dir.display()
    );

    let pipeline = Pipeline::new(layout, settings.store_paths(), settings.engine_options());
    let report = pipeline.run().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.all_failed() {
        anyhow::bail!("every ingestion stage failed");
    }
    Ok(())
}

fn print_report(report: &PipelineReport) {
    for entry in &report.stages {
        match &entry.outcome {
            StageOutcome::Completed { rows, dropped } => {
                println!("  {} {:<13} {} rows", style("✓").green(), entry.stage.name(), rows);
                if *dropped > 0 {
                    println!(
                        "    {} {} malformed source rows dropped",
                        style("!").yellow(),
                        dropped
                    );
                }
            }
            StageOutcome::Skipped { reason } => {
                println!("  {} {:<13} skipped: {}", style("-").dim(), entry.stage.name(), reason);
            }
            StageOutcome::Failed { error } => {
                println!("  {} {:<13} {}", style("✗").red(), entry.stage.name(), error);
            }
        }
    }

    let failures = report.failures();
    if failures > 0 {
        println!("{} {} stage(s) failed", style("!").yellow(), failures);
    } else {
        println!("{} Store ready", style("✓").green());
    }
}
