//! Ingest command: embed chunk records into the document index.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::ingest::{load_records, Ingestor};
use crate::orchestrator::CoachOrchestrator;
use anyhow::Result;

/// Run the ingest command.
pub async fn run_ingest(path: &str, replace: bool, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ingest, &settings) {
        Output::error(&e.to_string());
        return Err(e.into());
    }

    let path = Settings::expand_path(path);
    let records = load_records(&path)?;
    if records.is_empty() {
        Output::warning(&format!("No chunk records in {:?}", path));
        return Ok(());
    }
    Output::info(&format!("Loaded {} records from {:?}", records.len(), path));

    let coach = CoachOrchestrator::from_settings(&settings)?;
    let ingestor = Ingestor::new(coach.embedder(), coach.index(), &settings.embedding)
        .with_progress(true);

    let report = ingestor.ingest(records, replace).await?;

    Output::success(&format!(
        "Indexed {} chunks from {} sources",
        report.chunks_indexed,
        report.sources.len()
    ));
    if replace {
        Output::kv("Replaced chunks", &report.chunks_replaced.to_string());
    }
    for source in &report.sources {
        Output::kv("Source", source);
    }

    Ok(())
}
