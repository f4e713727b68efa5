//! Sources command: list indexed documents.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::CoachOrchestrator;
use anyhow::Result;

/// Run the sources command.
pub async fn run_sources(settings: Settings) -> Result<()> {
    let coach = CoachOrchestrator::from_settings(&settings)?;

    match coach.index().list_sources().await {
        Ok(sources) if sources.is_empty() => {
            Output::info("No documents indexed yet. Use 'plc-coach ingest <file>' to add content.");
        }
        Ok(sources) => {
            Output::header(&format!("Indexed Sources ({})", sources.len()));
            println!();

            for source in &sources {
                Output::source_info(&source.source_document, &source.author, source.chunk_count);
            }

            let total_chunks: u32 = sources.iter().map(|s| s.chunk_count).sum();
            println!();
            Output::kv("Total sources", &sources.len().to_string());
            Output::kv("Total chunks", &total_chunks.to_string());
        }
        Err(e) => {
            Output::error(&format!("Failed to list sources: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
