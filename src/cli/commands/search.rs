//! Search command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::model::{CriticalQuestion, RetrievalFilter};
use crate::orchestrator::CoachOrchestrator;
use anyhow::Result;

/// Run the search command.
pub async fn run_search(
    query: &str,
    limit: usize,
    min_score: Option<f32>,
    critical_question: Option<u8>,
    topics: Vec<String>,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Search, &settings) {
        Output::error(&e.to_string());
        return Err(e.into());
    }

    let coach = CoachOrchestrator::from_settings(&settings)?;

    let filter = RetrievalFilter {
        critical_question: critical_question
            .map(CriticalQuestion::try_from)
            .transpose()
            .map_err(|e| anyhow::anyhow!(e))?,
        topics: (!topics.is_empty()).then_some(topics),
    };

    let retriever = match min_score {
        Some(score) => coach.retriever().clone().with_min_score(score),
        None => coach.retriever().clone(),
    };

    let spinner = Output::spinner("Searching...");
    let results = async {
        let embedding = coach.embedder().embed(query).await?;
        retriever.retrieve(&embedding, limit, Some(&filter)).await
    }
    .await;
    spinner.finish_and_clear();

    match results {
        Ok(results) if results.is_empty() => {
            Output::warning(&format!(
                "No results scored above {:.2} for your query.",
                retriever.min_score()
            ));
        }
        Ok(results) => {
            Output::success(&format!("Found {} results", results.len()));
            for result in &results {
                Output::search_result(result);
            }
        }
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
