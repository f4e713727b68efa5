//! Purge command: apply conversation retention once.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::CoachOrchestrator;
use anyhow::Result;

/// Run the purge command.
pub async fn run_purge(days: Option<u32>, settings: Settings) -> Result<()> {
    let Some(days) = days.or(settings.conversation.retention_days) else {
        Output::warning("No retention configured. Pass --days or set conversation.retention_days.");
        return Ok(());
    };

    let coach = CoachOrchestrator::from_settings(&settings)?;
    let removed = coach.purge_older_than(days).await?;

    Output::success(&format!(
        "Removed {} conversations idle for more than {} days",
        removed, days
    ));
    Ok(())
}
