//! Serve command: run the HTTP API.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::CoachOrchestrator;
use crate::server::{create_router, spawn_retention_task, AppState};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Run the HTTP API server.
pub async fn run_serve(host: Option<String>, port: Option<u16>, settings: Settings) -> Result<()> {
    let coach = Arc::new(CoachOrchestrator::from_settings(&settings)?);

    let retention = settings.conversation.retention_days.map(|days| {
        let every = Duration::from_secs(settings.conversation.purge_interval_minutes.max(1) * 60);
        info!("Purging conversations idle for {} days every {:?}", days, every);
        spawn_retention_task(coach.clone(), days, every)
    });

    let app = create_router(AppState::new(coach, settings.server.phase.clone()));

    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("PLC Coach API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /api/health");
    Output::kv("Create session", "POST /api/sessions");
    Output::kv("Session", "GET  /api/sessions/{id}");
    Output::kv("History", "GET  /api/sessions/{id}/messages");
    Output::kv("Chat", "POST /api/chat");
    Output::kv("Feedback", "POST /api/feedback");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    if let Some(task) = retention {
        task.abort();
    }
    Output::info("Server stopped.");

    Ok(())
}
