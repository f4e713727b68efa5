//! Interactive coaching session in the terminal.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::model::ChatRequest;
use crate::orchestrator::CoachOrchestrator;
use anyhow::Result;
use console::style;
use std::io::{self, BufRead, Write};

/// Run the interactive chat command.
pub async fn run_chat(user: &str, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Chat, &settings) {
        Output::error(&e.to_string());
        return Err(e.into());
    }

    let coach = CoachOrchestrator::from_settings(&settings)?;
    let mut session = coach.create_session(user).await?;

    println!("\n{}", style("PLC Coach").bold().cyan());
    println!(
        "{}\n",
        style("Ask about your PLC work, or type 'exit' to quit. Use 'new' to start a fresh session.")
            .dim()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            Output::info("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("new") {
            session = coach.create_session(user).await?;
            Output::info(&format!("Started session {}", session.id));
            continue;
        }

        let spinner = Output::spinner("Thinking...");
        let result = coach
            .handle_chat_request(ChatRequest {
                session_id: session.id.clone(),
                message: input.to_string(),
                filter: None,
            })
            .await;
        spinner.finish_and_clear();

        match result {
            Ok(response) => {
                println!("\n{} {}\n", style("Coach:").cyan().bold(), response.content);
                Output::citations(&response.citations);
            }
            Err(e) => {
                Output::error(&format!("Error: {}", e));
            }
        }
    }

    Ok(())
}
