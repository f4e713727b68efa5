//! CLI output formatting utilities.

use crate::model::{Citation, RetrievalResult};
use crate::rag::context::source_label;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print an indexed source line.
    pub fn source_info(title: &str, author: &str, chunks: u32) {
        println!(
            "  {} {} ({}, {} chunks)",
            style("*").cyan(),
            style(title).bold(),
            style(author).dim(),
            chunks
        );
    }

    /// Print one retrieval hit.
    pub fn search_result(result: &RetrievalResult) {
        println!(
            "\n{} {} (score: {:.2})",
            style(">>").green(),
            style(source_label(result)).bold(),
            result.score
        );
        if let Some(question) = result.metadata.critical_question {
            println!("   {}", style(question.to_string()).cyan());
        }
        println!("   {}", content_preview(&result.content, 200));
        if let Some(url) = &result.metadata.url {
            println!("   {}", style(url).dim());
        }
    }

    /// Print the citations under an answer.
    pub fn citations(citations: &[Citation]) {
        if citations.is_empty() {
            return;
        }
        println!("{}", style("Sources").dim().underlined());
        for line in crate::rag::format_citations_for_display(citations).lines() {
            println!("  {}", style(line).dim());
        }
        println!();
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(spinner_style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Truncate content with ellipsis.
fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        let cut: String = content.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_preview() {
        assert_eq!(content_preview("short\ntext", 50), "short text");
        assert_eq!(content_preview("élève élève", 5), "élève...");
    }
}
