//! Prompt context assembled from retrieved chunks.

use super::citations::citation_number;
use crate::model::{Citation, RetrievalResult};

/// Format retrieved chunks for the model prompt.
///
/// Each excerpt is labelled with the number of the citation that covers it,
/// so `[n]` in the answer lines up with `citations[n - 1]`. Chunks whose
/// source did not make the citation cut are left out.
pub fn format_context_for_prompt(results: &[RetrievalResult], citations: &[Citation]) -> String {
    results
        .iter()
        .filter_map(|result| {
            citation_number(citations, result).map(|n| format_excerpt(n, result))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn format_excerpt(number: usize, result: &RetrievalResult) -> String {
    format!(
        "---\n[{}] {}\n{}\n---",
        number,
        source_label(result),
        result.content.trim()
    )
}

/// Human-readable label such as `Learning by Doing (DuFour), Chapter 2, p. 41`.
pub fn source_label(result: &RetrievalResult) -> String {
    let meta = &result.metadata;
    let mut label = format!("{} ({})", meta.source_document, meta.author);
    if let Some(section) = &meta.section {
        label.push_str(&format!(", {}", section));
    }
    if let Some(page) = meta.page_number {
        label.push_str(&format!(", p. {}", page));
    }
    label
}

/// Format citations for display to the user.
pub fn format_citations_for_display(citations: &[Citation]) -> String {
    citations
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let mut line = format!("[{}] {} ({})", i + 1, c.source_document, c.author);
            if let Some(section) = &c.chapter_or_section {
                line.push_str(&format!(", {}", section));
            }
            if let Some(page) = c.page_number {
                line.push_str(&format!(", p. {}", page));
            }
            line.push_str(&format!(" (score: {:.2})", c.relevance_score));
            if let Some(url) = &c.url {
                line.push_str(&format!("\n    {}", url));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChunkMetadata;
    use crate::rag::CitationBuilder;

    fn result(id: &str, source: &str, content: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            id: id.to_string(),
            score,
            metadata: ChunkMetadata {
                chunk_id: id.to_string(),
                source_document: source.to_string(),
                author: "Eaker".to_string(),
                section: Some("Chapter 2".to_string()),
                page_number: Some(41),
                critical_question: None,
                topics: Vec::new(),
                token_count: 5,
                url: None,
            },
            content: content.to_string(),
        }
    }

    #[test]
    fn test_prompt_numbers_follow_citations() {
        let results = vec![
            result("a", "Taking Action", "Teams write SMART goals.", 0.9),
            result("b", "Learning by Doing", "Norms guide collaboration.", 0.8),
            result("c", "Taking Action", "Goals are reviewed quarterly.", 0.7),
        ];
        let citations = CitationBuilder::new(5).build(&results);
        let prompt = format_context_for_prompt(&results, &citations);

        assert!(prompt.contains("[1] Taking Action (Eaker), Chapter 2, p. 41\nTeams write SMART goals."));
        assert!(prompt.contains("[2] Learning by Doing"));
        assert!(prompt.contains("[1] Taking Action (Eaker), Chapter 2, p. 41\nGoals are reviewed quarterly."));
    }

    #[test]
    fn test_uncited_chunks_are_dropped() {
        let results = vec![
            result("a", "Taking Action", "kept", 0.9),
            result("b", "Learning by Doing", "dropped", 0.8),
        ];
        let citations = CitationBuilder::new(1).build(&results);
        let prompt = format_context_for_prompt(&results, &citations);

        assert!(prompt.contains("kept"));
        assert!(!prompt.contains("dropped"));
    }

    #[test]
    fn test_display_format() {
        let results = vec![result("a", "Taking Action", "x", 0.87)];
        let citations = CitationBuilder::default().build(&results);
        let display = format_citations_for_display(&citations);
        assert_eq!(display, "[1] Taking Action (Eaker), Chapter 2, p. 41 (score: 0.87)");
    }
}
