//! Citation building from retrieval results.

use crate::model::{Citation, RetrievalResult};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Default cap on citations per response.
pub const DEFAULT_MAX_CITATIONS: usize = 5;

/// Key identifying one citable place in the library.
type SourceKey<'a> = (&'a str, Option<&'a str>);

fn source_key(result: &RetrievalResult) -> SourceKey<'_> {
    (
        result.metadata.source_document.as_str(),
        result.metadata.section.as_deref(),
    )
}

/// Maps retrieval results to deduplicated, ordered citations.
#[derive(Debug, Clone)]
pub struct CitationBuilder {
    max_citations: usize,
}

impl CitationBuilder {
    pub fn new(max_citations: usize) -> Self {
        Self { max_citations }
    }

    /// Build citations for a set of retrieval results.
    ///
    /// One citation per (source document, section), carrying the best chunk
    /// of that group. Output is sorted by relevance descending (ties keep
    /// first appearance) and capped.
    pub fn build(&self, results: &[RetrievalResult]) -> Vec<Citation> {
        let mut best: Vec<&RetrievalResult> = Vec::new();
        let mut positions: HashMap<SourceKey<'_>, usize> = HashMap::new();

        for result in results.iter().filter(|r| r.score.is_finite()) {
            match positions.get(&source_key(result)) {
                Some(&i) => {
                    if result.score > best[i].score {
                        best[i] = result;
                    }
                }
                None => {
                    positions.insert(source_key(result), best.len());
                    best.push(result);
                }
            }
        }

        let mut citations: Vec<Citation> = best.into_iter().map(to_citation).collect();
        citations.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(Ordering::Equal)
        });
        citations.truncate(self.max_citations);
        citations
    }
}

impl Default for CitationBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CITATIONS)
    }
}

fn to_citation(result: &RetrievalResult) -> Citation {
    Citation {
        id: result.id.clone(),
        source_document: result.metadata.source_document.clone(),
        author: result.metadata.author.clone(),
        chapter_or_section: result.metadata.section.clone(),
        page_number: result.metadata.page_number,
        url: result.metadata.url.clone(),
        relevance_score: result.score.clamp(0.0, 1.0),
    }
}

/// Position (1-based) of the citation covering a result, if it was cited.
pub fn citation_number(citations: &[Citation], result: &RetrievalResult) -> Option<usize> {
    citations
        .iter()
        .position(|c| {
            c.source_document == result.metadata.source_document
                && c.chapter_or_section == result.metadata.section
        })
        .map(|i| i + 1)
}
