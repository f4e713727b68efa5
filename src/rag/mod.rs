//! Retrieval-augmented generation: ranked retrieval, citations, prompt
//! context and the language model seam.

pub mod citations;
pub mod context;
mod llm;
mod retriever;

pub use citations::CitationBuilder;
pub use context::{format_citations_for_display, format_context_for_prompt};
pub use llm::{ChatTurn, Completion, CompletionRequest, LanguageModel, OpenAIChatModel};
pub use retriever::Retriever;
