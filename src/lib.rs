//! PLC Coach - cited answers for Professional Learning Communities
//!
//! A retrieval-augmented coaching assistant. Questions are embedded, matched
//! against an index of pre-chunked PLC literature, and answered by a language
//! model that cites the excerpts it was given.
//!
//! # Architecture
//!
//! - `conversation` - Sessions, messages and feedback (memory or SQLite)
//! - `index` - Embedded chunks and similarity search (memory or SQLite)
//! - `embedding` - Embedding generation
//! - `rag` - Ranked retrieval, citation building and the model seam
//! - `orchestrator` - One chat turn from request to stored answer
//! - `ingest` - Loading chunk files into the index
//! - `server` - JSON HTTP API
//! - `config` - Settings and prompt templates
//!
//! # Example
//!
//! ```rust,no_run
//! use plc_coach::config::Settings;
//! use plc_coach::model::ChatRequest;
//! use plc_coach::orchestrator::CoachOrchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let coach = CoachOrchestrator::from_settings(&settings)?;
//!
//!     let session = coach.create_session("teacher-42").await?;
//!     let response = coach
//!         .handle_chat_request(ChatRequest {
//!             session_id: session.id,
//!             message: "How do we write SMART goals as a team?".to_string(),
//!             filter: None,
//!         })
//!         .await?;
//!
//!     println!("{}", response.content);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ingest;
pub mod model;
pub mod openai;
pub mod orchestrator;
pub mod rag;
pub mod server;

pub use error::{CoachError, Result};
