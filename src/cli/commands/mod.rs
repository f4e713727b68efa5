//! CLI command implementations.

mod chat;
mod config;
mod ingest;
mod purge;
mod search;
mod serve;
mod sources;

pub use chat::run_chat;
pub use config::run_config;
pub use ingest::run_ingest;
pub use purge::run_purge;
pub use search::run_search;
pub use serve::run_serve;
pub use sources::run_sources;
