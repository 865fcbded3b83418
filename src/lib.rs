//! Tool selector - catalog, persistence and ranking of agent tool descriptors
//!
//! Descriptors are read from directories or remote MCP-style endpoints,
//! normalized into [`ToolRecord`]s, optionally persisted to SQLite, and
//! ranked against free-text queries with a feedback-aware heuristic. The
//! HTTP service in `main.rs` is a thin host over these components.

pub mod catalog;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ingestion;
pub mod persistence;
pub mod ranking;
pub mod state;

// Re-export key types for convenience
pub use catalog::ToolCatalog;
pub use config::Config;
pub use error::{AppError, Result};
pub use ingestion::{
    JsonSchemaValidator, NoopValidator, Normalizer, SchemaValidator, SchemaVariant, ToolRecord,
};
pub use persistence::{CatalogStorage, FeedbackOutcome, FeedbackStats, FeedbackSummary};
pub use ranking::{RankOptions, RankedTool, RankingWeights, ToolRanker};
pub use state::{AppState, ReloadReport};
