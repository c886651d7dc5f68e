//! YouBook Common Library
//!
//! Shared code for the YouBook backend including:
//! - Database entities, sequencing, upserts and transactions
//! - The content transformer abstraction (generative-text service)
//! - The drafting flows composed by the HTTP routes
//! - Error types and handling
//! - Configuration management
//! - Session identity
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod db;
pub mod drafting;
pub mod errors;
pub mod extract;
pub mod metrics;
pub mod transformer;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use errors::{AppError, Result};
pub use transformer::ContentTransformer;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Title used when a book is stored without one
pub const DEFAULT_BOOK_TITLE: &str = "제목없는 자서전";
