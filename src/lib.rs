//! # Research Harvester
//!
//! A resilient, browser-driven harvester for paper, author and citation
//! records from paginated scholarly catalogs.
//!
//! ## Architecture
//!
//! - [`extract`]: selector fallback chains, search-page parsing and citation heuristics
//! - [`browser`]: the [`BrowserDriver`] seam plus Chromium and scripted drivers
//! - [`session`]: session ownership, challenge handling and bounded retry across resets
//! - [`crawl`]: the [`Harvester`] pipeline (pagination, then author profiles)
//! - [`store`]: deduplicating repository, author visit queue and CSV export
//! - [`models`]: papers, authors and byline links
//! - [`utils`]: backoff, pacing and cancellation
//! - [`config`]: layered configuration

pub mod browser;
pub mod config;
pub mod crawl;
pub mod extract;
pub mod models;
pub mod session;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use browser::{BrowserDriver, DriverError};
pub use crawl::{HarvestError, Harvester, RunReport};
pub use models::{Author, CitationCount, Paper, PaperAuthorLink};
pub use store::Repository;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
