//! Core data models for harvested papers, authors and bylines.

mod author;
mod link;
mod paper;

pub use author::{Author, CitationCount};
pub use link::PaperAuthorLink;
pub use paper::{fallback_paper_id, Paper, PaperBuilder, UNKNOWN_TITLE};
