//! Paper-author association.

use serde::{Deserialize, Serialize};

/// One author position in a paper byline
///
/// Unique by `(paper_id, author_id)`; `order` is the 1-based byline position
/// of the first sighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperAuthorLink {
    pub paper_id: String,
    pub author_id: String,
    pub order: u32,
}

impl PaperAuthorLink {
    pub fn new(paper_id: impl Into<String>, author_id: impl Into<String>, order: u32) -> Self {
        Self {
            paper_id: paper_id.into(),
            author_id: author_id.into(),
            order,
        }
    }

    /// Uniqueness key
    pub fn key(&self) -> (&str, &str) {
        (&self.paper_id, &self.author_id)
    }
}
