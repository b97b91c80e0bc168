//! Paper model representing one search-result card.

use serde::{Deserialize, Serialize};

/// Title recorded when no title rule matches a card
pub const UNKNOWN_TITLE: &str = "Unknown Title";

/// A research paper harvested from a search listing
///
/// Papers are created once while a search page is parsed and never mutated
/// afterwards; the repository keeps the first sighting of each `paper_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    /// Catalog identifier (URL slug) or a title hash when no link was found
    pub paper_id: String,

    /// Paper title
    pub title: String,

    /// Absolute paper page URL
    pub url: Option<String>,

    /// Publication year
    pub year: Option<i32>,

    /// Citation count shown on the search card
    pub citation_count: Option<u64>,
}

impl Paper {
    /// Create a new paper with required fields
    pub fn new(paper_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            paper_id: paper_id.into(),
            title: title.into(),
            url: None,
            year: None,
            citation_count: None,
        }
    }

    /// Whether the card exposed a citation count
    pub fn has_citations(&self) -> bool {
        self.citation_count.is_some()
    }
}

/// Deterministic identifier for papers without an extractable catalog id.
///
/// First 16 hex digits of the MD5 digest of the title.
pub fn fallback_paper_id(title: &str) -> String {
    let digest = format!("{:x}", md5::compute(title.as_bytes()));
    digest[..16].to_string()
}

/// Builder for constructing Paper objects
#[derive(Debug, Clone)]
pub struct PaperBuilder {
    paper: Paper,
}

impl PaperBuilder {
    /// Create a new builder with required fields
    pub fn new(paper_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            paper: Paper::new(paper_id, title),
        }
    }

    /// Set paper URL
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.paper.url = Some(url.into());
        self
    }

    /// Set publication year
    pub fn year(mut self, year: i32) -> Self {
        self.paper.year = Some(year);
        self
    }

    /// Set citation count
    pub fn citations(mut self, count: u64) -> Self {
        self.paper.citation_count = Some(count);
        self
    }

    /// Set optional fields in one go, as extracted from a card
    pub fn maybe(mut self, year: Option<i32>, citations: Option<u64>) -> Self {
        self.paper.year = year;
        self.paper.citation_count = citations;
        self
    }

    /// Build the Paper
    pub fn build(self) -> Paper {
        self.paper
    }
}
