//! Author model and the tri-state citation count.

use serde::{Deserialize, Serialize};

/// Citation count of an author profile
///
/// `Unset` until the profile visit is attempted. `Measured(0)` means the
/// profile loaded but exposed no count; `Failed` means the visit itself
/// never succeeded. The two must not be collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationCount {
    #[default]
    Unset,
    Measured(u64),
    Failed,
}

impl CitationCount {
    /// Value as written to the `authors` table (`None` for unset and failed)
    pub fn as_option(&self) -> Option<u64> {
        match self {
            CitationCount::Measured(n) => Some(*n),
            CitationCount::Unset | CitationCount::Failed => None,
        }
    }

    pub fn is_measured(&self) -> bool {
        matches!(self, CitationCount::Measured(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CitationCount::Failed)
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, CitationCount::Unset)
    }
}

impl From<Option<u64>> for CitationCount {
    fn from(value: Option<u64>) -> Self {
        match value {
            Some(n) => CitationCount::Measured(n),
            None => CitationCount::Failed,
        }
    }
}

/// An author discovered in a paper byline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Catalog identifier taken from the profile URL
    pub author_id: String,

    /// Display name as shown in the byline
    pub name: String,

    /// Absolute profile URL
    pub profile_url: String,

    /// Citation count, filled in by the author queue processor
    pub citation_count: CitationCount,
}

impl Author {
    pub fn new(
        author_id: impl Into<String>,
        name: impl Into<String>,
        profile_url: impl Into<String>,
    ) -> Self {
        Self {
            author_id: author_id.into(),
            name: name.into(),
            profile_url: profile_url.into(),
            citation_count: CitationCount::Unset,
        }
    }
}
