//! Owned, deduplicating store for papers, authors and byline links.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::models::{Author, CitationCount, Paper, PaperAuthorLink};

/// Errors raised when an insertion would break referential integrity
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Unknown paper: {0}")]
    UnknownPaper(String),

    #[error("Unknown author: {0}")]
    UnknownAuthor(String),
}

/// Sole owner of the three harvested collections
///
/// Every insertion is first-write-wins on its uniqueness key, so reprocessing
/// a page after a recovery never produces duplicate rows.
#[derive(Debug, Default)]
pub struct Repository {
    papers: Vec<Paper>,
    paper_ids: HashSet<String>,
    authors: Vec<Author>,
    author_index: HashMap<String, usize>,
    links: Vec<PaperAuthorLink>,
    link_keys: HashSet<(String, String)>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a paper; returns `false` if its id is already present
    pub fn add_paper(&mut self, paper: Paper) -> bool {
        if !self.paper_ids.insert(paper.paper_id.clone()) {
            return false;
        }
        self.papers.push(paper);
        true
    }

    /// Insert an author; returns `false` if its id is already present
    pub fn add_author(&mut self, author: Author) -> bool {
        if self.author_index.contains_key(&author.author_id) {
            return false;
        }
        self.author_index
            .insert(author.author_id.clone(), self.authors.len());
        self.authors.push(author);
        true
    }

    /// Insert a byline link; both ends must already exist
    pub fn add_link(
        &mut self,
        paper_id: &str,
        author_id: &str,
        order: u32,
    ) -> Result<bool, RepositoryError> {
        if !self.paper_ids.contains(paper_id) {
            return Err(RepositoryError::UnknownPaper(paper_id.to_string()));
        }
        if !self.author_index.contains_key(author_id) {
            return Err(RepositoryError::UnknownAuthor(author_id.to_string()));
        }
        if !self
            .link_keys
            .insert((paper_id.to_string(), author_id.to_string()))
        {
            return Ok(false);
        }
        self.links
            .push(PaperAuthorLink::new(paper_id, author_id, order));
        Ok(true)
    }

    /// Record the outcome of a profile visit
    pub fn set_author_citation_count(
        &mut self,
        author_id: &str,
        value: impl Into<CitationCount>,
    ) -> Result<(), RepositoryError> {
        let index = *self
            .author_index
            .get(author_id)
            .ok_or_else(|| RepositoryError::UnknownAuthor(author_id.to_string()))?;
        self.authors[index].citation_count = value.into();
        Ok(())
    }

    pub fn contains_paper(&self, paper_id: &str) -> bool {
        self.paper_ids.contains(paper_id)
    }

    pub fn author(&self, author_id: &str) -> Option<&Author> {
        self.author_index.get(author_id).map(|&i| &self.authors[i])
    }

    pub fn paper_count(&self) -> usize {
        self.papers.len()
    }

    pub fn author_count(&self) -> usize {
        self.authors.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn papers(&self) -> &[Paper] {
        &self.papers
    }

    pub fn authors(&self) -> &[Author] {
        &self.authors
    }

    pub fn links(&self) -> &[PaperAuthorLink] {
        &self.links
    }

    /// Materialize the three tables with summary statistics
    pub fn export(&self) -> ExportTables {
        ExportTables {
            papers: self.papers.clone(),
            authors: self.authors.clone(),
            links: self.links.clone(),
            summary: self.summary(),
        }
    }

    pub fn summary(&self) -> ExportSummary {
        let mean_authors_per_paper = if self.papers.is_empty() {
            0.0
        } else {
            self.links.len() as f64 / self.papers.len() as f64
        };

        ExportSummary {
            papers: self.papers.len(),
            authors: self.authors.len(),
            links: self.links.len(),
            mean_authors_per_paper,
            papers_with_citations: self.papers.iter().filter(|p| p.has_citations()).count(),
            authors_with_citations: self
                .authors
                .iter()
                .filter(|a| a.citation_count.is_measured())
                .count(),
            authors_failed: self
                .authors
                .iter()
                .filter(|a| a.citation_count.is_failed())
                .count(),
        }
    }
}

/// Snapshot of the repository ready to be written out
#[derive(Debug, Clone)]
pub struct ExportTables {
    pub papers: Vec<Paper>,
    pub authors: Vec<Author>,
    pub links: Vec<PaperAuthorLink>,
    pub summary: ExportSummary,
}

/// Operator-facing statistics computed at export time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSummary {
    pub papers: usize,
    pub authors: usize,
    pub links: usize,
    pub mean_authors_per_paper: f64,
    pub papers_with_citations: usize,
    pub authors_with_citations: usize,
    pub authors_failed: usize,
}

impl ExportSummary {
    /// Log the summary block
    pub fn log(&self) {
        tracing::info!("--- Summary Statistics ---");
        tracing::info!("Total papers scraped: {}", self.papers);
        tracing::info!("Total unique authors: {}", self.authors);
        tracing::info!("Paper-author relationships: {}", self.links);
        tracing::info!(
            "Average authors per paper: {:.1}",
            self.mean_authors_per_paper
        );
        tracing::info!("Papers with citation data: {}", self.papers_with_citations);
        tracing::info!(
            "Authors with citation data: {}",
            self.authors_with_citations
        );
        if self.authors_failed > 0 {
            tracing::warn!("Authors whose profile could not be loaded: {}", self.authors_failed);
        }
    }
}
