//! CSV export of the three harvested tables.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::ExportTables;
use crate::config::OutputConfig;

/// Errors raised while writing export files
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Locations of the written tables
#[derive(Debug, Clone)]
pub struct ExportPaths {
    pub papers: PathBuf,
    pub authors: PathBuf,
    pub paper_authors: PathBuf,
}

#[derive(Serialize)]
struct PaperRow<'a> {
    paper_id: &'a str,
    title: &'a str,
    url: Option<&'a str>,
    year: Option<i32>,
    citation_count: Option<u64>,
}

#[derive(Serialize)]
struct AuthorRow<'a> {
    author_id: &'a str,
    name: &'a str,
    profile_url: &'a str,
    citation_count: Option<u64>,
}

#[derive(Serialize)]
struct LinkRow<'a> {
    paper_id: &'a str,
    author_id: &'a str,
    order: u32,
}

/// Writes `papers`, `authors` and `paper_authors` tables as CSV files
#[derive(Debug, Clone)]
pub struct CsvExporter {
    directory: PathBuf,
    papers_file: String,
    authors_file: String,
    links_file: String,
}

impl CsvExporter {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            directory: config.directory.clone(),
            papers_file: config.papers_file.clone(),
            authors_file: config.authors_file.clone(),
            links_file: config.paper_authors_file.clone(),
        }
    }

    /// Export into a different directory, keeping file names
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn write(&self, tables: &ExportTables) -> Result<ExportPaths, ExportError> {
        fs::create_dir_all(&self.directory)?;

        let paths = ExportPaths {
            papers: self.directory.join(&self.papers_file),
            authors: self.directory.join(&self.authors_file),
            paper_authors: self.directory.join(&self.links_file),
        };

        write_rows(
            &paths.papers,
            tables.papers.iter().map(|p| PaperRow {
                paper_id: &p.paper_id,
                title: &p.title,
                url: p.url.as_deref(),
                year: p.year,
                citation_count: p.citation_count,
            }),
        )?;
        tracing::info!(
            "Exported {} papers to {}",
            tables.papers.len(),
            paths.papers.display()
        );

        write_rows(
            &paths.authors,
            tables.authors.iter().map(|a| AuthorRow {
                author_id: &a.author_id,
                name: &a.name,
                profile_url: &a.profile_url,
                citation_count: a.citation_count.as_option(),
            }),
        )?;
        tracing::info!(
            "Exported {} authors to {}",
            tables.authors.len(),
            paths.authors.display()
        );

        write_rows(
            &paths.paper_authors,
            tables.links.iter().map(|l| LinkRow {
                paper_id: &l.paper_id,
                author_id: &l.author_id,
                order: l.order,
            }),
        )?;
        tracing::info!(
            "Exported {} paper-author relationships to {}",
            tables.links.len(),
            paths.paper_authors.display()
        );

        Ok(paths)
    }
}

fn write_rows<T: Serialize>(
    path: &Path,
    rows: impl Iterator<Item = T>,
) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_writer(File::create(path)?);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Author, PaperBuilder};
    use crate::store::Repository;
    use tempfile::tempdir;

    #[test]
    fn test_writes_three_tables() {
        let dir = tempdir().unwrap();
        let mut repo = Repository::new();
        repo.add_paper(
            PaperBuilder::new("p1", "Cache, Coherence")
                .url("https://example.org/paper/p1")
                .year(2020)
                .build(),
        );
        repo.add_author(Author::new("a1", "Ada", "https://example.org/author/Ada/a1"));
        repo.add_author(Author::new("a2", "Bob", "https://example.org/author/Bob/a2"));
        repo.add_link("p1", "a1", 1).unwrap();
        repo.add_link("p1", "a2", 2).unwrap();
        repo.set_author_citation_count("a1", Some(0)).unwrap();
        repo.set_author_citation_count("a2", None).unwrap();

        let exporter = CsvExporter::new(&OutputConfig::default()).with_directory(dir.path());
        let paths = exporter.write(&repo.export()).unwrap();

        let papers = std::fs::read_to_string(&paths.papers).unwrap();
        let mut lines = papers.lines();
        assert_eq!(lines.next(), Some("paper_id,title,url,year,citation_count"));
        assert_eq!(
            lines.next(),
            Some("p1,\"Cache, Coherence\",https://example.org/paper/p1,2020,")
        );

        let authors = std::fs::read_to_string(&paths.authors).unwrap();
        let authors: Vec<&str> = authors.lines().collect();
        assert_eq!(authors[0], "author_id,name,profile_url,citation_count");
        assert!(authors[1].ends_with(",0"));
        assert!(authors[2].ends_with(','));

        let links = std::fs::read_to_string(&paths.paper_authors).unwrap();
        assert_eq!(links.lines().count(), 3);
        assert!(links.starts_with("paper_id,author_id,order"));
    }

    #[test]
    fn test_unwritable_directory_fails() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let exporter = CsvExporter::new(&OutputConfig::default()).with_directory(blocker.join("sub"));
        let result = exporter.write(&Repository::new().export());
        assert!(matches!(result, Err(ExportError::Io(_))));
    }
}
