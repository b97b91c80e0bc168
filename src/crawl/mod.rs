//! End-to-end harvesting pipeline.
//!
//! [`Harvester`] owns the session, the repository and the author queue.
//! A run has two phases: the crawl walks search pages and records papers,
//! authors and byline links; the author phase then visits every queued
//! profile once to measure citation counts. Export is separate so callers
//! can write partial results after a cancelled or degraded run.

mod authors;
mod controller;

pub use authors::AuthorReport;
pub use controller::{CrawlReport, CrawlStop};

use chrono::{DateTime, Utc};
use url::Url;

use crate::browser::BrowserDriver;
use crate::config::{Config, ConfigError};
use crate::extract::{CompiledSelectors, SelectorError};
use crate::session::{SessionManager, SessionStats};
use crate::store::{AuthorQueue, CsvExporter, ExportError, ExportPaths, ExportSummary, Repository};
use crate::utils::{Pacer, RetryConfig, Shutdown};

/// Errors that prevent a run from starting or its results from being saved
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error("Invalid base URL: {0}")]
    BaseUrl(#[from] url::ParseError),

    #[error("Export failed: {0}")]
    Export(#[from] ExportError),
}

/// What happened during one run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub query: String,
    pub limit: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub crawl: CrawlReport,
    pub authors: AuthorReport,
    pub session: SessionStats,
}

impl RunReport {
    pub fn cancelled(&self) -> bool {
        self.crawl.stop == CrawlStop::Cancelled || self.authors.cancelled
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    pub fn log(&self) {
        tracing::info!(
            "Run for \"{}\" finished in {}s: {} pages fetched, {} failed, stop reason: {}",
            self.query,
            self.elapsed().num_seconds(),
            self.crawl.pages_fetched,
            self.crawl.pages_failed,
            self.crawl.stop
        );
        tracing::info!(
            "Authors: {} measured, {} failed, {} skipped",
            self.authors.measured,
            self.authors.failed,
            self.authors.skipped
        );
        tracing::info!(
            "Sessions: {} started, {} resets, {} challenges ({} bypassed)",
            self.session.sessions_started,
            self.session.resets,
            self.session.challenges_seen,
            self.session.challenges_bypassed
        );
    }
}

/// The resilient harvesting pipeline
#[derive(Debug)]
pub struct Harvester {
    config: Config,
    selectors: CompiledSelectors,
    base: Url,
    session: SessionManager,
    repository: Repository,
    queue: AuthorQueue,
    retry: RetryConfig,
    pacer: Pacer,
    shutdown: Shutdown,
}

impl Harvester {
    pub fn new(
        config: Config,
        driver: Box<dyn BrowserDriver>,
        shutdown: Shutdown,
    ) -> Result<Self, HarvestError> {
        config.validate()?;
        let selectors = config.selectors.compile()?;
        let base = Url::parse(&config.crawl.base_url)?;
        let session = SessionManager::new(
            driver,
            config.session.clone(),
            config.crawl.wait_policy,
        );

        Ok(Self {
            selectors,
            base,
            session,
            repository: Repository::new(),
            queue: AuthorQueue::new(),
            retry: config.retry.to_retry_config(),
            pacer: Pacer::new(&config.pacing),
            shutdown,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn queue(&self) -> &AuthorQueue {
        &self.queue
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Crawl `query` until `limit` papers are collected, then visit every
    /// discovered author. Never fails: degraded units are recorded as such.
    pub async fn run(&mut self, query: &str, limit: usize) -> RunReport {
        let started_at = Utc::now();
        tracing::info!("Harvesting \"{}\" (limit {} papers)", query, limit);

        let crawl = self.crawl(query, limit).await;
        tracing::info!(
            "Crawl finished ({}): {} papers, {} authors queued",
            crawl.stop,
            self.repository.paper_count(),
            self.queue.len()
        );

        let authors = if crawl.stop == CrawlStop::Cancelled {
            AuthorReport::skipped_all(self.queue.len())
        } else {
            self.process_authors().await
        };

        self.session.close().await;

        RunReport {
            query: query.to_string(),
            limit,
            started_at,
            finished_at: Utc::now(),
            crawl,
            authors,
            session: self.session.stats(),
        }
    }

    /// Write the repository to the configured output directory
    pub fn export(&self) -> Result<(ExportPaths, ExportSummary), HarvestError> {
        let tables = self.repository.export();
        let paths = CsvExporter::new(&self.config.output).write(&tables)?;
        Ok((paths, tables.summary))
    }
}
