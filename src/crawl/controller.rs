//! Search-result pagination.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::Harvester;
use crate::extract::{parse_search_page, NextControl, SearchPage};
use crate::models::Author;
use crate::session::{run_unit, PageSnapshot, SessionManager, SessionOutcome, Unit, UnitResult};

/// Why the crawl stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlStop {
    /// The paper limit was reached
    LimitReached,
    /// A page loaded but held no paper cards
    NoResults,
    /// No usable next-page control
    NoNextPage,
    /// The page ceiling was reached
    PageCeiling,
    /// A page exhausted its retries and could not be skipped
    PageExhausted,
    Cancelled,
}

impl fmt::Display for CrawlStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            CrawlStop::LimitReached => "paper limit reached",
            CrawlStop::NoResults => "no results on page",
            CrawlStop::NoNextPage => "no next page",
            CrawlStop::PageCeiling => "page ceiling reached",
            CrawlStop::PageExhausted => "page retries exhausted",
            CrawlStop::Cancelled => "cancelled",
        };
        f.write_str(reason)
    }
}

/// Crawl phase counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    pub pages_fetched: u32,
    pub pages_failed: u32,
    pub papers_added: usize,
    pub authors_discovered: usize,
    pub stop: CrawlStop,
}

/// How the next search page is reached
#[derive(Debug, Clone, PartialEq, Eq)]
enum PageTarget {
    Url(String),
    /// Click `locator` on `page_url`
    NextOf { page_url: String, locator: String },
}

/// One search page as a retryable unit
struct PageUnit {
    number: u32,
    target: PageTarget,
    timeout: Duration,
    ready: Vec<String>,
}

#[async_trait]
impl Unit for PageUnit {
    type Output = PageSnapshot;

    fn label(&self) -> String {
        format!("search page {}", self.number)
    }

    async fn attempt(&mut self, session: &mut SessionManager) -> SessionOutcome<PageSnapshot> {
        match &self.target {
            PageTarget::Url(url) => session.load(url, self.timeout, &self.ready).await,
            PageTarget::NextOf { page_url, locator } => {
                session
                    .click_through(page_url, locator, self.timeout, &self.ready)
                    .await
            }
        }
    }
}

/// Result of merging one page into the repository
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ingested {
    pub papers: usize,
    pub authors: usize,
}

impl Harvester {
    pub(super) async fn crawl(&mut self, query: &str, limit: usize) -> CrawlReport {
        let max_pages = self.config.crawl.max_pages;
        let timeout = self.config.session.search_navigation_timeout();
        let ready = self.selectors.search_ready.clone();

        let mut report = CrawlReport {
            pages_fetched: 0,
            pages_failed: 0,
            papers_added: 0,
            authors_discovered: 0,
            stop: CrawlStop::PageCeiling,
        };
        let mut target = PageTarget::Url(self.config.crawl.search_url(query));
        let mut number = 0;

        report.stop = loop {
            if self.shutdown.is_triggered() {
                break CrawlStop::Cancelled;
            }
            if self.repository.paper_count() >= limit {
                break CrawlStop::LimitReached;
            }
            if number >= max_pages {
                tracing::info!("Reached maximum page limit ({} pages). Stopping.", max_pages);
                break CrawlStop::PageCeiling;
            }
            number += 1;

            if number > 1 && !self.pacer.before_page(&self.shutdown).await {
                break CrawlStop::Cancelled;
            }

            tracing::info!(
                "Processing search page {}. Papers collected so far: {}",
                number,
                self.repository.paper_count()
            );

            let mut unit = PageUnit {
                number,
                target: target.clone(),
                timeout,
                ready: ready.clone(),
            };
            let snapshot =
                match run_unit(&mut self.session, &self.retry, &self.shutdown, &mut unit).await {
                    UnitResult::Done(snapshot) => snapshot,
                    UnitResult::Cancelled => break CrawlStop::Cancelled,
                    UnitResult::Exhausted { attempts, last_failure } => {
                        report.pages_failed += 1;
                        tracing::error!(
                            "Search page {} failed after {} attempts: {}",
                            number,
                            attempts,
                            last_failure
                        );
                        self.write_debug_snapshot(number);
                        match self.config.crawl.page_url(query, number + 1) {
                            Some(url) => {
                                tracing::warn!("Skipping to search page {}", number + 1);
                                target = PageTarget::Url(url);
                                continue;
                            }
                            None => break CrawlStop::PageExhausted,
                        }
                    }
                };
            report.pages_fetched += 1;

            let base = Url::parse(&snapshot.url).unwrap_or_else(|_| self.base.clone());
            let page = parse_search_page(&snapshot.markup, &self.selectors, &base);
            if page.cards.is_empty() {
                tracing::warn!("No papers found on page {}. Stopping.", number);
                break CrawlStop::NoResults;
            }

            let ingested = self.ingest(&page, limit);
            report.papers_added += ingested.papers;
            report.authors_discovered += ingested.authors;
            tracing::info!(
                "Page {}: {} cards, {} new papers, {} new authors",
                number,
                page.cards.len(),
                ingested.papers,
                ingested.authors
            );

            if self.repository.paper_count() >= limit {
                break CrawlStop::LimitReached;
            }

            target = match page.next {
                NextControl::Link(url) => PageTarget::Url(url),
                NextControl::Button(locator) => PageTarget::NextOf {
                    page_url: snapshot.url,
                    locator,
                },
                NextControl::Disabled => {
                    tracing::info!("Next button is disabled. No more pages available.");
                    break CrawlStop::NoNextPage;
                }
                NextControl::Absent => {
                    tracing::info!("No next button found. Reached end of results.");
                    break CrawlStop::NoNextPage;
                }
            };
        };

        report
    }

    /// Merge a parsed page into the repository and queue new authors.
    ///
    /// Safe to call again with the same page: identifiers absorb repeats.
    pub(crate) fn ingest(&mut self, page: &SearchPage, limit: usize) -> Ingested {
        let mut ingested = Ingested::default();

        for card in &page.cards {
            let paper_id = card.paper.paper_id.clone();
            if !self.repository.contains_paper(&paper_id) {
                if self.repository.paper_count() >= limit {
                    break;
                }
                self.repository.add_paper(card.paper.clone());
                ingested.papers += 1;
                tracing::debug!("Added paper {}: {}", paper_id, card.paper.title);
            }

            for author in &card.authors {
                self.repository.add_author(Author::new(
                    &author.author_id,
                    &author.name,
                    &author.profile_url,
                ));
                if self.queue.enqueue(&author.author_id) {
                    ingested.authors += 1;
                }
                if let Err(e) = self
                    .repository
                    .add_link(&paper_id, &author.author_id, author.order)
                {
                    tracing::warn!("Dropped byline link: {}", e);
                }
            }
        }

        ingested
    }

    /// Save the last markup seen for a failed page
    fn write_debug_snapshot(&self, number: u32) {
        if !self.config.output.debug_snapshots {
            return;
        }
        let Some(markup) = self.session.last_markup() else {
            return;
        };

        let directory = &self.config.output.directory;
        let path = directory.join(format!("debug_page_{number}.html"));
        let written = std::fs::create_dir_all(directory).and_then(|_| std::fs::write(&path, markup));
        match written {
            Ok(()) => tracing::info!("Saved debug snapshot: {}", path.display()),
            Err(e) => tracing::warn!("Failed to save debug snapshot {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::ScriptedDriver;
    use crate::crawl::testing::{self, card, results, search_url, BASE};
    use crate::utils::Shutdown;
    use tempfile::tempdir;

    const NEXT_LINK: &str = r#"<a data-test-id="pagination-next-button" href="/search?q=cache&sort=relevance&page=2">Next</a>"#;
    const NEXT_DISABLED: &str = r#"<button data-test-id="pagination-next-button" disabled>Next</button>"#;

    fn harvester(driver: ScriptedDriver, output: &std::path::Path) -> Harvester {
        Harvester::new(testing::config(output), Box::new(driver), Shutdown::new()).unwrap()
    }

    fn page_two() -> String {
        format!("{BASE}/search?q=cache&sort=relevance&page=2")
    }

    #[tokio::test]
    async fn test_ingest_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut harvester = harvester(ScriptedDriver::new(), dir.path());
        let markup = results(
            &[
                card("p1", "One", &[("a1", "Ada"), ("a2", "Alan")]),
                card("p2", "Two", &[("a2", "Alan"), ("a3", "Grace")]),
            ],
            "",
        );
        let page = parse_search_page(&markup, &harvester.selectors, &harvester.base);

        let first = harvester.ingest(&page, 10);
        let second = harvester.ingest(&page, 10);

        assert_eq!(first, Ingested { papers: 2, authors: 3 });
        assert_eq!(second, Ingested::default());
        assert_eq!(harvester.repository.paper_count(), 2);
        assert_eq!(harvester.repository.author_count(), 3);
        assert_eq!(harvester.repository.link_count(), 4);
        assert_eq!(harvester.queue.len(), 3);
    }

    #[tokio::test]
    async fn test_ingest_stops_at_limit() {
        let dir = tempdir().unwrap();
        let mut harvester = harvester(ScriptedDriver::new(), dir.path());
        let markup = results(
            &[
                card("p1", "One", &[("a1", "Ada")]),
                card("p2", "Two", &[("a2", "Alan")]),
            ],
            "",
        );
        let page = parse_search_page(&markup, &harvester.selectors, &harvester.base);

        harvester.ingest(&page, 1);
        assert_eq!(harvester.repository.paper_count(), 1);
        assert!(!harvester.queue.contains("a2"));
    }

    #[tokio::test]
    async fn test_follows_next_link_until_disabled() {
        let dir = tempdir().unwrap();
        let driver = ScriptedDriver::new()
            .with_page(search_url("cache"), results(&[card("p1", "One", &[("a1", "Ada")])], NEXT_LINK))
            .with_page(page_two(), results(&[card("p2", "Two", &[("a1", "Ada")])], NEXT_DISABLED));
        let mut harvester = harvester(driver, dir.path());

        let report = harvester.crawl("cache", 50).await;
        assert_eq!(report.stop, CrawlStop::NoNextPage);
        assert_eq!(report.pages_fetched, 2);
        assert_eq!(report.papers_added, 2);
        assert_eq!(report.authors_discovered, 1);
    }

    #[tokio::test]
    async fn test_clicks_next_button() {
        let dir = tempdir().unwrap();
        let button = r#"<button data-test-id="pagination-next-button">Next</button>"#;
        let driver = ScriptedDriver::new()
            .with_page(search_url("cache"), results(&[card("p1", "One", &[])], button))
            .with_page(page_two(), results(&[card("p2", "Two", &[])], ""))
            .with_click_target(search_url("cache"), r#"[data-test-id="pagination-next-button"]"#, page_two());
        let journal = driver.journal();
        let mut harvester = harvester(driver, dir.path());

        let report = harvester.crawl("cache", 50).await;
        assert_eq!(report.stop, CrawlStop::NoNextPage);
        assert_eq!(report.pages_fetched, 2);
        assert_eq!(journal.lock().unwrap().clicks.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_page_ends_crawl() {
        let dir = tempdir().unwrap();
        let driver = ScriptedDriver::new()
            .with_page(search_url("cache"), "<html><body><p>No results</p></body></html>");
        let mut config = testing::config(dir.path());
        config.selectors.search_ready = vec!["body".to_string()];
        let mut harvester = Harvester::new(config, Box::new(driver), Shutdown::new()).unwrap();

        let report = harvester.crawl("cache", 50).await;
        assert_eq!(report.stop, CrawlStop::NoResults);
        assert_eq!(report.pages_fetched, 1);
    }

    #[tokio::test]
    async fn test_page_ceiling() {
        let dir = tempdir().unwrap();
        let driver = ScriptedDriver::new()
            .with_page(search_url("cache"), results(&[card("p1", "One", &[])], NEXT_LINK))
            .with_page(page_two(), results(&[card("p2", "Two", &[])], NEXT_LINK));
        let mut config = testing::config(dir.path());
        config.crawl.max_pages = 3;
        let mut harvester = Harvester::new(config, Box::new(driver), Shutdown::new()).unwrap();

        let report = harvester.crawl("cache", 50).await;
        assert_eq!(report.stop, CrawlStop::PageCeiling);
        assert_eq!(report.pages_fetched, 3);
        assert_eq!(harvester.repository.paper_count(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_page_is_skipped_and_snapshotted() {
        let dir = tempdir().unwrap();
        let driver = ScriptedDriver::new()
            .with_page(search_url("cache"), results(&[card("p1", "One", &[])], ""))
            .challenged(search_url("cache"), 3)
            .with_page(page_two(), results(&[card("p2", "Two", &[])], ""));
        let mut harvester = harvester(driver, dir.path());

        let report = harvester.crawl("cache", 50).await;
        assert_eq!(report.pages_failed, 1);
        assert_eq!(report.pages_fetched, 1);
        assert_eq!(report.stop, CrawlStop::NoNextPage);
        assert!(harvester.repository.contains_paper("p2"));

        let snapshot = std::fs::read_to_string(dir.path().join("debug_page_1.html")).unwrap();
        assert!(snapshot.contains("challenge-form"));
    }

    #[tokio::test]
    async fn test_exhausted_page_without_page_param_stops() {
        let dir = tempdir().unwrap();
        let driver = ScriptedDriver::new().failing(search_url("cache"), 10);
        let mut config = testing::config(dir.path());
        config.crawl.page_param = None;
        let mut harvester = Harvester::new(config, Box::new(driver), Shutdown::new()).unwrap();

        let report = harvester.crawl("cache", 50).await;
        assert_eq!(report.stop, CrawlStop::PageExhausted);
        assert_eq!(report.pages_failed, 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_page() {
        let dir = tempdir().unwrap();
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let mut harvester = Harvester::new(
            testing::config(dir.path()),
            Box::new(ScriptedDriver::new()),
            shutdown,
        )
        .unwrap();

        let report = harvester.crawl("cache", 50).await;
        assert_eq!(report.stop, CrawlStop::Cancelled);
        assert_eq!(report.pages_fetched, 0);
    }
}
