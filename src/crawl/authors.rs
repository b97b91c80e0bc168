//! Sequential author profile visits.

use std::time::Duration;

use async_trait::async_trait;

use super::Harvester;
use crate::extract::CitationExtractor;
use crate::models::CitationCount;
use crate::session::{run_unit, PageSnapshot, SessionManager, SessionOutcome, Unit, UnitResult};

/// Author phase counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorReport {
    /// Profiles with a measured count (zero included)
    pub measured: usize,
    /// Profiles that exhausted their retries
    pub failed: usize,
    /// Queued authors left unvisited because of cancellation
    pub skipped: usize,
    pub cancelled: bool,
}

impl AuthorReport {
    pub(super) fn skipped_all(queued: usize) -> Self {
        Self {
            skipped: queued,
            cancelled: true,
            ..Self::default()
        }
    }

    pub fn processed(&self) -> usize {
        self.measured + self.failed
    }
}

/// One author profile as a retryable unit
struct ProfileUnit {
    author_id: String,
    profile_url: String,
    timeout: Duration,
    ready: Vec<String>,
}

#[async_trait]
impl Unit for ProfileUnit {
    type Output = PageSnapshot;

    fn label(&self) -> String {
        format!("author {}", self.author_id)
    }

    async fn attempt(&mut self, session: &mut SessionManager) -> SessionOutcome<PageSnapshot> {
        session
            .load(&self.profile_url, self.timeout, &self.ready)
            .await
    }
}

/// Progress is logged every `every` authors and once more at the end
fn should_report(done: usize, every: usize, total: usize) -> bool {
    done == total || (every > 0 && done % every == 0)
}

impl Harvester {
    /// Drain the author queue, one profile at a time
    pub(super) async fn process_authors(&mut self) -> AuthorReport {
        let total = self.queue.len();
        let every = self.config.authors.progress_every.max(1);
        let window = self.config.authors.visible_text_window;
        let timeout = self.config.session.profile_navigation_timeout();
        let ready = self.selectors.profile_ready.clone();
        let mut report = AuthorReport::default();

        tracing::info!("Scraping {} author profiles", total);

        while let Some(author_id) = self.queue.pop() {
            let Some(author) = self.repository.author(&author_id) else {
                tracing::warn!("Queued author {} is not in the repository", author_id);
                continue;
            };
            let profile_url = author.profile_url.clone();
            let name = author.name.clone();

            if report.processed() > 0 && !self.pacer.before_author(&self.shutdown).await {
                report.cancelled = true;
                report.skipped = self.queue.len() + 1;
                break;
            }

            let mut unit = ProfileUnit {
                author_id: author_id.clone(),
                profile_url,
                timeout,
                ready: ready.clone(),
            };
            let count = match run_unit(&mut self.session, &self.retry, &self.shutdown, &mut unit).await {
                UnitResult::Done(snapshot) => {
                    let reading = CitationExtractor::new(&self.selectors, window).extract(&snapshot.markup);
                    tracing::debug!(
                        "{} ({}): {} citations via {:?}",
                        name,
                        author_id,
                        reading.count,
                        reading.source
                    );
                    report.measured += 1;
                    CitationCount::Measured(reading.count)
                }
                UnitResult::Exhausted { attempts, last_failure } => {
                    tracing::warn!(
                        "Giving up on {} ({}) after {} attempts: {}",
                        name,
                        author_id,
                        attempts,
                        last_failure
                    );
                    report.failed += 1;
                    CitationCount::Failed
                }
                UnitResult::Cancelled => {
                    report.cancelled = true;
                    report.skipped = self.queue.len() + 1;
                    break;
                }
            };

            if let Err(e) = self.repository.set_author_citation_count(&author_id, count) {
                tracing::warn!("Could not record citations: {}", e);
            }

            let done = report.processed();
            if should_report(done, every, total) {
                tracing::info!(
                    "Processed {}/{} authors ({} succeeded, {} failed)",
                    done,
                    total,
                    report.measured,
                    report.failed
                );
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::ScriptedDriver;
    use crate::crawl::testing::{self, profile, BASE};
    use crate::models::Author;
    use crate::utils::Shutdown;
    use tempfile::tempdir;

    fn profile_url(id: &str) -> String {
        format!("{BASE}/author/A/{id}")
    }

    fn seed(harvester: &mut Harvester, ids: &[&str]) {
        for id in ids {
            harvester
                .repository
                .add_author(Author::new(*id, format!("Author {id}"), profile_url(id)));
            harvester.queue.enqueue(id);
        }
    }

    #[test]
    fn test_progress_cadence() {
        let reported: Vec<usize> = (1..=3).filter(|&done| should_report(done, 2, 3)).collect();
        assert_eq!(reported, vec![2, 3]);

        let reported: Vec<usize> = (1..=10).filter(|&done| should_report(done, 5, 10)).collect();
        assert_eq!(reported, vec![5, 10]);

        assert!(should_report(1, 1, 4));
        assert!(!should_report(3, 0, 4));
        assert!(should_report(4, 0, 4));
    }

    #[tokio::test]
    async fn test_measures_each_author_once() {
        let dir = tempdir().unwrap();
        let driver = ScriptedDriver::new()
            .with_page(profile_url("a1"), profile("12,450"))
            .with_page(profile_url("a2"), "<html><body><h1>New Author</h1></body></html>");
        let journal = driver.journal();
        let mut harvester =
            Harvester::new(testing::config(dir.path()), Box::new(driver), Shutdown::new()).unwrap();
        seed(&mut harvester, &["a1", "a2"]);

        let report = harvester.process_authors().await;

        assert_eq!(report.measured, 2);
        assert_eq!(report.failed, 0);
        let repo = harvester.repository();
        assert_eq!(repo.author("a1").unwrap().citation_count, CitationCount::Measured(12450));
        assert_eq!(repo.author("a2").unwrap().citation_count, CitationCount::Measured(0));
        let journal = journal.lock().unwrap();
        assert_eq!(journal.visits(&profile_url("a1")), 1);
        assert_eq!(journal.visits(&profile_url("a2")), 1);
    }

    #[tokio::test]
    async fn test_failed_profile_is_null_and_queue_advances() {
        let dir = tempdir().unwrap();
        let driver = ScriptedDriver::new()
            .with_page(profile_url("a1"), profile("10"))
            .failing(profile_url("a1"), 100)
            .with_page(profile_url("a2"), profile("3.2k"));
        let journal = driver.journal();
        let mut harvester =
            Harvester::new(testing::config(dir.path()), Box::new(driver), Shutdown::new()).unwrap();
        seed(&mut harvester, &["a1", "a2"]);

        let report = harvester.process_authors().await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.measured, 1);
        let repo = harvester.repository();
        assert_eq!(repo.author("a1").unwrap().citation_count, CitationCount::Failed);
        assert_eq!(repo.author("a2").unwrap().citation_count, CitationCount::Measured(3200));
        assert_eq!(journal.lock().unwrap().visits(&profile_url("a1")), 3);
    }

    #[tokio::test]
    async fn test_cancellation_leaves_rest_unset() {
        let dir = tempdir().unwrap();
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let mut harvester = Harvester::new(
            testing::config(dir.path()),
            Box::new(ScriptedDriver::new()),
            shutdown,
        )
        .unwrap();
        seed(&mut harvester, &["a1", "a2"]);

        let report = harvester.process_authors().await;

        assert!(report.cancelled);
        assert_eq!(report.skipped, 2);
        assert!(harvester.repository().author("a2").unwrap().citation_count.is_unset());
    }
}
