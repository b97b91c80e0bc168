//! Browser session ownership and recovery.
//!
//! [`SessionManager`] owns the only [`BrowserDriver`] in the process and
//! tracks its health as a small state machine:
//!
//! ```text
//! Healthy --challenge seen--> ChallengePresented --bypass ok--> Healthy
//!    |                               |
//!    |                          bypass failed
//!    |                               v
//!    +------unit failed-------> Resetting --new session--> Healthy
//! ```
//!
//! Every driver call goes through a timeout. Loads report a
//! [`SessionOutcome`] instead of an error so callers can hand failures to
//! [`run_unit`], which resets the session and retries the unit from the start.

mod recovery;

pub use recovery::{run_unit, Unit, UnitResult};

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::browser::{BrowserDriver, DriverError, WaitPolicy};
use crate::config::SessionConfig;

const CHANGE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Health of the browser session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Healthy,
    ChallengePresented,
    Resetting,
}

/// Result of one load attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome<T> {
    /// The page is loaded and its ready signal was observed
    Ready(T),
    /// A verification page was detected and could not be bypassed
    ChallengeDetected(String),
    /// The driver failed or timed out
    SessionLost(String),
}

impl<T> SessionOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SessionOutcome<U> {
        match self {
            SessionOutcome::Ready(value) => SessionOutcome::Ready(f(value)),
            SessionOutcome::ChallengeDetected(reason) => SessionOutcome::ChallengeDetected(reason),
            SessionOutcome::SessionLost(reason) => SessionOutcome::SessionLost(reason),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SessionOutcome::Ready(_))
    }
}

/// URL and markup of a loaded page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    pub url: String,
    pub markup: String,
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub sessions_started: u32,
    pub resets: u32,
    pub challenges_seen: u32,
    pub challenges_bypassed: u32,
}

/// Owner of the browser session
#[derive(Debug)]
pub struct SessionManager {
    driver: Box<dyn BrowserDriver>,
    config: SessionConfig,
    wait_policy: WaitPolicy,
    state: SessionState,
    stats: SessionStats,
    last_markup: Option<String>,
}

/// Run a driver call under a deadline
async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, DriverError>>,
) -> Result<T, DriverError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(DriverError::Timeout(limit)),
    }
}

impl SessionManager {
    pub fn new(driver: Box<dyn BrowserDriver>, config: SessionConfig, wait_policy: WaitPolicy) -> Self {
        Self {
            driver,
            config,
            wait_policy,
            state: SessionState::Healthy,
            stats: SessionStats::default(),
            last_markup: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn transition(&mut self, to: SessionState) {
        if self.state != to {
            tracing::info!(from = ?self.state, to = ?to, "Session state change");
            self.state = to;
        }
    }

    /// Markup of the most recent page seen, challenge pages included
    pub fn last_markup(&self) -> Option<&str> {
        self.last_markup.as_deref()
    }

    /// Open a session if none is established
    pub async fn ensure_session(&mut self) -> Result<(), DriverError> {
        if self.driver.has_session() {
            return Ok(());
        }
        let limit = self.config.lifecycle_timeout();
        bounded(limit, self.driver.new_session()).await?;
        self.stats.sessions_started += 1;
        tracing::debug!("Started {} browser session", self.driver.name());
        self.transition(SessionState::Healthy);
        Ok(())
    }

    /// Tear the session down and start a fresh one
    pub async fn reset(&mut self) -> Result<(), DriverError> {
        self.transition(SessionState::Resetting);
        self.stats.resets += 1;
        tracing::info!("Resetting browser session");

        let limit = self.config.lifecycle_timeout();
        if self.driver.has_session() {
            if let Err(e) = bounded(limit, self.driver.close_session()).await {
                tracing::warn!("Session teardown failed: {}", e);
            }
        }

        self.ensure_session().await
    }

    /// Close the session at the end of a run
    pub async fn close(&mut self) {
        if !self.driver.has_session() {
            return;
        }
        let limit = self.config.lifecycle_timeout();
        if let Err(e) = bounded(limit, self.driver.close_session()).await {
            tracing::warn!("Failed to close browser session: {}", e);
        }
    }

    /// Navigate to `url` and wait for one of the `ready` signals
    pub async fn load(
        &mut self,
        url: &str,
        navigation_timeout: Duration,
        ready: &[String],
    ) -> SessionOutcome<PageSnapshot> {
        if let Err(e) = self.ensure_session().await {
            return SessionOutcome::SessionLost(format!("no session: {e}"));
        }

        tracing::debug!("Navigating to {}", url);
        let navigation = bounded(
            navigation_timeout,
            self.driver.navigate(url, self.wait_policy, navigation_timeout),
        )
        .await;
        if let Err(e) = navigation {
            return SessionOutcome::SessionLost(format!("navigation to {url} failed: {e}"));
        }

        self.settle(ready).await
    }

    /// Make sure the session is on `page_url`, then click the first element
    /// matching `locator` and wait for one of the `ready` signals
    pub async fn click_through(
        &mut self,
        page_url: &str,
        locator: &str,
        navigation_timeout: Duration,
        ready: &[String],
    ) -> SessionOutcome<PageSnapshot> {
        if let Err(e) = self.ensure_session().await {
            return SessionOutcome::SessionLost(format!("no session: {e}"));
        }

        let op = self.config.operation_timeout();
        let here = bounded(op, self.driver.current_url()).await.unwrap_or_default();
        if here != page_url {
            match self.load(page_url, navigation_timeout, ready).await {
                SessionOutcome::Ready(_) => {}
                failure => return failure,
            }
        }

        let handles = match bounded(op, self.driver.query_all(locator)).await {
            Ok(handles) => handles,
            Err(e) => return SessionOutcome::SessionLost(format!("query {locator} failed: {e}")),
        };
        let Some(&control) = handles.first() else {
            return SessionOutcome::SessionLost(format!("control {locator} not found on {page_url}"));
        };

        let before_url = bounded(op, self.driver.current_url()).await.unwrap_or_default();
        let before_markup = bounded(op, self.driver.page_markup()).await.unwrap_or_default();

        tracing::debug!("Clicking {} on {}", locator, page_url);
        if let Err(e) = bounded(navigation_timeout, self.driver.click(control)).await {
            return SessionOutcome::SessionLost(format!("click on {locator} failed: {e}"));
        }

        match self.await_page_change(&before_url, &before_markup, navigation_timeout).await {
            Ok(true) => {}
            Ok(false) => {
                return SessionOutcome::SessionLost(format!(
                    "page did not change after clicking {locator} on {page_url}"
                ))
            }
            Err(e) => return SessionOutcome::SessionLost(format!("waiting for next page failed: {e}")),
        }

        self.settle(ready).await
    }

    /// Poll until the URL or the markup differs from what was there before a click.
    ///
    /// Ready signals cannot be trusted here: the previous page usually carries
    /// the same ones.
    async fn await_page_change(
        &mut self,
        before_url: &str,
        before_markup: &str,
        limit: Duration,
    ) -> Result<bool, DriverError> {
        let op = self.config.operation_timeout();
        let deadline = Instant::now() + limit;
        loop {
            if bounded(op, self.driver.current_url()).await? != before_url {
                return Ok(true);
            }
            if bounded(op, self.driver.page_markup()).await? != before_markup {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(CHANGE_POLL_INTERVAL).await;
        }
    }

    /// Post-navigation checks shared by loads and clicks
    async fn settle(&mut self, ready: &[String]) -> SessionOutcome<PageSnapshot> {
        match self.detect_challenge().await {
            Ok(Some(reason)) => return self.handle_challenge(reason, ready).await,
            Ok(None) => {}
            Err(e) => return SessionOutcome::SessionLost(format!("challenge check failed: {e}")),
        }

        match self.await_ready(ready).await {
            Ok(true) => self.snapshot().await,
            Ok(false) => match self.detect_challenge().await {
                Ok(Some(reason)) => self.handle_challenge(reason, ready).await,
                Ok(None) => {
                    self.handle_challenge("no ready signal appeared".to_string(), ready)
                        .await
                }
                Err(e) => SessionOutcome::SessionLost(format!("challenge check failed: {e}")),
            },
            Err(e) => SessionOutcome::SessionLost(format!("waiting for page failed: {e}")),
        }
    }

    /// Wait for the first ready signal, then each fallback in turn
    async fn await_ready(&mut self, ready: &[String]) -> Result<bool, DriverError> {
        let grace = self.config.operation_timeout();
        for (index, locator) in ready.iter().enumerate() {
            let limit = if index == 0 {
                self.config.ready_timeout()
            } else {
                self.config.fallback_ready_timeout()
            };
            match bounded(limit + grace, self.driver.wait_for_condition(locator, limit)).await {
                Ok(true) => {
                    if index > 0 {
                        tracing::debug!("Ready via fallback signal {}", locator);
                    }
                    return Ok(true);
                }
                Ok(false) | Err(DriverError::Timeout(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(ready.is_empty())
    }

    /// Name the challenge signature present on the current page, if any
    async fn detect_challenge(&mut self) -> Result<Option<String>, DriverError> {
        let op = self.config.operation_timeout();

        let url = bounded(op, self.driver.current_url()).await?;
        if let Some(pattern) = self
            .config
            .challenge_url_patterns
            .iter()
            .find(|pattern| url.contains(pattern.as_str()))
        {
            return Ok(Some(format!("challenge URL ({pattern}) at {url}")));
        }

        for marker in &self.config.challenge_markers {
            if !bounded(op, self.driver.query_all(marker)).await?.is_empty() {
                return Ok(Some(format!("challenge marker {marker} at {url}")));
            }
        }

        Ok(None)
    }

    /// Try the configured bypass; give up after `bypass_attempts`
    async fn handle_challenge(&mut self, reason: String, ready: &[String]) -> SessionOutcome<PageSnapshot> {
        self.transition(SessionState::ChallengePresented);
        self.stats.challenges_seen += 1;
        tracing::warn!("Verification challenge detected: {}", reason);
        self.capture_markup().await;

        let op = self.config.operation_timeout();
        let settle = self.config.settle_delay();
        let targets = self.config.challenge_click_targets.clone();

        for attempt in 1..=self.config.bypass_attempts {
            tokio::time::sleep(settle).await;

            for target in &targets {
                match bounded(op, self.driver.query_all(target)).await {
                    Ok(handles) => {
                        if let Some(&handle) = handles.first() {
                            tracing::debug!("Bypass attempt {}: clicking {}", attempt, target);
                            if let Err(e) = bounded(op, self.driver.click(handle)).await {
                                return SessionOutcome::SessionLost(format!("bypass click failed: {e}"));
                            }
                            break;
                        }
                    }
                    Err(e) => return SessionOutcome::SessionLost(format!("bypass query failed: {e}")),
                }
            }

            tokio::time::sleep(settle).await;

            match self.detect_challenge().await {
                Ok(None) => match self.await_ready(ready).await {
                    Ok(true) => {
                        tracing::info!("Challenge cleared on bypass attempt {}", attempt);
                        self.stats.challenges_bypassed += 1;
                        self.transition(SessionState::Healthy);
                        return self.snapshot().await;
                    }
                    Ok(false) => {}
                    Err(e) => return SessionOutcome::SessionLost(format!("waiting for page failed: {e}")),
                },
                Ok(Some(_)) => {}
                Err(e) => return SessionOutcome::SessionLost(format!("challenge check failed: {e}")),
            }
        }

        SessionOutcome::ChallengeDetected(reason)
    }

    async fn capture_markup(&mut self) {
        let op = self.config.operation_timeout();
        if let Ok(markup) = bounded(op, self.driver.page_markup()).await {
            self.last_markup = Some(markup);
        }
    }

    async fn snapshot(&mut self) -> SessionOutcome<PageSnapshot> {
        let op = self.config.operation_timeout();
        let url = match bounded(op, self.driver.current_url()).await {
            Ok(url) => url,
            Err(e) => return SessionOutcome::SessionLost(format!("reading URL failed: {e}")),
        };
        match bounded(op, self.driver.page_markup()).await {
            Ok(markup) => {
                self.last_markup = Some(markup.clone());
                SessionOutcome::Ready(PageSnapshot { url, markup })
            }
            Err(e) => SessionOutcome::SessionLost(format!("reading markup failed: {e}")),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_session_config() -> SessionConfig {
    SessionConfig {
        settle_delay_ms: 0,
        ..SessionConfig::default()
    }
}
