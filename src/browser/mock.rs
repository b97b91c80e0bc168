//! Scripted in-memory driver for tests.
//!
//! Serves canned markup per URL and answers selector queries by parsing that
//! markup. Navigation failures and verification challenges can be scripted
//! per URL, and every call is recorded in a shared [`DriverJournal`] that
//! stays readable after the driver has been moved into a session.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{BrowserDriver, DriverError, ElementHandle, WaitPolicy};
use crate::extract::normalize_text;

/// Markup served while a challenge is active
pub const CHALLENGE_MARKUP: &str = r#"<html><body>
<div id="challenge-form"><p>Verify you are human</p><button id="challenge-continue">Continue</button></div>
</body></html>"#;

/// Record of everything the driver was asked to do
#[derive(Debug, Default, Clone)]
pub struct DriverJournal {
    pub navigations: Vec<String>,
    pub clicks: Vec<String>,
    pub sessions_opened: usize,
    pub sessions_closed: usize,
}

impl DriverJournal {
    /// How many times `url` was navigated to
    pub fn visits(&self, url: &str) -> usize {
        self.navigations.iter().filter(|u| *u == url).count()
    }
}

#[derive(Debug, Clone)]
struct StoredElement {
    locator: String,
    text: String,
    attributes: HashMap<String, String>,
}

/// In-memory [`BrowserDriver`]
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    pages: HashMap<String, String>,
    redirects: HashMap<String, String>,
    click_targets: HashMap<(String, String), String>,
    delayed_clicks: HashMap<(String, String), (String, u32)>,
    pending_swap: Option<(String, u32)>,
    failures: HashMap<String, u32>,
    challenges: HashMap<String, u32>,
    solvable_challenges: bool,
    session: bool,
    current_url: Option<String>,
    current_markup: String,
    challenged: bool,
    elements: Vec<StoredElement>,
    journal: Arc<Mutex<DriverJournal>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `markup` at `url`
    pub fn with_page(mut self, url: impl Into<String>, markup: impl Into<String>) -> Self {
        self.pages.insert(url.into(), markup.into());
        self
    }

    /// Land on `to` whenever `from` is requested
    pub fn with_redirect(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.redirects.insert(from.into(), to.into());
        self
    }

    /// Clicking an element found by `locator` on `page` navigates to `target`
    pub fn with_click_target(
        mut self,
        page: impl Into<String>,
        locator: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.click_targets
            .insert((page.into(), locator.into()), target.into());
        self
    }

    /// Like [`with_click_target`](Self::with_click_target), but the old page
    /// stays visible until the `after`th observation following the click
    pub fn with_delayed_click_target(
        mut self,
        page: impl Into<String>,
        locator: impl Into<String>,
        target: impl Into<String>,
        after: u32,
    ) -> Self {
        self.delayed_clicks
            .insert((page.into(), locator.into()), (target.into(), after));
        self
    }

    /// Fail the next `times` navigations to `url`
    pub fn failing(mut self, url: impl Into<String>, times: u32) -> Self {
        self.failures.insert(url.into(), times);
        self
    }

    /// Serve the challenge page for the next `times` navigations to `url`
    pub fn challenged(mut self, url: impl Into<String>, times: u32) -> Self {
        self.challenges.insert(url.into(), times);
        self
    }

    /// Clicking `#challenge-continue` clears an active challenge
    pub fn solvable_challenges(mut self) -> Self {
        self.solvable_challenges = true;
        self
    }

    /// Shared journal handle
    pub fn journal(&self) -> Arc<Mutex<DriverJournal>> {
        Arc::clone(&self.journal)
    }

    fn record(&self, f: impl FnOnce(&mut DriverJournal)) {
        if let Ok(mut journal) = self.journal.lock() {
            f(&mut journal);
        }
    }

    fn require_session(&self) -> Result<(), DriverError> {
        if self.session {
            Ok(())
        } else {
            Err(DriverError::NoSession)
        }
    }

    /// Count one observation of the page and land a pending swap when due
    fn observe(&mut self) -> Result<(), DriverError> {
        let Some((target, remaining)) = self.pending_swap.as_mut() else {
            return Ok(());
        };
        if *remaining > 1 {
            *remaining -= 1;
            return Ok(());
        }
        let target = target.clone();
        self.load(&target)
    }

    fn load(&mut self, url: &str) -> Result<(), DriverError> {
        self.elements.clear();
        self.pending_swap = None;
        self.challenged = false;

        if let Some(remaining) = self.failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DriverError::Navigation(format!("net::ERR_CONNECTION_RESET at {url}")));
            }
        }

        let landed = self.redirects.get(url).cloned().unwrap_or_else(|| url.to_string());
        self.current_url = Some(landed.clone());

        if let Some(remaining) = self.challenges.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                self.challenged = true;
                self.current_markup = CHALLENGE_MARKUP.to_string();
                return Ok(());
            }
        }

        match self.pages.get(&landed) {
            Some(markup) => {
                self.current_markup = markup.clone();
                Ok(())
            }
            None => Err(DriverError::Navigation(format!("net::ERR_NAME_NOT_RESOLVED at {url}"))),
        }
    }

    fn element(&self, handle: ElementHandle) -> Result<&StoredElement, DriverError> {
        self.elements.get(handle.0).ok_or(DriverError::StaleElement)
    }
}

fn select_elements(markup: &str, locator: &str) -> Result<Vec<StoredElement>, DriverError> {
    let selector =
        Selector::parse(locator).map_err(|e| DriverError::Protocol(format!("{locator}: {e}")))?;
    let document = Html::parse_document(markup);
    let found = document
        .select(&selector)
        .map(|el| StoredElement {
            locator: locator.to_string(),
            text: normalize_text(el.text()),
            attributes: el
                .value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
        .collect();
    Ok(found)
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn new_session(&mut self) -> Result<(), DriverError> {
        self.session = true;
        self.pending_swap = None;
        self.current_url = None;
        self.current_markup.clear();
        self.elements.clear();
        self.record(|j| j.sessions_opened += 1);
        Ok(())
    }

    async fn close_session(&mut self) -> Result<(), DriverError> {
        self.session = false;
        self.elements.clear();
        self.record(|j| j.sessions_closed += 1);
        Ok(())
    }

    fn has_session(&self) -> bool {
        self.session
    }

    async fn navigate(
        &mut self,
        url: &str,
        _wait: WaitPolicy,
        _timeout: Duration,
    ) -> Result<(), DriverError> {
        self.require_session()?;
        self.record(|j| j.navigations.push(url.to_string()));
        self.load(url)
    }

    /// Answers immediately: a condition absent from the served markup is
    /// reported as a timeout without sleeping.
    async fn wait_for_condition(
        &mut self,
        locator: &str,
        _timeout: Duration,
    ) -> Result<bool, DriverError> {
        self.require_session()?;
        self.observe()?;
        Ok(!select_elements(&self.current_markup, locator)?.is_empty())
    }

    async fn query_all(&mut self, locator: &str) -> Result<Vec<ElementHandle>, DriverError> {
        self.require_session()?;
        self.observe()?;
        let found = select_elements(&self.current_markup, locator)?;
        let start = self.elements.len();
        self.elements.extend(found);
        Ok((start..self.elements.len()).map(ElementHandle).collect())
    }

    async fn text(&mut self, element: ElementHandle) -> Result<String, DriverError> {
        self.require_session()?;
        Ok(self.element(element)?.text.clone())
    }

    async fn attribute(
        &mut self,
        element: ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        self.require_session()?;
        Ok(self.element(element)?.attributes.get(name).cloned())
    }

    async fn current_url(&mut self) -> Result<String, DriverError> {
        self.require_session()?;
        self.observe()?;
        Ok(self
            .current_url
            .clone()
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn page_markup(&mut self) -> Result<String, DriverError> {
        self.require_session()?;
        self.observe()?;
        Ok(self.current_markup.clone())
    }

    async fn click(&mut self, element: ElementHandle) -> Result<(), DriverError> {
        self.require_session()?;
        let locator = self.element(element)?.locator.clone();
        let page = self.current_url.clone().unwrap_or_default();
        self.record(|j| j.clicks.push(locator.clone()));

        if self.challenged {
            if self.solvable_challenges && locator == "#challenge-continue" {
                self.challenged = false;
                self.elements.clear();
                self.current_markup = self.pages.get(&page).cloned().unwrap_or_default();
            }
            return Ok(());
        }

        let key = (page, locator);
        if let Some(target) = self.click_targets.get(&key).cloned() {
            return self.load(&target);
        }
        if let Some(delayed) = self.delayed_clicks.get(&key).cloned() {
            self.pending_swap = Some(delayed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body><a class="next" href="/p2">Next <b>page</b></a></body></html>"#;

    #[tokio::test]
    async fn test_serves_pages_and_queries() {
        let mut driver = ScriptedDriver::new().with_page("https://x/1", PAGE);
        driver.new_session().await.unwrap();
        driver
            .navigate("https://x/1", WaitPolicy::Load, Duration::from_secs(1))
            .await
            .unwrap();

        let handles = driver.query_all("a.next").await.unwrap();
        assert_eq!(handles.len(), 1);
        assert_eq!(driver.text(handles[0]).await.unwrap(), "Next page");
        assert_eq!(
            driver.attribute(handles[0], "href").await.unwrap().as_deref(),
            Some("/p2")
        );
        assert!(driver.wait_for_condition("a.next", Duration::ZERO).await.unwrap());
        assert!(!driver.wait_for_condition("table", Duration::ZERO).await.unwrap());
    }

    #[tokio::test]
    async fn test_requires_session() {
        let mut driver = ScriptedDriver::new().with_page("https://x/1", PAGE);
        let err = driver
            .navigate("https://x/1", WaitPolicy::Load, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, DriverError::NoSession);
    }

    #[tokio::test]
    async fn test_scripted_failures_then_success() {
        let mut driver = ScriptedDriver::new()
            .with_page("https://x/1", PAGE)
            .failing("https://x/1", 1);
        let journal = driver.journal();
        driver.new_session().await.unwrap();

        assert!(driver
            .navigate("https://x/1", WaitPolicy::Load, Duration::ZERO)
            .await
            .is_err());
        assert!(driver
            .navigate("https://x/1", WaitPolicy::Load, Duration::ZERO)
            .await
            .is_ok());
        assert_eq!(journal.lock().unwrap().visits("https://x/1"), 2);
    }

    #[tokio::test]
    async fn test_click_target_navigates() {
        let mut driver = ScriptedDriver::new()
            .with_page("https://x/1", PAGE)
            .with_page("https://x/2", "<p>two</p>")
            .with_click_target("https://x/1", "a.next", "https://x/2");
        driver.new_session().await.unwrap();
        driver
            .navigate("https://x/1", WaitPolicy::Load, Duration::ZERO)
            .await
            .unwrap();
        let handle = driver.query_all("a.next").await.unwrap()[0];
        driver.click(handle).await.unwrap();
        assert_eq!(driver.current_url().await.unwrap(), "https://x/2");
        assert!(driver.query_all("a.next").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delayed_click_keeps_old_page_visible() {
        let mut driver = ScriptedDriver::new()
            .with_page("https://x/1", PAGE)
            .with_page("https://x/2", "<p>two</p>")
            .with_delayed_click_target("https://x/1", "a.next", "https://x/2", 2);
        driver.new_session().await.unwrap();
        driver
            .navigate("https://x/1", WaitPolicy::Load, Duration::ZERO)
            .await
            .unwrap();
        let handle = driver.query_all("a.next").await.unwrap()[0];
        driver.click(handle).await.unwrap();

        assert_eq!(driver.current_url().await.unwrap(), "https://x/1");
        assert_eq!(driver.current_url().await.unwrap(), "https://x/2");
        assert_eq!(driver.page_markup().await.unwrap(), "<p>two</p>");
    }
}
