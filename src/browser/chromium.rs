//! Headless Chrome driver over the DevTools protocol.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

use super::{BrowserDriver, DriverError, ElementHandle, WaitPolicy};
use crate::config::BrowserSettings;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const NETWORK_IDLE_WINDOW: Duration = Duration::from_millis(500);
const CLICK_NAVIGATION_GRACE: Duration = Duration::from_secs(5);
const RESOURCE_COUNT_JS: &str = "performance.getEntriesByType('resource').length";

struct ActiveSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

/// [`BrowserDriver`] backed by a locally launched Chromium
pub struct ChromiumDriver {
    settings: BrowserSettings,
    session: Option<ActiveSession>,
    elements: Vec<Element>,
}

impl std::fmt::Debug for ChromiumDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumDriver")
            .field("headless", &self.settings.headless)
            .field("session", &self.session.is_some())
            .field("elements", &self.elements.len())
            .finish()
    }
}

impl ChromiumDriver {
    pub fn new(settings: BrowserSettings) -> Self {
        Self {
            settings,
            session: None,
            elements: Vec::new(),
        }
    }

    fn page(&self) -> Result<&Page, DriverError> {
        self.session
            .as_ref()
            .map(|s| &s.page)
            .ok_or(DriverError::NoSession)
    }

    fn element(&self, handle: ElementHandle) -> Result<&Element, DriverError> {
        self.elements.get(handle.0).ok_or(DriverError::StaleElement)
    }

    fn launch_config(&self) -> Result<BrowserConfig, DriverError> {
        let mut builder = BrowserConfig::builder()
            .window_size(self.settings.window_width, self.settings.window_height)
            .args(self.settings.extra_args.iter().cloned());
        if !self.settings.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.settings.executable {
            builder = builder.chrome_executable(executable);
        }
        builder.build().map_err(DriverError::Launch)
    }
}

fn protocol(err: chromiumoxide::error::CdpError) -> DriverError {
    DriverError::Protocol(err.to_string())
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    fn name(&self) -> &str {
        "chromium"
    }

    async fn new_session(&mut self) -> Result<(), DriverError> {
        if self.session.is_some() {
            self.close_session().await?;
        }

        let config = self.launch_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;
        page.set_user_agent(SetUserAgentOverrideParams::new(self.settings.user_agent.clone()))
            .await
            .map_err(protocol)?;

        tracing::debug!("Launched Chromium session (headless: {})", self.settings.headless);
        self.session = Some(ActiveSession {
            browser,
            page,
            handler,
        });
        Ok(())
    }

    async fn close_session(&mut self) -> Result<(), DriverError> {
        self.elements.clear();
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        if let Err(e) = session.page.close().await {
            tracing::debug!("Page close failed during teardown: {}", e);
        }
        let closed = session.browser.close().await;
        if let Err(e) = session.browser.wait().await {
            tracing::debug!("Browser process wait failed: {}", e);
        }
        session.handler.abort();
        closed.map(|_| ()).map_err(protocol)
    }

    fn has_session(&self) -> bool {
        self.session.is_some()
    }

    async fn navigate(
        &mut self,
        url: &str,
        wait: WaitPolicy,
        limit: Duration,
    ) -> Result<(), DriverError> {
        self.elements.clear();
        let page = self.page()?;

        let started = Instant::now();
        match timeout(limit, page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(DriverError::Navigation(e.to_string())),
            Err(_) => return Err(DriverError::Timeout(limit)),
        }

        // goto resolves on the load event, which already implies the DOM was parsed
        match wait {
            WaitPolicy::Load | WaitPolicy::DomContentLoaded => Ok(()),
            WaitPolicy::NetworkIdle => {
                let remaining = limit.saturating_sub(started.elapsed());
                if !network_idle(page, remaining).await? {
                    tracing::debug!("Network still busy after navigating to {}", url);
                }
                Ok(())
            }
        }
    }

    async fn wait_for_condition(
        &mut self,
        locator: &str,
        limit: Duration,
    ) -> Result<bool, DriverError> {
        let page = self.page()?;
        let deadline = Instant::now() + limit;

        loop {
            if !page.find_elements(locator).await.map_err(protocol)?.is_empty() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn query_all(&mut self, locator: &str) -> Result<Vec<ElementHandle>, DriverError> {
        let found = self.page()?.find_elements(locator).await.map_err(protocol)?;
        let start = self.elements.len();
        self.elements.extend(found);
        Ok((start..self.elements.len()).map(ElementHandle).collect())
    }

    async fn text(&mut self, element: ElementHandle) -> Result<String, DriverError> {
        let text = self.element(element)?.inner_text().await.map_err(protocol)?;
        Ok(text.unwrap_or_default())
    }

    async fn attribute(
        &mut self,
        element: ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        self.element(element)?.attribute(name).await.map_err(protocol)
    }

    async fn current_url(&mut self) -> Result<String, DriverError> {
        let url = self.page()?.url().await.map_err(protocol)?;
        Ok(url.unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn page_markup(&mut self) -> Result<String, DriverError> {
        self.page()?.content().await.map_err(protocol)
    }

    async fn click(&mut self, element: ElementHandle) -> Result<(), DriverError> {
        self.element(element)?.click().await.map_err(protocol)?;
        self.elements.clear();

        // Script-driven pagination may never fire a navigation; the session
        // manager still checks that the page changed
        let page = self.page()?;
        match timeout(CLICK_NAVIGATION_GRACE, page.wait_for_navigation()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::debug!("Waiting for navigation after click failed: {}", e),
            Err(_) => tracing::debug!("No navigation within {:?} of click", CLICK_NAVIGATION_GRACE),
        }
        Ok(())
    }
}

/// Wait until no new resource has been fetched for [`NETWORK_IDLE_WINDOW`].
/// Returns `false` if traffic was still flowing when `limit` ran out.
async fn network_idle(page: &Page, limit: Duration) -> Result<bool, DriverError> {
    let deadline = Instant::now() + limit;
    let mut last = resource_count(page).await?;
    let mut quiet_since = Instant::now();

    loop {
        if quiet_since.elapsed() >= NETWORK_IDLE_WINDOW {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        sleep(POLL_INTERVAL).await;
        let count = resource_count(page).await?;
        if count != last {
            last = count;
            quiet_since = Instant::now();
        }
    }
}

async fn resource_count(page: &Page) -> Result<u64, DriverError> {
    page.evaluate(RESOURCE_COUNT_JS)
        .await
        .map_err(protocol)?
        .into_value::<u64>()
        .map_err(|e| DriverError::Protocol(e.to_string()))
}
