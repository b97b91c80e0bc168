//! Browser automation seam.
//!
//! The harvester never talks to a browser directly; it consumes the
//! [`BrowserDriver`] capability set. Each call is treated as slow and
//! fallible, and the session manager wraps every one of them in a timeout
//! and the recovery discipline.
//!
//! # Implementations
//!
//! - [`ChromiumDriver`]: headless Chrome over the DevTools protocol (feature `chromium`)
//! - [`ScriptedDriver`]: in-memory driver serving canned markup, for tests

#[cfg(feature = "chromium")]
mod chromium;
pub mod mock;

#[cfg(feature = "chromium")]
pub use chromium::ChromiumDriver;
pub use mock::ScriptedDriver;

use async_trait::async_trait;
use std::time::Duration;

/// When a navigation counts as finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitPolicy {
    /// The `load` event fired
    #[default]
    Load,
    /// The DOM was parsed. Drivers that only observe `load` treat this as
    /// [`WaitPolicy::Load`], which comes later.
    DomContentLoaded,
    /// The `load` event fired and no new resource was fetched for a short
    /// quiet window
    NetworkIdle,
}

/// Opaque reference to an element returned by [`BrowserDriver::query_all`].
///
/// Handles are invalidated by navigation and by session teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub usize);

/// The capability set consumed from the browser collaborator
#[async_trait]
pub trait BrowserDriver: Send + std::fmt::Debug {
    /// Human-readable driver name for logs
    fn name(&self) -> &str;

    /// Establish a fresh browser session
    async fn new_session(&mut self) -> Result<(), DriverError>;

    /// Tear down the current session completely
    async fn close_session(&mut self) -> Result<(), DriverError>;

    /// Whether a session is currently established
    fn has_session(&self) -> bool;

    async fn navigate(
        &mut self,
        url: &str,
        wait: WaitPolicy,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    /// Wait until `locator` matches at least one element
    async fn wait_for_condition(
        &mut self,
        locator: &str,
        timeout: Duration,
    ) -> Result<bool, DriverError>;

    async fn query_all(&mut self, locator: &str) -> Result<Vec<ElementHandle>, DriverError>;

    async fn text(&mut self, element: ElementHandle) -> Result<String, DriverError>;

    async fn attribute(
        &mut self,
        element: ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError>;

    async fn current_url(&mut self) -> Result<String, DriverError>;

    async fn page_markup(&mut self) -> Result<String, DriverError>;

    async fn click(&mut self, element: ElementHandle) -> Result<(), DriverError>;
}

/// Errors reported by a browser driver
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("No active browser session")]
    NoSession,

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Element handle is stale")]
    StaleElement,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_policy_names() {
        let policy: WaitPolicy = serde_json::from_str("\"network_idle\"").unwrap();
        assert_eq!(policy, WaitPolicy::NetworkIdle);
        assert_eq!(WaitPolicy::default(), WaitPolicy::Load);
    }
}
