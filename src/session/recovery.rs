//! Bounded retry of a unit of work across session resets.

use async_trait::async_trait;

use super::{SessionManager, SessionOutcome};
use crate::utils::{RetryConfig, Shutdown};

/// A retryable piece of browser work: one search page or one author profile.
///
/// `attempt` must be safe to run again from the start after a reset.
#[async_trait]
pub trait Unit: Send {
    type Output: Send;

    /// Short description for logs
    fn label(&self) -> String;

    async fn attempt(&mut self, session: &mut SessionManager) -> SessionOutcome<Self::Output>;
}

/// Final result of running a unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitResult<T> {
    Done(T),
    /// Every attempt failed
    Exhausted { attempts: u32, last_failure: String },
    /// Cancellation was requested before the unit finished
    Cancelled,
}

/// Run `unit` until it succeeds or `retry.max_attempts` is reached.
///
/// Each failed attempt resets the session before the next one, so the
/// following unit also starts on a fresh session when this one is exhausted.
pub async fn run_unit<U>(
    session: &mut SessionManager,
    retry: &RetryConfig,
    shutdown: &Shutdown,
    unit: &mut U,
) -> UnitResult<U::Output>
where
    U: Unit + ?Sized,
{
    let mut attempts = 0;

    loop {
        if shutdown.is_triggered() {
            return UnitResult::Cancelled;
        }
        attempts += 1;

        let outcome = match shutdown.run_until(unit.attempt(session)).await {
            Some(outcome) => outcome,
            None => return UnitResult::Cancelled,
        };

        let failure = match outcome {
            SessionOutcome::Ready(output) => {
                if attempts > 1 {
                    tracing::info!(
                        "{} succeeded on attempt {} after {} failures",
                        unit.label(),
                        attempts,
                        attempts - 1
                    );
                }
                return UnitResult::Done(output);
            }
            SessionOutcome::ChallengeDetected(reason) => format!("challenge: {reason}"),
            SessionOutcome::SessionLost(reason) => format!("session lost: {reason}"),
        };

        tracing::warn!(
            "{} failed (attempt {}/{}): {}",
            unit.label(),
            attempts,
            retry.max_attempts,
            failure
        );

        if let Err(e) = session.reset().await {
            tracing::warn!("Session reset failed: {}", e);
        }

        if !retry.allows_another(attempts) {
            tracing::error!("{} exhausted after {} attempts", unit.label(), attempts);
            return UnitResult::Exhausted {
                attempts,
                last_failure: failure,
            };
        }

        let delay = retry.delay_after(attempts);
        tracing::debug!("Retrying {} in {:?}", unit.label(), delay);
        if !shutdown.sleep(delay).await {
            return UnitResult::Cancelled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{ScriptedDriver, WaitPolicy};
    use crate::session::test_session_config;
    use std::time::Duration;

    struct Visit {
        url: String,
        ready: Vec<String>,
    }

    #[async_trait]
    impl Unit for Visit {
        type Output = String;

        fn label(&self) -> String {
            format!("visit {}", self.url)
        }

        async fn attempt(&mut self, session: &mut SessionManager) -> SessionOutcome<String> {
            session
                .load(&self.url, Duration::from_secs(5), &self.ready)
                .await
                .map(|page| page.url)
        }
    }

    fn visit(url: &str) -> Visit {
        Visit {
            url: url.to_string(),
            ready: vec!["main".to_string()],
        }
    }

    fn session(driver: ScriptedDriver) -> SessionManager {
        SessionManager::new(Box::new(driver), test_session_config(), WaitPolicy::Load)
    }

    #[tokio::test]
    async fn test_recovers_after_failures() {
        let driver = ScriptedDriver::new()
            .with_page("https://s/a", "<main>ok</main>")
            .failing("https://s/a", 2);
        let journal = driver.journal();
        let mut session = session(driver);

        let result = run_unit(
            &mut session,
            &RetryConfig::immediate(3),
            &Shutdown::new(),
            &mut visit("https://s/a"),
        )
        .await;

        assert_eq!(result, UnitResult::Done("https://s/a".to_string()));
        let journal = journal.lock().unwrap();
        assert_eq!(journal.visits("https://s/a"), 3);
        assert_eq!(journal.sessions_closed, 2);
    }

    #[tokio::test]
    async fn test_exhausts_at_ceiling() {
        let driver = ScriptedDriver::new()
            .with_page("https://s/a", "<main>ok</main>")
            .challenged("https://s/a", 10);
        let journal = driver.journal();
        let mut session = session(driver);

        let result = run_unit(
            &mut session,
            &RetryConfig::immediate(3),
            &Shutdown::new(),
            &mut visit("https://s/a"),
        )
        .await;

        match result {
            UnitResult::Exhausted { attempts, last_failure } => {
                assert_eq!(attempts, 3);
                assert!(last_failure.starts_with("challenge"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(journal.lock().unwrap().visits("https://s/a"), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let driver = ScriptedDriver::new().with_page("https://s/a", "<main>ok</main>");
        let journal = driver.journal();
        let mut session = session(driver);
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let result = run_unit(
            &mut session,
            &RetryConfig::immediate(3),
            &shutdown,
            &mut visit("https://s/a"),
        )
        .await;

        assert_eq!(result, UnitResult::Cancelled);
        assert_eq!(journal.lock().unwrap().visits("https://s/a"), 0);
    }
}
