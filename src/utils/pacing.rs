//! Randomized politeness delays between page and profile loads.

use std::time::Duration;

use rand::Rng;

use super::Shutdown;
use crate::config::PacingConfig;

/// Uniform random delay in a closed millisecond range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }

    pub fn sample(&self) -> Duration {
        if self.min_ms == self.max_ms {
            return Duration::from_millis(self.min_ms);
        }
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms))
    }
}

/// Delay schedule for the two kinds of navigation
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    page: DelayRange,
    author: DelayRange,
}

impl Pacer {
    pub fn new(config: &PacingConfig) -> Self {
        Self {
            page: DelayRange::new(config.page_delay_min_ms, config.page_delay_max_ms),
            author: DelayRange::new(config.author_delay_min_ms, config.author_delay_max_ms),
        }
    }

    /// Wait before the next search page. Returns false if cancelled.
    pub async fn before_page(&self, shutdown: &Shutdown) -> bool {
        let delay = self.page.sample();
        tracing::debug!("Waiting {:?} before next page", delay);
        shutdown.sleep(delay).await
    }

    /// Wait before the next author profile. Returns false if cancelled.
    pub async fn before_author(&self, shutdown: &Shutdown) -> bool {
        let delay = self.author.sample();
        tracing::trace!("Waiting {:?} before next author", delay);
        shutdown.sleep(delay).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_stays_in_range() {
        let range = DelayRange::new(100, 200);
        for _ in 0..50 {
            let d = range.sample();
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(200));
        }
    }

    #[test]
    fn test_inverted_range_is_normalized() {
        let range = DelayRange::new(300, 100);
        assert_eq!(range.min_ms, 100);
        assert_eq!(range.max_ms, 300);
    }

    #[tokio::test]
    async fn test_zero_pacing_is_immediate() {
        let pacer = Pacer::new(&PacingConfig::none());
        let shutdown = Shutdown::new();
        assert!(pacer.before_page(&shutdown).await);
        assert!(pacer.before_author(&shutdown).await);
    }
}
