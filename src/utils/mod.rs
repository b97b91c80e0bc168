//! Shared runtime helpers.
//!
//! - [`RetryConfig`]: attempt ceiling and exponential backoff
//! - [`Pacer`]: randomized delays between navigations
//! - [`Shutdown`]: cooperative cancellation driven by Ctrl+C

mod pacing;
mod retry;
mod shutdown;

pub use pacing::{DelayRange, Pacer};
pub use retry::RetryConfig;
pub use shutdown::{setup_shutdown_handler, Shutdown};
