//! Shared utilities.

pub mod retry;

pub use retry::{constant_backoff, exponential_backoff, with_jitter, with_retry_when, Backoff};
