//! Retry policy shared by single calls and batches.
//!
//! ```text
//! attempt n fails → wait backoff_base * 2^(n-1) → next endpoint → attempt n+1
//! ```

pub mod retry;

pub use retry::{RetryConfig, RetryPolicy};
