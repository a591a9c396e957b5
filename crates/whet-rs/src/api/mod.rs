//! API-level request policies.
//!
//! - **[`retry`]** — attempt caps and backoff timing for the requester in
//!   [`agent::execution`](crate::agent::execution).

pub mod retry;

// Re-export commonly used items at the module level.
pub use retry::RetryConfig;
