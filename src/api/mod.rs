//! Remote platform API layer
//!
//! This module contains everything that talks to the platform:
//! - The shared HTTP client and typed endpoint calls
//! - The response envelope and per-endpoint wire types
//! - The bounded-retry wrapper applied around every remote call

mod client;
mod retry;
pub mod types;

pub use client::BiliClient;
pub use retry::{with_retry, RetryPolicy};
