//! Authenticated client for the GitHub-compatible Search and REST APIs.
//!
//! Owns retry policy, rate-limit accounting, search-endpoint throttling and
//! pagination so upstream code can treat every operation as "get result or
//! final error". A fixed-size pool of independent clients supports parallel
//! enrichment; all clients in a pool share one search throttle.

mod client;
mod pool;
pub mod wire;

pub use client::{HostClient, HostOptions, SearchThrottle, SEARCH_RESULT_CEILING};
pub use pool::{ClientPool, PooledClient};
