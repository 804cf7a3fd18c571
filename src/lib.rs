//! Fetch pages over HTTP, keep them in a redis-compatible store for a short while, and count how
//! many times each URL was requested.

pub mod cache;
pub mod config;
pub mod http;
pub mod tracker;

pub use cache::{Cacher, KvStore, MemoryStore};
pub use config::Config;
#[cfg(feature = "reqwest")]
pub use http::HttpClient;
pub use http::PageFetcher;
pub use tracker::PageTracker;
