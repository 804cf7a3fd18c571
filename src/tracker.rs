use anyhow::Context;
use std::time::Duration;
use tracing::{debug, info};
use typed_builder::TypedBuilder;

use crate::cache::KvStore;
use crate::http::PageFetcher;

/// How long a fetched page stays in the store.
pub const DEFAULT_TTL: Duration = Duration::from_secs(10);

const RESULT_PREFIX: &str = "result";
const COUNT_PREFIX: &str = "count";

/// Store key holding the cached body of `url`.
pub fn result_key(url: &str) -> String {
    format!("{RESULT_PREFIX}:{url}")
}

/// Store key holding the request counter of `url`.
pub fn count_key(url: &str) -> String {
    format!("{COUNT_PREFIX}:{url}")
}

/// Wrap a [`PageFetcher`] so every page is cached in the store for a short while and every
/// request to an URL is counted.
///
/// ```no_run
/// # async fn run() -> anyhow::Result<()> {
/// use page_tracker::{cache::Cacher, http::HttpClient, tracker::PageTracker};
///
/// let tracker = PageTracker::builder()
///     .store(Cacher::open("redis://localhost")?)
///     .fetcher(HttpClient::new()?)
///     .build();
/// let html = tracker.get_page("http://example.com").await?;
/// # Ok(())
/// # }
/// ```
#[derive(TypedBuilder)]
pub struct PageTracker<S, F> {
    store: S,
    fetcher: F,
    #[builder(default = DEFAULT_TTL)]
    ttl: Duration,
}

impl<S, F> PageTracker<S, F>
where
    S: KvStore,
    F: PageFetcher,
{
    /// Return the content of `url`, from the store if it was fetched within the TTL, otherwise
    /// from the fetcher. Absent, empty and whitespace-only URLs return an empty string without
    /// touching the store.
    ///
    /// # Error
    /// Return error if:
    ///     * The store is unreachable or rejects the request
    ///     * The fetcher fails, in which case nothing is cached and the request is not counted
    ///     * The cached value is not valid UTF-8
    pub async fn get_page<'a>(&self, url: impl Into<Option<&'a str>>) -> anyhow::Result<String> {
        let url = match url.into() {
            Some(url) if !url.trim().is_empty() => url,
            _ => return Ok(String::new()),
        };

        let res_key = result_key(url);
        let req_key = count_key(url);

        if let Some(cached) = self.store.get(&res_key)? {
            let count = self.store.incr(&req_key)?;
            debug!("cache hit for `{url}`, requested {count} times");
            return String::from_utf8(cached)
                .with_context(|| format!("cached value of `{res_key}` is not valid UTF-8"));
        }

        debug!("cache miss for `{url}`");
        let page = self.fetcher.fetch(url).await?;
        self.store.set_ex(&res_key, page.as_bytes(), self.ttl)?;
        let count = self.store.incr(&req_key)?;
        info!("fetched `{url}` ({} bytes), requested {count} times", page.len());

        Ok(page)
    }

    /// Read how many times `url` was requested. Never counts as a request itself.
    pub fn request_count<'a>(&self, url: impl Into<Option<&'a str>>) -> anyhow::Result<i64> {
        let url = match url.into() {
            Some(url) if !url.trim().is_empty() => url,
            _ => return Ok(0),
        };

        let key = count_key(url);
        let Some(raw) = self.store.get(&key)? else {
            return Ok(0);
        };

        std::str::from_utf8(&raw)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| anyhow::anyhow!("value of `{key}` is not an integer"))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
