#[cfg(feature = "reqwest")]
use anyhow::Context;
#[cfg(feature = "reqwest")]
use std::{ops::Deref, time::Duration};

/// Something that can turn a URL into its text content.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<String>;
}

#[async_trait::async_trait]
impl<F> PageFetcher for F
where
    F: Fn(&str) -> anyhow::Result<String> + Send + Sync,
{
    async fn fetch(&self, url: &str) -> anyhow::Result<String> {
        self(url)
    }
}

#[cfg(feature = "reqwest")]
pub struct HttpClient(reqwest::Client);

#[cfg(feature = "reqwest")]
impl HttpClient {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .with_context(|| "fail to build http client")?;
        Ok(Self(client))
    }
}

#[cfg(feature = "reqwest")]
impl Deref for HttpClient {
    type Target = reqwest::Client;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(feature = "reqwest")]
#[async_trait::async_trait]
impl PageFetcher for HttpClient {
    async fn fetch(&self, url: &str) -> anyhow::Result<String> {
        let body = self
            .get(url)
            .send()
            .await
            .with_context(|| format!("fail to send GET request to url: `{}`", url))?
            .error_for_status()
            .with_context(|| format!("url `{}` respond with error status", url))?
            .bytes()
            .await
            .with_context(|| format!("fail to read response body from url: `{}`", url))?;

        String::from_utf8(body.to_vec())
            .with_context(|| format!("response from url `{}` is not valid UTF-8", url))
    }
}
