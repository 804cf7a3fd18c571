use page_tracker::{cache::Cacher, config::Config, http::HttpClient, tracker::PageTracker};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let (config, config_err) = match Config::from_path() {
        Ok(config) => (config, None),
        Err(err) => (Config::default(), Some(err)),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(err) = config_err {
        tracing::warn!("{err:#}, fallback to default config");
    }

    if let Err(err) = run(config).await {
        tracing::error!("{err:#}");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        anyhow::bail!("usage: page-tracker <URL>...");
    }

    let tracker = PageTracker::builder()
        .store(Cacher::open(&config.redis_addr)?)
        .fetcher(HttpClient::with_timeout(config.request_timeout())?)
        .ttl(config.cache_ttl())
        .build();

    for url in &urls {
        let page = tracker.get_page(url.as_str()).await?;
        println!("{page}");

        let count = tracker.request_count(url.as_str())?;
        tracing::info!("`{url}` requested {count} times");
    }

    Ok(())
}
