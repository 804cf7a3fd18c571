use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{env, fs, path};

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "redis_addr_default")]
    pub redis_addr: String,
    #[serde(default = "log_level_default")]
    pub log_level: String,
    #[serde(default = "cache_ttl_secs_default")]
    pub cache_ttl_secs: u64,
    #[serde(default = "request_timeout_secs_default")]
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_addr: redis_addr_default(),
            log_level: log_level_default(),
            cache_ttl_secs: cache_ttl_secs_default(),
            request_timeout_secs: request_timeout_secs_default(),
        }
    }
}

impl std::str::FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        toml::from_str(content).with_context(|| "fail to parse config from toml")
    }
}

impl Config {
    fn get_config_dir() -> anyhow::Result<path::PathBuf> {
        let config_dir = if let Ok(xdg_path) = env::var("XDG_CONFIG_HOME") {
            path::PathBuf::from(&xdg_path)
        } else {
            let home = env::var("HOME").with_context(|| "neither $XDG_CONFIG_HOME nor $HOME is set")?;
            path::Path::new(&home).join(".config")
        };

        Ok(config_dir.join("page_tracker"))
    }

    /// Locate the config file: `$PAGE_TRACKER_CFG_PATH` if set, otherwise
    /// `$XDG_CONFIG_HOME/page_tracker/config.toml`.
    pub fn file_path() -> anyhow::Result<path::PathBuf> {
        if let Ok(cfg_path) = env::var("PAGE_TRACKER_CFG_PATH") {
            return Ok(path::PathBuf::from(cfg_path));
        }

        Ok(Self::get_config_dir()
            .with_context(|| "fail to locate config directory")?
            .join("config.toml"))
    }

    pub fn from_path() -> anyhow::Result<Self> {
        Self::from_file(Self::file_path()?)
    }

    pub fn from_file(file_path: impl AsRef<path::Path>) -> anyhow::Result<Self> {
        let file_path = file_path.as_ref();
        if !file_path.exists() {
            anyhow::bail!("Config file not found in {file_path:?}");
        }
        let content = fs::read_to_string(file_path).with_context(|| "fail to read config file")?;

        content.parse()
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn redis_addr_default() -> String {
    "redis://localhost:6379".to_string()
}

fn log_level_default() -> String {
    "INFO".to_string()
}

fn cache_ttl_secs_default() -> u64 {
    10
}

fn request_timeout_secs_default() -> u64 {
    30
}

#[test]
fn validate_file_correctness() {
    let dir = tempfile::tempdir().unwrap();
    let config = r#"
        redis_addr = "redis://localhost"
        log_level = "DEBUG"
        cache_ttl_secs = 5
    "#;
    let path = dir.path().join("config.toml");
    fs::write(&path, config).unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.redis_addr, "redis://localhost");
    assert_eq!(config.log_level, "DEBUG");
    assert_eq!(config.cache_ttl(), Duration::from_secs(5));
    assert_eq!(config.request_timeout(), Duration::from_secs(30));
}

#[test]
fn empty_config_use_default() {
    let config: Config = "".parse().unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.cache_ttl(), Duration::from_secs(10));
}

#[test]
fn missing_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Config::from_file(dir.path().join("nope.toml")).is_err());
}

#[test]
fn invalid_config_is_error() {
    assert!("cache_ttl_secs = \"ten\"".parse::<Config>().is_err());
}
