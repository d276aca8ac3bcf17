use serde::{Deserialize, Deserializer};
use std::time::Duration;

use crate::api::ClientError;

/// Settings for [`crate::ApiClient`] and [`crate::NetworkMonitor`].
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URLs of the API, in order of preference.
    #[serde(deserialize_with = "url_list")]
    pub api_urls: Vec<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// How many times every endpoint is tried before giving up.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
}

impl ClientConfig {
    /// Configuration with default timings for the given endpoints.
    pub fn with_urls<I, S>(api_urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            api_urls: api_urls.into_iter().map(Into::into).collect(),
            request_timeout_ms: default_request_timeout_ms(),
            max_rounds: default_max_rounds(),
            retry_backoff_ms: default_retry_backoff_ms(),
            health_path: default_health_path(),
            monitor_interval_ms: default_monitor_interval_ms(),
        }
    }

    /// Loads configuration from `TASKMARKET_*` environment variables.
    /// `TASKMARKET_API_URLS` is a comma-separated list.
    pub fn from_env() -> Result<Self, ClientError> {
        let settings = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("TASKMARKET")
                    .prefix_separator("_")
                    .try_parsing(true),
            )
            .build()?;
        Self::from_settings(settings)
    }

    pub fn from_settings(settings: config::Config) -> Result<Self, ClientError> {
        let config: ClientConfig = settings.try_deserialize()?;
        if config.api_urls.is_empty() {
            return Err(ClientError::NoEndpoints);
        }
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UrlList {
    Joined(String),
    Items(Vec<String>),
}

fn url_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let items = match UrlList::deserialize(deserializer)? {
        UrlList::Joined(joined) => joined.split(',').map(str::to_string).collect(),
        UrlList::Items(items) => items,
    };
    Ok(items
        .into_iter()
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .collect())
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_max_rounds() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_monitor_interval_ms() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_parse_comma_separated_urls_with_defaults() {
        let settings = config::Config::builder()
            .set_override("api_urls", "http://a.example, http://b.example,")
            .unwrap()
            .build()
            .unwrap();

        let config = ClientConfig::from_settings(settings).unwrap();

        assert_eq!(
            config.api_urls,
            vec!["http://a.example".to_string(), "http://b.example".to_string()]
        );
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_rounds, 2);
        assert_eq!(config.retry_backoff(), Duration::from_millis(250));
        assert_eq!(config.health_path, "/health");
        assert_eq!(config.monitor_interval(), Duration::from_secs(30));
    }

    #[test]
    fn can_parse_url_list() {
        let settings = config::Config::builder()
            .set_override("api_urls", vec!["http://a.example", "http://b.example"])
            .unwrap()
            .set_override("max_rounds", 5)
            .unwrap()
            .build()
            .unwrap();

        let config = ClientConfig::from_settings(settings).unwrap();

        assert_eq!(config.api_urls.len(), 2);
        assert_eq!(config.max_rounds, 5);
    }

    #[test]
    fn rejects_empty_url_list() {
        let settings = config::Config::builder()
            .set_override("api_urls", " , ")
            .unwrap()
            .build()
            .unwrap();

        assert!(matches!(
            ClientConfig::from_settings(settings),
            Err(ClientError::NoEndpoints)
        ));
    }

    #[test]
    fn rejects_missing_urls() {
        let settings = config::Config::builder().build().unwrap();
        assert!(matches!(
            ClientConfig::from_settings(settings),
            Err(ClientError::Config(_))
        ));
    }
}
