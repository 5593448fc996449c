use crate::config::Settings;
use crate::domain::dataset::RawDataset;
use crate::ingest::file::parse_json_dataset;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 3;

/// Where sales records come from. Transport concerns (retries, timeouts) live here, never in the
/// analysis.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch(&self) -> Result<RawDataset>;
}

/// Rows served as JSON over HTTP, either a bare array or `{ "records": [...] }`.
#[derive(Debug, Clone)]
pub struct HttpJsonSource {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    retries: u32,
}

impl HttpJsonSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let url = settings.require_data_source_url()?.to_string();
        let api_key = settings.data_source_api_key.clone();

        let timeout_secs = settings
            .data_source_timeout_secs
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let retries = settings.data_source_retries.unwrap_or(DEFAULT_RETRIES).max(1);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build data source http client")?;

        Ok(Self {
            http,
            url,
            api_key,
            retries,
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn fetch_once(&self) -> Result<Value> {
        let res = self
            .http
            .get(&self.url)
            .headers(self.headers()?)
            .send()
            .await
            .context("data source request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read data source response")?;

        if !status.is_success() {
            anyhow::bail!("data source HTTP {status}: {text}");
        }

        serde_json::from_str::<Value>(&text)
            .with_context(|| format!("data source response is not valid JSON: {text}"))
    }
}

/// Delay before retry number `attempt` (1-based): 1s, 2s, 4s, ...
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(6))
}

#[async_trait::async_trait]
impl DataSource for HttpJsonSource {
    fn source_name(&self) -> &'static str {
        "http_json"
    }

    async fn fetch(&self) -> Result<RawDataset> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once().await {
                Ok(raw) => {
                    let ds = parse_json_dataset(&raw)?;
                    tracing::info!(rows = ds.len(), attempt, "fetched dataset from data source");
                    return Ok(ds);
                }
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let delay = backoff(attempt);
                    tracing::warn!(attempt, ?delay, error = %err, "data source fetch failed; retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_one_second() {
        assert_eq!(backoff(1), Duration::from_secs(1));
        assert_eq!(backoff(2), Duration::from_secs(2));
        assert_eq!(backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn requires_a_url() {
        let err = HttpJsonSource::from_settings(&Settings::default()).unwrap_err();
        assert!(err.to_string().contains("DATA_SOURCE_URL"));
    }

    #[test]
    fn sends_api_key_header_when_configured() {
        let settings = Settings {
            data_source_url: Some("http://localhost:9/sales".into()),
            data_source_api_key: Some("secret".into()),
            ..Default::default()
        };
        let source = HttpJsonSource::from_settings(&settings).unwrap();
        let headers = source.headers().unwrap();
        assert_eq!(headers.get("x-api-key").unwrap(), "secret");
        assert_eq!(source.source_name(), "http_json");
        assert_eq!(source.retries, DEFAULT_RETRIES);
    }

    #[test]
    fn retries_come_from_settings() {
        let settings = Settings {
            data_source_url: Some("http://localhost:9/sales".into()),
            data_source_retries: Some(5),
            data_source_timeout_secs: Some(2),
            ..Default::default()
        };
        assert_eq!(HttpJsonSource::from_settings(&settings).unwrap().retries, 5);

        let zero = Settings {
            data_source_retries: Some(0),
            ..settings
        };
        assert_eq!(HttpJsonSource::from_settings(&zero).unwrap().retries, 1);
    }
}
