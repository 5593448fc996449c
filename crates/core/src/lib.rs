pub mod analysis;
pub mod domain;
pub mod error;
pub mod export;
pub mod ingest;
pub mod narrative;

#[cfg(test)]
mod fixtures;

pub use analysis::{analyze, Analysis, AnalysisOptions};
pub use error::{EngineError, ExportError};

pub mod config {
    use anyhow::Context;

    use crate::analysis::period::Granularity;

    #[derive(Debug, Clone, Default)]
    pub struct Settings {
        pub sentry_dsn: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub anthropic_base_url: Option<String>,
        pub anthropic_model: Option<String>,
        pub anthropic_max_tokens: Option<u32>,
        pub anthropic_timeout_secs: Option<u64>,
        pub data_source_url: Option<String>,
        pub data_source_api_key: Option<String>,
        pub data_source_timeout_secs: Option<u64>,
        pub data_source_retries: Option<u32>,
        pub analysis_granularity: Option<String>,
        pub anomaly_threshold: Option<f64>,
        pub forecast_horizon: Option<usize>,
        pub export_dir: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                anthropic_base_url: std::env::var("ANTHROPIC_BASE_URL").ok(),
                anthropic_model: std::env::var("ANTHROPIC_MODEL").ok(),
                anthropic_max_tokens: parse_env("ANTHROPIC_MAX_TOKENS")?,
                anthropic_timeout_secs: parse_env("ANTHROPIC_TIMEOUT_SECS")?,
                data_source_url: std::env::var("DATA_SOURCE_URL").ok(),
                data_source_api_key: std::env::var("DATA_SOURCE_API_KEY").ok(),
                data_source_timeout_secs: parse_env("DATA_SOURCE_TIMEOUT_SECS")?,
                data_source_retries: parse_env("DATA_SOURCE_RETRIES")?,
                analysis_granularity: std::env::var("ANALYSIS_GRANULARITY").ok(),
                anomaly_threshold: parse_env("ANOMALY_THRESHOLD")?,
                forecast_horizon: parse_env("FORECAST_HORIZON")?,
                export_dir: std::env::var("EXPORT_DIR").ok(),
            })
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }

        pub fn require_data_source_url(&self) -> anyhow::Result<&str> {
            self.data_source_url
                .as_deref()
                .context("DATA_SOURCE_URL is required")
        }

        pub fn granularity(&self) -> anyhow::Result<Option<Granularity>> {
            self.analysis_granularity
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.parse::<Granularity>())
                .transpose()
                .context("invalid ANALYSIS_GRANULARITY")
        }

        pub fn export_dir(&self) -> &str {
            self.export_dir
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(".")
        }
    }

    fn parse_env<T>(key: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match std::env::var(key) {
            Ok(s) if !s.trim().is_empty() => s
                .trim()
                .parse::<T>()
                .map(Some)
                .with_context(|| format!("invalid {key}: {s}")),
            _ => Ok(None),
        }
    }

}
