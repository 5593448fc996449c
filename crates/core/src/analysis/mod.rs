//! The analysis pipeline: validate, clean, then derive every report section from the cleaned
//! dataset.

pub mod anomaly;
pub mod clean;
pub mod forecast;
pub mod metrics;
pub mod period;
pub(crate) mod stats;
pub mod trend;
pub mod validate;

use crate::config::Settings;
use crate::domain::dataset::{Dataset, RawDataset};
use crate::domain::report::AnalysisReport;
use crate::domain::schema::Field;
use crate::error::{EngineError, Result};
use period::Granularity;

pub use anomaly::detect_anomalies;
pub use clean::clean;
pub use forecast::forecast;
pub use metrics::{compute_kpis, summarize};
pub use trend::analyze_trend;
pub use validate::{validate, ValidationOutcome};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisOptions {
    pub granularity: Granularity,
    pub anomaly_threshold: f64,
    pub forecast_horizon: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            granularity: Granularity::Monthly,
            anomaly_threshold: anomaly::DEFAULT_THRESHOLD,
            forecast_horizon: forecast::DEFAULT_HORIZON,
        }
    }
}

impl AnalysisOptions {
    /// Defaults overridden by whatever the environment sets.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let anomaly_threshold = settings
            .anomaly_threshold
            .unwrap_or(defaults.anomaly_threshold);
        anyhow::ensure!(
            anomaly_threshold.is_finite() && anomaly_threshold > 0.0,
            "ANOMALY_THRESHOLD must be a positive number"
        );
        let forecast_horizon = settings
            .forecast_horizon
            .unwrap_or(defaults.forecast_horizon);
        anyhow::ensure!(
            forecast_horizon <= forecast::MAX_HORIZON,
            "FORECAST_HORIZON must be at most {}",
            forecast::MAX_HORIZON
        );
        Ok(Self {
            granularity: settings.granularity()?.unwrap_or(defaults.granularity),
            anomaly_threshold,
            forecast_horizon,
        })
    }
}

/// A finished run: the cleaned dataset every section was computed from, plus the report.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub dataset: Dataset,
    pub report: AnalysisReport,
}

/// Runs the whole pipeline. Validation failures stop the run; every later stage works on the
/// cleaned dataset.
pub fn analyze(raw: &RawDataset, options: &AnalysisOptions) -> Result<Analysis> {
    validate(raw).into_result()?;
    let dataset = clean(raw);
    let report = build_report(&dataset, options)?;
    Ok(Analysis { dataset, report })
}

/// Report sections for an already cleaned dataset. Trend and forecast are left out when the
/// dataset has no `timestamp` or `amount` column.
pub fn build_report(dataset: &Dataset, options: &AnalysisOptions) -> Result<AnalysisReport> {
    let time_series = dataset.has(Field::Timestamp) && dataset.has(Field::Amount);
    let trend = time_series
        .then(|| analyze_trend(dataset, options.granularity))
        .transpose()?;
    let forecast = time_series
        .then(|| forecast(dataset, options.forecast_horizon))
        .transpose()?;

    let report = AnalysisReport {
        generated_at: chrono::Utc::now(),
        summary: summarize(dataset),
        kpis: compute_kpis(dataset),
        trend,
        anomalies: detect_anomalies(dataset, options.anomaly_threshold),
        forecast,
    };

    tracing::info!(
        rows = dataset.len(),
        anomalies = report.anomalies.len(),
        has_trend = report.trend.is_some(),
        has_forecast = report.forecast.is_some(),
        "analysis report built"
    );
    Ok(report)
}

pub(crate) fn require_columns(
    dataset: &Dataset,
    stage: &'static str,
    fields: &[Field],
) -> Result<()> {
    let missing = dataset.columns().missing(fields);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::missing_columns(stage, &missing))
    }
}
