use crate::analysis::period::{self, Granularity};
use crate::analysis::{require_columns, stats};
use crate::domain::dataset::Dataset;
use crate::domain::report::{ForecastMethod, ForecastResult, TrendDirection};
use crate::domain::schema::Field;
use crate::error::{EngineError, Result};

pub const DEFAULT_HORIZON: usize = 3;
/// Two years of monthly projections.
pub const MAX_HORIZON: usize = 24;
const MIN_HISTORY: usize = 3;

/// Least-squares line over monthly totals, projected `horizon` months ahead.
///
/// Months are the ones with at least one sale; gaps are not filled. Fewer than three months of
/// history is not an error: the result carries the insufficient-data marker instead.
pub fn forecast(dataset: &Dataset, horizon: usize) -> Result<ForecastResult> {
    require_columns(dataset, "forecast", &[Field::Timestamp, Field::Amount])?;
    check_horizon(horizon)?;

    let buckets = period::bucket_totals(dataset, Granularity::Monthly);
    if buckets.len() < MIN_HISTORY {
        tracing::info!(months = buckets.len(), "not enough history to forecast");
        return Ok(ForecastResult {
            method: ForecastMethod::InsufficientData,
            projections: Vec::new(),
            projected_periods: Vec::new(),
            confidence: 0.0,
            residual_std: 0.0,
            direction: TrendDirection::Stable,
            historical_periods: buckets.len(),
            horizon,
            message: Some(format!(
                "at least {MIN_HISTORY} months of history are needed to forecast, found {}",
                buckets.len()
            )),
        });
    }

    let ys: Vec<f64> = buckets.iter().map(|b| b.total).collect();
    let fit = Fit::least_squares(&ys);
    let n = ys.len();

    let projections: Vec<f64> = (n..n + horizon).map(|x| fit.at(x as f64).max(0.0)).collect();

    let mut projected_periods = Vec::with_capacity(horizon);
    let mut start = buckets[n - 1].start;
    for _ in 0..horizon {
        start = Granularity::Monthly.next_start(start);
        projected_periods.push(Granularity::Monthly.label(start));
    }

    let residuals: Vec<f64> = ys
        .iter()
        .enumerate()
        .map(|(x, y)| y - fit.at(x as f64))
        .collect();
    let mean_y = stats::mean(&ys).unwrap_or(0.0);
    let ss_res: f64 = residuals.iter().map(|r| r * r).sum();
    let ss_tot: f64 = ys.iter().map(|y| (y - mean_y).powi(2)).sum();
    let r_squared = if ss_tot == 0.0 { 1.0 } else { 1.0 - ss_res / ss_tot };

    let direction = if fit.slope > 0.0 {
        TrendDirection::Growing
    } else if fit.slope < 0.0 {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    };

    tracing::debug!(
        slope = fit.slope,
        intercept = fit.intercept,
        r_squared,
        months = n,
        horizon,
        "forecast fitted"
    );

    Ok(ForecastResult {
        method: ForecastMethod::LinearRegression,
        projections,
        projected_periods,
        confidence: (r_squared * 100.0).clamp(0.0, 100.0),
        residual_std: stats::population_std(&residuals).unwrap_or(0.0),
        direction,
        historical_periods: n,
        horizon,
        message: None,
    })
}

pub fn check_horizon(horizon: usize) -> Result<()> {
    if horizon > MAX_HORIZON {
        return Err(EngineError::Analysis {
            stage: "forecast",
            detail: format!("horizon {horizon} exceeds the maximum of {MAX_HORIZON} months"),
        });
    }
    Ok(())
}

/// `y = intercept + slope * x` over `x = 0..n`.
struct Fit {
    slope: f64,
    intercept: f64,
}

impl Fit {
    fn least_squares(ys: &[f64]) -> Self {
        let xs: Vec<f64> = (0..ys.len()).map(|x| x as f64).collect();
        let mean_x = stats::mean(&xs).unwrap_or(0.0);
        let mean_y = stats::mean(ys).unwrap_or(0.0);

        let (mut sxy, mut sxx) = (0.0, 0.0);
        for (x, y) in xs.iter().zip(ys) {
            sxy += (x - mean_x) * (y - mean_y);
            sxx += (x - mean_x).powi(2);
        }
        let slope = stats::ratio(sxy, sxx);
        Self {
            slope,
            intercept: mean_y - slope * mean_x,
        }
    }

    fn at(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}
