use crate::analysis::period::{self, Granularity};
use crate::analysis::{require_columns, stats};
use crate::domain::dataset::Dataset;
use crate::domain::report::{TrendDirection, TrendResult};
use crate::domain::schema::Field;
use crate::error::Result;

/// Growth beyond this many percent, either way, counts as a trend.
const STABLE_BAND_PCT: f64 = 5.0;

/// Per-period totals and the first-to-last growth classification.
pub fn analyze_trend(dataset: &Dataset, granularity: Granularity) -> Result<TrendResult> {
    require_columns(dataset, "trend", &[Field::Timestamp, Field::Amount])?;

    let buckets = period::bucket_totals(dataset, granularity);
    let growth_pct = match (buckets.first(), buckets.last()) {
        (Some(first), Some(last)) if buckets.len() >= 2 && first.total != 0.0 => {
            (last.total - first.total) / first.total * 100.0
        }
        _ => 0.0,
    };
    let direction = classify(growth_pct);

    let (best_period, worst_period) = match period::extremes(&buckets) {
        Some((best, worst)) => (
            Some(granularity.label(buckets[best].start)),
            Some(granularity.label(buckets[worst].start)),
        ),
        None => (None, None),
    };
    let totals: Vec<f64> = buckets.iter().map(|b| b.total).collect();

    tracing::debug!(
        granularity = %granularity,
        periods = buckets.len(),
        growth_pct,
        direction = direction.as_str(),
        "trend computed"
    );

    Ok(TrendResult {
        granularity,
        direction,
        growth_pct,
        periods: period::labelled(&buckets, granularity),
        best_period,
        worst_period,
        mean_per_period: stats::mean(&totals).unwrap_or(0.0),
        period_count: buckets.len(),
    })
}

fn classify(growth_pct: f64) -> TrendDirection {
    if growth_pct > STABLE_BAND_PCT {
        TrendDirection::Growing
    } else if growth_pct < -STABLE_BAND_PCT {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    }
}
