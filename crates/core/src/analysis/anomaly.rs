use crate::analysis::stats;
use crate::domain::dataset::{Dataset, Record};
use crate::domain::report::{AnomalyKind, AnomalyRecord};
use crate::domain::schema::Field;

pub const DEFAULT_THRESHOLD: f64 = 2.0;

/// Flags amounts further than `threshold` sample standard deviations from the mean.
///
/// High outliers come first, then low ones, each group in dataset order. Deviation is signed, so
/// low anomalies carry a negative value. Zero amounts are never reported as low. A dataset
/// without an `amount` column, with fewer than two amounts, or with no spread yields nothing.
pub fn detect_anomalies(dataset: &Dataset, threshold: f64) -> Vec<AnomalyRecord> {
    if !dataset.has(Field::Amount) {
        return Vec::new();
    }
    let amounts = dataset.amounts();
    let (Some(mean), Some(std)) = (stats::mean(&amounts), stats::sample_std(&amounts)) else {
        return Vec::new();
    };
    if std <= 0.0 {
        return Vec::new();
    }

    let upper = mean + threshold * std;
    let lower = mean - threshold * std;
    let flag = |kind: AnomalyKind, bound: f64, r: &Record| -> Option<AnomalyRecord> {
        let value = r.amount?;
        let crossed = match kind {
            AnomalyKind::High => value > bound,
            // Zero is a day without sales, never a low outlier.
            AnomalyKind::Low => value < bound && value > 0.0,
        };
        crossed.then(|| AnomalyRecord {
            kind,
            value,
            bound,
            deviation: (value - mean) / std,
            entity: r.entity_name.clone(),
            timestamp: r.timestamp,
        })
    };

    let records = dataset.records();
    let anomalies: Vec<AnomalyRecord> = records
        .iter()
        .filter_map(|r| flag(AnomalyKind::High, upper, r))
        .chain(records.iter().filter_map(|r| flag(AnomalyKind::Low, lower, r)))
        .collect();

    tracing::debug!(mean, std, threshold, found = anomalies.len(), "anomaly scan finished");
    anomalies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::Columns;
    use crate::fixtures::{dataset, sale};

    fn amounts(values: &[f64]) -> Dataset {
        dataset(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| sale("2024-01-01 10:00:00", &format!("E{i}"), "C", *v))
                .collect(),
        )
    }

    #[test]
    fn single_spike_is_a_high_anomaly() {
        let mut values = Vec::new();
        for v in [40.0, 50.0, 60.0] {
            values.extend(std::iter::repeat(v).take(33));
        }
        values.push(10_000.0);

        let found = detect_anomalies(&amounts(&values), DEFAULT_THRESHOLD);
        assert_eq!(found.len(), 1);
        let a = &found[0];
        assert_eq!(a.kind, AnomalyKind::High);
        assert_eq!(a.value, 10_000.0);
        assert_eq!(a.entity.as_deref(), Some("E99"));
        assert!(a.deviation > 9.8 && a.deviation < 10.0, "{}", a.deviation);
        assert!((a.bound - 2139.567).abs() < 1e-2);
    }

    #[test]
    fn highs_are_listed_before_lows() {
        let mut values = vec![1.0];
        values.extend(std::iter::repeat(100.0).take(9));
        values.push(400.0);

        let found = detect_anomalies(&amounts(&values), 1.0);
        let kinds: Vec<AnomalyKind> = found.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AnomalyKind::High, AnomalyKind::Low]);
        assert_eq!(found[0].value, 400.0);
        assert!(found[0].deviation > 1.0);
        assert_eq!(found[1].value, 1.0);
        assert!(found[1].deviation < -1.0);
    }

    #[test]
    fn low_outlier_has_negative_deviation() {
        let mut values = vec![100.0; 9];
        values.push(1.0);
        let found = detect_anomalies(&amounts(&values), DEFAULT_THRESHOLD);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, AnomalyKind::Low);
        assert!((found[0].deviation + 2.846).abs() < 1e-3, "{}", found[0].deviation);
        assert!(found[0].value < found[0].bound);
    }

    #[test]
    fn zero_amount_is_never_a_low_anomaly() {
        let mut values = vec![100.0; 9];
        values.push(0.0);
        assert!(detect_anomalies(&amounts(&values), DEFAULT_THRESHOLD).is_empty());

        let mut values = vec![0.0, 0.0, 1.0];
        values.extend(std::iter::repeat(100.0).take(12));
        let found = detect_anomalies(&amounts(&values), 1.0);
        assert!(!found.is_empty());
        assert!(found
            .iter()
            .filter(|a| a.kind == AnomalyKind::Low)
            .all(|a| a.value > 0.0 && a.deviation < 0.0));
    }

    #[test]
    fn degenerate_inputs_yield_nothing() {
        assert!(detect_anomalies(&amounts(&[5.0, 5.0, 5.0]), DEFAULT_THRESHOLD).is_empty());
        assert!(detect_anomalies(&amounts(&[5.0]), DEFAULT_THRESHOLD).is_empty());
        assert!(detect_anomalies(&amounts(&[]), DEFAULT_THRESHOLD).is_empty());

        let no_amount = Dataset::new(Columns::empty().with(Field::Category), vec![]);
        assert!(detect_anomalies(&no_amount, DEFAULT_THRESHOLD).is_empty());
    }
}
