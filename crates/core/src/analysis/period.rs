use crate::domain::dataset::Dataset;
use crate::domain::report::PeriodTotal;
use crate::error::EngineError;
use chrono::{Datelike, Days, Months, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Calendar bucket used by the trend and forecast components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Daily,
    Weekly,
    #[default]
    Monthly,
}

impl Granularity {
    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
        }
    }

    /// First day of the period containing `date`. Weeks run Monday through Sunday.
    pub fn period_start(self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Daily => date,
            Granularity::Weekly => {
                date - Days::new(u64::from(date.weekday().num_days_from_monday()))
            }
            Granularity::Monthly => date.with_day(1).unwrap_or(date),
        }
    }

    pub fn next_start(self, start: NaiveDate) -> NaiveDate {
        let next = match self {
            Granularity::Daily => start.checked_add_days(Days::new(1)),
            Granularity::Weekly => start.checked_add_days(Days::new(7)),
            Granularity::Monthly => start.checked_add_months(Months::new(1)),
        };
        next.unwrap_or(start)
    }

    /// `2024-03-05`, `2024-03-04/2024-03-10`, or `2024-03`.
    pub fn label(self, start: NaiveDate) -> String {
        match self {
            Granularity::Daily => start.format("%Y-%m-%d").to_string(),
            Granularity::Weekly => {
                let end = start + Days::new(6);
                format!("{}/{}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"))
            }
            Granularity::Monthly => start.format("%Y-%m").to_string(),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" | "diario" => Ok(Granularity::Daily),
            "weekly" | "week" | "semanal" => Ok(Granularity::Weekly),
            "monthly" | "month" | "mensual" => Ok(Granularity::Monthly),
            other => Err(EngineError::Analysis {
                stage: "granularity",
                detail: format!("unsupported granularity: {other} (expected daily, weekly or monthly)"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Bucket {
    pub start: NaiveDate,
    pub total: f64,
}

/// Sums `amount` per period, oldest first. Records without a timestamp are skipped.
pub(crate) fn bucket_totals(dataset: &Dataset, granularity: Granularity) -> Vec<Bucket> {
    let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for record in dataset.records() {
        let Some(ts) = record.timestamp else {
            continue;
        };
        let start = granularity.period_start(ts.date());
        *totals.entry(start).or_insert(0.0) += record.amount.unwrap_or(0.0);
    }
    totals
        .into_iter()
        .map(|(start, total)| Bucket { start, total })
        .collect()
}

pub(crate) fn labelled(buckets: &[Bucket], granularity: Granularity) -> Vec<PeriodTotal> {
    buckets
        .iter()
        .map(|b| PeriodTotal {
            period: granularity.label(b.start),
            total: b.total,
        })
        .collect()
}

/// Index of the first maximum and first minimum total.
pub(crate) fn extremes(buckets: &[Bucket]) -> Option<(usize, usize)> {
    let first = buckets.first()?;
    let (mut best, mut worst) = (0, 0);
    let (mut max, mut min) = (first.total, first.total);
    for (idx, b) in buckets.iter().enumerate().skip(1) {
        if b.total > max {
            max = b.total;
            best = idx;
        }
        if b.total < min {
            min = b.total;
            worst = idx;
        }
    }
    Some((best, worst))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{dataset, sale};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn period_start_and_labels() {
        // 2024-03-07 is a Thursday.
        let date = d(2024, 3, 7);
        assert_eq!(Granularity::Daily.label(Granularity::Daily.period_start(date)), "2024-03-07");
        assert_eq!(
            Granularity::Weekly.label(Granularity::Weekly.period_start(date)),
            "2024-03-04/2024-03-10"
        );
        assert_eq!(Granularity::Monthly.label(Granularity::Monthly.period_start(date)), "2024-03");
    }

    #[test]
    fn next_start_rolls_over_year() {
        assert_eq!(Granularity::Monthly.next_start(d(2023, 12, 1)), d(2024, 1, 1));
        assert_eq!(Granularity::Weekly.next_start(d(2024, 12, 30)), d(2025, 1, 6));
    }

    #[test]
    fn parses_english_and_spanish_names() {
        assert_eq!("Weekly".parse::<Granularity>().unwrap(), Granularity::Weekly);
        assert_eq!("mensual".parse::<Granularity>().unwrap(), Granularity::Monthly);
        assert!("quarterly".parse::<Granularity>().is_err());
    }

    #[test]
    fn buckets_are_chronological() {
        let ds = dataset(vec![
            sale("2024-03-15 10:00:00", "A", "X", 10.0),
            sale("2024-01-02 10:00:00", "A", "X", 5.0),
            sale("2024-03-01 09:00:00", "B", "X", 1.0),
        ]);
        let buckets = bucket_totals(&ds, Granularity::Monthly);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].start, d(2024, 1, 1));
        assert_eq!(buckets[1].total, 11.0);
    }

    #[test]
    fn extremes_prefer_first_occurrence() {
        let buckets: Vec<Bucket> = [3.0, 7.0, 1.0, 7.0, 1.0]
            .iter()
            .enumerate()
            .map(|(i, t)| Bucket {
                start: d(2024, 1 + i as u32, 1),
                total: *t,
            })
            .collect();
        assert_eq!(extremes(&buckets), Some((1, 2)));
        assert_eq!(extremes(&[]), None);
    }
}
