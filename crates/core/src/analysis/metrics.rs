use crate::analysis::period::{self, Granularity};
use crate::analysis::stats;
use crate::domain::dataset::Dataset;
use crate::domain::report::{
    BasicInfo, CategoryBasis, CategoryBreakdown, CategoryTotal, InventoryAlerts, KpiSet,
    MonthlyTrend, RankedEntity, SalesMetrics, Summary,
};
use crate::domain::schema::{Field, DISPLAY_TIMESTAMP_FORMAT};
use std::collections::{HashMap, HashSet};

pub const TOP_ENTITIES: usize = 10;
const EXPIRY_ALERT_DAYS: i64 = 7;
const ALERT_DISPLAY_LIMIT: usize = 10;
const SUMMARY_MONTHS: usize = 6;

/// Builds the summary sections the dataset's columns allow. Missing columns skip sections.
pub fn summarize(dataset: &Dataset) -> Summary {
    Summary {
        basic_info: basic_info(dataset),
        sales_metrics: sales_metrics(dataset),
        top_entities: top_entities(dataset, TOP_ENTITIES),
        category_breakdown: category_breakdown(dataset),
        alerts: inventory_alerts(dataset),
        trend: monthly_trend(dataset),
    }
}

fn basic_info(dataset: &Dataset) -> BasicInfo {
    let period = if dataset.has(Field::Timestamp) {
        let mut stamps = dataset.records().iter().filter_map(|r| r.timestamp);
        stamps.next().map(|first| {
            let (min, max) = stamps.fold((first, first), |(lo, hi), ts| (lo.min(ts), hi.max(ts)));
            format!(
                "from {} to {}",
                min.format(DISPLAY_TIMESTAMP_FORMAT),
                max.format(DISPLAY_TIMESTAMP_FORMAT)
            )
        })
    } else {
        None
    };

    BasicInfo {
        row_count: dataset.len(),
        columns: dataset
            .columns()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect(),
        period,
    }
}

fn sales_metrics(dataset: &Dataset) -> Option<SalesMetrics> {
    if !dataset.has(Field::Amount) {
        return None;
    }
    let amounts = dataset.amounts();
    Some(SalesMetrics {
        total: stats::sum(&amounts),
        average: stats::mean(&amounts).unwrap_or(0.0),
        transactions: amounts.iter().filter(|a| **a > 0.0).count(),
    })
}

/// Groups summed values by key, keeping first-seen key order.
fn group_sum<'a>(pairs: impl Iterator<Item = (&'a str, f64)>) -> Vec<(String, f64)> {
    let mut index: HashMap<&'a str, usize> = HashMap::new();
    let mut groups: Vec<(String, f64)> = Vec::new();
    for (key, value) in pairs {
        match index.get(key) {
            Some(&i) => groups[i].1 += value,
            None => {
                index.insert(key, groups.len());
                groups.push((key.to_string(), value));
            }
        }
    }
    groups
}

/// Largest groups first. The sort is stable, so equal totals keep first-seen order.
fn sort_desc(groups: &mut [(String, f64)]) {
    groups.sort_by(|a, b| b.1.total_cmp(&a.1));
}

pub fn top_entities(dataset: &Dataset, limit: usize) -> Option<Vec<RankedEntity>> {
    if !(dataset.has(Field::EntityName) && dataset.has(Field::Amount)) {
        return None;
    }
    let mut groups = group_sum(dataset.records().iter().filter_map(|r| {
        r.entity_name
            .as_deref()
            .map(|name| (name, r.amount.unwrap_or(0.0)))
    }));
    sort_desc(&mut groups);

    Some(
        groups
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, (entity, total))| RankedEntity {
                rank: i + 1,
                entity,
                total,
            })
            .collect(),
    )
}

fn category_breakdown(dataset: &Dataset) -> Option<CategoryBreakdown> {
    if !dataset.has(Field::Category) {
        return None;
    }
    let basis = if dataset.has(Field::Amount) {
        CategoryBasis::Amount
    } else {
        CategoryBasis::Count
    };
    let mut groups = group_sum(dataset.records().iter().filter_map(|r| {
        let value = match basis {
            CategoryBasis::Amount => r.amount.unwrap_or(0.0),
            CategoryBasis::Count => 1.0,
        };
        r.category.as_deref().map(|c| (c, value))
    }));
    sort_desc(&mut groups);

    Some(CategoryBreakdown {
        basis,
        entries: groups
            .into_iter()
            .map(|(category, value)| CategoryTotal { category, value })
            .collect(),
    })
}

fn inventory_alerts(dataset: &Dataset) -> Option<InventoryAlerts> {
    if !dataset.has(Field::DaysUntilExpiry) {
        return None;
    }
    let critical: Vec<_> = dataset
        .records()
        .iter()
        .filter(|r| r.days_until_expiry.is_some_and(|d| d <= EXPIRY_ALERT_DAYS))
        .collect();

    Some(InventoryAlerts {
        critical_count: critical.len(),
        entities: critical
            .iter()
            .filter_map(|r| r.entity_name.clone())
            .take(ALERT_DISPLAY_LIMIT)
            .collect(),
    })
}

fn monthly_trend(dataset: &Dataset) -> Option<MonthlyTrend> {
    if !(dataset.has(Field::Timestamp) && dataset.has(Field::Amount)) {
        return None;
    }
    let buckets = period::bucket_totals(dataset, Granularity::Monthly);
    let recent = &buckets[buckets.len().saturating_sub(SUMMARY_MONTHS)..];
    let (best, worst) = period::extremes(recent)?;

    Some(MonthlyTrend {
        monthly_totals: period::labelled(recent, Granularity::Monthly),
        best_month: Granularity::Monthly.label(recent[best].start),
        worst_month: Granularity::Monthly.label(recent[worst].start),
    })
}

/// Flat KPI projection of the dataset. Ratios over an empty denominator are 0.0.
pub fn compute_kpis(dataset: &Dataset) -> KpiSet {
    let total = dataset.len();
    let mut kpis = KpiSet {
        total_transactions: total,
        ..Default::default()
    };

    if dataset.has(Field::Amount) {
        let amounts = dataset.amounts();
        let successful = amounts.iter().filter(|a| **a > 0.0).count();
        kpis.total_sales = stats::sum(&amounts);
        kpis.average_ticket = stats::mean(&amounts).unwrap_or(0.0);
        kpis.median_sale = stats::median(&amounts).unwrap_or(0.0);
        kpis.successful_transactions = successful;
        kpis.conversion_rate = stats::ratio(successful as f64 * 100.0, total as f64);
    }

    if dataset.has(Field::EntityName) {
        kpis.unique_entities = distinct(dataset.records().iter().map(|r| r.entity_name.as_deref()));
    }

    if dataset.has(Field::CustomerId) {
        let customers = distinct(dataset.records().iter().map(|r| r.customer_id.as_deref()));
        kpis.unique_customers = customers;
        kpis.transactions_per_customer = stats::ratio(total as f64, customers as f64);
    }

    kpis
}

fn distinct<'a>(values: impl Iterator<Item = Option<&'a str>>) -> usize {
    values.flatten().collect::<HashSet<_>>().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dataset::Record;
    use crate::domain::schema::Columns;
    use crate::fixtures::{dataset, sale};

    fn shop() -> Dataset {
        dataset(vec![
            sale("2024-01-05 10:00:00", "Tea", "Drinks", 30.0),
            sale("2024-01-20 10:00:00", "Bread", "Bakery", 50.0),
            sale("2024-02-03 10:00:00", "Tea", "Drinks", 20.0),
            sale("2024-02-14 10:00:00", "Cake", "Bakery", 0.0),
            sale("2024-03-01 10:00:00", "Milk", "Drinks", 50.0),
        ])
    }

    #[test]
    fn sales_metrics_match_amount_column() {
        let s = summarize(&shop());
        let m = s.sales_metrics.unwrap();
        assert_eq!(m.total, 150.0);
        assert_eq!(m.average, 30.0);
        assert_eq!(m.transactions, 4);
        assert_eq!(s.basic_info.row_count, 5);
        assert_eq!(
            s.basic_info.period.as_deref(),
            Some("from 2024-01-05 10:00:00 to 2024-03-01 10:00:00")
        );
    }

    #[test]
    fn top_entities_rank_descending_with_stable_ties() {
        let top = top_entities(&shop(), TOP_ENTITIES).unwrap();
        let names: Vec<&str> = top.iter().map(|e| e.entity.as_str()).collect();
        // Tea, Bread, and Milk all total 50; first-seen order decides.
        assert_eq!(names, vec!["Tea", "Bread", "Milk", "Cake"]);
        assert_eq!(top[0].rank, 1);
        assert_eq!(top[3].rank, 4);
    }

    #[test]
    fn top_entities_are_capped_and_bounded_by_total() {
        let records: Vec<Record> = (0..25)
            .map(|i| sale("2024-01-01 00:00:00", &format!("E{i}"), "C", i as f64))
            .collect();
        let ds = dataset(records);
        let top = top_entities(&ds, TOP_ENTITIES).unwrap();
        assert_eq!(top.len(), 10);
        assert!(top.windows(2).all(|w| w[0].total >= w[1].total));
        let ranked: f64 = top.iter().map(|e| e.total).sum();
        assert!(ranked <= summarize(&ds).sales_metrics.unwrap().total);
    }

    #[test]
    fn category_breakdown_uses_amount_or_count() {
        let by_amount = summarize(&shop()).category_breakdown.unwrap();
        assert_eq!(by_amount.basis, CategoryBasis::Amount);
        assert_eq!(by_amount.entries[0].category, "Drinks");
        assert_eq!(by_amount.entries[0].value, 100.0);

        let counts_only = Dataset::new(
            Columns::empty().with(Field::Category),
            ["A", "B", "B"]
                .iter()
                .map(|c| Record {
                    category: Some(c.to_string()),
                    ..Default::default()
                })
                .collect(),
        );
        let by_count = summarize(&counts_only).category_breakdown.unwrap();
        assert_eq!(by_count.basis, CategoryBasis::Count);
        assert_eq!(by_count.entries[0].category, "B");
        assert_eq!(by_count.entries[0].value, 2.0);
    }

    #[test]
    fn expiry_alerts_cap_display_list() {
        let records: Vec<Record> = (0..15)
            .map(|i| Record {
                entity_name: Some(format!("P{i}")),
                amount: Some(1.0),
                days_until_expiry: Some(i),
                ..Default::default()
            })
            .collect();
        let ds = Dataset::new(
            Columns::empty()
                .with(Field::EntityName)
                .with(Field::Amount)
                .with(Field::DaysUntilExpiry),
            records,
        );
        let alerts = summarize(&ds).alerts.unwrap();
        assert_eq!(alerts.critical_count, 8);
        assert_eq!(alerts.entities.len(), 8);
        assert_eq!(alerts.entities[0], "P0");
        assert!(summarize(&shop()).alerts.is_none());
    }

    #[test]
    fn summary_trend_reports_best_and_worst_month() {
        let trend = summarize(&shop()).trend.unwrap();
        assert_eq!(trend.monthly_totals.len(), 3);
        assert_eq!(trend.best_month, "2024-01");
        assert_eq!(trend.worst_month, "2024-02");
    }

    #[test]
    fn kpis_cover_amounts_entities_and_customers() {
        let mut ds_records = shop().records().to_vec();
        for (i, r) in ds_records.iter_mut().enumerate() {
            r.customer_id = Some(format!("C{}", i % 2));
        }
        let ds = Dataset::new(shop().columns().with(Field::CustomerId), ds_records);

        let kpis = compute_kpis(&ds);
        assert_eq!(kpis.total_sales, 150.0);
        assert_eq!(kpis.median_sale, 30.0);
        assert_eq!(kpis.total_transactions, 5);
        assert_eq!(kpis.successful_transactions, 4);
        assert_eq!(kpis.unique_entities, 4);
        assert_eq!(kpis.unique_customers, 2);
        assert_eq!(kpis.transactions_per_customer, 2.5);
        assert_eq!(kpis.conversion_rate, 80.0);
    }

    #[test]
    fn kpis_without_customers_are_zero() {
        let kpis = compute_kpis(&shop());
        assert_eq!(kpis.unique_customers, 0);
        assert_eq!(kpis.transactions_per_customer, 0.0);
    }

    #[test]
    fn empty_dataset_yields_zero_filled_output() {
        let ds = dataset(vec![]);
        let kpis = compute_kpis(&ds);
        assert_eq!(kpis, KpiSet::default());

        let s = summarize(&ds);
        assert_eq!(s.sales_metrics.unwrap().average, 0.0);
        assert!(s.top_entities.unwrap().is_empty());
        assert!(s.trend.is_none());
        assert!(s.basic_info.period.is_none());
    }
}
