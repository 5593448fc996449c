use crate::domain::dataset::{Dataset, Record};
use crate::domain::schema::{parse_timestamp, Columns, Field};

pub(crate) fn sales_columns() -> Columns {
    Columns::empty()
        .with(Field::Timestamp)
        .with(Field::EntityName)
        .with(Field::Category)
        .with(Field::Amount)
}

pub(crate) fn sale(ts: &str, entity: &str, category: &str, amount: f64) -> Record {
    Record {
        timestamp: parse_timestamp(ts),
        entity_name: Some(entity.to_string()),
        category: Some(category.to_string()),
        amount: Some(amount),
        ..Default::default()
    }
}

pub(crate) fn dataset(records: Vec<Record>) -> Dataset {
    Dataset::new(sales_columns(), records)
}

/// One sale per month starting January 2024, with the given totals.
pub(crate) fn monthly(totals: &[f64]) -> Dataset {
    let records = totals
        .iter()
        .enumerate()
        .map(|(i, t)| sale(&format!("2024-{:02}-10 12:00:00", i + 1), "Item", "Cat", *t))
        .collect();
    dataset(records)
}
