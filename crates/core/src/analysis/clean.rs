use crate::domain::dataset::{Dataset, RawDataset, RawRecord, Record};
use crate::domain::schema::{Cell, Columns, Field};

/// Replacement for missing or blank entity and category labels.
pub const UNSPECIFIED: &str = "Unspecified";

const NULL_LIKE: [&str; 3] = ["nan", "none", "null"];

/// Normalizes a raw dataset into the canonical form. Never fails; an empty result is valid.
///
/// Per record, in order: blank rows are dropped; `amount` is coerced with failures becoming 0
/// (unknown counts as no sale); negative amounts are dropped; entity and category labels are
/// trimmed with blanks replaced by [`UNSPECIFIED`]; rows whose `timestamp` does not coerce are
/// dropped.
pub fn clean(raw: &RawDataset) -> Dataset {
    let columns = raw.columns();
    let records: Vec<Record> = raw
        .records()
        .iter()
        .filter(|r| !r.is_blank())
        .filter_map(|r| clean_record(r, columns))
        .collect();

    tracing::info!(before = raw.len(), after = records.len(), "dataset cleaned");
    Dataset::new(columns, records)
}

fn clean_record(raw: &RawRecord, columns: Columns) -> Option<Record> {
    let amount = if columns.contains(Field::Amount) {
        let amount = raw.get(Field::Amount).as_number().unwrap_or(0.0);
        if amount < 0.0 {
            return None;
        }
        Some(amount)
    } else {
        None
    };

    let entity_name = columns
        .contains(Field::EntityName)
        .then(|| normalize_label(raw.get(Field::EntityName)));
    let category = columns
        .contains(Field::Category)
        .then(|| normalize_label(raw.get(Field::Category)));

    let timestamp = if columns.contains(Field::Timestamp) {
        Some(raw.get(Field::Timestamp).as_timestamp()?)
    } else {
        None
    };

    Some(Record {
        id: raw.get(Field::Id).as_text(),
        timestamp,
        entity_name,
        category,
        amount,
        quantity: raw.get(Field::Quantity).as_integer(),
        customer_id: raw.get(Field::CustomerId).as_text(),
        days_until_expiry: raw.get(Field::DaysUntilExpiry).as_integer(),
    })
}

fn normalize_label(cell: &Cell) -> String {
    let Some(text) = cell.as_text() else {
        return UNSPECIFIED.to_string();
    };
    let trimmed = text.trim();
    if trimmed.is_empty() || NULL_LIKE.contains(&trimmed.to_ascii_lowercase().as_str()) {
        UNSPECIFIED.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(rows: Vec<serde_json::Value>) -> RawDataset {
        RawDataset::from_json_rows(&rows).unwrap()
    }

    #[test]
    fn applies_cleaning_policy() {
        let ds = raw(vec![
            json!({"entity_name": "  Tea ", "category": "", "amount": "12.5", "timestamp": "2024-01-01 09:00:00"}),
            json!({"entity_name": null, "category": "None", "amount": "oops", "timestamp": "2024-01-02"}),
            json!({"entity_name": "Refund", "category": "X", "amount": -4, "timestamp": "2024-01-03"}),
            json!({"entity_name": "Late", "category": "X", "amount": 1, "timestamp": "someday"}),
            json!({}),
        ]);

        let cleaned = clean(&ds);
        assert_eq!(cleaned.len(), 2);

        let first = &cleaned.records()[0];
        assert_eq!(first.entity_name.as_deref(), Some("Tea"));
        assert_eq!(first.category.as_deref(), Some(UNSPECIFIED));
        assert_eq!(first.amount, Some(12.5));

        let second = &cleaned.records()[1];
        assert_eq!(second.entity_name.as_deref(), Some(UNSPECIFIED));
        assert_eq!(second.category.as_deref(), Some(UNSPECIFIED));
        assert_eq!(second.amount, Some(0.0));
    }

    #[test]
    fn absent_columns_stay_absent() {
        let cleaned = clean(&raw(vec![json!({"category": "Drinks", "quantity": 2})]));
        let r = &cleaned.records()[0];
        assert_eq!(r.amount, None);
        assert_eq!(r.entity_name, None);
        assert_eq!(r.timestamp, None);
        assert_eq!(r.quantity, Some(2));
    }

    #[test]
    fn empty_result_is_not_an_error() {
        let cleaned = clean(&raw(vec![json!({"amount": -1}), json!({"amount": -2})]));
        assert!(cleaned.is_empty());
        assert_eq!(cleaned.columns().names(), vec!["amount"]);
    }

    #[test]
    fn cleaning_is_idempotent() {
        let ds = raw(vec![
            json!({"id": 7, "entity_name": " Tea", "category": null, "amount": "3", "customer_id": "C1",
                   "timestamp": "2024-02-01T10:00:00", "quantity": 2, "days_until_expiry": "5"}),
            json!({"id": "A-2", "entity_name": "nan", "category": "Food", "amount": null,
                   "timestamp": "2024-02-03", "quantity": 1.5}),
            json!({"entity_name": "Bad", "amount": -3, "timestamp": "2024-02-03"}),
        ])
        .coerce_types();

        let once = clean(&ds);
        let twice = clean(&once.to_raw());
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
        assert_eq!(once.records()[0].id.as_deref(), Some("7"));
        assert_eq!(once.records()[1].quantity, None);
    }
}
