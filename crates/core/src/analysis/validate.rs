use crate::domain::dataset::RawDataset;
use crate::domain::schema::{Cell, Field};
use crate::error::{EngineError, Result};
use serde::Serialize;

/// At least one of these must be present for any analysis to make sense.
const CORE_FIELDS: [Field; 3] = [Field::EntityName, Field::Category, Field::Amount];
const MAX_NULL_PCT: f64 = 80.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// An invalid outcome is a hard stop for the pipeline.
    pub fn into_result(self) -> Result<()> {
        if self.is_valid {
            Ok(())
        } else {
            Err(EngineError::Validation {
                errors: self.errors,
            })
        }
    }
}

/// Checks structural and type preconditions. Every rule runs; all violations are reported.
pub fn validate(dataset: &RawDataset) -> ValidationOutcome {
    if dataset.is_empty() {
        return ValidationOutcome::from_errors(vec!["dataset is empty".to_string()]);
    }

    let columns = dataset.columns();
    let mut errors = Vec::new();

    if !columns.contains_any(&CORE_FIELDS) {
        let names: Vec<&str> = CORE_FIELDS.iter().map(|f| f.as_str()).collect();
        errors.push(format!(
            "dataset must contain at least one of these columns: {}",
            names.join(", ")
        ));
    }

    if columns.contains(Field::Amount) {
        if !all_non_null(dataset, Field::Amount, Cell::is_number) {
            errors.push("column 'amount' must be numeric".to_string());
        } else if dataset.column(Field::Amount).all(Cell::is_null) {
            errors.push("column 'amount' is entirely null".to_string());
        }
    }

    if columns.contains(Field::Timestamp)
        && !all_non_null(dataset, Field::Timestamp, Cell::is_datetime)
    {
        errors.push("column 'timestamp' must be a date-time".to_string());
    }

    for field in [Field::EntityName, Field::Category] {
        if !columns.contains(field) {
            continue;
        }
        let nulls = dataset.column(field).filter(|c| c.is_null()).count();
        let null_pct = nulls as f64 / dataset.len() as f64 * 100.0;
        if null_pct > MAX_NULL_PCT {
            errors.push(format!("too many null values in '{field}': {null_pct:.1}%"));
        }
    }

    ValidationOutcome::from_errors(errors)
}

fn all_non_null(dataset: &RawDataset, field: Field, typed: fn(&Cell) -> bool) -> bool {
    dataset
        .column(field)
        .filter(|c| !c.is_null())
        .all(typed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dataset::{RawRecord, RawTable};
    use crate::domain::schema::Columns;
    use serde_json::json;

    fn raw(rows: Vec<serde_json::Value>) -> RawDataset {
        RawDataset::from_json_rows(&rows).unwrap()
    }

    #[test]
    fn empty_dataset_reports_a_single_error() {
        let outcome = validate(&RawDataset::default());
        assert!(!outcome.is_valid);
        assert_eq!(outcome.errors, vec!["dataset is empty".to_string()]);
    }

    #[test]
    fn accepts_well_typed_sales() {
        let ds = raw(vec![
            json!({"entity_name": "Tea", "amount": 3.5, "timestamp": "2024-01-01 10:00:00"}),
            json!({"entity_name": "Milk", "amount": 0, "timestamp": "2024-01-02 10:00:00"}),
        ])
        .coerce_types();
        let outcome = validate(&ds);
        assert!(outcome.is_valid, "{:?}", outcome.errors);
        assert!(outcome.into_result().is_ok());
    }

    #[test]
    fn requires_a_core_column() {
        let ds = raw(vec![json!({"id": 1, "customer_id": "C1"})]);
        let outcome = validate(&ds);
        assert!(!outcome.is_valid);
        assert!(outcome.errors[0].contains("entity_name, category, amount"));
    }

    #[test]
    fn amount_that_fails_coercion_everywhere_is_entirely_null() {
        let ds = raw(vec![
            json!({"entity_name": "Tea", "amount": "abc"}),
            json!({"entity_name": "Milk", "amount": "n/a"}),
        ])
        .coerce_types();
        let outcome = validate(&ds);
        assert!(!outcome.is_valid);
        assert_eq!(outcome.errors, vec!["column 'amount' is entirely null".to_string()]);
    }

    #[test]
    fn uncoerced_text_amount_is_not_numeric() {
        let ds = raw(vec![json!({"category": "Drinks", "amount": "abc"})]);
        let outcome = validate(&ds);
        assert_eq!(outcome.errors, vec!["column 'amount' must be numeric".to_string()]);
    }

    #[test]
    fn collects_every_violation() {
        let table = RawTable {
            headers: vec!["timestamp".into(), "category".into(), "amount".into()],
            rows: (0..6)
                .map(|i| {
                    vec![
                        Cell::Text("not a date".into()),
                        if i == 0 { Cell::Text("Drinks".into()) } else { Cell::Null },
                        Cell::Number(1.0),
                    ]
                })
                .collect(),
        };
        let outcome = validate(&RawDataset::from_table(table).unwrap());
        assert!(!outcome.is_valid);
        assert_eq!(
            outcome.errors,
            vec![
                "column 'timestamp' must be a date-time".to_string(),
                "too many null values in 'category': 83.3%".to_string(),
            ]
        );
    }

    #[test]
    fn null_ratio_above_eighty_percent_fails() {
        let records: Vec<RawRecord> = (0..10)
            .map(|i| {
                let name = if i < 1 { Cell::Text("Tea".into()) } else { Cell::Null };
                RawRecord::default()
                    .with(Field::EntityName, name)
                    .with(Field::Amount, Cell::Number(1.0))
            })
            .collect();
        let ds = RawDataset::new(
            Columns::empty().with(Field::EntityName).with(Field::Amount),
            records,
        );
        let outcome = validate(&ds);
        assert_eq!(
            outcome.errors,
            vec!["too many null values in 'entity_name': 90.0%".to_string()]
        );
        let err = outcome.into_result().unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }
}
