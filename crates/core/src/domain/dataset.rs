use crate::domain::schema::{format_number, Cell, Columns, Field, DISPLAY_TIMESTAMP_FORMAT};
use crate::error::{EngineError, Result};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// A header row plus untyped rows, as a tabular source hands them over.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// One uncleaned row; every recognized field has a cell (`Cell::Null` when absent).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    cells: [Cell; Field::COUNT],
}

impl RawRecord {
    pub fn get(&self, field: Field) -> &Cell {
        &self.cells[field.index()]
    }

    pub fn set(&mut self, field: Field, cell: Cell) {
        self.cells[field.index()] = cell;
    }

    pub fn with(mut self, field: Field, cell: Cell) -> Self {
        self.set(field, cell);
        self
    }

    /// True when every attribute is absent.
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(Cell::is_null)
    }
}

/// The dataset as ingested: a fixed column set and raw cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDataset {
    columns: Columns,
    records: Vec<RawRecord>,
}

impl RawDataset {
    /// Cells of fields outside `columns` are cleared so every record exposes the same schema.
    pub fn new(columns: Columns, records: Vec<RawRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|mut r| {
                for field in Field::ALL {
                    if !columns.contains(field) {
                        r.set(field, Cell::Null);
                    }
                }
                r
            })
            .collect();
        Self { columns, records }
    }

    pub fn from_table(table: RawTable) -> Result<Self> {
        let mut positions: Vec<(usize, Field)> = Vec::new();
        let mut columns = Columns::empty();
        for (idx, header) in table.headers.iter().enumerate() {
            match Field::from_header(header) {
                Some(field) if columns.contains(field) => {
                    return Err(EngineError::processing(format!(
                        "header '{header}' duplicates column '{field}'"
                    )));
                }
                Some(field) => {
                    columns.insert(field);
                    positions.push((idx, field));
                }
                None => tracing::debug!(header = %header, "ignoring unrecognized column"),
            }
        }

        let width = table.headers.len();
        let mut records = Vec::with_capacity(table.rows.len());
        for (row_idx, row) in table.rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(EngineError::processing(format!(
                    "row {} has {} cells, expected {width}",
                    row_idx + 1,
                    row.len()
                )));
            }
            let mut record = RawRecord::default();
            let mut row = row;
            for (idx, field) in &positions {
                record.set(*field, std::mem::take(&mut row[*idx]));
            }
            records.push(record);
        }

        Ok(Self { columns, records })
    }

    /// Row objects with sparse keys; the column set is the union of recognized keys.
    pub fn from_json_rows(rows: &[serde_json::Value]) -> Result<Self> {
        let mut columns = Columns::empty();
        let mut records = Vec::with_capacity(rows.len());
        for (row_idx, row) in rows.iter().enumerate() {
            let obj = row.as_object().ok_or_else(|| {
                EngineError::processing(format!("row {} is not a JSON object", row_idx + 1))
            })?;
            let mut record = RawRecord::default();
            for (key, value) in obj {
                let Some(field) = Field::from_header(key) else {
                    continue;
                };
                columns.insert(field);
                record.set(field, Cell::from_json(value));
            }
            records.push(record);
        }
        Ok(Self { columns, records })
    }

    /// Source-side type normalization: numeric columns and `timestamp` are coerced, and values
    /// that fail coercion become missing.
    pub fn coerce_types(mut self) -> Self {
        for record in &mut self.records {
            for field in [Field::Amount, Field::Quantity, Field::DaysUntilExpiry] {
                let cell = record.get(field);
                if !cell.is_null() && !cell.is_number() {
                    let coerced = cell.as_number().map(Cell::number).unwrap_or(Cell::Null);
                    record.set(field, coerced);
                }
            }
            let ts = record.get(Field::Timestamp);
            if !ts.is_null() && !ts.is_datetime() {
                let coerced = ts.as_timestamp().map(Cell::DateTime).unwrap_or(Cell::Null);
                record.set(Field::Timestamp, coerced);
            }
        }
        self
    }

    pub fn columns(&self) -> Columns {
        self.columns
    }

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column(&self, field: Field) -> impl Iterator<Item = &Cell> + '_ {
        self.records.iter().map(move |r| r.get(field))
    }
}

/// A cleaned transaction row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub id: Option<String>,
    pub timestamp: Option<NaiveDateTime>,
    pub entity_name: Option<String>,
    pub category: Option<String>,
    pub amount: Option<f64>,
    pub quantity: Option<i64>,
    pub customer_id: Option<String>,
    pub days_until_expiry: Option<i64>,
}

impl Record {
    pub fn cell(&self, field: Field) -> Cell {
        match field {
            Field::Id => text_cell(&self.id),
            Field::Timestamp => self.timestamp.map(Cell::DateTime).unwrap_or_default(),
            Field::EntityName => text_cell(&self.entity_name),
            Field::Category => text_cell(&self.category),
            Field::Amount => self.amount.map(Cell::number).unwrap_or_default(),
            Field::Quantity => self.quantity.map(|q| Cell::Number(q as f64)).unwrap_or_default(),
            Field::CustomerId => text_cell(&self.customer_id),
            Field::DaysUntilExpiry => self
                .days_until_expiry
                .map(|d| Cell::Number(d as f64))
                .unwrap_or_default(),
        }
    }

    /// Display text of a field, as written by the tabular exports.
    pub fn value_text(&self, field: Field) -> Option<String> {
        match field {
            Field::Timestamp => self
                .timestamp
                .map(|ts| ts.format(DISPLAY_TIMESTAMP_FORMAT).to_string()),
            Field::Amount => self.amount.map(format_number),
            _ => self.cell(field).as_text(),
        }
    }
}

fn text_cell(v: &Option<String>) -> Cell {
    v.as_ref().map(|s| Cell::Text(s.clone())).unwrap_or_default()
}

/// The canonical dataset every analytical component reads. Never mutated in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Columns,
    records: Vec<Record>,
}

impl Dataset {
    pub fn new(columns: Columns, records: Vec<Record>) -> Self {
        Self { columns, records }
    }

    pub fn columns(&self) -> Columns {
        self.columns
    }

    pub fn has(&self, field: Field) -> bool {
        self.columns.contains(field)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Amounts of the records that carry one, in dataset order.
    pub fn amounts(&self) -> Vec<f64> {
        self.records.iter().filter_map(|r| r.amount).collect()
    }

    /// Back to raw cells, e.g. to feed a cleaned dataset through the cleaner again.
    pub fn to_raw(&self) -> RawDataset {
        let records = self
            .records
            .iter()
            .map(|r| {
                let mut raw = RawRecord::default();
                for field in self.columns.iter() {
                    raw.set(field, r.cell(field));
                }
                raw
            })
            .collect();
        RawDataset::new(self.columns, records)
    }

    /// Row maps keyed by column name, for plain-data consumers.
    pub fn to_rows(&self) -> Vec<BTreeMap<&'static str, String>> {
        self.records
            .iter()
            .map(|r| {
                self.columns
                    .iter()
                    .filter_map(|f| r.value_text(f).map(|v| (f.as_str(), v)))
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_table_maps_known_headers_and_ignores_others() {
        let table = RawTable {
            headers: vec!["nombre".into(), "margin".into(), "venta_total".into()],
            rows: vec![vec![
                Cell::Text("Tea".into()),
                Cell::Number(0.3),
                Cell::Number(12.0),
            ]],
        };
        let ds = RawDataset::from_table(table).unwrap();
        assert_eq!(ds.columns().names(), vec!["entity_name", "amount"]);
        assert_eq!(ds.records()[0].get(Field::Amount), &Cell::Number(12.0));
        assert_eq!(ds.records()[0].get(Field::EntityName), &Cell::Text("Tea".into()));
    }

    #[test]
    fn from_table_rejects_ragged_rows() {
        let table = RawTable {
            headers: vec!["amount".into(), "category".into()],
            rows: vec![vec![Cell::Number(1.0)]],
        };
        let err = RawDataset::from_table(table).unwrap_err();
        assert_eq!(err.kind(), "processing_error");
    }

    #[test]
    fn from_table_rejects_duplicate_fields() {
        let table = RawTable {
            headers: vec!["amount".into(), "venta_total".into()],
            rows: vec![],
        };
        assert!(RawDataset::from_table(table).is_err());
    }

    #[test]
    fn from_json_rows_unions_sparse_keys() {
        let rows = vec![
            json!({"entity_name": "Tea", "amount": 3}),
            json!({"category": "Drinks", "unknown": true}),
        ];
        let ds = RawDataset::from_json_rows(&rows).unwrap();
        assert_eq!(ds.columns().names(), vec!["entity_name", "category", "amount"]);
        assert!(ds.records()[1].get(Field::Amount).is_null());
    }

    #[test]
    fn from_json_rows_rejects_non_objects() {
        assert!(RawDataset::from_json_rows(&[json!([1, 2])]).is_err());
    }

    #[test]
    fn coerce_types_nulls_unparseable_values() {
        let rows = vec![
            json!({"amount": "12.5", "timestamp": "2024-01-03 10:00:00"}),
            json!({"amount": "n/a", "timestamp": "yesterday"}),
        ];
        let ds = RawDataset::from_json_rows(&rows).unwrap().coerce_types();
        assert_eq!(ds.records()[0].get(Field::Amount), &Cell::Number(12.5));
        assert!(ds.records()[0].get(Field::Timestamp).is_datetime());
        assert!(ds.records()[1].get(Field::Amount).is_null());
        assert!(ds.records()[1].get(Field::Timestamp).is_null());
    }

    #[test]
    fn to_raw_keeps_schema() {
        let ds = Dataset::new(
            Columns::empty().with(Field::Amount).with(Field::CustomerId),
            vec![Record {
                amount: Some(4.0),
                customer_id: Some("C1".into()),
                ..Default::default()
            }],
        );
        let raw = ds.to_raw();
        assert_eq!(raw.columns(), ds.columns());
        assert_eq!(raw.records()[0].get(Field::Amount), &Cell::Number(4.0));
        assert_eq!(ds.to_rows()[0].get("customer_id").map(String::as_str), Some("C1"));
    }
}
