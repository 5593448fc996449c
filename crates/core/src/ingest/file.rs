use crate::domain::dataset::{RawDataset, RawTable};
use crate::domain::schema::{Cell, Field};
use crate::ingest::provider::DataSource;
use anyhow::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Reads a headed CSV into an untyped table. Cells are trimmed. Numbers and timestamps are
/// recognized in typed columns only; every other column stays text.
pub fn read_csv<R: Read>(reader: R) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    // Spreadsheet exports often prefix the first header with a BOM.
    let headers: Vec<String> = reader
        .headers()
        .context("failed to read CSV headers")?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let typed: Vec<bool> = headers
        .iter()
        .map(|h| Field::from_header(h).is_some_and(Field::is_typed))
        .collect();

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV parse error at line {}", idx + 2))?;
        rows.push(
            record
                .iter()
                .enumerate()
                .map(|(col, raw)| {
                    if typed.get(col).copied().unwrap_or(false) {
                        Cell::infer(raw)
                    } else {
                        Cell::text(raw)
                    }
                })
                .collect(),
        );
    }

    Ok(RawTable { headers, rows })
}

pub fn parse_csv_dataset(bytes: &[u8]) -> Result<RawDataset> {
    let table = read_csv(bytes)?;
    Ok(RawDataset::from_table(table)?.coerce_types())
}

/// Accepts a JSON array of row objects, or an object wrapping one under `records`.
pub fn parse_json_dataset(value: &serde_json::Value) -> Result<RawDataset> {
    let rows = match value {
        serde_json::Value::Array(rows) => rows,
        serde_json::Value::Object(obj) => obj
            .get("records")
            .and_then(|v| v.as_array())
            .context("JSON object payload must carry a `records` array")?,
        other => anyhow::bail!("expected a JSON array of rows, got {}", json_kind(other)),
    };
    Ok(RawDataset::from_json_rows(rows)?.coerce_types())
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[derive(Debug, Clone)]
pub struct CsvFileSource {
    path: PathBuf,
}

impl CsvFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl DataSource for CsvFileSource {
    fn source_name(&self) -> &'static str {
        "csv_file"
    }

    async fn fetch(&self) -> Result<RawDataset> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let ds = parse_csv_dataset(&bytes)
            .with_context(|| format!("failed to load CSV {}", self.path.display()))?;
        tracing::info!(path = %self.path.display(), rows = ds.len(), "loaded CSV dataset");
        Ok(ds)
    }
}

#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl DataSource for JsonFileSource {
    fn source_name(&self) -> &'static str {
        "json_file"
    }

    async fn fetch(&self) -> Result<RawDataset> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .with_context(|| format!("{} is not valid JSON", self.path.display()))?;
        let ds = parse_json_dataset(&value)?;
        tracing::info!(path = %self.path.display(), rows = ds.len(), "loaded JSON dataset");
        Ok(ds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{clean, compute_kpis};
    use serde_json::json;

    #[test]
    fn csv_infers_cell_types_and_maps_legacy_headers() {
        let csv = "\u{feff}venta_timestamp,nombre,categoria,venta_total,notes\n\
                   2024-01-05 10:00:00, Tea ,Drinks,12.5,x\n\
                   2024-01-06,Milk,,oops,y\n";
        let ds = parse_csv_dataset(csv.as_bytes()).unwrap();
        assert_eq!(
            ds.columns().names(),
            vec!["timestamp", "entity_name", "category", "amount"]
        );
        let first = &ds.records()[0];
        assert_eq!(first.get(Field::Amount), &Cell::Number(12.5));
        assert_eq!(first.get(Field::EntityName), &Cell::Text("Tea".into()));
        assert!(first.get(Field::Timestamp).is_datetime());

        let second = &ds.records()[1];
        assert!(second.get(Field::Category).is_null());
        assert!(second.get(Field::Amount).is_null());
    }

    #[test]
    fn csv_identifiers_keep_their_text() {
        let csv = "id,customer_id,entity_name,amount\n\
                   007,0012,1e3,5\n\
                   7,12,1000,5\n";
        let raw = parse_csv_dataset(csv.as_bytes()).unwrap();
        let first = &raw.records()[0];
        assert_eq!(first.get(Field::Id), &Cell::Text("007".into()));
        assert_eq!(first.get(Field::CustomerId), &Cell::Text("0012".into()));
        assert_eq!(first.get(Field::EntityName), &Cell::Text("1e3".into()));
        assert_eq!(first.get(Field::Amount), &Cell::Number(5.0));

        let kpis = compute_kpis(&clean(&raw));
        assert_eq!(kpis.unique_customers, 2);
        assert_eq!(kpis.unique_entities, 2);
    }

    #[test]
    fn ragged_csv_rows_are_rejected() {
        let csv = "amount,category\n1,A\n2\n";
        let err = parse_csv_dataset(csv.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("row 2"));
    }

    #[test]
    fn json_accepts_bare_array_or_records_wrapper() {
        let rows = json!([{"amount": 1}, {"amount": "2"}]);
        let ds = parse_json_dataset(&rows).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.records()[1].get(Field::Amount), &Cell::Number(2.0));

        let wrapped = json!({"records": [{"category": "A"}]});
        assert_eq!(parse_json_dataset(&wrapped).unwrap().len(), 1);

        assert!(parse_json_dataset(&json!({"rows": []})).is_err());
        assert!(parse_json_dataset(&json!("nope")).is_err());
    }
}
