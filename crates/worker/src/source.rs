use anyhow::Result;
use std::path::Path;
use ventas_core::config::Settings;
use ventas_core::ingest::{CsvFileSource, DataSource, HttpJsonSource, JsonFileSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Csv,
    Json,
    Http,
}

fn source_kind(input: Option<&Path>) -> Result<SourceKind> {
    let Some(path) = input else {
        return Ok(SourceKind::Http);
    };
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("csv") => Ok(SourceKind::Csv),
        Some("json") => Ok(SourceKind::Json),
        _ => anyhow::bail!(
            "unsupported input file {} (expected .csv or .json)",
            path.display()
        ),
    }
}

/// A file source for `--input`, otherwise the configured HTTP data source.
pub fn build_source(input: Option<&Path>, settings: &Settings) -> Result<Box<dyn DataSource>> {
    Ok(match (source_kind(input)?, input) {
        (SourceKind::Csv, Some(path)) => Box::new(CsvFileSource::new(path)),
        (SourceKind::Json, Some(path)) => Box::new(JsonFileSource::new(path)),
        _ => Box::new(HttpJsonSource::from_settings(settings)?),
    })
}
