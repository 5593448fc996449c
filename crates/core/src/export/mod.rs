pub mod xlsx;

use crate::analysis::Analysis;
use crate::domain::dataset::Dataset;
use crate::domain::report::{AnalysisReport, CategoryBasis};
use crate::domain::schema::{format_number, Field};
use crate::error::ExportError;
use chrono::NaiveDateTime;
use std::fmt;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use xlsx::{Sheet, XlsxValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Excel,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "excel",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "xlsx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Excel => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "excel" | "xlsx" => Ok(ExportFormat::Excel),
            _ => Err(ExportError::UnsupportedFormat(s.trim().to_string())),
        }
    }
}

/// `analysis_results_YYYYMMDD_HHMMSS.<ext>`
pub fn default_file_name(format: ExportFormat, now: NaiveDateTime) -> String {
    format!(
        "analysis_results_{}.{}",
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Serializes a finished analysis in the given format.
pub fn export_bytes(analysis: &Analysis, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_vec_pretty(&analysis.report)?),
        ExportFormat::Csv => {
            let mut buf = Vec::new();
            write_csv(&mut buf, &analysis.dataset)?;
            Ok(buf)
        }
        ExportFormat::Excel => {
            let sheets = [data_sheet(&analysis.dataset), summary_sheet(&analysis.report)];
            Ok(xlsx::write_workbook(Cursor::new(Vec::new()), &sheets)?.into_inner())
        }
    }
}

/// Writes the export under `dir` (created when missing) and returns the file path.
pub fn export_to_path(
    analysis: &Analysis,
    format: ExportFormat,
    dir: &Path,
    file_name: Option<&str>,
) -> Result<PathBuf, ExportError> {
    let bytes = export_bytes(analysis, format)?;
    std::fs::create_dir_all(dir)?;
    let name = file_name
        .map(str::to_string)
        .unwrap_or_else(|| default_file_name(format, chrono::Local::now().naive_local()));
    let path = dir.join(name);
    std::fs::write(&path, bytes)?;
    tracing::info!(path = %path.display(), format = %format, "analysis exported");
    Ok(path)
}

/// The cleaned dataset, header row first, present columns in canonical order.
pub fn write_csv<W: Write>(writer: W, dataset: &Dataset) -> Result<(), ExportError> {
    let columns: Vec<Field> = dataset.columns().iter().collect();
    let mut w = csv::Writer::from_writer(writer);
    w.write_record(columns.iter().map(|f| f.as_str()))?;
    for record in dataset.records() {
        w.write_record(
            columns
                .iter()
                .map(|f| record.value_text(*f).unwrap_or_default()),
        )?;
    }
    w.flush()?;
    Ok(())
}

fn data_sheet(dataset: &Dataset) -> Sheet {
    let columns: Vec<Field> = dataset.columns().iter().collect();
    let mut sheet = Sheet::new("Data");
    sheet.push_row(
        columns
            .iter()
            .map(|f| XlsxValue::Text(f.as_str().to_string()))
            .collect(),
    );
    for record in dataset.records() {
        let row = columns
            .iter()
            .map(|f| match f {
                Field::Amount => record.amount.map(XlsxValue::Number),
                Field::Quantity => record.quantity.map(|q| XlsxValue::Number(q as f64)),
                Field::DaysUntilExpiry => {
                    record.days_until_expiry.map(|d| XlsxValue::Number(d as f64))
                }
                _ => record.value_text(*f).map(XlsxValue::Text),
            })
            .map(|v| v.unwrap_or(XlsxValue::Empty))
            .collect();
        sheet.push_row(row);
    }
    sheet
}

fn summary_sheet(report: &AnalysisReport) -> Sheet {
    let mut sheet = Sheet::new("Summary");
    sheet.push_row(vec![
        XlsxValue::Text("metric".into()),
        XlsxValue::Text("value".into()),
    ]);
    for (metric, value) in summary_rows(report) {
        sheet.push_row(vec![XlsxValue::Text(metric), value]);
    }
    sheet
}

/// The report flattened to metric/value pairs.
pub fn summary_rows(report: &AnalysisReport) -> Vec<(String, XlsxValue)> {
    type Rows = Vec<(String, XlsxValue)>;
    fn num(rows: &mut Rows, metric: &str, v: f64) {
        rows.push((metric.to_string(), XlsxValue::Number(v)));
    }
    fn text(rows: &mut Rows, metric: &str, v: String) {
        rows.push((metric.to_string(), XlsxValue::Text(v)));
    }

    let mut rows = Rows::new();

    let s = &report.summary;
    num(&mut rows, "row_count", s.basic_info.row_count as f64);
    text(&mut rows, "columns", s.basic_info.columns.join(", "));
    if let Some(period) = &s.basic_info.period {
        text(&mut rows, "period", period.clone());
    }

    let k = &report.kpis;
    num(&mut rows, "total_sales", k.total_sales);
    num(&mut rows, "average_ticket", k.average_ticket);
    num(&mut rows, "median_sale", k.median_sale);
    num(&mut rows, "total_transactions", k.total_transactions as f64);
    num(&mut rows, "successful_transactions", k.successful_transactions as f64);
    num(&mut rows, "unique_entities", k.unique_entities as f64);
    num(&mut rows, "unique_customers", k.unique_customers as f64);
    num(&mut rows, "transactions_per_customer", k.transactions_per_customer);
    num(&mut rows, "conversion_rate", k.conversion_rate);

    for e in s.top_entities.iter().flatten() {
        num(&mut rows, &format!("top_{}: {}", e.rank, e.entity), e.total);
    }
    if let Some(breakdown) = &s.category_breakdown {
        let prefix = match breakdown.basis {
            CategoryBasis::Amount => "category_total",
            CategoryBasis::Count => "category_count",
        };
        for c in &breakdown.entries {
            num(&mut rows, &format!("{prefix}: {}", c.category), c.value);
        }
    }
    if let Some(alerts) = &s.alerts {
        num(&mut rows, "expiring_items", alerts.critical_count as f64);
    }

    if let Some(trend) = &report.trend {
        text(&mut rows, "trend_direction", trend.direction.as_str().to_string());
        num(&mut rows, "trend_growth_pct", trend.growth_pct);
        if let Some(best) = &trend.best_period {
            text(&mut rows, "best_period", best.clone());
        }
        if let Some(worst) = &trend.worst_period {
            text(&mut rows, "worst_period", worst.clone());
        }
    }

    num(&mut rows, "anomalies", report.anomalies.len() as f64);

    if let Some(f) = &report.forecast {
        if f.is_insufficient() {
            text(&mut rows, "forecast", "insufficient data".to_string());
        } else {
            for (period, value) in f.projected_periods.iter().zip(&f.projections) {
                num(&mut rows, &format!("forecast: {period}"), *value);
            }
            num(&mut rows, "forecast_confidence", f.confidence);
        }
    }
    rows
}

/// Display form of a summary value, for text renderers.
pub fn value_text(value: &XlsxValue) -> String {
    match value {
        XlsxValue::Text(s) => s.clone(),
        XlsxValue::Number(n) => format_number(*n),
        XlsxValue::Empty => String::new(),
    }
}
