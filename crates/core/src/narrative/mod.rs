pub mod anthropic;
pub mod error;
pub mod json;

use crate::domain::narrative::Narrative;
use crate::domain::report::{AnalysisReport, ForecastMethod};
use crate::domain::schema::format_number;

pub use anthropic::AnthropicNarrator;

#[derive(Debug, Clone)]
pub enum Provider {
    Anthropic,
}

/// Turns a finished report into reader-facing commentary.
#[async_trait::async_trait]
pub trait NarrativeGenerator: Send + Sync {
    fn provider(&self) -> Provider;

    async fn generate(&self, report: &AnalysisReport) -> anyhow::Result<Narrative>;
}

/// The facts a narrator is given: headline figures, not the whole report.
pub fn report_digest(report: &AnalysisReport) -> String {
    let mut lines = Vec::new();
    let k = &report.kpis;

    lines.push(format!("Total sales: {}", money(k.total_sales)));
    lines.push(format!("Average ticket: {}", money(k.average_ticket)));
    lines.push(format!("Transactions: {}", k.total_transactions));
    if let Some(period) = &report.summary.basic_info.period {
        lines.push(format!("Period: {period}"));
    }

    if let Some(top) = &report.summary.top_entities {
        let names: Vec<String> = top
            .iter()
            .take(3)
            .map(|e| format!("{} ({})", e.entity, money(e.total)))
            .collect();
        if !names.is_empty() {
            lines.push(format!("Top entities: {}", names.join(", ")));
        }
    }

    if let Some(trend) = &report.trend {
        lines.push(format!(
            "Trend ({}): {} ({:+.1}%)",
            trend.granularity,
            trend.direction.as_str(),
            trend.growth_pct
        ));
    }

    match &report.forecast {
        Some(f) if f.method == ForecastMethod::LinearRegression => {
            let next = f
                .projected_periods
                .iter()
                .zip(&f.projections)
                .map(|(p, v)| format!("{p}: {}", money(*v)))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!(
                "Forecast: {next} (confidence {:.0}%)",
                f.confidence
            ));
        }
        Some(_) => lines.push("Forecast: not enough history".to_string()),
        None => {}
    }

    lines.push(format!("Anomalous transactions: {}", report.anomalies.len()));
    lines.join("\n")
}

fn money(v: f64) -> String {
    format_number((v * 100.0).round() / 100.0)
}
