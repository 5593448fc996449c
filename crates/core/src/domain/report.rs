//! Output types of an analysis run. All of them are plain data that serialize to nested maps of
//! numbers, strings, and dates.

use crate::analysis::period::Granularity;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub basic_info: BasicInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sales_metrics: Option<SalesMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_entities: Option<Vec<RankedEntity>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_breakdown: Option<CategoryBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerts: Option<InventoryAlerts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<MonthlyTrend>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasicInfo {
    pub row_count: usize,
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesMetrics {
    pub total: f64,
    pub average: f64,
    /// Records with a strictly positive amount.
    pub transactions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntity {
    pub rank: usize,
    pub entity: String,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryBasis {
    /// Summed `amount` per category.
    Amount,
    /// Occurrence count per category (no `amount` column).
    Count,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryBreakdown {
    pub basis: CategoryBasis,
    pub entries: Vec<CategoryTotal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryAlerts {
    pub critical_count: usize,
    pub entities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTrend {
    pub monthly_totals: Vec<PeriodTotal>,
    pub best_month: String,
    pub worst_month: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodTotal {
    pub period: String,
    pub total: f64,
}

/// Flat indicator set. Every field is zero when the columns it needs are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KpiSet {
    pub total_sales: f64,
    pub average_ticket: f64,
    pub median_sale: f64,
    pub total_transactions: usize,
    pub successful_transactions: usize,
    pub unique_entities: usize,
    pub unique_customers: usize,
    pub transactions_per_customer: f64,
    /// Share of rows with `amount > 0`, as a percentage. Not a funnel conversion.
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Growing,
    Declining,
    Stable,
}

impl TrendDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            TrendDirection::Growing => "growing",
            TrendDirection::Declining => "declining",
            TrendDirection::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendResult {
    pub granularity: Granularity,
    pub direction: TrendDirection,
    pub growth_pct: f64,
    pub periods: Vec<PeriodTotal>,
    pub best_period: Option<String>,
    pub worst_period: Option<String>,
    pub mean_per_period: f64,
    pub period_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    High,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyRecord {
    pub kind: AnomalyKind,
    pub value: f64,
    /// The bound the value crossed.
    pub bound: f64,
    /// Signed distance from the mean in standard deviations; negative for low anomalies.
    pub deviation: f64,
    pub entity: Option<String>,
    pub timestamp: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    LinearRegression,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResult {
    pub method: ForecastMethod,
    /// Projected monthly totals, chronological.
    pub projections: Vec<f64>,
    /// Month labels matching `projections`.
    pub projected_periods: Vec<String>,
    /// R² as a percentage in [0, 100].
    pub confidence: f64,
    pub residual_std: f64,
    pub direction: TrendDirection,
    pub historical_periods: usize,
    pub horizon: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ForecastResult {
    pub fn is_insufficient(&self) -> bool {
        self.method == ForecastMethod::InsufficientData
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub summary: Summary,
    pub kpis: KpiSet,
    pub trend: Option<TrendResult>,
    pub anomalies: Vec<AnomalyRecord>,
    pub forecast: Option<ForecastResult>,
}

impl AnalysisReport {
    /// The report as a plain JSON tree, the shape renderers and narrators consume.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
