use std::fmt::Write;
use ventas_core::domain::report::{AnalysisReport, AnomalyKind};
use ventas_core::domain::schema::format_number;

const MAX_ANOMALIES_SHOWN: usize = 5;

/// Human-readable run summary for the terminal.
pub fn render(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let s = &report.summary;
    let k = &report.kpis;

    let _ = writeln!(out, "== Sales analysis ==");
    let _ = writeln!(out, "rows: {}", s.basic_info.row_count);
    if let Some(period) = &s.basic_info.period {
        let _ = writeln!(out, "period: {period}");
    }
    let _ = writeln!(
        out,
        "total sales: {}  average ticket: {}  median: {}",
        money(k.total_sales),
        money(k.average_ticket),
        money(k.median_sale)
    );
    let _ = writeln!(
        out,
        "transactions: {} ({} with a sale, {:.1}%)",
        k.total_transactions, k.successful_transactions, k.conversion_rate
    );
    if k.unique_customers > 0 {
        let _ = writeln!(
            out,
            "customers: {}  transactions per customer: {:.2}",
            k.unique_customers, k.transactions_per_customer
        );
    }

    if let Some(top) = s.top_entities.as_ref().filter(|t| !t.is_empty()) {
        let _ = writeln!(out, "\n-- top entities --");
        for e in top {
            let _ = writeln!(out, "{:>2}. {:<30} {}", e.rank, e.entity, money(e.total));
        }
    }

    if let Some(alerts) = s.alerts.as_ref().filter(|a| a.critical_count > 0) {
        let _ = writeln!(
            out,
            "\n!! {} items expire within 7 days: {}",
            alerts.critical_count,
            alerts.entities.join(", ")
        );
    }

    if let Some(trend) = &report.trend {
        let _ = writeln!(
            out,
            "\n-- {} trend: {} ({:+.1}%) --",
            trend.granularity,
            trend.direction.as_str(),
            trend.growth_pct
        );
        for p in &trend.periods {
            let _ = writeln!(out, "{:<23} {}", p.period, money(p.total));
        }
    }

    if !report.anomalies.is_empty() {
        let _ = writeln!(out, "\n-- anomalies: {} --", report.anomalies.len());
        for a in report.anomalies.iter().take(MAX_ANOMALIES_SHOWN) {
            let kind = match a.kind {
                AnomalyKind::High => "high",
                AnomalyKind::Low => "low",
            };
            let _ = writeln!(
                out,
                "{kind:<4} {} ({:+.1} sd) {}",
                money(a.value),
                a.deviation,
                a.entity.as_deref().unwrap_or("-")
            );
        }
    }

    if let Some(f) = &report.forecast {
        if let Some(message) = &f.message {
            let _ = writeln!(out, "\n-- forecast: {message} --");
        } else {
            let _ = writeln!(out, "\n-- forecast (confidence {:.0}%) --", f.confidence);
            for (period, value) in f.projected_periods.iter().zip(&f.projections) {
                let _ = writeln!(out, "{period:<8} {}", money(*value));
            }
        }
    }

    out
}

fn money(v: f64) -> String {
    format_number((v * 100.0).round() / 100.0)
}
