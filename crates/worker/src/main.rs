use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use ventas_core::analysis::{forecast, period::Granularity};
use ventas_core::export::{self, ExportFormat};
use ventas_core::narrative::{AnthropicNarrator, NarrativeGenerator};
use ventas_core::{analyze, AnalysisOptions};

mod console;
mod source;

#[derive(Debug, Parser)]
#[command(name = "ventas_worker")]
struct Args {
    /// CSV or JSON file with sales rows. Defaults to the configured DATA_SOURCE_URL.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Trend bucket: daily, weekly or monthly.
    #[arg(long)]
    granularity: Option<String>,

    /// Anomaly threshold in standard deviations.
    #[arg(long)]
    threshold: Option<f64>,

    /// Months to forecast.
    #[arg(long)]
    horizon: Option<usize>,

    /// Export formats (json, csv, excel). Repeatable or comma-separated.
    #[arg(long, value_delimiter = ',')]
    export: Vec<String>,

    /// Export directory. Defaults to EXPORT_DIR, then the current directory.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Also generate LLM commentary for the report.
    #[arg(long)]
    narrative: bool,

    /// Analyze and print, but write no files and call no LLM.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = ventas_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Err(err) = run(args, &settings).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %format!("{err:#}"), "analysis run failed");
        return Err(err);
    }
    Ok(())
}

async fn run(args: Args, settings: &ventas_core::config::Settings) -> anyhow::Result<()> {
    let options = resolve_options(&args, settings)?;
    let formats = args
        .export
        .iter()
        .map(|f| f.parse::<ExportFormat>())
        .collect::<Result<Vec<_>, _>>()?;

    let source = source::build_source(args.input.as_deref(), settings)?;
    let raw = source
        .fetch()
        .await
        .with_context(|| format!("failed to load dataset from {}", source.source_name()))?;
    tracing::info!(
        source = source.source_name(),
        rows = raw.len(),
        columns = ?raw.columns().names(),
        "dataset loaded"
    );

    let analysis = analyze(&raw, &options)?;
    print!("{}", console::render(&analysis.report));

    if args.dry_run {
        tracing::info!(dry_run = true, formats = formats.len(), "skipping export and narrative");
        return Ok(());
    }

    let dir = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(settings.export_dir()));
    for format in formats {
        let path = export::export_to_path(&analysis, format, &dir, None)?;
        println!("exported {format}: {}", path.display());
    }

    if args.narrative {
        let narrator = AnthropicNarrator::from_settings(settings)?;
        match narrator.generate(&analysis.report).await {
            Ok(narrative) => println!("\n{}", narrative.to_text()),
            Err(err) => {
                // Commentary is optional; the analysis itself already succeeded.
                sentry_anyhow::capture_anyhow(&err);
                if let Some(diag) =
                    err.downcast_ref::<ventas_core::narrative::error::NarrativeDiagnosticsError>()
                {
                    tracing::warn!(
                        stage = diag.stage.as_str(),
                        raw_output = diag.output_excerpt().unwrap_or_default(),
                        "narrative diagnostics"
                    );
                }
                tracing::error!(provider = ?narrator.provider(), error = %err, "narrative generation failed");
            }
        }
    }

    Ok(())
}

/// CLI flags win over environment settings, which win over defaults.
fn resolve_options(
    args: &Args,
    settings: &ventas_core::config::Settings,
) -> anyhow::Result<AnalysisOptions> {
    let mut options = AnalysisOptions::from_settings(settings)?;
    if let Some(g) = args.granularity.as_deref() {
        options.granularity = g.parse::<Granularity>()?;
    }
    if let Some(t) = args.threshold {
        anyhow::ensure!(t.is_finite() && t > 0.0, "--threshold must be positive");
        options.anomaly_threshold = t;
    }
    if let Some(h) = args.horizon {
        anyhow::ensure!(
            h <= forecast::MAX_HORIZON,
            "--horizon must be at most {}",
            forecast::MAX_HORIZON
        );
        options.forecast_horizon = h;
    }
    Ok(options)
}

fn init_sentry(settings: &ventas_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_settings() {
        let args = Args::parse_from([
            "ventas_worker",
            "--input",
            "sales.csv",
            "--granularity",
            "semanal",
            "--threshold",
            "3",
            "--export",
            "json,excel",
        ]);
        let settings = ventas_core::config::Settings {
            forecast_horizon: Some(6),
            ..Default::default()
        };
        let options = resolve_options(&args, &settings).unwrap();
        assert_eq!(options.granularity, Granularity::Weekly);
        assert_eq!(options.anomaly_threshold, 3.0);
        assert_eq!(options.forecast_horizon, 6);
        assert_eq!(args.export, vec!["json".to_string(), "excel".to_string()]);
    }

    #[test]
    fn rejects_bad_flags() {
        let args = Args::parse_from(["ventas_worker", "--threshold", "0"]);
        assert!(resolve_options(&args, &Default::default()).is_err());

        let args = Args::parse_from(["ventas_worker", "--granularity", "yearly"]);
        assert!(resolve_options(&args, &Default::default()).is_err());

        let args = Args::parse_from(["ventas_worker", "--horizon", "18446744073709551615"]);
        assert!(resolve_options(&args, &Default::default()).is_err());
    }
}
