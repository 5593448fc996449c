use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ventas_core::analysis::{self, forecast, period::Granularity, Analysis, AnalysisOptions};
use ventas_core::domain::dataset::Dataset;
use ventas_core::domain::report::{ForecastResult, KpiSet, TrendResult};
use ventas_core::export::{self, ExportFormat};
use ventas_core::ingest::file::parse_json_dataset;
use ventas_core::EngineError;

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

    let options = match AnalysisOptions::from_settings(&settings) {
        Ok(options) => options,
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "invalid analysis settings; using defaults");
            AnalysisOptions::default()
        }
    };

    let state = AppState { options };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/analyze", post(post_analyze))
        .route("/kpis", post(post_kpis))
        .route("/trend", post(post_trend))
        .route("/forecast", post(post_forecast))
        .route("/export", post(post_export))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    options: AnalysisOptions,
}

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Engine(EngineError),
    Internal(anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
}

impl ApiError {
    fn status_and_body(&self) -> (StatusCode, ErrorBody) {
        match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    kind: "bad_request",
                    message: message.clone(),
                    errors: Vec::new(),
                },
            ),
            ApiError::Engine(err) => {
                let status = match err {
                    EngineError::Validation { .. } | EngineError::Analysis { .. } => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    EngineError::Processing { .. } => StatusCode::BAD_REQUEST,
                    EngineError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let errors = match err {
                    EngineError::Validation { errors } => errors.clone(),
                    _ => Vec::new(),
                };
                (
                    status,
                    ErrorBody {
                        kind: err.kind(),
                        message: err.to_string(),
                        errors,
                    },
                )
            }
            ApiError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    kind: "internal_error",
                    message: format!("{err:#}"),
                    errors: Vec::new(),
                },
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(err) = &self {
            sentry_anyhow::capture_anyhow(err);
        }
        let (status, body) = self.status_and_body();
        if status.is_server_error() {
            tracing::error!(%status, message = %body.message, "request failed");
        } else {
            tracing::info!(%status, kind = body.kind, "request rejected");
        }
        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

/// Runs CPU-bound analysis off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(anyhow::Error::new(e).context("analysis task failed")))?
}

/// Parses, validates and cleans a request body.
fn prepare(body: &Value) -> Result<Dataset, ApiError> {
    let raw = parse_json_dataset(body).map_err(|e| ApiError::BadRequest(format!("{e:#}")))?;
    analysis::validate(&raw).into_result()?;
    Ok(analysis::clean(&raw))
}

fn run_analysis(body: &Value, options: &AnalysisOptions) -> Result<Analysis, ApiError> {
    let raw = parse_json_dataset(body).map_err(|e| ApiError::BadRequest(format!("{e:#}")))?;
    Ok(analysis::analyze(&raw, options)?)
}

async fn post_analyze(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let options = state.options;
    let report = blocking(move || run_analysis(&body, &options)).await?.report;
    Ok(Json(report.to_value()))
}

async fn post_kpis(Json(body): Json<Value>) -> Result<Json<KpiSet>, ApiError> {
    let kpis = blocking(move || prepare(&body).map(|ds| analysis::compute_kpis(&ds))).await?;
    Ok(Json(kpis))
}

#[derive(Debug, Deserialize)]
struct TrendQuery {
    granularity: Option<String>,
}

async fn post_trend(
    State(state): State<AppState>,
    Query(q): Query<TrendQuery>,
    Json(body): Json<Value>,
) -> Result<Json<TrendResult>, ApiError> {
    let granularity = match q.granularity.as_deref() {
        Some(g) => g.parse::<Granularity>()?,
        None => state.options.granularity,
    };
    let trend = blocking(move || {
        let ds = prepare(&body)?;
        Ok(analysis::analyze_trend(&ds, granularity)?)
    })
    .await?;
    Ok(Json(trend))
}

#[derive(Debug, Deserialize)]
struct ForecastQuery {
    horizon: Option<usize>,
}

fn resolve_horizon(requested: Option<usize>, options: &AnalysisOptions) -> Result<usize, ApiError> {
    let horizon = requested.unwrap_or(options.forecast_horizon);
    forecast::check_horizon(horizon).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(horizon)
}

async fn post_forecast(
    State(state): State<AppState>,
    Query(q): Query<ForecastQuery>,
    Json(body): Json<Value>,
) -> Result<Json<ForecastResult>, ApiError> {
    let horizon = resolve_horizon(q.horizon, &state.options)?;
    let forecast = blocking(move || {
        let ds = prepare(&body)?;
        Ok(analysis::forecast(&ds, horizon)?)
    })
    .await?;
    Ok(Json(forecast))
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    format: String,
}

fn parse_format(name: &str) -> Result<ExportFormat, ApiError> {
    name.parse::<ExportFormat>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

async fn post_export(
    State(state): State<AppState>,
    Query(q): Query<ExportQuery>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let format = parse_format(&q.format)?;
    let options = state.options;
    let bytes = blocking(move || {
        let analysis = run_analysis(&body, &options)?;
        export::export_bytes(&analysis, format).map_err(|e| ApiError::Engine(e.into()))
    })
    .await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        export::default_file_name(format, chrono::Local::now().naive_local())
    );
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
