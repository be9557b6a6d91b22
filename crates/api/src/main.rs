use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use screener_core::domain::snapshot::RecommendationSnapshot;
use screener_core::domain::ticker::{parse_selection, Ticker};
use screener_core::format::{summarize, DisplayRow, ScreenSummary};
use screener_core::ingest::http::HttpOptions;
use screener_core::ingest::provider::{build_adapters, ProviderWarning, SourceAdapter};
use screener_core::screen::aggregate::{aggregate, AggregatedRow};
use screener_core::screen::runner::{screen, Cancellation};
use screener_core::screen::{validate_max_pe, ScreenOptions, DEFAULT_MAX_PE};
use screener_core::storage::load_snapshot;

// One request may not fan out into more provider calls than a full CLI run.
const MAX_TICKERS_PER_REQUEST: usize = 50;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = screener_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let adapters: Vec<Box<dyn SourceAdapter>> =
        match build_adapters(&settings, &HttpOptions::from_env()) {
            Ok(adapters) => adapters,
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "source setup failed; starting API in degraded mode");
                Vec::new()
            }
        };

    let state = AppState {
        adapters: Arc::from(adapters),
        snapshot_path: PathBuf::from(settings.snapshot_path()),
        screen_opts: ScreenOptions::from_env(),
    };

    let app = router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET]),
        )
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

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/screen", get(get_screen))
        .route("/tickers/:ticker", get(get_ticker))
        .route("/snapshot", get(get_snapshot))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    adapters: Arc<[Box<dyn SourceAdapter>]>,
    snapshot_path: PathBuf,
    screen_opts: ScreenOptions,
}

#[derive(Debug, Deserialize)]
struct ScreenParams {
    tickers: String,
    max_pe: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ApiScreen {
    max_pe: f64,
    rows: Vec<DisplayRow>,
    summary: ScreenSummary,
    dropped: Vec<Ticker>,
    warnings: Vec<ProviderWarning>,
}

async fn get_screen(
    State(state): State<AppState>,
    Query(params): Query<ScreenParams>,
) -> Result<Json<ApiScreen>, StatusCode> {
    if state.adapters.is_empty() {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let max_pe = validate_max_pe(params.max_pe.unwrap_or(DEFAULT_MAX_PE))
        .map_err(|_| StatusCode::BAD_REQUEST)?;
    let tickers = parse_selection(&params.tickers).map_err(|_| StatusCode::BAD_REQUEST)?;
    if tickers.is_empty() || tickers.len() > MAX_TICKERS_PER_REQUEST {
        return Err(StatusCode::BAD_REQUEST);
    }

    let report = screen(
        &tickers,
        state.adapters.clone(),
        &state.screen_opts,
        &Cancellation::new(),
    )
    .await
    .map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let rows = report.filtered(max_pe);
    Ok(Json(ApiScreen {
        max_pe,
        summary: summarize(&rows),
        rows,
        dropped: report.dropped,
        warnings: report.warnings,
    }))
}

#[derive(Debug, Serialize)]
struct ApiTicker {
    display: DisplayRow,
    row: AggregatedRow,
    warnings: Vec<ProviderWarning>,
}

async fn get_ticker(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<ApiTicker>, StatusCode> {
    if state.adapters.is_empty() {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let ticker = Ticker::parse(&ticker).map_err(|_| StatusCode::BAD_REQUEST)?;
    let agg = aggregate(&ticker, &state.adapters).await;
    let row = agg.row.ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(ApiTicker {
        display: DisplayRow::from_row(&row),
        row,
        warnings: agg.warnings,
    }))
}

async fn get_snapshot(
    State(state): State<AppState>,
) -> Result<Json<RecommendationSnapshot>, StatusCode> {
    let snapshot = load_snapshot(&state.snapshot_path)
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(snapshot))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &screener_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
