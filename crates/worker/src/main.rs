use anyhow::Context;
use clap::Parser;
use screener_core::config::Settings;
use screener_core::domain::snapshot::{detect_changes, RecommendationSnapshot};
use screener_core::domain::ticker::Ticker;
use screener_core::format::summarize;
use screener_core::ingest::http::HttpOptions;
use screener_core::ingest::provider::build_adapters;
use screener_core::ingest::yahoo::YahooAdapter;
use screener_core::notify::{build_notifier, notify_changes, ChangeAlert, Notifier, NotifyConfig};
use screener_core::screen::runner::{screen, Cancellation};
use screener_core::screen::{validate_max_pe, ScreenOptions, ScreenReport, DEFAULT_MAX_PE};
use screener_core::storage::{
    load_snapshot, save_snapshot, try_acquire_snapshot_lock, SnapshotLock,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod export;
mod table;
mod universe;

const HISTORY_RANGE: &str = "6mo";

#[derive(Debug, Parser)]
#[command(name = "screener_worker")]
struct Args {
    /// Comma-separated tickers to screen. Overrides --tickers-file.
    #[arg(long)]
    tickers: Option<String>,

    /// CSV ticker list with a `Ticker` column.
    #[arg(long, default_value = "tickers.csv")]
    tickers_file: PathBuf,

    /// Number of tickers taken from the top of --tickers-file.
    #[arg(long)]
    limit: Option<usize>,

    /// Maximum P/E (0..=100). Rows without a P/E are always excluded.
    #[arg(long, default_value_t = DEFAULT_MAX_PE)]
    max_pe: f64,

    /// Tickers screened in parallel. 1 keeps the polite sequential mode.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Delay between tickers in sequential mode.
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Write the filtered results to this CSV file.
    #[arg(long)]
    csv_out: Option<PathBuf>,

    /// Write 6 months of daily closes for the first ticker to this CSV file.
    #[arg(long)]
    history_out: Option<PathBuf>,

    /// Skip the change email even when SMTP is configured.
    #[arg(long)]
    no_notify: bool,

    /// Screen and print only; no notification and no snapshot update.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Err(err) = run(args, settings).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, "screen run failed");
        return Err(err);
    }
    Ok(())
}

async fn run(args: Args, settings: Settings) -> anyhow::Result<()> {
    let max_pe = validate_max_pe(args.max_pe)?;

    let mut universe_opts = universe::UniverseOptions::from_env();
    if let Some(limit) = args.limit {
        universe_opts.limit = limit;
    }
    let tickers =
        universe::select_universe(args.tickers.as_deref(), &args.tickers_file, &universe_opts)?;

    let http = HttpOptions::from_env();
    let adapters = build_adapters(&settings, &http)?;
    anyhow::ensure!(!adapters.is_empty(), "no data sources enabled");

    let mut screen_opts = ScreenOptions::from_env();
    if let Some(n) = args.concurrency {
        screen_opts.concurrency = n.max(1);
    }
    if let Some(ms) = args.delay_ms {
        screen_opts.ticker_delay = Duration::from_millis(ms);
    }

    let snapshot_path = PathBuf::from(settings.snapshot_path());
    let lock = if args.dry_run {
        None
    } else {
        let lock = try_acquire_snapshot_lock(&snapshot_path)?;
        if lock.is_none() {
            tracing::warn!(
                path = %snapshot_path.display(),
                "snapshot lock not acquired; another run in progress. Results will not be persisted"
            );
        }
        lock
    };

    let previous = load_snapshot(&snapshot_path)?.unwrap_or_else(RecommendationSnapshot::empty);

    let cancel = Cancellation::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; finishing in-flight tickers");
                cancel.cancel();
            }
        }
    });

    tracing::info!(
        tickers = tickers.len(),
        max_pe,
        dry_run = args.dry_run,
        "starting screen"
    );
    let report = screen(&tickers, Arc::from(adapters), &screen_opts, &cancel).await?;

    let rows = report.filtered(max_pe);
    if rows.is_empty() {
        println!("No data found. Try different tickers or relax P/E filter.");
    } else {
        println!("{}", table::render_results(&rows));
        println!("{}", table::render_summary(&summarize(&rows)));

        // The CSV is an extra output; losing it must not cost the snapshot update.
        if let Some(path) = &args.csv_out {
            if let Err(err) = export::write_results_csv(path, &rows) {
                tracing::warn!(path = %path.display(), error = %err, "results CSV export failed");
            }
        }
    }

    if !report.dropped.is_empty() {
        tracing::warn!(dropped = ?report.dropped, "tickers with no data from any source");
    }

    let notifier = if args.no_notify {
        None
    } else {
        build_notifier(&NotifyConfig::from_env())
    };
    let outcome = finish_run(lock, &report, &previous, &snapshot_path, notifier.as_deref()).await?;
    tracing::info!(?outcome, "screen run finished");

    if let Some(path) = &args.history_out {
        write_history(&settings, &http, &tickers, path).await;
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    Persisted { notified: bool },
    Cancelled,
    /// Another run holds the snapshot lock, or this is a dry run.
    NotOwner,
}

/// Diffs against the previous snapshot, then notifies and persists. Both happen only when this
/// run holds the lock and screened every ticker; a notifier failure never blocks persistence.
async fn finish_run(
    lock: Option<SnapshotLock>,
    report: &ScreenReport,
    previous: &RecommendationSnapshot,
    snapshot_path: &Path,
    notifier: Option<&dyn Notifier>,
) -> anyhow::Result<RunOutcome> {
    let Some(lock) = lock else {
        return Ok(RunOutcome::NotOwner);
    };

    if report.cancelled {
        tracing::warn!(
            skipped = report.skipped.len(),
            "run cancelled; snapshot left unchanged"
        );
        lock.release()?;
        return Ok(RunOutcome::Cancelled);
    }

    let current = RecommendationSnapshot::new(chrono::Utc::now(), report.grade_counts());
    let changes = detect_changes(&current.tickers, &previous.tickers);
    tracing::info!(changes = changes.len(), "compared against previous snapshot");

    let notified = match notifier {
        Some(notifier) => notify_changes(notifier, &ChangeAlert::new(changes)).await,
        None => false,
    };

    save_snapshot(snapshot_path, &current)?;
    lock.release()?;
    Ok(RunOutcome::Persisted { notified })
}

// Best effort: a missing chart never fails the run.
async fn write_history(settings: &Settings, http: &HttpOptions, tickers: &[Ticker], path: &Path) {
    let Some(ticker) = tickers.first() else {
        return;
    };

    if let Err(err) = export_history(settings, http, ticker, path).await {
        tracing::warn!(%ticker, error = %err, "price history export failed");
    }
}

async fn export_history(
    settings: &Settings,
    http: &HttpOptions,
    ticker: &Ticker,
    path: &Path,
) -> anyhow::Result<()> {
    let yahoo = YahooAdapter::from_settings(settings, http)?;
    let points = yahoo
        .fetch_price_history(ticker, HISTORY_RANGE)
        .await
        .with_context(|| format!("price history for {ticker}"))?;
    export::write_history_csv(path, &points)
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
