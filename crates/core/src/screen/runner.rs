use crate::domain::ticker::Ticker;
use crate::ingest::provider::SourceAdapter;
use crate::screen::aggregate::{aggregate, Aggregation};
use crate::screen::{ScreenOptions, ScreenReport};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

/// Cooperative stop signal shared between the caller and running screen tasks.
///
/// Cancelling never interrupts a ticker that is already being fetched; it prevents new tickers
/// from starting and cuts the inter-ticker delay short.
#[derive(Debug, Clone)]
pub struct Cancellation {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`Self::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|c| *c).await;
    }
}

/// Screens `tickers` against `adapters` and returns rows in input order.
///
/// Duplicate tickers are screened once. With `concurrency == 1` tickers run one after another
/// with `ticker_delay` between them; otherwise up to `concurrency` tickers are in flight.
/// Provider failures never fail the run; only a crashed task does.
pub async fn screen(
    tickers: &[Ticker],
    adapters: Arc<[Box<dyn SourceAdapter>]>,
    opts: &ScreenOptions,
    cancel: &Cancellation,
) -> Result<ScreenReport> {
    let mut unique: Vec<Ticker> = Vec::with_capacity(tickers.len());
    for t in tickers {
        if !unique.contains(t) {
            unique.push(t.clone());
        }
    }

    tracing::info!(
        tickers = unique.len(),
        sources = adapters.len(),
        concurrency = opts.concurrency,
        "screen started"
    );

    let slots = if opts.concurrency <= 1 {
        run_sequential(&unique, &adapters, opts, cancel).await
    } else {
        run_parallel(&unique, adapters, opts.concurrency, cancel).await?
    };

    let mut report = ScreenReport::default();
    for (ticker, slot) in unique.into_iter().zip(slots) {
        match slot {
            Some(agg) => {
                report.warnings.extend(agg.warnings);
                match agg.row {
                    Some(row) => report.rows.push(row),
                    None => report.dropped.push(ticker),
                }
            }
            None => report.skipped.push(ticker),
        }
    }
    report.cancelled = cancel.is_cancelled();

    tracing::info!(
        rows = report.rows.len(),
        dropped = report.dropped.len(),
        skipped = report.skipped.len(),
        warnings = report.warnings.len(),
        cancelled = report.cancelled,
        "screen finished"
    );

    Ok(report)
}

async fn run_sequential(
    tickers: &[Ticker],
    adapters: &[Box<dyn SourceAdapter>],
    opts: &ScreenOptions,
    cancel: &Cancellation,
) -> Vec<Option<Aggregation>> {
    let mut slots: Vec<Option<Aggregation>> = vec![None; tickers.len()];

    for (i, ticker) in tickers.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        if i > 0 && !opts.ticker_delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(opts.ticker_delay) => {}
                _ = cancel.cancelled() => break,
            }
        }

        tracing::debug!(%ticker, index = i, total = tickers.len(), "screening ticker");
        slots[i] = Some(aggregate(ticker, adapters).await);
    }

    slots
}

async fn run_parallel(
    tickers: &[Ticker],
    adapters: Arc<[Box<dyn SourceAdapter>]>,
    concurrency: usize,
    cancel: &Cancellation,
) -> Result<Vec<Option<Aggregation>>> {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut set = JoinSet::new();

    for (i, ticker) in tickers.iter().cloned().enumerate() {
        let semaphore = semaphore.clone();
        let adapters = adapters.clone();
        let cancel = cancel.clone();
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            if cancel.is_cancelled() {
                return None;
            }
            tracing::debug!(%ticker, index = i, "screening ticker");
            Some((i, aggregate(&ticker, &adapters[..]).await))
        });
    }

    let mut slots: Vec<Option<Aggregation>> = vec![None; tickers.len()];
    let mut fatal = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Some((i, agg))) => slots[i] = Some(agg),
            Ok(None) => {}
            Err(err) => {
                tracing::error!(error = %err, "screen task failed; cancelling remaining tickers");
                cancel.cancel();
                fatal.get_or_insert(err);
            }
        }
    }

    if let Some(err) = fatal {
        anyhow::bail!("screen task failed: {err}");
    }
    Ok(slots)
}
