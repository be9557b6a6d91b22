pub mod aggregate;
pub mod runner;

use crate::config::env_parse;
use crate::domain::snapshot::GradeCounts;
use crate::domain::ticker::Ticker;
use crate::format::DisplayRow;
use crate::ingest::provider::ProviderWarning;
use aggregate::AggregatedRow;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

pub const MAX_PE_LIMIT: f64 = 100.0;
pub const DEFAULT_MAX_PE: f64 = 30.0;

#[derive(Debug, Clone)]
pub struct ScreenOptions {
    /// Tickers in flight at once. 1 means strictly sequential with `ticker_delay` between tickers.
    pub concurrency: usize,

    /// Pause between tickers in sequential mode, to stay under provider rate limits.
    pub ticker_delay: Duration,
}

impl Default for ScreenOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            ticker_delay: Duration::from_millis(500),
        }
    }
}

impl ScreenOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();
        if let Some(n) = env_parse::<usize>("SCREENER_CONCURRENCY") {
            out.concurrency = n.max(1);
        }
        if let Some(ms) = env_parse::<u64>("SCREENER_TICKER_DELAY_MS") {
            out.ticker_delay = Duration::from_millis(ms);
        }
        out
    }
}

pub fn validate_max_pe(max_pe: f64) -> anyhow::Result<f64> {
    anyhow::ensure!(
        (0.0..=MAX_PE_LIMIT).contains(&max_pe),
        "max P/E must be within 0..={MAX_PE_LIMIT} (got {max_pe})"
    );
    Ok(max_pe)
}

/// Outcome of screening a list of tickers. `rows` keeps the input order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScreenReport {
    pub rows: Vec<AggregatedRow>,
    pub warnings: Vec<ProviderWarning>,
    /// Tickers for which no source returned data.
    pub dropped: Vec<Ticker>,
    /// Tickers never started because the run was cancelled.
    pub skipped: Vec<Ticker>,
    pub cancelled: bool,
}

impl ScreenReport {
    /// Display rows with a PE at or below `max_pe`. Rows without a PE never pass.
    pub fn filtered(&self, max_pe: f64) -> Vec<DisplayRow> {
        self.rows
            .iter()
            .map(DisplayRow::from_row)
            .filter(|d| d.pe.is_some_and(|pe| pe <= max_pe))
            .collect()
    }

    /// Buy/hold/sell per ticker for every aggregated row, before the PE filter.
    pub fn grade_counts(&self) -> BTreeMap<Ticker, GradeCounts> {
        self.rows
            .iter()
            .map(|r| (r.ticker.clone(), GradeCounts::from(r.recommendations)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{Fundamentals, RecommendationCounts};

    fn row(ticker: &str, pe: Option<f64>, buy: u32) -> AggregatedRow {
        AggregatedRow {
            ticker: Ticker::parse(ticker).unwrap(),
            primary_source: "yahoo",
            fundamentals: Fundamentals {
                pe_ratio: pe,
                ..Default::default()
            },
            recommendations: RecommendationCounts {
                buy,
                ..Default::default()
            },
            source_count: 1,
            intrinsic_value: None,
        }
    }

    #[test]
    fn rows_without_pe_never_pass_even_at_max_threshold() {
        let report = ScreenReport {
            rows: vec![row("AAPL", Some(29.456), 1), row("NOPE", None, 3)],
            ..Default::default()
        };

        let out = report.filtered(MAX_PE_LIMIT);
        let tickers: Vec<&str> = out.iter().map(|d| d.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["AAPL"]);
    }

    #[test]
    fn threshold_is_inclusive_on_rounded_pe() {
        let report = ScreenReport {
            rows: vec![
                row("A", Some(30.004), 0),
                row("B", Some(30.006), 0),
                row("C", Some(12.0), 0),
            ],
            ..Default::default()
        };

        let out = report.filtered(30.0);
        let tickers: Vec<&str> = out.iter().map(|d| d.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["A", "C"]);
    }

    #[test]
    fn grade_counts_cover_rows_filtered_out_by_pe() {
        let report = ScreenReport {
            rows: vec![row("AAPL", Some(80.0), 2), row("NOPE", None, 3)],
            ..Default::default()
        };

        let counts = report.grade_counts();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[&Ticker::parse("NOPE").unwrap()].buy, 3);
    }

    #[test]
    fn max_pe_must_be_in_slider_range() {
        assert!(validate_max_pe(0.0).is_ok());
        assert!(validate_max_pe(100.0).is_ok());
        assert!(validate_max_pe(100.5).is_err());
        assert!(validate_max_pe(-1.0).is_err());
    }
}
