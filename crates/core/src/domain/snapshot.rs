use crate::domain::record::RecommendationCounts;
use crate::domain::ticker::Ticker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeCounts {
    pub buy: u32,
    pub hold: u32,
    pub sell: u32,
}

impl From<RecommendationCounts> for GradeCounts {
    fn from(c: RecommendationCounts) -> Self {
        Self {
            buy: c.buy,
            hold: c.hold,
            sell: c.sell,
        }
    }
}

/// Per-ticker Buy/Hold/Sell counts observed by one run. The latest one is the baseline for the
/// next run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSnapshot {
    pub generated_at: DateTime<Utc>,
    pub tickers: BTreeMap<Ticker, GradeCounts>,
}

impl RecommendationSnapshot {
    pub fn new(generated_at: DateTime<Utc>, tickers: BTreeMap<Ticker, GradeCounts>) -> Self {
        Self {
            generated_at,
            tickers,
        }
    }

    pub fn empty() -> Self {
        Self::new(Utc::now(), BTreeMap::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEntry {
    pub ticker: Ticker,
    pub previous: GradeCounts,
    pub current: GradeCounts,
}

/// Tickers present in both maps whose counts differ, ordered by ticker. A ticker seen for the
/// first time is not a change.
pub fn detect_changes(
    current: &BTreeMap<Ticker, GradeCounts>,
    previous: &BTreeMap<Ticker, GradeCounts>,
) -> Vec<ChangeEntry> {
    current
        .iter()
        .filter_map(|(ticker, now)| {
            let before = previous.get(ticker)?;
            (before != now).then(|| ChangeEntry {
                ticker: ticker.clone(),
                previous: *before,
                current: *now,
            })
        })
        .collect()
}
