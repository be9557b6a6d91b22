use crate::domain::record::{Fundamentals, RecommendationCounts, SourceRecord};
use crate::domain::ticker::Ticker;
use crate::ingest::provider::{fetch, ProviderWarning, SourceAdapter};
use crate::valuation::graham_number;
use serde::Serialize;

/// One ticker's merged view across sources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedRow {
    pub ticker: Ticker,
    /// Source whose scalar fields were taken.
    pub primary_source: &'static str,
    pub fundamentals: Fundamentals,
    pub recommendations: RecommendationCounts,
    pub source_count: usize,
    pub intrinsic_value: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Aggregation {
    pub row: Option<AggregatedRow>,
    pub warnings: Vec<ProviderWarning>,
}

/// Merges records given in priority order: scalar fields come whole from the first record,
/// recommendation counts are summed over all of them. `None` when there are no records.
pub fn merge(ticker: &Ticker, records: Vec<SourceRecord>) -> Option<AggregatedRow> {
    let source_count = records.len();
    let recommendations: RecommendationCounts = records.iter().map(|r| r.recommendations).sum();
    let primary = records.into_iter().next()?;

    let intrinsic_value = graham_number(
        primary.fundamentals.eps,
        primary.fundamentals.book_value_per_share,
    );

    Some(AggregatedRow {
        ticker: ticker.clone(),
        primary_source: primary.source,
        fundamentals: primary.fundamentals,
        recommendations,
        source_count,
        intrinsic_value,
    })
}

/// Calls every adapter for `ticker`, one after another in priority order. A failing adapter is
/// skipped with a warning; it never aborts the ticker.
pub async fn aggregate(ticker: &Ticker, adapters: &[Box<dyn SourceAdapter>]) -> Aggregation {
    let mut records = Vec::with_capacity(adapters.len());
    let mut warnings = Vec::new();

    for adapter in adapters {
        match fetch(adapter.as_ref(), ticker).await {
            Ok(record) => records.push(record),
            Err(warning) => warnings.push(warning),
        }
    }

    let row = merge(ticker, records);
    if row.is_none() {
        tracing::warn!(%ticker, "no source returned data; dropping ticker");
    }

    Aggregation { row, warnings }
}
