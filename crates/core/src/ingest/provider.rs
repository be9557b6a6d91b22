use crate::config::Settings;
use crate::domain::record::SourceRecord;
use crate::domain::ticker::Ticker;
use crate::ingest::alpha_vantage::AlphaVantageAdapter;
use crate::ingest::error::ProviderDiagnosticsError;
use crate::ingest::finnhub::FinnhubAdapter;
use crate::ingest::http::HttpOptions;
use crate::ingest::yahoo::YahooAdapter;
use anyhow::{Context, Result};
use serde::Serialize;
use std::str::FromStr;

const DEFAULT_SOURCES: &str = "yahoo,finnhub,alpha_vantage";

#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// Fetches one ticker. Any failure (network, status, decode, missing data) is an `Err`;
    /// [`fetch`] turns it into an absent record plus a warning.
    async fn fetch_record(&self, ticker: &Ticker) -> Result<SourceRecord>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Yahoo,
    Finnhub,
    AlphaVantage,
}

impl SourceKind {
    pub fn name(self) -> &'static str {
        match self {
            SourceKind::Yahoo => "yahoo",
            SourceKind::Finnhub => "finnhub",
            SourceKind::AlphaVantage => "alpha_vantage",
        }
    }
}

impl FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "yahoo" | "yfinance" => Ok(SourceKind::Yahoo),
            "finnhub" => Ok(SourceKind::Finnhub),
            "alpha_vantage" | "alphavantage" => Ok(SourceKind::AlphaVantage),
            other => anyhow::bail!("unknown data source: {other:?}"),
        }
    }
}

/// Parses a priority-ordered, comma-separated source list. Duplicates keep their first position.
pub fn parse_sources(raw: &str) -> Result<Vec<SourceKind>> {
    let mut out = Vec::new();
    for part in raw.split(',') {
        if part.trim().is_empty() {
            continue;
        }
        let kind = part.parse::<SourceKind>()?;
        if !out.contains(&kind) {
            out.push(kind);
        }
    }
    anyhow::ensure!(!out.is_empty(), "at least one data source must be listed");
    Ok(out)
}

/// Builds the enabled adapters in priority order. Sources whose API key is missing are skipped.
pub fn build_adapters(
    settings: &Settings,
    http: &HttpOptions,
) -> Result<Vec<Box<dyn SourceAdapter>>> {
    let kinds = parse_sources(settings.sources.as_deref().unwrap_or(DEFAULT_SOURCES))
        .context("invalid SCREENER_SOURCES")?;

    let mut out: Vec<Box<dyn SourceAdapter>> = Vec::with_capacity(kinds.len());
    for kind in kinds {
        match kind {
            SourceKind::Yahoo => out.push(Box::new(YahooAdapter::from_settings(settings, http)?)),
            SourceKind::Finnhub => match FinnhubAdapter::from_settings(settings, http)? {
                Some(a) => out.push(Box::new(a)),
                None => tracing::info!(source = kind.name(), "no API key configured; source disabled"),
            },
            SourceKind::AlphaVantage => match AlphaVantageAdapter::from_settings(settings, http)? {
                Some(a) => out.push(Box::new(a)),
                None => tracing::info!(source = kind.name(), "no API key configured; source disabled"),
            },
        }
    }
    Ok(out)
}

/// Non-fatal provider failure, reported next to the screen results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderWarning {
    pub source: &'static str,
    pub ticker: Ticker,
    pub stage: &'static str,
    pub detail: String,
}

/// Calls one adapter and never fails: errors become `Err(ProviderWarning)`, meaning the adapter
/// is absent for this ticker.
pub async fn fetch(
    adapter: &dyn SourceAdapter,
    ticker: &Ticker,
) -> std::result::Result<SourceRecord, ProviderWarning> {
    match adapter.fetch_record(ticker).await {
        Ok(record) => Ok(record),
        Err(err) => {
            let stage = err
                .downcast_ref::<ProviderDiagnosticsError>()
                .map(|d| d.stage)
                .unwrap_or("adapter");
            tracing::warn!(
                source = adapter.source_name(),
                %ticker,
                stage,
                error = %err,
                "source fetch failed; treating as absent"
            );
            Err(ProviderWarning {
                source: adapter.source_name(),
                ticker: ticker.clone(),
                stage,
                detail: format!("{err:#}"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_priority_order_and_aliases() {
        let kinds = parse_sources("Finnhub, yfinance ,alpha-vantage,finnhub").unwrap();
        assert_eq!(
            kinds,
            vec![
                SourceKind::Finnhub,
                SourceKind::Yahoo,
                SourceKind::AlphaVantage
            ]
        );
    }

    #[test]
    fn rejects_unknown_or_empty_source_lists() {
        assert!(parse_sources("yahoo,bloomberg").is_err());
        assert!(parse_sources(" , ").is_err());
    }

    #[test]
    fn keyless_sources_are_skipped() {
        let settings = Settings {
            sentry_dsn: None,
            finnhub_api_key: None,
            alpha_vantage_api_key: None,
            yahoo_base_url: None,
            yahoo_cookie_url: None,
            finnhub_base_url: None,
            alpha_vantage_base_url: None,
            sources: Some("finnhub,yahoo,alpha_vantage".to_string()),
            snapshot_path: None,
        };

        let adapters = build_adapters(&settings, &HttpOptions::default()).unwrap();
        let names: Vec<&str> = adapters.iter().map(|a| a.source_name()).collect();
        assert_eq!(names, vec!["yahoo"]);
    }

    #[test]
    fn keyed_sources_keep_configured_order() {
        let settings = Settings {
            sentry_dsn: None,
            finnhub_api_key: Some("fh".to_string()),
            alpha_vantage_api_key: Some("av".to_string()),
            yahoo_base_url: None,
            yahoo_cookie_url: None,
            finnhub_base_url: None,
            alpha_vantage_base_url: None,
            sources: Some("alpha_vantage,finnhub,yahoo".to_string()),
            snapshot_path: None,
        };

        let adapters = build_adapters(&settings, &HttpOptions::default()).unwrap();
        let names: Vec<&str> = adapters.iter().map(|a| a.source_name()).collect();
        assert_eq!(names, vec!["alpha_vantage", "finnhub", "yahoo"]);
    }
}
