use crate::config::Settings;
use crate::domain::record::{DividendYield, Fundamentals, RecommendationCounts, SourceRecord};
use crate::domain::ticker::Ticker;
use crate::ingest::error::ProviderDiagnosticsError;
use crate::ingest::http::{join_url, HttpJsonClient, HttpOptions};
use crate::ingest::provider::SourceAdapter;
use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;

pub const SOURCE: &str = "alpha_vantage";

const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";
const QUERY_PATH: &str = "/query";

// Alpha Vantage answers throttling and bad symbols with HTTP 200 and one of these keys.
const MESSAGE_KEYS: [&str; 3] = ["Note", "Information", "Error Message"];

/// Fundamentals source backed by the OVERVIEW and GLOBAL_QUOTE functions.
#[derive(Debug, Clone)]
pub struct AlphaVantageAdapter {
    client: HttpJsonClient,
    base_url: String,
    api_key: String,
}

impl AlphaVantageAdapter {
    /// `Ok(None)` when no API key is configured.
    pub fn from_settings(settings: &Settings, http: &HttpOptions) -> Result<Option<Self>> {
        let Ok(api_key) = settings.require_alpha_vantage_api_key() else {
            return Ok(None);
        };
        let base_url = settings
            .alpha_vantage_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Some(Self {
            client: HttpJsonClient::new(SOURCE, http)?,
            base_url,
            api_key: api_key.to_string(),
        }))
    }

    async fn query(&self, function: &'static str, ticker: &Ticker) -> Result<Value> {
        let url = join_url(&self.base_url, QUERY_PATH);
        let raw = self
            .client
            .get_value(
                &url,
                &[
                    ("function", function),
                    ("symbol", ticker.as_str()),
                    ("apikey", self.api_key.as_str()),
                ],
            )
            .await?;
        check_api_message(function, &raw)?;
        Ok(raw)
    }
}

#[async_trait::async_trait]
impl SourceAdapter for AlphaVantageAdapter {
    fn source_name(&self) -> &'static str {
        SOURCE
    }

    async fn fetch_record(&self, ticker: &Ticker) -> Result<SourceRecord> {
        let overview: Overview = self.client.decode(self.query("OVERVIEW", ticker).await?)?;

        // The quote only adds price and volume; losing it keeps the overview usable.
        let quote = match self.query("GLOBAL_QUOTE", ticker).await {
            Ok(raw) => match self.client.decode::<GlobalQuoteEnvelope>(raw) {
                Ok(env) => env.global_quote,
                Err(err) => {
                    tracing::warn!(source = SOURCE, %ticker, error = %err, "GLOBAL_QUOTE decode failed");
                    GlobalQuote::default()
                }
            },
            Err(err) => {
                tracing::warn!(source = SOURCE, %ticker, error = %err, "GLOBAL_QUOTE failed");
                GlobalQuote::default()
            }
        };

        Ok(into_record(overview, quote))
    }
}

fn check_api_message(function: &'static str, raw: &Value) -> Result<()> {
    let Some(obj) = raw.as_object() else {
        return Err(ProviderDiagnosticsError::new(SOURCE, function, "response is not a JSON object").into());
    };
    if obj.is_empty() {
        return Err(ProviderDiagnosticsError::new(SOURCE, function, "empty response (unknown symbol?)").into());
    }
    for key in MESSAGE_KEYS {
        if let Some(msg) = obj.get(key) {
            let msg = msg.as_str().unwrap_or_default();
            return Err(ProviderDiagnosticsError::new(SOURCE, function, format!("{key}: {msg}")).into());
        }
    }
    Ok(())
}

fn into_record(o: Overview, q: GlobalQuote) -> SourceRecord {
    let fundamentals = Fundamentals {
        company_name: text(o.name),
        long_name: None,
        price: parse_num(q.price.as_deref()),
        market_cap: parse_num(o.market_capitalization.as_deref()),
        pe_ratio: parse_num(o.pe_ratio.as_deref()),
        volume: parse_count(q.volume.as_deref()),
        avg_volume: None,
        dividend_yield: DividendYield::from_reported(parse_num(o.dividend_yield.as_deref())),
        beta: parse_num(o.beta.as_deref()),
        fifty_two_week_high: parse_num(o.week_52_high.as_deref()),
        fifty_two_week_low: parse_num(o.week_52_low.as_deref()),
        eps: parse_num(o.eps.as_deref()),
        book_value_per_share: parse_num(o.book_value.as_deref()),
    };

    let rating = |s: &Option<String>| parse_count(s.as_deref()).unwrap_or(0) as u32;
    let recommendations = RecommendationCounts {
        buy: rating(&o.analyst_rating_buy),
        hold: rating(&o.analyst_rating_hold),
        sell: rating(&o.analyst_rating_sell),
        upgrades: 0,
        downgrades: 0,
    };

    SourceRecord {
        source: SOURCE,
        fundamentals,
        recommendations,
    }
}

fn text(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s != "None")
}

/// Alpha Vantage encodes every number as a string and uses "None" or "-" for missing values.
fn parse_num(s: Option<&str>) -> Option<f64> {
    let t = s?.trim().trim_end_matches('%');
    if t.is_empty() || t == "None" || t == "-" {
        return None;
    }
    t.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_count(s: Option<&str>) -> Option<u64> {
    parse_num(s).filter(|v| *v >= 0.0).map(|v| v.round() as u64)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Overview {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    market_capitalization: Option<String>,
    #[serde(default, rename = "PERatio")]
    pe_ratio: Option<String>,
    #[serde(default)]
    dividend_yield: Option<String>,
    #[serde(default)]
    beta: Option<String>,
    #[serde(default, rename = "52WeekHigh")]
    week_52_high: Option<String>,
    #[serde(default, rename = "52WeekLow")]
    week_52_low: Option<String>,
    #[serde(default, rename = "EPS")]
    eps: Option<String>,
    #[serde(default)]
    book_value: Option<String>,
    #[serde(default)]
    analyst_rating_buy: Option<String>,
    #[serde(default)]
    analyst_rating_hold: Option<String>,
    #[serde(default)]
    analyst_rating_sell: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GlobalQuoteEnvelope {
    #[serde(rename = "Global Quote", default)]
    global_quote: GlobalQuote,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "05. price", default)]
    price: Option<String>,
    #[serde(rename = "06. volume", default)]
    volume: Option<String>,
}
