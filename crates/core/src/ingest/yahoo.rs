use crate::config::Settings;
use crate::domain::grade::{tally_recent, GradeEntry};
use crate::domain::record::{DividendYield, Fundamentals, SourceRecord};
use crate::domain::ticker::Ticker;
use crate::ingest::error::ProviderDiagnosticsError;
use crate::ingest::http::{join_url, truncate, HttpJsonClient, HttpOptions};
use crate::ingest::provider::SourceAdapter;
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::{COOKIE, SET_COOKIE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

pub const SOURCE: &str = "yahoo";

const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";
const DEFAULT_COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_PATH: &str = "/v1/test/getcrumb";
const QUOTE_SUMMARY_PATH: &str = "/v10/finance/quoteSummary";
const CHART_PATH: &str = "/v8/finance/chart";
const QUOTE_SUMMARY_MODULES: &str =
    "price,financialData,summaryDetail,defaultKeyStatistics,upgradeDowngradeHistory";
const HISTORY_RANGES: [&str; 8] = ["1mo", "3mo", "6mo", "1y", "2y", "5y", "ytd", "max"];
// Yahoo refuses the crumb endpoint for non-browser agents.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Session cookie plus the crumb Yahoo issued for it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Crumb {
    cookie: String,
    value: String,
}

/// Primary quote/fundamentals source. Needs no API key, but every data call carries a
/// cookie + crumb pair obtained by a two-step handshake and cached until Yahoo rejects it.
#[derive(Debug, Clone)]
pub struct YahooAdapter {
    client: HttpJsonClient,
    base_url: String,
    cookie_url: String,
    // Shared between clones so parallel tickers reuse one session.
    crumb: Arc<Mutex<Option<Crumb>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl YahooAdapter {
    pub fn from_settings(settings: &Settings, http: &HttpOptions) -> Result<Self> {
        let base_url = settings
            .yahoo_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let cookie_url = settings
            .yahoo_cookie_url
            .clone()
            .unwrap_or_else(|| DEFAULT_COOKIE_URL.to_string());
        Ok(Self::new(HttpJsonClient::new(SOURCE, http)?, base_url, cookie_url))
    }

    fn new(client: HttpJsonClient, base_url: String, cookie_url: String) -> Self {
        Self {
            client,
            base_url,
            cookie_url,
            crumb: Arc::new(Mutex::new(None)),
        }
    }

    /// Daily closes over `range` (e.g. "6mo"). Days without a close are skipped.
    pub async fn fetch_price_history(&self, ticker: &Ticker, range: &str) -> Result<Vec<PricePoint>> {
        anyhow::ensure!(
            HISTORY_RANGES.contains(&range),
            "invalid history range {range:?}; expected one of {HISTORY_RANGES:?}"
        );

        let url = self.symbol_url(CHART_PATH, ticker);
        let envelope: ChartEnvelope = self
            .get_with_crumb(&url, &[("range", range), ("interval", "1d")])
            .await?;

        let result = first_result(envelope.chart.result, envelope.chart.error.as_ref(), "chart")?;
        Ok(price_points(&result))
    }

    // Symbols such as "^GSPC" or "BRK/B" must stay a single path segment.
    fn symbol_url(&self, prefix: &str, ticker: &Ticker) -> String {
        join_url(
            &self.base_url,
            &format!("{prefix}/{}", urlencoding::encode(ticker.as_str())),
        )
    }

    /// GET with the cached crumb. A 401 means the session expired: the crumb is dropped,
    /// a fresh one fetched, and the request sent once more.
    async fn get_with_crumb<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let crumb = self.ensure_crumb().await?;
        match self.get_as(&crumb, url, query).await {
            Err(err) if is_unauthorized(&err) => {
                tracing::debug!(source = SOURCE, "crumb rejected; refreshing session");
                self.clear_crumb(&crumb).await;
                let crumb = self.ensure_crumb().await?;
                self.get_as(&crumb, url, query).await
            }
            other => other,
        }
    }

    async fn get_as<T: DeserializeOwned>(
        &self,
        crumb: &Crumb,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let mut query = query.to_vec();
        query.push(("crumb", crumb.value.as_str()));
        self.client
            .get_json_with_headers(
                url,
                &query,
                &[
                    (USER_AGENT.as_str(), BROWSER_USER_AGENT),
                    (COOKIE.as_str(), crumb.cookie.as_str()),
                ],
            )
            .await
    }

    async fn ensure_crumb(&self) -> Result<Crumb> {
        let mut cached = self.crumb.lock().await;
        if let Some(crumb) = cached.as_ref() {
            return Ok(crumb.clone());
        }

        let crumb = self.fetch_crumb().await?;
        *cached = Some(crumb.clone());
        Ok(crumb)
    }

    // Another task may already have replaced the rejected crumb; keep that one.
    async fn clear_crumb(&self, rejected: &Crumb) {
        let mut cached = self.crumb.lock().await;
        if cached.as_ref() == Some(rejected) {
            *cached = None;
        }
    }

    async fn fetch_crumb(&self) -> Result<Crumb> {
        let http = self.client.raw();

        // The cookie page answers 404 but still sets the session cookie.
        let res = http
            .get(&self.cookie_url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await
            .map_err(|err| ProviderDiagnosticsError::new(SOURCE, "cookie", err.to_string()))?;
        let cookie = res
            .headers()
            .get(SET_COOKIE)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(';').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderDiagnosticsError::new(SOURCE, "cookie", "no session cookie in response")
            })?;

        let res = http
            .get(join_url(&self.base_url, CRUMB_PATH))
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(COOKIE, &cookie)
            .send()
            .await
            .map_err(|err| ProviderDiagnosticsError::new(SOURCE, "crumb", err.to_string()))?;
        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|err| ProviderDiagnosticsError::new(SOURCE, "crumb", err.to_string()))?;

        let value = text.trim();
        if !status.is_success() || value.is_empty() || value.contains(char::is_whitespace) {
            return Err(ProviderDiagnosticsError::new(
                SOURCE,
                "crumb",
                format!("HTTP {status}: {}", truncate(value, 200)),
            )
            .into());
        }

        tracing::debug!(source = SOURCE, "acquired yahoo session crumb");
        Ok(Crumb {
            cookie,
            value: value.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl SourceAdapter for YahooAdapter {
    fn source_name(&self) -> &'static str {
        SOURCE
    }

    async fn fetch_record(&self, ticker: &Ticker) -> Result<SourceRecord> {
        let url = self.symbol_url(QUOTE_SUMMARY_PATH, ticker);
        let envelope: QuoteSummaryEnvelope = self
            .get_with_crumb(&url, &[("modules", QUOTE_SUMMARY_MODULES)])
            .await?;

        let summary = envelope.quote_summary;
        let result = first_result(summary.result, summary.error.as_ref(), "quoteSummary")?;
        Ok(into_record(result))
    }
}

fn is_unauthorized(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ProviderDiagnosticsError>()
        .and_then(|d| d.status)
        == Some(401)
}

fn first_result<T>(results: Option<Vec<T>>, error: Option<&YahooError>, stage: &'static str) -> Result<T> {
    if let Some(first) = results.and_then(|r| r.into_iter().next()) {
        return Ok(first);
    }
    let detail = match error {
        Some(e) => format!(
            "{}: {}",
            e.code.as_deref().unwrap_or("error"),
            e.description.as_deref().unwrap_or("no description")
        ),
        None => "empty result".to_string(),
    };
    Err(ProviderDiagnosticsError::new(SOURCE, stage, detail).into())
}

fn into_record(r: QuoteSummaryResult) -> SourceRecord {
    let price = r.price.unwrap_or_default();
    let financial = r.financial_data.unwrap_or_default();
    let detail = r.summary_detail.unwrap_or_default();
    let stats = r.default_key_statistics.unwrap_or_default();

    let fundamentals = Fundamentals {
        company_name: price.short_name.filter(|s| !s.trim().is_empty()),
        long_name: price.long_name.filter(|s| !s.trim().is_empty()),
        price: num(&financial.current_price).or_else(|| num(&price.regular_market_price)),
        market_cap: num(&price.market_cap).or_else(|| num(&detail.market_cap)),
        pe_ratio: num(&detail.trailing_pe),
        volume: count(&detail.volume).or_else(|| count(&price.regular_market_volume)),
        avg_volume: count(&detail.average_volume),
        dividend_yield: DividendYield::from_reported(num(&detail.dividend_yield)),
        beta: num(&detail.beta),
        fifty_two_week_high: num(&detail.fifty_two_week_high),
        fifty_two_week_low: num(&detail.fifty_two_week_low),
        eps: num(&stats.trailing_eps),
        book_value_per_share: num(&stats.book_value),
    };

    let mut history = r
        .upgrade_downgrade_history
        .map(|h| h.history)
        .unwrap_or_default();
    // Yahoo lists newest first; tally expects oldest first.
    history.sort_by_key(|h| h.epoch_grade_date.unwrap_or(0));
    // Entries without a to-grade still take a slot in the recent window; they match no bucket.
    let grades: Vec<GradeEntry> = history
        .into_iter()
        .map(|h| {
            GradeEntry::new(
                h.to_grade.unwrap_or_default(),
                h.from_grade.as_deref().filter(|g| !g.trim().is_empty()),
            )
        })
        .collect();

    SourceRecord {
        source: SOURCE,
        fundamentals,
        recommendations: tally_recent(&grades),
    }
}

fn price_points(result: &ChartResult) -> Vec<PricePoint> {
    let closes = result
        .indicators
        .quote
        .first()
        .map(|q| q.close.as_slice())
        .unwrap_or(&[]);

    result
        .timestamp
        .iter()
        .zip(closes)
        .filter_map(|(ts, close)| {
            let close = close.filter(|c| c.is_finite())?;
            let date = DateTime::<Utc>::from_timestamp(*ts, 0)?.date_naive();
            Some(PricePoint { date, close })
        })
        .collect()
}

fn num(v: &Option<YahooNumber>) -> Option<f64> {
    v.as_ref().and_then(YahooNumber::value)
}

fn count(v: &Option<YahooNumber>) -> Option<u64> {
    num(v).filter(|n| *n >= 0.0).map(|n| n.round() as u64)
}

/// Yahoo reports numbers as `{"raw": 1.2, "fmt": "1.20"}`, `{}` when unknown, and occasionally
/// as bare values.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum YahooNumber {
    Plain(f64),
    Wrapped {
        #[serde(default)]
        raw: Option<f64>,
    },
    Other(serde_json::Value),
}

impl YahooNumber {
    fn value(&self) -> Option<f64> {
        let v = match self {
            YahooNumber::Plain(v) => Some(*v),
            YahooNumber::Wrapped { raw } => *raw,
            YahooNumber::Other(_) => None,
        };
        v.filter(|n| n.is_finite())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct YahooError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct QuoteSummaryEnvelope {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummary,
}

#[derive(Debug, Clone, Deserialize)]
struct QuoteSummary {
    #[serde(default)]
    result: Option<Vec<QuoteSummaryResult>>,
    #[serde(default)]
    error: Option<YahooError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResult {
    #[serde(default)]
    price: Option<PriceModule>,
    #[serde(default)]
    financial_data: Option<FinancialDataModule>,
    #[serde(default)]
    summary_detail: Option<SummaryDetailModule>,
    #[serde(default)]
    default_key_statistics: Option<KeyStatisticsModule>,
    #[serde(default)]
    upgrade_downgrade_history: Option<UpgradeDowngradeModule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default)]
    long_name: Option<String>,
    #[serde(default)]
    regular_market_price: Option<YahooNumber>,
    #[serde(default)]
    regular_market_volume: Option<YahooNumber>,
    #[serde(default)]
    market_cap: Option<YahooNumber>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinancialDataModule {
    #[serde(default)]
    current_price: Option<YahooNumber>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDetailModule {
    #[serde(default, rename = "trailingPE")]
    trailing_pe: Option<YahooNumber>,
    #[serde(default)]
    market_cap: Option<YahooNumber>,
    #[serde(default)]
    volume: Option<YahooNumber>,
    #[serde(default)]
    average_volume: Option<YahooNumber>,
    #[serde(default)]
    dividend_yield: Option<YahooNumber>,
    #[serde(default)]
    beta: Option<YahooNumber>,
    #[serde(default)]
    fifty_two_week_high: Option<YahooNumber>,
    #[serde(default)]
    fifty_two_week_low: Option<YahooNumber>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyStatisticsModule {
    #[serde(default)]
    trailing_eps: Option<YahooNumber>,
    #[serde(default)]
    book_value: Option<YahooNumber>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct UpgradeDowngradeModule {
    #[serde(default)]
    history: Vec<GradeHistoryItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GradeHistoryItem {
    #[serde(default)]
    epoch_grade_date: Option<i64>,
    #[serde(default)]
    to_grade: Option<String>,
    #[serde(default)]
    from_grade: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Clone, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<YahooError>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Clone, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SESSION_COOKIE: &str = "A3=d=session";

    fn adapter_for(base_url: String) -> YahooAdapter {
        let cookie_url = join_url(&base_url, "/cookie");
        YahooAdapter::new(
            HttpJsonClient::new(SOURCE, &HttpOptions::default()).unwrap(),
            base_url,
            cookie_url,
        )
    }

    async fn mount_cookie(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/cookie"))
            .respond_with(
                ResponseTemplate::new(404)
                    .insert_header("set-cookie", format!("{SESSION_COOKIE}; Expires=Sun, 1 Jan 2034 00:00:00 GMT; Path=/; Domain=.yahoo.com").as_str()),
            )
            .mount(server)
            .await;
    }

    async fn mount_session(server: &MockServer, crumb: &str) {
        mount_cookie(server).await;
        Mock::given(method("GET"))
            .and(path(CRUMB_PATH))
            .and(header("cookie", SESSION_COOKIE))
            .respond_with(ResponseTemplate::new(200).set_body_string(crumb))
            .mount(server)
            .await;
    }

    fn summary_fixture() -> serde_json::Value {
        json!({
            "quoteSummary": {
                "result": [{
                    "price": {
                        "shortName": "Apple Inc.",
                        "longName": "Apple Inc.",
                        "regularMarketPrice": {"raw": 189.5, "fmt": "189.50"},
                        "marketCap": {"raw": 2.95e12, "fmt": "2.95T"}
                    },
                    "financialData": {"currentPrice": {"raw": 190.12, "fmt": "190.12"}},
                    "summaryDetail": {
                        "trailingPE": {"raw": 29.456},
                        "volume": {"raw": 51234567},
                        "averageVolume": {"raw": 60000000},
                        "dividendYield": {"raw": 0.0051},
                        "beta": {"raw": 1.29},
                        "fiftyTwoWeekHigh": {"raw": 199.62},
                        "fiftyTwoWeekLow": {}
                    },
                    "defaultKeyStatistics": {
                        "trailingEps": {"raw": 6.43},
                        "bookValue": {"raw": 4.79}
                    },
                    "upgradeDowngradeHistory": {
                        "history": [
                            {"epochGradeDate": 300, "firm": "A", "toGrade": "Buy", "fromGrade": "Hold", "action": "up"},
                            {"epochGradeDate": 200, "firm": "B", "toGrade": "Neutral", "fromGrade": "Outperform", "action": "down"},
                            {"epochGradeDate": 100, "firm": "C", "toGrade": "Sell", "fromGrade": "", "action": "init"}
                        ]
                    }
                }],
                "error": null
            }
        })
    }

    #[test]
    fn maps_quote_summary_into_record() {
        let envelope: QuoteSummaryEnvelope = serde_json::from_value(summary_fixture()).unwrap();
        let result = envelope.quote_summary.result.unwrap().remove(0);
        let record = into_record(result);

        let f = &record.fundamentals;
        assert_eq!(record.source, "yahoo");
        assert_eq!(f.company_name.as_deref(), Some("Apple Inc."));
        // financialData.currentPrice wins over price.regularMarketPrice.
        assert_eq!(f.price, Some(190.12));
        assert_eq!(f.market_cap, Some(2.95e12));
        assert_eq!(f.pe_ratio, Some(29.456));
        assert_eq!(f.volume, Some(51_234_567));
        assert_eq!(f.dividend_yield, DividendYield::Rate(0.0051));
        assert_eq!(f.fifty_two_week_low, None);
        assert_eq!(f.eps, Some(6.43));

        let r = record.recommendations;
        assert_eq!((r.buy, r.hold, r.sell), (1, 1, 1));
        assert_eq!((r.upgrades, r.downgrades), (1, 1));
    }

    #[test]
    fn missing_modules_leave_fields_absent() {
        let envelope: QuoteSummaryEnvelope = serde_json::from_value(json!({
            "quoteSummary": {"result": [{"price": {"shortName": "Tiny Co"}}], "error": null}
        }))
        .unwrap();
        let record = into_record(envelope.quote_summary.result.unwrap().remove(0));

        assert_eq!(record.fundamentals.pe_ratio, None);
        assert_eq!(record.fundamentals.dividend_yield, DividendYield::Unknown);
        assert_eq!(record.recommendations, Default::default());
    }

    #[test]
    fn parses_chart_closes_skipping_nulls() {
        let envelope: ChartEnvelope = serde_json::from_value(json!({
            "chart": {
                "result": [{
                    "timestamp": [1704205800, 1704292200, 1704378600],
                    "indicators": {"quote": [{"close": [185.64, null, 181.91]}]}
                }],
                "error": null
            }
        }))
        .unwrap();

        let points = price_points(&envelope.chart.result.unwrap()[0]);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(points[1].close, 181.91);
    }

    #[tokio::test]
    async fn fetch_record_reads_quote_summary_endpoint() {
        let server = MockServer::start().await;
        mount_session(&server, "abc123").await;
        Mock::given(method("GET"))
            .and(path("/v10/finance/quoteSummary/AAPL"))
            .and(query_param("modules", QUOTE_SUMMARY_MODULES))
            .and(query_param("crumb", "abc123"))
            .and(header("cookie", SESSION_COOKIE))
            .respond_with(ResponseTemplate::new(200).set_body_json(summary_fixture()))
            .mount(&server)
            .await;

        let adapter = adapter_for(server.uri());
        let record = adapter
            .fetch_record(&Ticker::parse("AAPL").unwrap())
            .await
            .unwrap();
        assert_eq!(record.fundamentals.pe_ratio, Some(29.456));
    }

    #[tokio::test]
    async fn not_found_result_is_an_error() {
        let server = MockServer::start().await;
        mount_session(&server, "abc123").await;
        Mock::given(method("GET"))
            .and(path("/v10/finance/quoteSummary/ZZZZ"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "quoteSummary": {
                    "result": null,
                    "error": {"code": "Not Found", "description": "Quote not found for ticker symbol: ZZZZ"}
                }
            })))
            .mount(&server)
            .await;

        let adapter = adapter_for(server.uri());
        let err = adapter
            .fetch_record(&Ticker::parse("ZZZZ").unwrap())
            .await
            .unwrap_err();
        let diag = err.downcast_ref::<ProviderDiagnosticsError>().unwrap();
        assert_eq!(diag.stage, "quoteSummary");
        assert!(diag.detail.contains("Not Found"));
    }

    #[test]
    fn recent_window_counts_entries_without_a_grade() {
        // Eleven entries, oldest first: a Sell that falls outside the window, then nine
        // Buys and one blank that displaces it.
        let mut history = vec![json!({"epochGradeDate": 1, "toGrade": "Sell", "fromGrade": ""})];
        for i in 2..=10 {
            history.push(json!({"epochGradeDate": i, "toGrade": "Buy", "fromGrade": ""}));
        }
        history.push(json!({"epochGradeDate": 11, "toGrade": "", "fromGrade": "Hold"}));

        let envelope: QuoteSummaryEnvelope = serde_json::from_value(json!({
            "quoteSummary": {
                "result": [{"upgradeDowngradeHistory": {"history": history}}],
                "error": null
            }
        }))
        .unwrap();
        let r = into_record(envelope.quote_summary.result.unwrap().remove(0)).recommendations;

        assert_eq!((r.buy, r.hold, r.sell), (9, 0, 0));
        assert_eq!((r.upgrades, r.downgrades), (0, 0));
    }

    #[test]
    fn symbol_is_encoded_as_one_path_segment() {
        let adapter = adapter_for("http://127.0.0.1:9".to_string());
        let url = adapter.symbol_url(QUOTE_SUMMARY_PATH, &Ticker::parse("brk/b").unwrap());
        assert_eq!(url, "http://127.0.0.1:9/v10/finance/quoteSummary/BRK%2FB");

        let url = adapter.symbol_url(CHART_PATH, &Ticker::parse("x?y#z").unwrap());
        assert_eq!(url, "http://127.0.0.1:9/v8/finance/chart/X%3FY%23Z");

        let url = adapter.symbol_url(CHART_PATH, &Ticker::parse("brk-b.to").unwrap());
        assert_eq!(url, "http://127.0.0.1:9/v8/finance/chart/BRK-B.TO");
    }

    #[tokio::test]
    async fn crumb_is_fetched_once_and_reused() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cookie"))
            .respond_with(
                ResponseTemplate::new(404).insert_header("set-cookie", format!("{SESSION_COOKIE}; Path=/").as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CRUMB_PATH))
            .and(header("cookie", SESSION_COOKIE))
            .respond_with(ResponseTemplate::new(200).set_body_string("abc123"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v10/finance/quoteSummary/AAPL"))
            .and(query_param("crumb", "abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(summary_fixture()))
            .expect(2)
            .mount(&server)
            .await;

        let adapter = adapter_for(server.uri());
        let ticker = Ticker::parse("AAPL").unwrap();
        adapter.fetch_record(&ticker).await.unwrap();
        // Clones share the cached session.
        adapter.clone().fetch_record(&ticker).await.unwrap();
    }

    #[tokio::test]
    async fn rejected_crumb_is_refreshed_and_request_retried() {
        let server = MockServer::start().await;
        mount_cookie(&server).await;
        Mock::given(method("GET"))
            .and(path(CRUMB_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("stale"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CRUMB_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("fresh"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v10/finance/quoteSummary/AAPL"))
            .and(query_param("crumb", "stale"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "finance": {"result": null, "error": {"code": "Unauthorized", "description": "Invalid Crumb"}}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v10/finance/quoteSummary/AAPL"))
            .and(query_param("crumb", "fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(summary_fixture()))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = adapter_for(server.uri());
        let record = adapter
            .fetch_record(&Ticker::parse("AAPL").unwrap())
            .await
            .unwrap();
        assert_eq!(record.fundamentals.pe_ratio, Some(29.456));
        assert_eq!(
            adapter.crumb.lock().await.as_ref().map(|c| c.value.clone()),
            Some("fresh".to_string())
        );
    }

    #[tokio::test]
    async fn missing_session_cookie_is_a_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cookie"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let adapter = adapter_for(server.uri());
        let err = adapter
            .fetch_record(&Ticker::parse("AAPL").unwrap())
            .await
            .unwrap_err();
        let diag = err.downcast_ref::<ProviderDiagnosticsError>().unwrap();
        assert_eq!(diag.stage, "cookie");
        assert!(adapter.crumb.lock().await.is_none());
    }

    #[tokio::test]
    async fn rejects_unknown_history_range() {
        let adapter = adapter_for("http://127.0.0.1:9".to_string());
        let res = adapter
            .fetch_price_history(&Ticker::parse("AAPL").unwrap(), "7w")
            .await;
        assert!(res.is_err());
    }
}
