use crate::config::Settings;
use crate::domain::record::{RecommendationCounts, SourceRecord};
use crate::domain::ticker::Ticker;
use crate::ingest::http::{join_url, HttpJsonClient, HttpOptions};
use crate::ingest::provider::SourceAdapter;
use anyhow::Result;
use serde::Deserialize;

pub const SOURCE: &str = "finnhub";

const DEFAULT_BASE_URL: &str = "https://finnhub.io";
const RECOMMENDATION_PATH: &str = "/api/v1/stock/recommendation";

/// Recommendation-trend source. Reports counts only; every scalar field stays absent.
#[derive(Debug, Clone)]
pub struct FinnhubAdapter {
    client: HttpJsonClient,
    base_url: String,
    api_key: String,
}

impl FinnhubAdapter {
    /// `Ok(None)` when no API key is configured.
    pub fn from_settings(settings: &Settings, http: &HttpOptions) -> Result<Option<Self>> {
        let Ok(api_key) = settings.require_finnhub_api_key() else {
            return Ok(None);
        };
        let base_url = settings
            .finnhub_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Some(Self {
            client: HttpJsonClient::new(SOURCE, http)?,
            base_url,
            api_key: api_key.to_string(),
        }))
    }
}

#[async_trait::async_trait]
impl SourceAdapter for FinnhubAdapter {
    fn source_name(&self) -> &'static str {
        SOURCE
    }

    async fn fetch_record(&self, ticker: &Ticker) -> Result<SourceRecord> {
        let url = join_url(&self.base_url, RECOMMENDATION_PATH);
        let trends: Vec<RecommendationTrend> = self
            .client
            .get_json(
                &url,
                &[("symbol", ticker.as_str()), ("token", self.api_key.as_str())],
            )
            .await?;

        let mut record = SourceRecord::new(SOURCE);
        record.recommendations = latest_counts(trends);
        Ok(record)
    }
}

/// Counts from the most recent period. An empty trend list means no coverage, i.e. zeros.
fn latest_counts(trends: Vec<RecommendationTrend>) -> RecommendationCounts {
    let latest = trends
        .into_iter()
        .reduce(|best, t| if t.period > best.period { t } else { best });

    match latest {
        Some(t) => RecommendationCounts {
            buy: t.buy,
            hold: t.hold,
            sell: t.sell,
            upgrades: 0,
            downgrades: 0,
        },
        None => RecommendationCounts::default(),
    }
}

// strongBuy/strongSell are reported separately and not folded into buy/sell.
#[derive(Debug, Clone, Deserialize)]
struct RecommendationTrend {
    #[serde(default)]
    period: Option<String>,
    #[serde(default)]
    buy: u32,
    #[serde(default)]
    hold: u32,
    #[serde(default)]
    sell: u32,
}
