pub mod domain;
pub mod format;
pub mod ingest;
pub mod notify;
pub mod screen;
pub mod storage;
pub mod valuation;

pub mod config {
    use anyhow::Context;

    pub const DEFAULT_SNAPSHOT_PATH: &str = "last_recommendations.json";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub sentry_dsn: Option<String>,
        pub finnhub_api_key: Option<String>,
        pub alpha_vantage_api_key: Option<String>,
        pub yahoo_base_url: Option<String>,
        /// Page whose Set-Cookie starts a Yahoo session for the crumb handshake.
        pub yahoo_cookie_url: Option<String>,
        pub finnhub_base_url: Option<String>,
        pub alpha_vantage_base_url: Option<String>,
        /// Comma-separated source names in priority order (e.g. "yahoo,finnhub").
        pub sources: Option<String>,
        pub snapshot_path: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                finnhub_api_key: non_empty_var("FINNHUB_API_KEY"),
                alpha_vantage_api_key: non_empty_var("ALPHA_VANTAGE_API_KEY"),
                yahoo_base_url: non_empty_var("YAHOO_BASE_URL"),
                yahoo_cookie_url: non_empty_var("YAHOO_COOKIE_URL"),
                finnhub_base_url: non_empty_var("FINNHUB_BASE_URL"),
                alpha_vantage_base_url: non_empty_var("ALPHA_VANTAGE_BASE_URL"),
                sources: non_empty_var("SCREENER_SOURCES"),
                snapshot_path: non_empty_var("SNAPSHOT_PATH"),
            })
        }

        pub fn snapshot_path(&self) -> &str {
            self.snapshot_path
                .as_deref()
                .unwrap_or(DEFAULT_SNAPSHOT_PATH)
        }

        pub fn require_finnhub_api_key(&self) -> anyhow::Result<&str> {
            self.finnhub_api_key
                .as_deref()
                .context("FINNHUB_API_KEY is required")
        }

        pub fn require_alpha_vantage_api_key(&self) -> anyhow::Result<&str> {
            self.alpha_vantage_api_key
                .as_deref()
                .context("ALPHA_VANTAGE_API_KEY is required")
        }
    }

    // Blank values in .env files count as unset.
    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub(crate) fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
    }
}
