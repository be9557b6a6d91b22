use crate::config::env_parse;
use crate::ingest::error::ProviderDiagnosticsError;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
// One attempt per call; raise PROVIDER_RETRIES to opt into backoff retries.
const DEFAULT_RETRIES: u32 = 1;
const USER_AGENT: &str = concat!("screener/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout: Duration,
    pub retries: u32,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retries: DEFAULT_RETRIES,
        }
    }
}

impl HttpOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();
        if let Some(secs) = env_parse::<u64>("PROVIDER_TIMEOUT_SECS") {
            out.timeout = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse::<u32>("PROVIDER_RETRIES") {
            out.retries = n.max(1);
        }
        out
    }
}

/// GET-and-decode JSON client shared by the provider adapters.
#[derive(Debug, Clone)]
pub struct HttpJsonClient {
    http: reqwest::Client,
    provider: &'static str,
    retries: u32,
}

impl HttpJsonClient {
    pub fn new(provider: &'static str, opts: &HttpOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(opts.timeout)
            .user_agent(USER_AGENT)
            .build()
            .with_context(|| format!("failed to build {provider} http client"))?;

        Ok(Self {
            http,
            provider,
            retries: opts.retries.max(1),
        })
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        self.get_json_with_headers(url, query, &[]).await
    }

    /// Like `get_json`, with extra request headers (session cookies and the like).
    pub async fn get_json_with_headers<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<T> {
        let raw = self.send_with_retries(url, query, headers).await?;
        self.decode(raw)
    }

    pub fn decode<T: DeserializeOwned>(&self, raw: Value) -> Result<T> {
        serde_json::from_value::<T>(raw).map_err(|err| {
            ProviderDiagnosticsError::new(self.provider, "decode", err.to_string()).into()
        })
    }

    pub async fn get_value(&self, url: &str, query: &[(&str, &str)]) -> Result<Value> {
        self.send_with_retries(url, query, &[]).await
    }

    /// Underlying client, for calls that do not return JSON.
    pub(crate) fn raw(&self) -> &reqwest::Client {
        &self.http
    }

    async fn send_with_retries(
        &self,
        url: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<Value> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.get_once(url, query, headers).await {
                Ok(v) => return Ok(v),
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(
                        provider = self.provider,
                        attempt,
                        ?backoff,
                        error = %err,
                        "provider request failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn get_once(
        &self,
        url: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<Value> {
        let mut req = self.http.get(url).query(query);
        for (name, value) in headers {
            req = req.header(*name, *value);
        }
        let res = req
            .send()
            .await
            .map_err(|err| ProviderDiagnosticsError::new(self.provider, "request", err.to_string()))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|err| ProviderDiagnosticsError::new(self.provider, "read", err.to_string()))?;

        if !status.is_success() {
            return Err(ProviderDiagnosticsError::new(
                self.provider,
                "http_status",
                format!("HTTP {status}: {}", truncate(&text, 200)),
            )
            .with_status(status.as_u16())
            .into());
        }

        serde_json::from_str::<Value>(&text).map_err(|err| {
            ProviderDiagnosticsError::new(
                self.provider,
                "decode",
                format!("response is not valid JSON ({err}): {}", truncate(&text, 200)),
            )
            .into()
        })
    }
}

pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
