//! Rate-limited HTTP client.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, USER_AGENT};
use sync_core::{Coin, Error, Result, DATE_FORMAT};
use telemetry::metrics;
use tracing::{debug, info};
use url::Url;

use crate::api::MarketDataApi;
use crate::config::CoinGeckoConfig;
use crate::types::{decode, parse_coin_list, CoinStatus, MarketChart};

const CLIENT_USER_AGENT: &str = concat!("market-sync/", env!("CARGO_PKG_VERSION"));

/// CoinGecko client. Clones share the HTTP connection pool and the token
/// bucket.
#[derive(Clone)]
pub struct CoinGeckoClient {
    http: reqwest::Client,
    base_url: Url,
    limiter: Arc<DefaultDirectRateLimiter>,
    config: CoinGeckoConfig,
}

impl CoinGeckoClient {
    /// Creates a new client.
    pub fn new(config: CoinGeckoConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| Error::config(format!("invalid base url {}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::config(format!("base url {} cannot be a base", base_url)));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        if !config.api_key.is_empty() {
            let name = HeaderName::from_bytes(config.api_key_header.as_bytes())
                .map_err(|e| Error::config(format!("invalid api key header: {}", e)))?;
            let mut value = HeaderValue::from_str(&config.api_key)
                .map_err(|e| Error::config(format!("invalid api key: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("failed to build http client: {}", e)))?;

        let limiter = Arc::new(RateLimiter::direct(quota(
            config.requests_per_second,
            config.burst,
        )?));

        info!(
            base_url = %base_url,
            rps = config.requests_per_second,
            burst = config.burst,
            authenticated = !config.api_key.is_empty(),
            "Created CoinGecko client"
        );

        Ok(Self {
            http,
            base_url,
            limiter,
            config,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CoinGeckoConfig {
        &self.config
    }

    /// Base URL extended with path segments; segments are percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Waits for a token, sends a GET, and returns status and body.
    async fn get_raw(&self, url: Url) -> Result<(u16, String)> {
        self.limiter.until_ready().await;

        metrics().fetch_requests.inc();
        let start = Instant::now();

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::network(format!("GET {}: {}", url.path(), e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::network(format!("reading body of {}: {}", url.path(), e)))?;

        metrics()
            .fetch_latency_ms
            .observe(start.elapsed().as_millis() as u64);

        if status >= 400 {
            return Err(Error::http(status, body));
        }

        debug!(path = url.path(), status = status, bytes = body.len(), "CoinGecko response");
        Ok((status, body))
    }
}

/// Token bucket for a fractional request rate.
fn quota(requests_per_second: f64, burst: u32) -> Result<Quota> {
    if !(requests_per_second.is_finite() && requests_per_second > 0.0) {
        return Err(Error::config(format!(
            "requests per second must be positive, got {}",
            requests_per_second
        )));
    }
    let burst = NonZeroU32::new(burst).ok_or_else(|| Error::config("burst must be at least 1"))?;
    let period = Duration::try_from_secs_f64(1.0 / requests_per_second).map_err(|e| {
        Error::config(format!("request rate {} out of range: {}", requests_per_second, e))
    })?;
    let quota = Quota::with_period(period)
        .ok_or_else(|| Error::config("request rate too high"))?
        .allow_burst(burst);
    Ok(quota)
}

#[async_trait]
impl MarketDataApi for CoinGeckoClient {
    async fn list_coins(&self, status: CoinStatus) -> Result<Vec<Coin>> {
        let mut url = self.endpoint(&["coins", "list"]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("include_platform", "false");
            if let Some(value) = status.query_value() {
                query.append_pair("status", value);
            }
        }

        let (code, body) = self.get_raw(url).await?;
        parse_coin_list(code, &body)
    }

    async fn fetch_range(
        &self,
        coin_id: &str,
        vs_currency: &str,
        from: NaiveDate,
        to: NaiveDate,
        interval: &str,
    ) -> Result<MarketChart> {
        let mut url = self.endpoint(&["coins", coin_id, "market_chart", "range"]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("vs_currency", vs_currency);
            query.append_pair("from", &from.format(DATE_FORMAT).to_string());
            query.append_pair("to", &to.format(DATE_FORMAT).to_string());
            if !interval.is_empty() {
                query.append_pair("interval", interval);
            }
        }

        let (code, body) = self.get_raw(url).await?;
        decode(code, &body)
    }
}
