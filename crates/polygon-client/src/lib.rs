use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use portfolio_core::{Bar, BarSource, PortfolioError, Series};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const DEFAULT_BASE_URL: &str = "https://api.polygon.io";

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            // Remove timestamps outside the window
            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }
            let oldest = ts.front().copied().unwrap_or(now);

            // Wait until the oldest request falls out of the window
            let sleep_dur = (oldest + self.window).duration_since(now) + Duration::from_millis(50);
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.1}s for Polygon API slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// One sliding window per API key, since Polygon enforces its quota per key.
#[derive(Clone)]
struct KeyedRateLimiter {
    limiters: Arc<Mutex<HashMap<String, RateLimiter>>>,
    max_requests: usize,
    window: Duration,
}

impl KeyedRateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            limiters: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    async fn acquire(&self, api_key: &str) {
        let limiter = {
            let mut limiters = self.limiters.lock().await;
            limiters
                .entry(api_key.to_string())
                .or_insert_with(|| RateLimiter::new(self.max_requests, self.window))
                .clone()
        };
        limiter.acquire().await;
    }
}

#[derive(Clone)]
pub struct PolygonClient {
    api_key: String,
    base_url: String,
    client: Client,
    rate_limiter: KeyedRateLimiter,
}

impl PolygonClient {
    pub fn new(api_key: String) -> Self {
        // Free tier allows 5 req/min; paid plans should raise POLYGON_RATE_LIMIT.
        let rate_limit: usize = std::env::var("POLYGON_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
            rate_limiter: KeyedRateLimiter::new(rate_limit, Duration::from_secs(60)),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_rate_limit(mut self, max_per_minute: usize) -> Self {
        self.rate_limiter = KeyedRateLimiter::new(max_per_minute, Duration::from_secs(60));
        self
    }

    /// Same connection pool, different caller key. Each key is throttled on its own window.
    pub fn with_api_key(&self, api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..self.clone()
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Send a request once, after waiting for a rate-limit slot.
    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, PortfolioError> {
        self.rate_limiter.acquire(&self.api_key).await;
        builder
            .send()
            .await
            .map_err(|e| PortfolioError::ApiError(e.without_url().to_string()))
    }

    /// Decode a JSON body. Polygon reports most failures as JSON on a non-2xx status,
    /// so the body is decoded whenever possible and the caller inspects it.
    async fn get_json<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder) -> Result<T, PortfolioError> {
        let response = self.send_request(builder).await?;
        let status = response.status();

        if status.as_u16() == 429 {
            tracing::warn!("Polygon rate limited the request (HTTP 429)");
            return Err(PortfolioError::ApiError("Rate limited by Polygon (HTTP 429)".to_string()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PortfolioError::ApiError(e.without_url().to_string()))?;

        serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                PortfolioError::ApiError(format!("Invalid response: {}", e))
            } else {
                PortfolioError::ApiError(format!("HTTP {}: {}", status, body))
            }
        })
    }

    /// Get aggregates (bars) for a symbol
    pub async fn get_aggregates(
        &self,
        symbol: &str,
        multiplier: u32,
        timespan: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>, PortfolioError> {
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
            self.base_url,
            ticker_segment(symbol)?,
            multiplier,
            timespan,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        let agg_response: AggregateResponse = self
            .get_json(self.client.get(&url).query(&[
                ("adjusted", "true"),
                ("sort", "asc"),
                ("apiKey", self.api_key.as_str()),
            ]))
            .await?;

        agg_response.into_bars(symbol)
    }

    /// Daily bars for `symbol` between `from` and `to` inclusive
    pub async fn get_daily_series(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Series, PortfolioError> {
        let bars = self.get_aggregates(symbol, 1, "day", from, to).await?;
        tracing::debug!("Fetched {} daily bars for {}", bars.len(), symbol);
        Ok(Series::new(symbol, bars))
    }

    /// Check that a symbol exists by asking for its previous close
    pub async fn validate_symbol(&self, symbol: &str) -> Result<bool, PortfolioError> {
        let url = format!("{}/v2/aggs/ticker/{}/prev", self.base_url, ticker_segment(symbol)?);

        let prev: PrevCloseResponse = self
            .get_json(self.client.get(&url).query(&[
                ("adjusted", "true"),
                ("apiKey", self.api_key.as_str()),
            ]))
            .await?;

        Ok(prev.is_valid())
    }

    /// Search active tickers by symbol or company name
    pub async fn search_tickers(&self, text: &str, limit: usize) -> Result<Vec<TickerMatch>, PortfolioError> {
        let url = format!("{}/v3/reference/tickers", self.base_url);
        let limit = limit.to_string();

        let body: TickerSearchResponse = self
            .get_json(self.client.get(&url).query(&[
                ("search", text),
                ("active", "true"),
                ("sort", "ticker"),
                ("order", "asc"),
                ("limit", limit.as_str()),
                ("apiKey", self.api_key.as_str()),
            ]))
            .await?;

        Ok(body.into_matches())
    }
}

#[async_trait]
impl BarSource for PolygonClient {
    async fn daily_series(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Series, PortfolioError> {
        self.get_daily_series(symbol, from, to).await
    }
}

/// Tickers are placed in the URL path, so only characters Polygon uses in tickers
/// (letters, digits, `.`, `-`, and `:` for crypto/forex prefixes) are accepted.
fn ticker_segment(symbol: &str) -> Result<&str, PortfolioError> {
    let valid = !symbol.is_empty()
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'));
    if valid {
        Ok(symbol)
    } else {
        Err(PortfolioError::InvalidSymbol(symbol.to_string()))
    }
}

// Response structures
#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    results: Option<Vec<AggregateResult>>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AggregateResult {
    t: i64, // timestamp (ms)
    o: f64, // open
    h: f64, // high
    l: f64, // low
    c: f64, // close
    v: f64, // volume
    #[serde(default)]
    vw: Option<f64>, // volume-weighted average price
}

impl AggregateResponse {
    fn into_bars(self, symbol: &str) -> Result<Vec<Bar>, PortfolioError> {
        let Some(results) = self.results else {
            let reason = self
                .error
                .or(self.message)
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(PortfolioError::MissingResults {
                symbol: symbol.to_string(),
                reason,
            });
        };

        results
            .into_iter()
            .map(|r| {
                let date = DateTime::from_timestamp_millis(r.t)
                    .map(|dt| dt.date_naive())
                    .ok_or_else(|| {
                        PortfolioError::InvalidData(format!("{}: bad timestamp {}", symbol, r.t))
                    })?;
                Ok(Bar {
                    date,
                    open: r.o,
                    high: r.h,
                    low: r.l,
                    close: r.c,
                    volume: r.v,
                    vwap: r.vw,
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct PrevCloseResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    results: Option<serde_json::Value>,
}

impl PrevCloseResponse {
    fn is_valid(&self) -> bool {
        self.status.as_deref() == Some("OK") || self.results.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct TickerSearchResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    results: Option<Vec<TickerSearchEntry>>,
}

#[derive(Debug, Deserialize)]
struct TickerSearchEntry {
    ticker: String,
    #[serde(default)]
    name: String,
}

impl TickerSearchResponse {
    fn into_matches(self) -> Vec<TickerMatch> {
        let ok = self.status.as_deref() == Some("OK") || self.results.is_some();
        if !ok {
            return Vec::new();
        }
        self.results
            .unwrap_or_default()
            .into_iter()
            .map(|r| TickerMatch {
                symbol: r.ticker,
                name: r.name,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerMatch {
    pub symbol: String,
    pub name: String,
}
