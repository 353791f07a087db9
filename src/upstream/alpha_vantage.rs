//! Alpha Vantage daily time series client.
//!
//! # Responsibilities
//! - Build `TIME_SERIES_DAILY` queries against the configured endpoint
//! - Enforce the whole-request deadline
//! - Classify provider error payloads (errors, rate-limit notices)
//! - Reduce the series to the most recent closes and their average

use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

use crate::config::schema::UpstreamConfig;
use crate::fetch::{FetchError, FetchResult, RawFetch};
use crate::upstream::types::{PricePoint, StockData, StockRequest};

const FUNCTION: &str = "TIME_SERIES_DAILY";

/// Raw provider payload. Only the fields we act on.
#[derive(Debug, Deserialize)]
struct DailySeriesResponse {
    #[serde(rename = "Time Series (Daily)", default)]
    time_series: BTreeMap<String, DailyBar>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DailyBar {
    #[serde(rename = "4. close", default)]
    close: String,
}

/// HTTP client for the daily price series.
#[derive(Clone)]
pub struct AlphaVantageClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    timeout: Duration,
}

impl AlphaVantageClient {
    pub fn new(config: &UpstreamConfig) -> FetchResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            FetchError::Transport(format!("invalid upstream URL '{}': {}", config.base_url, e))
        })?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        tracing::info!(
            base_url = %base_url,
            timeout_secs = config.timeout_secs,
            "Upstream client initialized"
        );

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
            timeout: config.timeout(),
        })
    }

    /// Fetch and reduce the daily series for `request`.
    pub async fn fetch_daily(&self, request: &StockRequest) -> FetchResult<StockData> {
        tracing::info!(symbol = %request.symbol(), ndays = request.ndays(), "Calling upstream");

        let body = match timeout(self.timeout, self.fetch_body(request.symbol())).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(symbol = %request.symbol(), "Upstream request timed out");
                return Err(FetchError::Timeout(self.timeout));
            }
        };

        parse_daily_series(request.symbol(), request.ndays(), &body)
    }

    async fn fetch_body(&self, symbol: &str) -> FetchResult<Vec<u8>> {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("function", FUNCTION)
            .append_pair("symbol", symbol)
            .append_pair("apikey", &self.api_key);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(symbol = %symbol, status = status.as_u16(), "Upstream returned error status");
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        Ok(body.to_vec())
    }

    /// The URL carries the API key, so it is stripped before the error is rendered.
    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transport(err.without_url().to_string())
        }
    }
}

impl RawFetch for AlphaVantageClient {
    type Request = StockRequest;
    type Output = Arc<StockData>;

    async fn fetch(&self, request: &StockRequest) -> FetchResult<Arc<StockData>> {
        self.fetch_daily(request).await.map(Arc::new)
    }
}

/// Decode a provider body and reduce it to [`StockData`].
pub fn parse_daily_series(symbol: &str, ndays: u32, body: &[u8]) -> FetchResult<StockData> {
    let response: DailySeriesResponse =
        serde_json::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))?;

    if let Some(message) = response.error_message {
        tracing::error!(symbol = %symbol, error = %message, "Upstream API error");
        return Err(FetchError::Api(message));
    }

    let notice = response.note.or(response.information);
    if let Some(notice) = &notice {
        tracing::warn!(symbol = %symbol, note = %notice, "Upstream notice");
    }

    if response.time_series.is_empty() {
        return Err(match notice {
            Some(notice) => FetchError::RateLimited(notice),
            None => FetchError::NoData,
        });
    }

    let closes = response
        .time_series
        .into_iter()
        .map(|(date, bar)| (date, bar.close));
    reduce_series(symbol, ndays, closes)
}

/// Keep the `ndays` most recent dates, skip unparseable closes, average the rest.
///
/// Fewer available days than requested is not an error; the result's `ndays`
/// reports how many valid prices were used.
fn reduce_series<I>(symbol: &str, ndays: u32, closes: I) -> FetchResult<StockData>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut dated: Vec<(String, String)> = closes.into_iter().collect();
    // ISO dates sort lexicographically; newest first
    dated.sort_by(|a, b| b.0.cmp(&a.0));

    let prices: Vec<PricePoint> = dated
        .into_iter()
        .take(ndays as usize)
        .filter_map(|(date, raw)| match raw.trim().parse::<f64>() {
            Ok(close) if close.is_finite() => Some(PricePoint { date, close }),
            _ => {
                tracing::warn!(symbol = %symbol, date = %date, close = %raw, "Skipping unparseable close price");
                None
            }
        })
        .collect();

    if prices.is_empty() {
        return Err(FetchError::NoValidPrices);
    }

    let average = prices.iter().map(|p| p.close).sum::<f64>() / prices.len() as f64;

    Ok(StockData {
        symbol: symbol.to_string(),
        ndays: prices.len() as u32,
        prices,
        average,
    })
}
