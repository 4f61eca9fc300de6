use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::provider::MarketDataProvider;
use crate::{DateRange, FetchError, RawBar, RawSeries, Symbol};

const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i32,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteColumns>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteColumns {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

/// Daily history from the Yahoo Finance v8 chart endpoint.
#[derive(Clone)]
pub struct YahooChartProvider {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    request_timeout: Duration,
}

impl Default for YahooChartProvider {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestHttpClient::new()))
    }
}

impl YahooChartProvider {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            base_url: String::from(DEFAULT_BASE_URL),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn chart_url(&self, symbol: &Symbol, range: DateRange) -> String {
        format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d&events=history",
            self.base_url,
            urlencoding::encode(symbol.as_str()),
            range.start_epoch(),
            range.end_epoch_exclusive(),
        )
    }

    async fn fetch_chart(&self, symbol: &Symbol, range: DateRange) -> Result<RawSeries, FetchError> {
        let request = HttpRequest::get(self.chart_url(symbol, range))
            .with_header("accept", "application/json")
            .with_header("referer", "https://finance.yahoo.com/")
            .with_timeout(self.request_timeout);

        let response = self.http_client.execute(request).await.map_err(|e| {
            FetchError::Upstream {
                message: format!("yahoo transport error: {}", e.message()),
                retryable: e.retryable(),
            }
        })?;

        // Unknown and delisted tickers come back as 404 with a chart error body.
        if response.status == 404 {
            return Err(FetchError::EmptySeries);
        }
        if !response.is_success() {
            return Err(FetchError::Upstream {
                message: format!("yahoo returned status {}", response.status),
                retryable: response.status == 429 || response.status >= 500,
            });
        }

        parse_chart(response.body.as_str())
    }
}

impl MarketDataProvider for YahooChartProvider {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    fn get_history<'a>(
        &'a self,
        symbol: &'a Symbol,
        range: DateRange,
    ) -> Pin<Box<dyn Future<Output = Result<RawSeries, FetchError>> + Send + 'a>> {
        Box::pin(self.fetch_chart(symbol, range))
    }
}

/// Decode a chart payload into a raw series, one bar per timestamp.
pub fn parse_chart(body: &str) -> Result<RawSeries, FetchError> {
    let response: ChartResponse = serde_json::from_str(body).map_err(|e| FetchError::Upstream {
        message: format!("yahoo response is not a chart payload: {e}"),
        retryable: false,
    })?;

    if let Some(error) = response.chart.error {
        if error.code == "Not Found" {
            return Err(FetchError::EmptySeries);
        }
        return Err(FetchError::Upstream {
            message: format!(
                "yahoo chart error {}: {}",
                error.code,
                error.description.unwrap_or_default()
            ),
            retryable: false,
        });
    }

    let Some(data) = response.chart.result.and_then(|r| r.into_iter().next()) else {
        return Err(FetchError::EmptySeries);
    };

    let timestamps = data.timestamp.unwrap_or_default();
    if timestamps.is_empty() {
        return Err(FetchError::EmptySeries);
    }

    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();
    let bars = timestamps
        .iter()
        .enumerate()
        .map(|(index, &timestamp)| RawBar {
            timestamp,
            open: value_at(&quote.open, index),
            high: value_at(&quote.high, index),
            low: value_at(&quote.low, index),
            close: value_at(&quote.close, index),
            volume: value_at(&quote.volume, index),
        })
        .collect();

    Ok(RawSeries::new(data.meta.gmtoffset, bars))
}

// Yahoo sometimes returns indicator columns shorter than the timestamp list.
fn value_at<T: Copy>(values: &[Option<T>], index: usize) -> Option<T> {
    values.get(index).copied().flatten()
}
