//! Wire contract of the Yahoo chart provider, exercised through a scripted
//! transport so no network access is needed.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use histx_core::{
    normalize, DateRange, FetchError, HttpClient, HttpError, HttpRequest, HttpResponse,
    MarketDataProvider, RateLimitedFetcher, Symbol, YahooChartProvider,
};
use time::macros::date;

const CHART_BODY: &str = r#"{"chart":{"result":[{
  "meta":{"currency":"USD","symbol":"BRK-B","exchangeName":"NYQ","gmtoffset":-18000,"timezone":"EST"},
  "timestamp":[1704205800,1704292200,1704378600],
  "indicators":{"quote":[{
    "open":[362.0,362.3,null],
    "high":[364.1,363.9,null],
    "low":[360.6,359.7,null],
    "close":[362.5,360.1,null],
    "volume":[3455500,3166000,null]}]}}],
  "error":null}}"#;

struct ScriptedTransport {
    response: Result<HttpResponse, HttpError>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    fn responding(status: u16, body: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Ok(HttpResponse::new(status, body)),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn failing(error: HttpError) -> Arc<Self> {
        Arc::new(Self {
            response: Err(error),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn last_request(&self) -> HttpRequest {
        self.requests
            .lock()
            .expect("requests lock")
            .last()
            .cloned()
            .expect("a request was sent")
    }
}

impl HttpClient for ScriptedTransport {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.requests.lock().expect("requests lock").push(request);
        let response = self.response.clone();
        Box::pin(async move { response })
    }
}

fn range() -> DateRange {
    DateRange::trailing_years(date!(2024 - 01 - 05), 1).expect("range")
}

fn brk_b() -> Symbol {
    Symbol::from_ticker("BRK.B").expect("symbol")
}

#[tokio::test]
async fn requests_daily_chart_for_the_shared_range() {
    let transport = ScriptedTransport::responding(200, CHART_BODY);
    let provider = YahooChartProvider::new(transport.clone()).with_base_url("https://chart.test/");

    provider
        .get_history(&brk_b(), range())
        .await
        .expect("history");

    let request = transport.last_request();
    assert_eq!(
        request.url,
        "https://chart.test/v8/finance/chart/BRK-B?period1=1672876800&period2=1704499200&interval=1d&events=history"
    );
    assert_eq!(
        request.headers.get("accept").map(String::as_str),
        Some("application/json")
    );
}

#[tokio::test]
async fn parses_chart_into_raw_series() {
    let provider = YahooChartProvider::new(ScriptedTransport::responding(200, CHART_BODY));

    let series = provider
        .get_history(&brk_b(), range())
        .await
        .expect("history");

    assert_eq!(series.utc_offset_secs, -18_000);
    assert_eq!(series.bars.len(), 3);
    assert_eq!(series.bars[0].close, Some(362.5));
    assert!(series.bars[2].is_blank());
}

#[tokio::test]
async fn chart_normalizes_to_exchange_days() {
    let fetcher = RateLimitedFetcher::new(
        Arc::new(YahooChartProvider::new(ScriptedTransport::responding(200, CHART_BODY))),
        1,
    );

    let raw = fetcher.fetch(&brk_b(), range()).await.expect("fetch");
    let series = normalize(raw, &brk_b()).expect("normalize");

    let dates = series.rows().iter().map(|row| row.date).collect::<Vec<_>>();
    assert_eq!(dates, vec![date!(2024 - 01 - 02), date!(2024 - 01 - 03)]);
    assert!(series.rows().iter().all(|row| row.symbol.as_str() == "BRK-B"));
}

#[tokio::test]
async fn not_found_status_is_empty_series() {
    let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
    let provider = YahooChartProvider::new(ScriptedTransport::responding(404, body));

    let error = provider
        .get_history(&brk_b(), range())
        .await
        .expect_err("must fail");

    assert_eq!(error, FetchError::EmptySeries);
}

#[tokio::test]
async fn throttling_and_server_errors_are_retryable_upstream_errors() {
    for status in [429, 500, 503] {
        let provider = YahooChartProvider::new(ScriptedTransport::responding(status, ""));

        let error = provider
            .get_history(&brk_b(), range())
            .await
            .expect_err("must fail");

        assert!(
            matches!(error, FetchError::Upstream { retryable: true, .. }),
            "status {status}: {error:?}"
        );
    }
}

#[tokio::test]
async fn client_errors_are_terminal_upstream_errors() {
    let provider = YahooChartProvider::new(ScriptedTransport::responding(401, "Unauthorized"));

    let error = provider
        .get_history(&brk_b(), range())
        .await
        .expect_err("must fail");

    assert!(matches!(error, FetchError::Upstream { retryable: false, .. }));
}

#[tokio::test]
async fn transport_failure_is_upstream_error() {
    let provider = YahooChartProvider::new(ScriptedTransport::failing(HttpError::new(
        "connection failed: dns error",
    )));

    let error = provider
        .get_history(&brk_b(), range())
        .await
        .expect_err("must fail");

    assert_eq!(error.code(), "fetch.upstream");
    assert!(error.to_string().contains("dns error"));
}
