//! Behaviour of a full ingestion run against scripted collaborators.
//!
//! The provider and sink are in-memory fakes so each scenario controls
//! exactly what upstream returns and can inspect what was persisted.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use histx_core::{
    run_pipeline, AggregateDataset, DateRange, FetchError, FetchOutcome, IngestConfig, IngestError,
    IngestionOrchestrator, MarketDataProvider, NormalizedRow, PersistenceSink,
    RateLimitedFetcher, RawBar, RawSeries, StaticSymbolSource, Symbol, SymbolSource,
};
use time::macros::date;

const JAN_2_OPEN: i64 = 1_704_205_800;
const DAY: i64 = 86_400;

#[derive(Clone)]
enum Script {
    Bars(usize),
    Upstream,
    Empty,
    Descending,
    Slow,
}

struct FakeProvider {
    scripts: HashMap<String, Script>,
    latency: Duration,
    observed: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeProvider {
    fn new(scripts: &[(&str, Script)]) -> Self {
        Self {
            scripts: scripts
                .iter()
                .map(|(symbol, script)| ((*symbol).to_owned(), script.clone()))
                .collect(),
            latency: Duration::from_millis(5),
            observed: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn observed(&self) -> Vec<String> {
        self.observed.lock().expect("observed lock").clone()
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

fn daily_bars(count: usize) -> RawSeries {
    let bars = (0..count)
        .map(|day| {
            let close = 100.0 + day as f64;
            RawBar {
                timestamp: JAN_2_OPEN + day as i64 * DAY,
                open: Some(close - 0.5),
                high: Some(close + 1.0),
                low: Some(close - 1.0),
                close: Some(close),
                volume: Some(1_000 + day as i64),
            }
        })
        .collect();
    RawSeries::new(0, bars)
}

impl MarketDataProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn get_history<'a>(
        &'a self,
        symbol: &'a Symbol,
        _range: DateRange,
    ) -> Pin<Box<dyn Future<Output = Result<RawSeries, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            self.observed
                .lock()
                .expect("observed lock")
                .push(symbol.to_string());

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;

            let script = self
                .scripts
                .get(symbol.as_str())
                .cloned()
                .unwrap_or(Script::Bars(1));
            let result = match script {
                Script::Bars(count) => Ok(daily_bars(count)),
                Script::Upstream => Err(FetchError::upstream("503 service unavailable")),
                Script::Empty => Ok(RawSeries::default()),
                Script::Descending => {
                    let mut series = daily_bars(3);
                    series.bars.reverse();
                    Ok(series)
                }
                Script::Slow => {
                    tokio::time::sleep(Duration::from_secs(3_600)).await;
                    Ok(daily_bars(1))
                }
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }
}

#[derive(Default)]
struct RecordingSink {
    fail: bool,
    replaced: Mutex<Vec<Vec<NormalizedRow>>>,
}

impl RecordingSink {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Vec<NormalizedRow>> {
        self.replaced.lock().expect("sink lock").clone()
    }
}

impl PersistenceSink for RecordingSink {
    fn describe(&self) -> String {
        String::from("memory")
    }

    fn replace(&self, dataset: &AggregateDataset) -> Result<(), IngestError> {
        if self.fail {
            return Err(IngestError::Persistence(String::from("disk full")));
        }
        self.replaced
            .lock()
            .expect("sink lock")
            .push(dataset.rows().to_vec());
        Ok(())
    }
}

struct OfflineSource;

impl SymbolSource for OfflineSource {
    fn describe(&self) -> String {
        String::from("offline")
    }

    fn symbols<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, IngestError>> + Send + 'a>> {
        Box::pin(async { Err(IngestError::SymbolSource(String::from("503 from wiki"))) })
    }
}

fn range() -> DateRange {
    DateRange::trailing_years(date!(2026 - 10 - 19), 11).expect("range")
}

fn symbols(raw: &[&str]) -> Vec<Symbol> {
    raw.iter()
        .map(|ticker| Symbol::from_ticker(ticker).expect("symbol"))
        .collect()
}

fn orchestrator(provider: Arc<FakeProvider>, workers: usize, slots: usize) -> IngestionOrchestrator {
    IngestionOrchestrator::new(RateLimitedFetcher::new(provider, slots), workers)
}

fn sorted_keys(rows: &[NormalizedRow]) -> Vec<(String, String)> {
    let mut keys = rows
        .iter()
        .map(|row| (row.symbol.to_string(), row.date.to_string()))
        .collect::<Vec<_>>();
    keys.sort();
    keys
}

// =============================================================================
// One outcome per symbol
// =============================================================================

#[tokio::test]
async fn every_symbol_yields_exactly_one_outcome() {
    // Given: a universe mixing healthy, failing, empty and malformed symbols
    let provider = Arc::new(FakeProvider::new(&[
        ("BAD", Script::Upstream),
        ("GONE", Script::Empty),
        ("WARP", Script::Descending),
    ]));
    let input = symbols(&["AAA", "BAD", "GONE", "WARP", "EEE", "FFF"]);

    // When: the orchestrator collects outcomes
    let outcomes = orchestrator(provider, 4, 2).collect(&input, range()).await;

    // Then: there is one outcome per input symbol, in input order
    assert_eq!(outcomes.len(), input.len());
    for (outcome, symbol) in outcomes.iter().zip(&input) {
        assert_eq!(outcome.symbol(), symbol);
    }
}

// =============================================================================
// Admission gate bound
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn upstream_concurrency_never_exceeds_slots() {
    for (workers, slots) in [(10, 1), (8, 3), (4, 4), (2, 5)] {
        // Given: many symbols and a provider that tracks overlapping calls
        let provider = Arc::new(FakeProvider::new(&[]));
        let tickers = (0..30).map(|n| format!("S{n}")).collect::<Vec<_>>();
        let input = tickers
            .iter()
            .map(|ticker| Symbol::parse(ticker).expect("symbol"))
            .collect::<Vec<_>>();
        let orchestrator = orchestrator(Arc::clone(&provider), workers, slots);

        // When: the run completes
        let result = orchestrator.run(&input, range()).await;

        // Then: neither the gate nor the provider ever saw more than K calls at once
        assert_eq!(result.succeeded, 30);
        let bound = slots.min(workers);
        assert!(provider.peak() <= bound, "peak {} > {bound}", provider.peak());
        assert!(orchestrator.fetcher().gate().peak_in_flight() <= slots);
        assert_eq!(orchestrator.fetcher().gate().in_flight(), 0);
        assert_eq!(orchestrator.fetcher().gate().available(), slots);
    }
}

#[tokio::test]
async fn default_config_serializes_upstream_calls() {
    // Given: the default configuration (W=10, K=1)
    let provider = Arc::new(FakeProvider::new(&[]));
    let orchestrator =
        IngestionOrchestrator::from_config(provider.clone(), &IngestConfig::default())
            .expect("valid config");
    let input = symbols(&["AAA", "BBB", "CCC", "DDD", "EEE"]);

    // When: the run completes
    orchestrator.run(&input, range()).await;

    // Then: upstream calls never overlapped
    assert_eq!(provider.peak(), 1);
}

// =============================================================================
// Normalized series invariants
// =============================================================================

#[tokio::test]
async fn normalized_rows_are_chronological_and_tagged() {
    // Given: two symbols with multi-day history
    let provider = Arc::new(FakeProvider::new(&[("AAA", Script::Bars(5)), ("BBB", Script::Bars(3))]));

    // When: the run completes
    let result = orchestrator(provider, 2, 1)
        .run(&symbols(&["AAA", "BBB"]), range())
        .await;

    // Then: per symbol, dates strictly increase and every row carries its symbol
    assert_eq!(result.dataset.len(), 8);
    for ticker in ["AAA", "BBB"] {
        let dates = result
            .dataset
            .rows()
            .iter()
            .filter(|row| row.symbol.as_str() == ticker)
            .map(|row| row.date)
            .collect::<Vec<_>>();
        assert!(dates.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(dates[0], date!(2024 - 01 - 02));
    }
}

#[tokio::test]
async fn misordered_series_is_surfaced_not_dropped() {
    // Given: a provider returning descending dates for one symbol
    let provider = Arc::new(FakeProvider::new(&[("WARP", Script::Descending)]));

    // When: the run completes
    let result = orchestrator(provider, 2, 1)
        .run(&symbols(&["AAA", "WARP"]), range())
        .await;

    // Then: the symbol is a malformed-data failure and contributes no rows
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].symbol.as_str(), "WARP");
    assert_eq!(result.failures[0].error.code(), "fetch.malformed_data");
    assert!(result.dataset.rows().iter().all(|row| row.symbol.as_str() == "AAA"));
}

// =============================================================================
// Symbol normalization
// =============================================================================

#[tokio::test]
async fn share_class_dot_is_rewritten_before_fetch() {
    // Given: a raw universe containing dotted share classes
    let provider = Arc::new(FakeProvider::new(&[]));
    let source = StaticSymbolSource::new(["BRK.B", "BF.B", "AAPL"]);
    let sink = RecordingSink::default();

    // When: the pipeline runs
    let report = run_pipeline(&source, &orchestrator(Arc::clone(&provider), 3, 1), &sink, range())
        .await
        .expect("run succeeds");

    // Then: the provider only ever saw hyphenated symbols
    let mut observed = provider.observed();
    observed.sort();
    assert_eq!(observed, vec!["AAPL", "BF-B", "BRK-B"]);
    assert!(observed.iter().all(|symbol| !symbol.contains('.')));
    assert_eq!(report.attempted, 3);
}

// =============================================================================
// Partial failure scenarios
// =============================================================================

#[tokio::test]
async fn one_upstream_failure_does_not_block_the_rest() {
    // Given: AAA and CCC succeed with one row, BBB fails upstream
    let provider = Arc::new(FakeProvider::new(&[
        ("AAA", Script::Bars(1)),
        ("BBB", Script::Upstream),
        ("CCC", Script::Bars(1)),
    ]));
    let source = StaticSymbolSource::new(["AAA", "BBB", "CCC"]);
    let sink = RecordingSink::default();

    // When: the pipeline runs
    let report = run_pipeline(&source, &orchestrator(provider, 10, 1), &sink, range())
        .await
        .expect("partial failure is still a successful run");

    // Then: exactly two rows are persisted by a single replace
    let calls = sink.calls();
    assert_eq!(calls.len(), 1);
    let mut persisted = calls[0]
        .iter()
        .map(|row| row.symbol.to_string())
        .collect::<Vec<_>>();
    persisted.sort();
    assert_eq!(persisted, vec!["AAA", "CCC"]);

    // And: the failure list names BBB with an upstream cause
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].symbol, "BBB");
    assert_eq!(report.failures[0].code, "fetch.upstream");
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.rows, 2);
}

#[tokio::test]
async fn all_failures_still_clear_the_table() {
    // Given: every symbol fails upstream
    let provider = Arc::new(FakeProvider::new(&[
        ("AAA", Script::Upstream),
        ("BBB", Script::Upstream),
    ]));
    let source = StaticSymbolSource::new(["AAA", "BBB"]);
    let sink = RecordingSink::default();

    // When: the pipeline runs
    let report = run_pipeline(&source, &orchestrator(provider, 2, 1), &sink, range())
        .await
        .expect("run succeeds");

    // Then: replace is called once with zero rows and the run is detectably empty
    let calls = sink.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].is_empty());
    assert_eq!(report.failed(), 2);
    assert!(report.nothing_collected());
}

#[tokio::test]
async fn empty_universe_replaces_with_zero_rows() {
    // Given: a symbol source with no tickers
    let provider = Arc::new(FakeProvider::new(&[]));
    let source = StaticSymbolSource::default();
    let sink = RecordingSink::default();

    // When: the pipeline runs
    let report = run_pipeline(&source, &orchestrator(Arc::clone(&provider), 4, 1), &sink, range())
        .await
        .expect("empty universe is not an error");

    // Then: nothing is fetched, no failures, and replace still runs once
    assert!(provider.observed().is_empty());
    assert!(report.failures.is_empty());
    assert_eq!(report.attempted, 0);
    let calls = sink.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].is_empty());
}

#[tokio::test]
async fn empty_series_is_counted_apart_from_failures() {
    // Given: a delisted symbol with no data in range
    let provider = Arc::new(FakeProvider::new(&[("GONE", Script::Empty)]));
    let source = StaticSymbolSource::new(["AAA", "GONE"]);
    let sink = RecordingSink::default();

    // When: the pipeline runs
    let report = run_pipeline(&source, &orchestrator(provider, 2, 1), &sink, range())
        .await
        .expect("run succeeds");

    // Then: it is reported as empty, not failed
    assert_eq!(report.empty, vec!["GONE"]);
    assert!(report.failures.is_empty());
    assert_eq!(report.succeeded, 1);
}

// =============================================================================
// Run-level failures
// =============================================================================

#[tokio::test]
async fn unavailable_universe_aborts_before_any_write() {
    // Given: a symbol source that cannot be reached
    let provider = Arc::new(FakeProvider::new(&[]));
    let sink = RecordingSink::default();

    // When: the pipeline runs
    let error = run_pipeline(&OfflineSource, &orchestrator(Arc::clone(&provider), 2, 1), &sink, range())
        .await
        .expect_err("run must fail");

    // Then: the run fails without fetching or persisting
    assert!(matches!(error, IngestError::SymbolSource(_)));
    assert!(provider.observed().is_empty());
    assert!(sink.calls().is_empty());
}

#[tokio::test]
async fn persistence_failure_fails_the_run() {
    // Given: a sink whose write fails
    let provider = Arc::new(FakeProvider::new(&[]));
    let source = StaticSymbolSource::new(["AAA"]);
    let sink = RecordingSink::failing();

    // When: the pipeline runs
    let error = run_pipeline(&source, &orchestrator(provider, 2, 1), &sink, range())
        .await
        .expect_err("run must fail");

    // Then: the run reports a persistence failure rather than success
    assert!(matches!(error, IngestError::Persistence(_)));
    assert_eq!(error.code(), "ingest.persistence");
}

// =============================================================================
// Determinism and deadlines
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn identical_inputs_produce_identical_datasets() {
    // Given: the same universe and provider responses twice
    let scripts = [
        ("AAA", Script::Bars(4)),
        ("BBB", Script::Upstream),
        ("CCC", Script::Bars(2)),
        ("DDD", Script::Bars(7)),
    ];
    let input = symbols(&["AAA", "BBB", "CCC", "DDD"]);

    // When: the run happens twice with parallel workers
    let first = orchestrator(Arc::new(FakeProvider::new(&scripts)), 4, 3)
        .run(&input, range())
        .await;
    let second = orchestrator(Arc::new(FakeProvider::new(&scripts)), 4, 3)
        .run(&input, range())
        .await;

    // Then: the datasets match row for row once keyed by (symbol, date)
    assert_eq!(sorted_keys(first.dataset.rows()), sorted_keys(second.dataset.rows()));
    assert_eq!(first.dataset, second.dataset);
    assert_eq!(first.failures, second.failures);
}

#[tokio::test(start_paused = true)]
async fn run_deadline_records_unsettled_symbols_as_timeouts() {
    // Given: one symbol whose provider call outlives the run deadline
    let provider = Arc::new(FakeProvider::new(&[("SLOW", Script::Slow)]));
    let config = IngestConfig {
        workers: 3,
        upstream_slots: 3,
        request_timeout: Duration::from_secs(7_200),
        run_timeout: Some(Duration::from_secs(60)),
        ..IngestConfig::default()
    };
    let orchestrator = IngestionOrchestrator::from_config(provider, &config).expect("config");
    let source = StaticSymbolSource::new(["AAA", "SLOW", "CCC"]);
    let sink = RecordingSink::default();

    // When: the pipeline runs
    let report = run_pipeline(&source, &orchestrator, &sink, range())
        .await
        .expect("run succeeds");

    // Then: the slow symbol is a timeout failure and the others are persisted
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].symbol, "SLOW");
    assert_eq!(report.failures[0].code, "fetch.run_timeout");
    assert_eq!(sink.calls().len(), 1);
    assert_eq!(sink.calls()[0].len(), 2);
}

#[tokio::test(start_paused = true)]
async fn run_deadline_leaves_gate_intact_and_starts_no_new_calls() {
    // Given: five workers behind one upstream slot and calls slower than the deadline
    let provider = Arc::new(FakeProvider::new(&[]).with_latency(Duration::from_secs(10)));
    let orchestrator = orchestrator(Arc::clone(&provider), 5, 1)
        .with_run_timeout(Some(Duration::from_secs(5)));
    let input = symbols(&["AAA", "BBB", "CCC", "DDD", "EEE", "FFF", "GGG", "HHH"]);

    // When: the run hits its deadline with workers still queued for the slot
    let outcomes = orchestrator.collect(&input, range()).await;
    let calls_at_deadline = provider.observed().len();

    // Then: every symbol timed out and only the call already in flight was made
    assert_eq!(outcomes.len(), 8);
    assert!(outcomes.iter().all(|outcome| matches!(
        outcome,
        FetchOutcome::Failure(failure) if failure.error == FetchError::RunTimeout
    )));
    assert_eq!(calls_at_deadline, 1);

    // And: once the straggler settles, the slot is back and no further calls happened
    tokio::time::sleep(Duration::from_secs(600)).await;
    let gate = orchestrator.fetcher().gate();
    assert_eq!(provider.observed().len(), calls_at_deadline);
    assert_eq!(gate.available(), 1);
    assert_eq!(gate.in_flight(), 0);
}

/// Write that only completes once another runtime task has run.
struct HandshakeSink;

impl PersistenceSink for HandshakeSink {
    fn describe(&self) -> String {
        String::from("handshake")
    }

    fn replace(&self, _dataset: &AggregateDataset) -> Result<(), IngestError> {
        let (tx, rx) = std::sync::mpsc::channel();
        tokio::spawn(async move {
            let _ = tx.send(());
        });
        rx.recv_timeout(Duration::from_secs(5))
            .map_err(|_| IngestError::Persistence(String::from("runtime stalled during write")))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn table_write_keeps_the_runtime_responsive() {
    // Given: a pipeline running on the only runtime worker
    let provider = Arc::new(FakeProvider::new(&[]));
    let orchestrator = orchestrator(provider, 2, 1);

    // When: the sink blocks until another task gets scheduled
    let report = tokio::spawn(async move {
        let source = StaticSymbolSource::new(["AAA", "BBB"]);
        let sink = HandshakeSink;
        run_pipeline(&source, &orchestrator, &sink, range()).await
    })
    .await
    .expect("pipeline task")
    .expect("write completes while other tasks run");

    // Then: the run finished normally
    assert_eq!(report.succeeded, 2);
}
