use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::fetcher::RateLimitedFetcher;
use crate::normalizer::normalize;
use crate::provider::MarketDataProvider;
use crate::throttling::UpstreamQuota;
use crate::{
    AggregateDataset, DateRange, FetchError, IngestConfig, NormalizedSeries, Symbol,
    ValidationError,
};

#[derive(Debug, Clone, PartialEq)]
pub struct FetchFailure {
    pub symbol: Symbol,
    pub error: FetchError,
}

/// Exactly one per input symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(NormalizedSeries),
    Failure(FetchFailure),
}

impl FetchOutcome {
    pub fn symbol(&self) -> &Symbol {
        match self {
            Self::Success(series) => series.symbol(),
            Self::Failure(failure) => &failure.symbol,
        }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Outcomes of a run partitioned by tag, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestResult {
    pub dataset: AggregateDataset,
    pub attempted: usize,
    pub succeeded: usize,
    /// Symbols the provider had no data for. Not failures.
    pub empty: Vec<Symbol>,
    pub failures: Vec<FetchFailure>,
}

impl IngestResult {
    pub fn partition(outcomes: Vec<FetchOutcome>) -> Self {
        let attempted = outcomes.len();
        let mut series = Vec::new();
        let mut empty = Vec::new();
        let mut failures = Vec::new();

        for outcome in outcomes {
            match outcome {
                FetchOutcome::Success(normalized) => series.push(normalized),
                FetchOutcome::Failure(FetchFailure {
                    symbol,
                    error: FetchError::EmptySeries,
                }) => empty.push(symbol),
                FetchOutcome::Failure(failure) => failures.push(failure),
            }
        }

        Self {
            succeeded: series.len(),
            dataset: AggregateDataset::from_series(series),
            attempted,
            empty,
            failures,
        }
    }

    /// True when symbols were attempted and none produced rows.
    pub fn nothing_collected(&self) -> bool {
        self.attempted > 0 && self.succeeded == 0
    }
}

/// Fans symbols out over a fixed pool of worker tasks.
#[derive(Clone)]
pub struct IngestionOrchestrator {
    fetcher: RateLimitedFetcher,
    workers: usize,
    run_timeout: Option<Duration>,
}

impl IngestionOrchestrator {
    pub fn new(fetcher: RateLimitedFetcher, workers: usize) -> Self {
        Self {
            fetcher,
            workers: workers.max(1),
            run_timeout: None,
        }
    }

    pub fn from_config(
        provider: Arc<dyn MarketDataProvider>,
        config: &IngestConfig,
    ) -> Result<Self, ValidationError> {
        config.validate()?;

        let mut fetcher = RateLimitedFetcher::new(provider, config.upstream_slots)
            .with_request_timeout(config.request_timeout);
        if let Some(policy) = config.quota {
            let quota = UpstreamQuota::new(policy.window, policy.limit);
            info!(
                limit = quota.limit(),
                window_secs = quota.window().as_secs_f64(),
                "upstream quota enabled"
            );
            fetcher = fetcher.with_quota(quota);
        }

        Ok(Self::new(fetcher, config.workers).with_run_timeout(config.run_timeout))
    }

    pub fn with_run_timeout(mut self, run_timeout: Option<Duration>) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    pub fn fetcher(&self) -> &RateLimitedFetcher {
        &self.fetcher
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub async fn run(&self, symbols: &[Symbol], range: DateRange) -> IngestResult {
        IngestResult::partition(self.collect(symbols, range).await)
    }

    /// One outcome per symbol, ordered like `symbols`.
    ///
    /// Individual failures never stop the run. When the run deadline passes,
    /// symbols without an outcome are recorded as [`FetchError::RunTimeout`].
    /// Calls already in flight finish in the background and release their
    /// gate slots as usual; workers still queued for a slot give up without
    /// calling the provider.
    pub async fn collect(&self, symbols: &[Symbol], range: DateRange) -> Vec<FetchOutcome> {
        if symbols.is_empty() {
            return Vec::new();
        }

        let queue = Arc::new(Mutex::new(
            symbols.iter().cloned().enumerate().collect::<VecDeque<_>>(),
        ));
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, FetchOutcome)>();

        let worker_count = self.workers.min(symbols.len());
        info!(
            symbols = symbols.len(),
            workers = worker_count,
            upstream_slots = self.fetcher.gate().slots(),
            provider = self.fetcher.provider_name(),
            %range,
            "starting fetch"
        );

        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let queue = Arc::clone(&queue);
            let stop = Arc::clone(&stop);
            let tx = tx.clone();
            let fetcher = self.fetcher.clone();
            handles.push(tokio::spawn(async move {
                while !stop.load(Ordering::SeqCst) {
                    let next = queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pop_front();
                    let Some((index, symbol)) = next else {
                        break;
                    };
                    let outcome = fetch_one(&fetcher, symbol, range, &stop).await;
                    if tx.send((index, outcome)).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        let mut settled: Vec<Option<FetchOutcome>> = symbols.iter().map(|_| None).collect();
        let receive_all = async {
            while let Some((index, outcome)) = rx.recv().await {
                settled[index] = Some(outcome);
            }
        };

        let timed_out = match self.run_timeout {
            Some(limit) => tokio::time::timeout(limit, receive_all).await.is_err(),
            None => {
                receive_all.await;
                false
            }
        };

        if timed_out {
            stop.store(true, Ordering::SeqCst);
            while let Ok((index, outcome)) = rx.try_recv() {
                settled[index] = Some(outcome);
            }
            warn!(
                pending = settled.iter().filter(|slot| slot.is_none()).count(),
                "run deadline reached"
            );
        } else {
            for handle in handles {
                if let Err(error) = handle.await {
                    warn!(error = %error, "worker task ended abnormally");
                }
            }
        }

        let missing = if timed_out {
            FetchError::RunTimeout
        } else {
            FetchError::Aborted
        };

        settled
            .into_iter()
            .zip(symbols)
            .map(|(slot, symbol)| {
                slot.unwrap_or_else(|| {
                    FetchOutcome::Failure(FetchFailure {
                        symbol: symbol.clone(),
                        error: missing.clone(),
                    })
                })
            })
            .collect()
    }
}

async fn fetch_one(
    fetcher: &RateLimitedFetcher,
    symbol: Symbol,
    range: DateRange,
    stop: &AtomicBool,
) -> FetchOutcome {
    let result = match fetcher.fetch_until_stopped(&symbol, range, stop).await {
        Ok(raw) => normalize(raw, &symbol),
        Err(error) => Err(error),
    };

    match result {
        Ok(series) => {
            debug!(symbol = %symbol, rows = series.len(), "fetched");
            FetchOutcome::Success(series)
        }
        Err(FetchError::EmptySeries) => {
            info!(symbol = %symbol, "no data for range");
            FetchOutcome::Failure(FetchFailure {
                symbol,
                error: FetchError::EmptySeries,
            })
        }
        Err(FetchError::RunTimeout) => FetchOutcome::Failure(FetchFailure {
            symbol,
            error: FetchError::RunTimeout,
        }),
        Err(error) => {
            warn!(symbol = %symbol, code = error.code(), error = %error, "fetch failed");
            FetchOutcome::Failure(FetchFailure { symbol, error })
        }
    }
}
