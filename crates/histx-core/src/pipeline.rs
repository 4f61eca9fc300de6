//! End-to-end ingestion run: universe, fetch, replace, report.

use std::time::Instant;

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{info, warn};
use uuid::Uuid;

use crate::orchestrator::{IngestResult, IngestionOrchestrator};
use crate::sink::PersistenceSink;
use crate::universe::{normalize_tickers, SymbolSource};
use crate::{DateRange, IngestError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    pub symbol: String,
    pub code: &'static str,
    pub message: String,
}

/// What a run did. Only produced when the dataset was persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: String,
    pub source: String,
    pub destination: String,
    pub start_date: String,
    pub end_date: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub empty: Vec<String>,
    pub rows: usize,
    pub rejected: Vec<String>,
    pub failures: Vec<FailureReport>,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Elapsed wall time as whole minutes and remaining seconds.
    pub fn elapsed_minutes_seconds(&self) -> (u64, u64) {
        let seconds = self.elapsed_ms / 1_000;
        (seconds / 60, seconds % 60)
    }

    /// True when symbols were attempted and none produced rows.
    pub fn nothing_collected(&self) -> bool {
        self.attempted > 0 && self.succeeded == 0
    }
}

/// Run one ingestion job.
///
/// The universe is read once and every fetch shares `range`. The sink's
/// `replace` is called exactly once, after all symbols settle, including
/// when nothing was collected.
///
/// # Errors
///
/// [`IngestError::SymbolSource`] and [`IngestError::Persistence`] end the run;
/// no report is produced for a run whose dataset was not persisted.
pub async fn run_pipeline(
    source: &dyn SymbolSource,
    orchestrator: &IngestionOrchestrator,
    sink: &dyn PersistenceSink,
    range: DateRange,
) -> Result<RunReport, IngestError> {
    let clock = Instant::now();
    let started_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    let run_id = Uuid::new_v4().to_string();

    info!(run_id = %run_id, source = %source.describe(), "resolving symbol universe");
    let raw = source.symbols().await?;
    let universe = normalize_tickers(&raw);
    if !universe.rejected.is_empty() {
        warn!(rejected = ?universe.rejected, "skipping tickers that are not valid symbols");
    }

    let result = orchestrator.run(&universe.symbols, range).await;
    if result.nothing_collected() {
        warn!(attempted = result.attempted, "no symbol produced any rows");
    }

    info!(rows = result.dataset.len(), destination = %sink.describe(), "replacing table");
    blocking(|| sink.replace(&result.dataset))?;

    let report = build_report(
        run_id,
        started_at,
        source.describe(),
        sink.describe(),
        range,
        universe.rejected,
        result,
        clock.elapsed().as_millis() as u64,
    );

    if let Err(error) = blocking(|| sink.record_run(&report)) {
        warn!(error = %error, "could not record run in ingest log");
    }

    info!(
        run_id = %report.run_id,
        attempted = report.attempted,
        succeeded = report.succeeded,
        empty = report.empty.len(),
        failed = report.failed(),
        rows = report.rows,
        elapsed_ms = report.elapsed_ms,
        "run complete"
    );

    Ok(report)
}

// Sink writes are synchronous bulk inserts. On a multi-threaded runtime the
// worker steps aside so detached fetches keep making progress meanwhile.
fn blocking<T>(write: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(write),
        _ => write(),
    }
}

#[allow(clippy::too_many_arguments)]
fn build_report(
    run_id: String,
    started_at: String,
    source: String,
    destination: String,
    range: DateRange,
    rejected: Vec<String>,
    result: IngestResult,
    elapsed_ms: u64,
) -> RunReport {
    RunReport {
        run_id,
        started_at,
        source,
        destination,
        start_date: range.start().to_string(),
        end_date: range.end().to_string(),
        attempted: result.attempted,
        succeeded: result.succeeded,
        empty: result.empty.iter().map(ToString::to_string).collect(),
        rows: result.dataset.len(),
        rejected,
        failures: result
            .failures
            .iter()
            .map(|failure| FailureReport {
                symbol: failure.symbol.to_string(),
                code: failure.error.code(),
                message: failure.error.to_string(),
            })
            .collect(),
        elapsed_ms,
    }
}
