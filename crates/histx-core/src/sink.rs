use histx_warehouse::{IngestRunRecord, PriceRecord, Warehouse};

use crate::pipeline::RunReport;
use crate::{AggregateDataset, IngestError, NormalizedRow};

/// Destination of a run's aggregate dataset.
pub trait PersistenceSink: Send + Sync {
    fn describe(&self) -> String;

    /// Atomically supersede the target's contents with `dataset`.
    ///
    /// Must write even when `dataset` is empty. On error the previous
    /// contents stay in place.
    fn replace(&self, dataset: &AggregateDataset) -> Result<(), IngestError>;

    /// Record a finished run. Called only after a successful `replace`.
    fn record_run(&self, report: &RunReport) -> Result<(), IngestError> {
        let _ = report;
        Ok(())
    }
}

/// Writes the dataset to one DuckDB table and the run summary to `ingest_log`.
#[derive(Clone)]
pub struct WarehouseSink {
    warehouse: Warehouse,
    table: String,
}

impl WarehouseSink {
    pub fn new(warehouse: Warehouse, table: impl Into<String>) -> Self {
        Self {
            warehouse,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }
}

impl PersistenceSink for WarehouseSink {
    fn describe(&self) -> String {
        format!("{}:{}", self.warehouse.db_path().display(), self.table)
    }

    fn replace(&self, dataset: &AggregateDataset) -> Result<(), IngestError> {
        let records = dataset.rows().iter().map(price_record).collect::<Vec<_>>();
        self.warehouse
            .replace_prices(self.table.as_str(), &records)
            .map_err(|e| IngestError::Persistence(e.to_string()))
    }

    fn record_run(&self, report: &RunReport) -> Result<(), IngestError> {
        self.warehouse
            .log_ingest_run(&IngestRunRecord {
                run_id: report.run_id.clone(),
                table_name: self.table.clone(),
                started_at: report.started_at.clone(),
                attempted: report.attempted,
                succeeded: report.succeeded,
                empty: report.empty.len(),
                failed: report.failures.len(),
                row_count: report.rows,
                elapsed_ms: report.elapsed_ms,
            })
            .map_err(|e| IngestError::Persistence(e.to_string()))
    }
}

fn price_record(row: &NormalizedRow) -> PriceRecord {
    PriceRecord {
        date: row.date.to_string(),
        open: row.open,
        high: row.high,
        low: row.low,
        close: row.close,
        volume: row.volume,
        name: row.symbol.to_string(),
    }
}
