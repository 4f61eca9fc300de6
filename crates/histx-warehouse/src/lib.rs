pub mod duckdb;
pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::Connection;
use serde::Serialize;
use thiserror::Error;

pub use crate::duckdb::{DuckDbConnectionManager, PooledConnection};

/// Rows per multi-row `INSERT` statement during a table replace.
const INSERT_CHUNK_ROWS: usize = 1_000;

pub const DEFAULT_PRICE_TABLE: &str = "s_and_p";

/// Tables owned by the warehouse itself; never valid as a price table.
const RESERVED_TABLES: &[&str] = &["ingest_log", "schema_migrations"];

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid table name '{0}': expected [A-Za-z_][A-Za-z0-9_]* other than ingest_log or schema_migrations")]
    InvalidTableName(String),

    #[error("invalid record for '{name}': {reason}")]
    InvalidRecord { name: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub histx_home: PathBuf,
    pub db_path: PathBuf,
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        let histx_home = resolve_histx_home();
        let db_path = histx_home.join("warehouse.duckdb");
        Self {
            histx_home,
            db_path,
            max_pool_size: 2,
        }
    }
}

impl WarehouseConfig {
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }
}

/// One row of the daily price table.
///
/// `date` is an ISO `YYYY-MM-DD` calendar day; `name` is the ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub date: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
    pub name: String,
}

/// Summary row appended to `ingest_log` after a successful replace.
#[derive(Debug, Clone, Serialize)]
pub struct IngestRunRecord {
    pub run_id: String,
    pub table_name: String,
    pub started_at: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub empty: usize,
    pub failed: usize,
    pub row_count: usize,
    pub elapsed_ms: u64,
}

#[derive(Clone)]
pub struct Warehouse {
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let manager = DuckDbConnectionManager::new(config.db_path, config.max_pool_size);
        let warehouse = Self { manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    /// Supersedes the full contents of `table` with `rows` in one transaction.
    ///
    /// The table is recreated even when `rows` is empty. Any failure rolls the
    /// transaction back, leaving the previous table in place.
    pub fn replace_prices(&self, table: &str, rows: &[PriceRecord]) -> Result<(), WarehouseError> {
        let table = validate_table_name(table)?;

        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            connection.execute_batch(
                format!(
                    r#"
CREATE OR REPLACE TABLE {table} (
    date DATE NOT NULL,
    open DOUBLE,
    high DOUBLE,
    low DOUBLE,
    close DOUBLE,
    volume BIGINT,
    name TEXT NOT NULL
);
"#
                )
                .as_str(),
            )?;

            for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
                let values = chunk
                    .iter()
                    .map(price_values_tuple)
                    .collect::<Result<Vec<_>, _>>()?
                    .join(",\n");
                let sql = format!(
                    "INSERT INTO {table} (date, open, high, low, close, volume, name) VALUES\n{values};"
                );
                connection.execute_batch(sql.as_str())?;
            }

            Ok(())
        })();

        finalize_transaction(&connection, result)
    }

    pub fn log_ingest_run(&self, record: &IngestRunRecord) -> Result<(), WarehouseError> {
        validate_table_name(record.table_name.as_str())?;

        let connection = self.manager.acquire()?;
        let sql = format!(
            r#"
INSERT INTO ingest_log (
    run_id, table_name, started_at, attempted, succeeded, empty, failed,
    row_count, elapsed_ms, logged_at
) VALUES (
    '{run_id}', '{table_name}', TRY_CAST('{started_at}' AS TIMESTAMP), {attempted},
    {succeeded}, {empty}, {failed}, {row_count}, {elapsed_ms}, CURRENT_TIMESTAMP
);
"#,
            run_id = escape_sql_string(record.run_id.as_str()),
            table_name = escape_sql_string(record.table_name.as_str()),
            started_at = escape_sql_string(record.started_at.as_str()),
            attempted = record.attempted,
            succeeded = record.succeeded,
            empty = record.empty,
            failed = record.failed,
            row_count = record.row_count,
            elapsed_ms = record.elapsed_ms,
        );
        connection.execute_batch(sql.as_str())?;
        Ok(())
    }
}

fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn price_values_tuple(row: &PriceRecord) -> Result<String, WarehouseError> {
    if !is_iso_date(row.date.as_str()) {
        return Err(WarehouseError::InvalidRecord {
            name: row.name.clone(),
            reason: format!("date '{}' is not YYYY-MM-DD", row.date),
        });
    }

    Ok(format!(
        "(DATE '{date}', {open}, {high}, {low}, {close}, {volume}, '{name}')",
        date = row.date,
        open = sql_option_f64(row, "open", row.open)?,
        high = sql_option_f64(row, "high", row.high)?,
        low = sql_option_f64(row, "low", row.low)?,
        close = sql_option_f64(row, "close", row.close)?,
        volume = sql_option_i64(row.volume),
        name = escape_sql_string(row.name.as_str()),
    ))
}

/// Accept only plain SQL identifiers as table names, excluding the
/// warehouse's own bookkeeping tables. Identifiers compare case-insensitively.
pub fn validate_table_name(table: &str) -> Result<&str, WarehouseError> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_');
    let valid_rest = chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    let reserved = RESERVED_TABLES
        .iter()
        .any(|name| name.eq_ignore_ascii_case(table));

    if valid_start && valid_rest && !reserved {
        Ok(table)
    } else {
        Err(WarehouseError::InvalidTableName(table.to_owned()))
    }
}

fn is_iso_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(index, byte)| index == 4 || index == 7 || byte.is_ascii_digit())
}

fn resolve_histx_home() -> PathBuf {
    if let Some(path) = env::var_os("HISTX_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".histx");
    }

    PathBuf::from(".histx")
}

fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

fn sql_option_f64(
    row: &PriceRecord,
    field: &str,
    value: Option<f64>,
) -> Result<String, WarehouseError> {
    match value {
        Some(value) if value.is_finite() => Ok(value.to_string()),
        Some(value) => Err(WarehouseError::InvalidRecord {
            name: row.name.clone(),
            reason: format!("{field} is not finite ({value})"),
        }),
        None => Ok(String::from("NULL")),
    }
}

fn sql_option_i64(value: Option<i64>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => String::from("NULL"),
    }
}
