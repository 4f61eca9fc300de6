//! Command-line definitions for histx.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ingest` | Fetch the universe's daily history and replace the price table |
//! | `symbols` | Resolve and print the symbol universe without fetching |
//!
//! Every tunable can also be set through a `HISTX_*` environment variable.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use histx_core::{
    IngestConfig, QuotaPolicy, WarehouseConfig, DEFAULT_PRICE_TABLE, SP500_CONSTITUENTS_URL,
};

#[derive(Debug, Parser)]
#[command(
    name = "histx",
    author,
    version,
    about = "Batch ingestion of index-constituent daily price history into DuckDB"
)]
pub struct Cli {
    /// Report format written to stdout.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch daily history for every symbol and replace the price table.
    Ingest(IngestArgs),
    /// Print the resolved symbol universe.
    Symbols(SymbolsArgs),
}

/// Where the symbol universe comes from. The first one given wins:
/// `--symbols`, then `--symbols-file`, then `--universe-url`.
#[derive(Debug, Clone, Args)]
pub struct UniverseArgs {
    /// Explicit comma-separated tickers.
    #[arg(long, value_delimiter = ',', env = "HISTX_SYMBOLS")]
    pub symbols: Vec<String>,

    /// Newline-delimited ticker file.
    #[arg(long, env = "HISTX_SYMBOLS_FILE")]
    pub symbols_file: Option<PathBuf>,

    /// Wikipedia page whose first wikitable lists the constituents.
    #[arg(long, env = "HISTX_UNIVERSE_URL", default_value = SP500_CONSTITUENTS_URL)]
    pub universe_url: String,
}

#[derive(Debug, Clone, Args)]
pub struct SymbolsArgs {
    #[command(flatten)]
    pub universe: UniverseArgs,
}

#[derive(Debug, Clone, Args)]
pub struct IngestArgs {
    #[command(flatten)]
    pub universe: UniverseArgs,

    /// Worker tasks processing symbols concurrently (W).
    #[arg(long, env = "HISTX_WORKERS", default_value_t = 10)]
    pub workers: usize,

    /// Provider calls allowed in flight at once (K).
    #[arg(long, env = "HISTX_UPSTREAM_SLOTS", default_value_t = 1)]
    pub upstream_slots: usize,

    /// Calendar years of history ending today.
    #[arg(long, env = "HISTX_HISTORY_YEARS", default_value_t = 11)]
    pub history_years: u16,

    /// Per-call provider timeout in seconds.
    #[arg(long, env = "HISTX_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Deadline for the whole fetch phase in seconds.
    #[arg(long, env = "HISTX_RUN_TIMEOUT_SECS")]
    pub run_timeout_secs: Option<u64>,

    /// Pace provider calls to at most this many per quota window.
    #[arg(long, env = "HISTX_QUOTA_LIMIT")]
    pub quota_limit: Option<u32>,

    #[arg(long, env = "HISTX_QUOTA_WINDOW_SECS", default_value_t = 60)]
    pub quota_window_secs: u64,

    /// DuckDB file; defaults to $HISTX_HOME/warehouse.duckdb.
    #[arg(long, env = "HISTX_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Table replaced by each run.
    #[arg(long, env = "HISTX_TABLE", default_value = DEFAULT_PRICE_TABLE)]
    pub table: String,

    /// Override of the Yahoo chart API host.
    #[arg(long, env = "HISTX_YAHOO_BASE_URL", hide = true)]
    pub yahoo_base_url: Option<String>,
}

impl IngestArgs {
    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            workers: self.workers,
            upstream_slots: self.upstream_slots,
            history_years: self.history_years,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            run_timeout: self.run_timeout_secs.map(Duration::from_secs),
            quota: self.quota_limit.map(|limit| QuotaPolicy {
                window: Duration::from_secs(self.quota_window_secs),
                limit,
            }),
        }
    }

    pub fn warehouse_config(&self) -> WarehouseConfig {
        match &self.db_path {
            Some(path) => WarehouseConfig::with_db_path(path.clone()),
            None => WarehouseConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_defaults_match_core_defaults() {
        let cli = Cli::try_parse_from(["histx", "ingest"]).expect("parse");
        let Command::Ingest(args) = cli.command else {
            panic!("expected ingest");
        };

        assert_eq!(args.ingest_config(), IngestConfig::default());
        assert_eq!(args.table, DEFAULT_PRICE_TABLE);
        assert_eq!(args.universe.universe_url, SP500_CONSTITUENTS_URL);
    }

    #[test]
    fn parses_symbol_list_and_knobs() {
        let cli = Cli::try_parse_from([
            "histx",
            "--format",
            "json",
            "ingest",
            "--symbols",
            "AAPL,BRK.B",
            "--workers",
            "4",
            "--upstream-slots",
            "2",
            "--quota-limit",
            "100",
        ])
        .expect("parse");
        let Command::Ingest(args) = cli.command else {
            panic!("expected ingest");
        };

        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(args.universe.symbols, vec!["AAPL", "BRK.B"]);
        let config = args.ingest_config();
        assert_eq!(config.workers, 4);
        assert_eq!(config.upstream_slots, 2);
        assert_eq!(
            config.quota,
            Some(QuotaPolicy {
                window: Duration::from_secs(60),
                limit: 100
            })
        );
    }
}
