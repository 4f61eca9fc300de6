//! Core of histx.
//!
//! This crate contains:
//! - Symbol, date-range and price-series domain types
//! - The per-symbol and run-level error taxonomy
//! - Provider and symbol-source seams with Yahoo and Wikipedia adapters
//! - The admission-gated fetcher, normalizer and worker-pool orchestrator
//! - The persistence seam and the end-to-end pipeline driver

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod http_client;
pub mod normalizer;
pub mod orchestrator;
pub mod pipeline;
pub mod provider;
pub mod sink;
pub mod throttling;
pub mod universe;

pub use adapters::{parse_chart, YahooChartProvider};
pub use config::{IngestConfig, QuotaPolicy};
pub use domain::{
    today_utc, AggregateDataset, DateRange, NormalizedRow, NormalizedSeries, RawBar, RawSeries,
    Symbol, MAX_HISTORY_YEARS,
};
pub use error::{FetchError, IngestError, ValidationError};
pub use fetcher::RateLimitedFetcher;
pub use histx_warehouse::{
    validate_table_name, Warehouse, WarehouseConfig, WarehouseError, DEFAULT_PRICE_TABLE,
};
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use normalizer::normalize;
pub use orchestrator::{FetchFailure, FetchOutcome, IngestResult, IngestionOrchestrator};
pub use pipeline::{run_pipeline, FailureReport, RunReport};
pub use provider::MarketDataProvider;
pub use sink::{PersistenceSink, WarehouseSink};
pub use throttling::{AdmissionGate, AdmissionPermit, UpstreamQuota};
pub use universe::{
    extract_first_column, normalize_tickers, FileSymbolSource, ResolvedUniverse,
    StaticSymbolSource, SymbolSource, WikipediaSymbolSource, SP500_CONSTITUENTS_URL,
};
