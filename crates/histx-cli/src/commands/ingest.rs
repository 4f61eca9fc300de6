use std::sync::Arc;

use histx_core::{
    run_pipeline, today_utc, validate_table_name, DateRange, HttpClient, IngestionOrchestrator,
    ReqwestHttpClient, RunReport, Warehouse, WarehouseSink, YahooChartProvider,
};
use tracing::info;

use super::symbol_source;
use crate::cli::IngestArgs;
use crate::error::CliError;

pub async fn run(args: &IngestArgs) -> Result<RunReport, CliError> {
    let config = args.ingest_config();
    config.validate()?;
    validate_table_name(args.table.as_str())?;

    // Computed once so every symbol shares the same bounds.
    let range = DateRange::trailing_years(today_utc(), config.history_years)?;

    let http_client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    let mut provider =
        YahooChartProvider::new(Arc::clone(&http_client)).with_request_timeout(config.request_timeout);
    if let Some(base_url) = &args.yahoo_base_url {
        provider = provider.with_base_url(base_url.clone());
    }

    let orchestrator = IngestionOrchestrator::from_config(Arc::new(provider), &config)?;
    let warehouse = Warehouse::open(args.warehouse_config())?;
    info!(db_path = %warehouse.db_path().display(), table = %args.table, "warehouse ready");
    let sink = WarehouseSink::new(warehouse, args.table.clone());

    let source = symbol_source(&args.universe, http_client);
    let report = run_pipeline(source.as_ref(), &orchestrator, &sink, range).await?;
    Ok(report)
}
