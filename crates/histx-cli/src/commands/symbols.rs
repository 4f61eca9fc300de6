use std::sync::Arc;

use histx_core::{normalize_tickers, ReqwestHttpClient, Symbol};
use serde::Serialize;

use super::symbol_source;
use crate::cli::SymbolsArgs;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct SymbolsReport {
    pub source: String,
    pub count: usize,
    pub symbols: Vec<String>,
    pub rejected: Vec<String>,
}

pub async fn run(args: &SymbolsArgs) -> Result<SymbolsReport, CliError> {
    let source = symbol_source(&args.universe, Arc::new(ReqwestHttpClient::new()));
    let raw = source.symbols().await?;
    let universe = normalize_tickers(&raw);

    Ok(SymbolsReport {
        source: source.describe(),
        count: universe.symbols.len(),
        symbols: universe.symbols.iter().map(Symbol::to_string).collect(),
        rejected: universe.rejected,
    })
}
