mod ingest;
mod symbols;

use std::sync::Arc;

use histx_core::{
    FileSymbolSource, HttpClient, RunReport, StaticSymbolSource, SymbolSource,
    WikipediaSymbolSource,
};

use crate::cli::{Cli, Command, UniverseArgs};
use crate::error::CliError;

pub use symbols::SymbolsReport;

pub enum CommandOutput {
    Ingest(RunReport),
    Symbols(SymbolsReport),
}

pub async fn run(cli: &Cli) -> Result<CommandOutput, CliError> {
    match &cli.command {
        Command::Ingest(args) => ingest::run(args).await.map(CommandOutput::Ingest),
        Command::Symbols(args) => symbols::run(args).await.map(CommandOutput::Symbols),
    }
}

fn symbol_source(args: &UniverseArgs, http_client: Arc<dyn HttpClient>) -> Box<dyn SymbolSource> {
    if !args.symbols.is_empty() {
        return Box::new(StaticSymbolSource::new(args.symbols.iter().cloned()));
    }
    if let Some(path) = &args.symbols_file {
        return Box::new(FileSymbolSource::new(path.clone()));
    }
    Box::new(WikipediaSymbolSource::new(http_client).with_url(args.universe_url.clone()))
}
