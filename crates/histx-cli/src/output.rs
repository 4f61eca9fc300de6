use std::fmt::Write as _;

use histx_core::RunReport;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::commands::{CommandOutput, SymbolsReport};
use crate::error::CliError;

pub fn render(output: &CommandOutput, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    let text = match (format, output) {
        (OutputFormat::Json, CommandOutput::Ingest(report)) => to_json(report, pretty)?,
        (OutputFormat::Json, CommandOutput::Symbols(report)) => to_json(report, pretty)?,
        (OutputFormat::Table, CommandOutput::Ingest(report)) => ingest_table(report),
        (OutputFormat::Table, CommandOutput::Symbols(report)) => symbols_table(report),
    };
    println!("{}", text.trim_end());
    Ok(())
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, CliError> {
    let payload = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(payload)
}

fn ingest_table(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "run_id      : {}", report.run_id);
    let _ = writeln!(out, "source      : {}", report.source);
    let _ = writeln!(out, "destination : {}", report.destination);
    let _ = writeln!(out, "range       : {} .. {}", report.start_date, report.end_date);
    let _ = writeln!(out, "attempted   : {}", report.attempted);
    let _ = writeln!(out, "succeeded   : {}", report.succeeded);
    let _ = writeln!(out, "empty       : {}", report.empty.len());
    let _ = writeln!(out, "failed      : {}", report.failed());
    let _ = writeln!(out, "rows        : {}", report.rows);

    if !report.rejected.is_empty() {
        let _ = writeln!(out, "rejected    : {}", report.rejected.join(","));
    }
    if !report.empty.is_empty() {
        let _ = writeln!(out, "no data     : {}", report.empty.join(","));
    }
    if !report.failures.is_empty() {
        let _ = writeln!(out, "failures:");
        for failure in &report.failures {
            let _ = writeln!(
                out,
                "  - {} [{}]: {}",
                failure.symbol, failure.code, failure.message
            );
        }
    }
    if report.nothing_collected() {
        let _ = writeln!(out, "warning     : no symbol produced any rows; table is now empty");
    }

    let (minutes, seconds) = report.elapsed_minutes_seconds();
    let _ = writeln!(
        out,
        "download completed in {minutes} minutes and {seconds} seconds"
    );
    out
}

fn symbols_table(report: &SymbolsReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "source   : {}", report.source);
    let _ = writeln!(out, "count    : {}", report.count);
    if !report.rejected.is_empty() {
        let _ = writeln!(out, "rejected : {}", report.rejected.join(","));
    }
    for symbol in &report.symbols {
        let _ = writeln!(out, "{symbol}");
    }
    out
}
