//! Raw provider bars to canonical per-day rows.

use time::{Date, OffsetDateTime, UtcOffset};

use crate::{FetchError, NormalizedRow, NormalizedSeries, RawSeries, Symbol};

/// Convert `raw` into rows tagged with `symbol`, one per trading day.
///
/// Timestamps are shifted into the exchange offset and truncated to the
/// calendar day. Bars with every field missing are skipped. Input order is
/// kept as-is; any date that does not strictly follow its predecessor is
/// rejected rather than re-sorted.
///
/// # Errors
///
/// - [`FetchError::MalformedData`] for negative volume, negative or non-finite
///   prices, unrepresentable timestamps and non-increasing or duplicate dates
/// - [`FetchError::EmptySeries`] when no bar survives
pub fn normalize(raw: RawSeries, symbol: &Symbol) -> Result<NormalizedSeries, FetchError> {
    let offset = UtcOffset::from_whole_seconds(raw.utc_offset_secs).map_err(|_| {
        FetchError::malformed(format!(
            "{symbol}: utc offset {} seconds is out of range",
            raw.utc_offset_secs
        ))
    })?;

    let mut rows = Vec::with_capacity(raw.bars.len());
    let mut previous: Option<Date> = None;

    for bar in raw.bars.into_iter().filter(|bar| !bar.is_blank()) {
        let date = OffsetDateTime::from_unix_timestamp(bar.timestamp)
            .map_err(|_| {
                FetchError::malformed(format!(
                    "{symbol}: timestamp {} is out of range",
                    bar.timestamp
                ))
            })?
            .to_offset(offset)
            .date();

        if let Some(previous) = previous {
            if date == previous {
                return Err(FetchError::malformed(format!(
                    "{symbol}: duplicate date {date}"
                )));
            }
            if date < previous {
                return Err(FetchError::malformed(format!(
                    "{symbol}: date {date} follows {previous}"
                )));
            }
        }

        for (field, value) in [
            ("open", bar.open),
            ("high", bar.high),
            ("low", bar.low),
            ("close", bar.close),
        ] {
            check_price(symbol, date, field, value)?;
        }

        if let Some(volume) = bar.volume {
            if volume < 0 {
                return Err(FetchError::malformed(format!(
                    "{symbol}: negative volume {volume} on {date}"
                )));
            }
        }

        previous = Some(date);
        rows.push(NormalizedRow {
            date,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            symbol: symbol.clone(),
        });
    }

    if rows.is_empty() {
        return Err(FetchError::EmptySeries);
    }

    Ok(NormalizedSeries::new(symbol.clone(), rows))
}

fn check_price(
    symbol: &Symbol,
    date: Date,
    field: &str,
    value: Option<f64>,
) -> Result<(), FetchError> {
    match value {
        Some(value) if !value.is_finite() => Err(FetchError::malformed(format!(
            "{symbol}: {field} is not finite on {date}"
        ))),
        Some(value) if value < 0.0 => Err(FetchError::malformed(format!(
            "{symbol}: negative {field} {value} on {date}"
        ))),
        _ => Ok(()),
    }
}
