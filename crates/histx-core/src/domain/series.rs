use time::Date;

use super::Symbol;

/// One provider data point. Any field may be missing on non-trading days.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawBar {
    /// Epoch seconds as reported by the provider.
    pub timestamp: i64,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
}

impl RawBar {
    pub const fn is_blank(&self) -> bool {
        self.open.is_none()
            && self.high.is_none()
            && self.low.is_none()
            && self.close.is_none()
            && self.volume.is_none()
    }
}

/// Provider output for one symbol over one date range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSeries {
    /// Exchange offset from UTC, applied before truncating timestamps to days.
    pub utc_offset_secs: i32,
    pub bars: Vec<RawBar>,
}

impl RawSeries {
    pub fn new(utc_offset_secs: i32, bars: Vec<RawBar>) -> Self {
        Self {
            utc_offset_secs,
            bars,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub date: Date,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
    pub symbol: Symbol,
}

/// Rows for a single symbol with strictly increasing dates.
///
/// Only the normalizer builds these, so the ordering and tagging
/// invariants hold for every instance.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSeries {
    symbol: Symbol,
    rows: Vec<NormalizedRow>,
}

impl NormalizedSeries {
    pub(crate) fn new(symbol: Symbol, rows: Vec<NormalizedRow>) -> Self {
        Self { symbol, rows }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn rows(&self) -> &[NormalizedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<NormalizedRow> {
        self.rows
    }
}

/// Concatenation of every successful series in a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateDataset {
    rows: Vec<NormalizedRow>,
}

impl AggregateDataset {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_series(series: impl IntoIterator<Item = NormalizedSeries>) -> Self {
        let rows = series
            .into_iter()
            .flat_map(NormalizedSeries::into_rows)
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[NormalizedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<NormalizedRow> {
        self.rows
    }
}
