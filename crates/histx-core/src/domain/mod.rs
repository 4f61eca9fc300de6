mod date_range;
mod series;
mod symbol;

pub use date_range::{today_utc, DateRange, MAX_HISTORY_YEARS};
pub use series::{AggregateDataset, NormalizedRow, NormalizedSeries, RawBar, RawSeries};
pub use symbol::Symbol;
