use std::future::Future;
use std::pin::Pin;

use crate::{DateRange, FetchError, RawSeries, Symbol};

/// Remote source of daily price history.
///
/// Implementations make exactly one upstream call per invocation. Callers
/// are expected to route every call through a [`crate::RateLimitedFetcher`].
pub trait MarketDataProvider: Send + Sync {
    /// Short provider name used in logs.
    fn name(&self) -> &'static str;

    /// Daily bars for `symbol` within `range`.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Upstream`] when the call fails or the response cannot be read
    /// - [`FetchError::EmptySeries`] when the provider has no points for the range
    fn get_history<'a>(
        &'a self,
        symbol: &'a Symbol,
        range: DateRange,
    ) -> Pin<Box<dyn Future<Output = Result<RawSeries, FetchError>> + Send + 'a>>;
}
