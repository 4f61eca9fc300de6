use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::provider::MarketDataProvider;
use crate::throttling::{AdmissionGate, UpstreamQuota};
use crate::{DateRange, FetchError, RawSeries, Symbol};

/// Routes every provider call through the shared [`AdmissionGate`].
#[derive(Clone)]
pub struct RateLimitedFetcher {
    provider: Arc<dyn MarketDataProvider>,
    gate: AdmissionGate,
    quota: Option<UpstreamQuota>,
    request_timeout: Duration,
}

impl RateLimitedFetcher {
    pub fn new(provider: Arc<dyn MarketDataProvider>, upstream_slots: usize) -> Self {
        Self {
            provider,
            gate: AdmissionGate::new(upstream_slots),
            quota: None,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_quota(mut self, quota: UpstreamQuota) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// One upstream call for `symbol` over `range`.
    ///
    /// The gate slot is held only for the duration of the provider call. A
    /// call that outlives the request timeout is reported as
    /// [`FetchError::Upstream`]; a series with no bars as
    /// [`FetchError::EmptySeries`].
    pub async fn fetch(&self, symbol: &Symbol, range: DateRange) -> Result<RawSeries, FetchError> {
        self.fetch_until_stopped(symbol, range, &AtomicBool::new(false))
            .await
    }

    /// [`fetch`](Self::fetch) that gives up once `stop` is set.
    ///
    /// `stop` is checked after the gate grants a slot, so a call still queued
    /// for a slot when the run ends never reaches the provider; it returns
    /// [`FetchError::RunTimeout`] and hands the slot straight back. A call
    /// already started is not interrupted.
    pub async fn fetch_until_stopped(
        &self,
        symbol: &Symbol,
        range: DateRange,
        stop: &AtomicBool,
    ) -> Result<RawSeries, FetchError> {
        if let Some(quota) = &self.quota {
            if !quota.try_take() {
                debug!(symbol = %symbol, "upstream quota spent; pacing");
                quota.until_ready().await;
            }
        }

        let result = {
            let _permit = self.gate.acquire().await?;
            if stop.load(Ordering::SeqCst) {
                debug!(symbol = %symbol, "run stopped before upstream call");
                return Err(FetchError::RunTimeout);
            }
            debug!(symbol = %symbol, in_flight = self.gate.in_flight(), "upstream call");
            tokio::time::timeout(self.request_timeout, self.provider.get_history(symbol, range))
                .await
        };

        match result {
            Ok(Ok(series)) if series.is_empty() => Err(FetchError::EmptySeries),
            Ok(outcome) => outcome,
            Err(_) => Err(FetchError::Upstream {
                message: format!(
                    "{} request timed out after {} ms",
                    self.provider.name(),
                    self.request_timeout.as_millis()
                ),
                retryable: true,
            }),
        }
    }
}
