use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::FetchError;

/// Counting gate that bounds simultaneous upstream calls to `slots`.
///
/// Clones share the same slots. A slot is held by an [`AdmissionPermit`]
/// and returned when the permit drops, on every exit path.
#[derive(Clone)]
pub struct AdmissionGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    semaphore: Semaphore,
    slots: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl AdmissionGate {
    pub fn new(slots: usize) -> Self {
        let slots = slots.max(1);
        Self {
            inner: Arc::new(GateInner {
                semaphore: Semaphore::new(slots),
                slots,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    /// Waits for a free slot.
    pub async fn acquire(&self) -> Result<AdmissionPermit<'_>, FetchError> {
        let permit = self
            .inner
            .semaphore
            .acquire()
            .await
            .map_err(|_| FetchError::Aborted)?;

        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(now, Ordering::SeqCst);

        Ok(AdmissionPermit {
            gate: &self.inner,
            _permit: permit,
        })
    }

    pub fn slots(&self) -> usize {
        self.inner.slots
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    pub fn available(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    /// Highest number of slots held at once since the gate was created.
    pub fn peak_in_flight(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }
}

/// One held slot of an [`AdmissionGate`].
pub struct AdmissionPermit<'a> {
    gate: &'a GateInner,
    _permit: SemaphorePermit<'a>,
}

impl Drop for AdmissionPermit<'_> {
    fn drop(&mut self) {
        // Runs before the semaphore permit field is released.
        self.gate.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Optional pacing applied on top of the gate: at most `limit` upstream
/// calls per `window`, spread evenly, with a burst of `limit`.
#[derive(Clone)]
pub struct UpstreamQuota {
    limiter: Arc<DirectRateLimiter>,
    window: Duration,
    limit: u32,
}

impl UpstreamQuota {
    pub fn new(window: Duration, limit: u32) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(quota_from_window(window, limit))),
            window,
            limit: limit.max(1),
        }
    }

    /// Waits until the quota admits one more call.
    pub async fn until_ready(&self) {
        self.limiter.until_ready().await;
    }

    /// Takes one call from the quota without waiting; `false` when the quota is spent.
    pub fn try_take(&self) -> bool {
        self.limiter.check().is_ok()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

impl std::fmt::Debug for UpstreamQuota {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamQuota")
            .field("window", &self.window)
            .field("limit", &self.limit)
            .finish()
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let safe_limit = quota_limit.max(1);
    let burst = NonZeroU32::new(safe_limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(safe_limit)).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}
