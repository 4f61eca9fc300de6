use std::time::Duration;

use crate::{ValidationError, MAX_HISTORY_YEARS};

/// Tunables for one ingestion run.
///
/// `workers` (W) and `upstream_slots` (K) are independent: W bounds how many
/// symbols are in progress, K bounds how many provider calls are in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub workers: usize,
    pub upstream_slots: usize,
    pub history_years: u16,
    pub request_timeout: Duration,
    pub run_timeout: Option<Duration>,
    pub quota: Option<QuotaPolicy>,
}

/// Pacing of upstream calls: at most `limit` per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub window: Duration,
    pub limit: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            upstream_slots: 1,
            history_years: 11,
            request_timeout: Duration::from_secs(30),
            run_timeout: None,
            quota: None,
        }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.workers == 0 {
            return Err(ValidationError::ZeroLimit { field: "workers" });
        }
        if self.upstream_slots == 0 {
            return Err(ValidationError::ZeroLimit {
                field: "upstream_slots",
            });
        }
        if self.history_years == 0 || self.history_years > MAX_HISTORY_YEARS {
            return Err(ValidationError::InvalidHistoryYears {
                value: self.history_years,
                max: MAX_HISTORY_YEARS,
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ValidationError::ZeroDuration {
                field: "request_timeout",
            });
        }
        if self.run_timeout.is_some_and(|limit| limit.is_zero()) {
            return Err(ValidationError::ZeroDuration {
                field: "run_timeout",
            });
        }
        if let Some(quota) = self.quota {
            if quota.limit == 0 {
                return Err(ValidationError::ZeroLimit {
                    field: "quota_limit",
                });
            }
            if quota.window.is_zero() {
                return Err(ValidationError::ZeroDuration {
                    field: "quota_window",
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_serialize_upstream_calls() {
        let config = IngestConfig::default();

        assert_eq!(config.workers, 10);
        assert_eq!(config.upstream_slots, 1);
        assert_eq!(config.history_years, 11);
        assert_eq!(config.run_timeout, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_slots() {
        let config = IngestConfig {
            upstream_slots: 0,
            ..IngestConfig::default()
        };

        assert_eq!(
            config.validate(),
            Err(ValidationError::ZeroLimit {
                field: "upstream_slots"
            })
        );
    }

    #[test]
    fn rejects_zero_workers() {
        let config = IngestConfig {
            workers: 0,
            ..IngestConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn allows_more_slots_than_workers() {
        let config = IngestConfig {
            workers: 2,
            upstream_slots: 8,
            ..IngestConfig::default()
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_empty_quota() {
        let config = IngestConfig {
            quota: Some(QuotaPolicy {
                window: Duration::from_secs(60),
                limit: 0,
            }),
            ..IngestConfig::default()
        };

        assert!(config.validate().is_err());
    }
}
