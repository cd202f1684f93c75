//! Dispatcher configuration: endpoint concurrency caps, the long-request
//! overflow policy, and the idle-reap schedule for the dispatcher's
//! private async-submission pool.

use std::time::Duration;

use crate::error::{Error, Result};

/// The default maximum of short+long requests concurrently running
/// against a single endpoint.
pub const DEFAULT_MAX_PER_ENDPOINT: u32 = 4;
/// The default maximum of long requests concurrently running against a
/// single endpoint.
pub const DEFAULT_MAX_LONG_PER_ENDPOINT: u32 = 2;
/// Idle threshold for the dispatcher's private async-submission pool.
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(10);
/// Reap interval for the dispatcher's private async-submission pool.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(15);

/// What happens to a long submission that would exceed
/// `max_long_per_endpoint`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Fail synchronously with [`crate::error::Kind::LongLimitExceeded`].
    #[default]
    Throw,
    /// Synthesize a completed, failed operation and deliver it
    /// asynchronously through the delegate's `did_fail`.
    Fail,
    /// Queue the submission; admit it once a long slot frees up.
    /// Bounded by [`DispatcherConfig::max_enqueue_depth`].
    Enqueue,
}

/// Dispatcher construction parameters.
///
/// Build with [`DispatcherConfigBuilder`], or use [`DispatcherConfig::default`]
/// for the documented defaults (`M = 4`, `L = 2`, policy `Throw`).
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub max_per_endpoint: u32,
    pub max_long_per_endpoint: u32,
    pub overflow_policy: OverflowPolicy,
    /// Bound on the `Enqueue` policy's per-endpoint waiter queue. `None`
    /// preserves the historical unbounded behavior.
    pub max_enqueue_depth: Option<usize>,
    pub idle_threshold: Duration,
    pub reap_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            max_per_endpoint: DEFAULT_MAX_PER_ENDPOINT,
            max_long_per_endpoint: DEFAULT_MAX_LONG_PER_ENDPOINT,
            overflow_policy: OverflowPolicy::Throw,
            max_enqueue_depth: None,
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            reap_interval: DEFAULT_REAP_INTERVAL,
        }
    }
}

impl DispatcherConfig {
    pub fn builder() -> DispatcherConfigBuilder {
        DispatcherConfigBuilder::default()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_per_endpoint == 0 {
            return Err(Error::invalid_argument("max_per_endpoint must be positive"));
        }
        if self.max_long_per_endpoint > self.max_per_endpoint {
            return Err(Error::invalid_argument(
                "max_long_per_endpoint must not exceed max_per_endpoint",
            ));
        }
        Ok(())
    }
}

/// Builds a [`DispatcherConfig`], validating cross-field constraints at
/// [`build`](Self::build) rather than on each setter call.
#[derive(Debug, Clone, Default)]
pub struct DispatcherConfigBuilder {
    config: DispatcherConfig,
}

impl DispatcherConfigBuilder {
    pub fn max_per_endpoint(mut self, value: u32) -> Self {
        self.config.max_per_endpoint = value;
        self
    }

    pub fn max_long_per_endpoint(mut self, value: u32) -> Self {
        self.config.max_long_per_endpoint = value;
        self
    }

    pub fn overflow_policy(mut self, value: OverflowPolicy) -> Self {
        self.config.overflow_policy = value;
        self
    }

    pub fn max_enqueue_depth(mut self, value: Option<usize>) -> Self {
        self.config.max_enqueue_depth = value;
        self
    }

    pub fn idle_threshold(mut self, value: Duration) -> Self {
        self.config.idle_threshold = value;
        self
    }

    pub fn reap_interval(mut self, value: Duration) -> Self {
        self.config.reap_interval = value;
        self
    }

    pub fn build(self) -> Result<DispatcherConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = DispatcherConfig::default();
        assert_eq!(config.max_per_endpoint, 4);
        assert_eq!(config.max_long_per_endpoint, 2);
        assert_eq!(config.overflow_policy, OverflowPolicy::Throw);
        assert_eq!(config.max_enqueue_depth, None);
    }

    #[test]
    fn rejects_long_limit_above_short_limit() {
        let err = DispatcherConfig::builder()
            .max_per_endpoint(2)
            .max_long_per_endpoint(3)
            .build()
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn rejects_zero_max_per_endpoint() {
        let err = DispatcherConfig::builder().max_per_endpoint(0).build().unwrap_err();
        assert!(err.is_invalid_argument());
    }
}
