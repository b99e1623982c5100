//! Adapter configuration types.

use std::time::Duration;

/// Configuration for the [`HyperAdapter`](crate::HyperAdapter).
///
/// Connect and receive timeouts are per call, see
/// [`PoolOptions`](crate::PoolOptions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Maximum idle connections per host.
    pub pool_idle_per_host: usize,
    /// Idle connection timeout.
    pub pool_idle_timeout: Duration,
    /// Whether HTTP/2 may be negotiated over TLS.
    pub http2: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            pool_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
            http2: true,
        }
    }
}

impl AdapterConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> AdapterConfigBuilder {
        AdapterConfigBuilder::default()
    }
}

/// Builder for [`AdapterConfig`].
#[derive(Debug, Clone, Default)]
pub struct AdapterConfigBuilder {
    pool_idle_per_host: Option<usize>,
    pool_idle_timeout: Option<Duration>,
    http2: Option<bool>,
}

impl AdapterConfigBuilder {
    /// Set the maximum idle connections per host.
    #[must_use]
    pub const fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.pool_idle_per_host = Some(count);
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub const fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Enable or disable HTTP/2.
    #[must_use]
    pub const fn http2(mut self, enabled: bool) -> Self {
        self.http2 = Some(enabled);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> AdapterConfig {
        let defaults = AdapterConfig::default();
        AdapterConfig {
            pool_idle_per_host: self
                .pool_idle_per_host
                .unwrap_or(defaults.pool_idle_per_host),
            pool_idle_timeout: self.pool_idle_timeout.unwrap_or(defaults.pool_idle_timeout),
            http2: self.http2.unwrap_or(defaults.http2),
        }
    }
}
