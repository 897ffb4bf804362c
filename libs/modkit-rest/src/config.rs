use std::time::Duration;

/// Default maximum response body size (10 MB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Configuration for [`RestClient`](crate::RestClient).
#[derive(Debug, Clone)]
pub struct RestClientConfig {
    /// Base URL that route templates resolve against (required)
    pub base_url: Option<String>,

    /// Maximum response body size in bytes (default: 10 MB)
    pub max_body_size: usize,

    /// Bind every method of a service when it is created instead of on first
    /// invocation (default: false)
    ///
    /// With lazy binding a method that cannot be bound fails only its own
    /// invocations; its siblings stay usable.
    pub validate_eagerly: bool,

    /// Transport settings for the default [`HyperTransport`](crate::HyperTransport)
    pub transport: TransportConfig,
}

impl Default for RestClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            validate_eagerly: false,
            transport: TransportConfig::default(),
        }
    }
}

/// Settings for the hyper-based default transport.
///
/// Ignored when a custom transport is installed with
/// [`RestClientBuilder::transport`](crate::RestClientBuilder::transport).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout (default: 30 seconds, `None` disables it)
    pub request_timeout: Option<Duration>,

    /// Idle timeout for pooled connections (default: 90 seconds)
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum idle connections per host (default: 32)
    pub pool_max_idle_per_host: usize,

    /// Allow plain `http://` URLs in addition to `https://` (default: true)
    pub allow_http: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            allow_http: true,
        }
    }
}
