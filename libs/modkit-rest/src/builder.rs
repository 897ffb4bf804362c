use crate::chain::ConverterChain;
use crate::client::{ClientInner, RestClient};
use crate::config::{RestClientConfig, TransportConfig};
use crate::converter::ConverterFactory;
use crate::error::RestError;
use crate::transport::{HyperTransport, Transport};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Builder for constructing a [`RestClient`].
pub struct RestClientBuilder {
    config: RestClientConfig,
    factories: Vec<Arc<dyn ConverterFactory>>,
    transport: Option<Transport>,
}

impl RestClientBuilder {
    /// Create a new builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RestClientConfig::default())
    }

    /// Create a builder with a specific configuration
    #[must_use]
    pub fn with_config(config: RestClientConfig) -> Self {
        Self {
            config,
            factories: Vec::new(),
            transport: None,
        }
    }

    /// Set the base URL route templates resolve against. It must end in `/`.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Append a converter factory.
    ///
    /// Factories are consulted in the order they are added, after the
    /// built-in converters and before the optional-response fallback.
    #[must_use]
    pub fn add_converter_factory(self, factory: impl ConverterFactory) -> Self {
        self.add_shared_converter_factory(Arc::new(factory))
    }

    /// Append a converter factory that is shared with other clients.
    #[must_use]
    pub fn add_shared_converter_factory(mut self, factory: Arc<dyn ConverterFactory>) -> Self {
        self.factories.push(factory);
        self
    }

    /// Replace the default hyper transport.
    #[must_use]
    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the per-request timeout of the default transport
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.request_timeout = Some(timeout);
        self
    }

    /// Set the settings of the default transport
    #[must_use]
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.config.transport = config;
        self
    }

    /// Set maximum response body size
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Bind every method when a service is created.
    #[must_use]
    pub fn validate_eagerly(mut self, validate: bool) -> Self {
        self.config.validate_eagerly = validate;
        self
    }

    /// Build the client
    ///
    /// # Errors
    ///
    /// Returns [`RestError::MissingBaseUrl`] or [`RestError::InvalidUrl`] for a
    /// missing or unusable base URL, and [`RestError::Transport`] if the
    /// default transport cannot be initialized.
    pub fn build(self) -> Result<RestClient, RestError> {
        let raw = self.config.base_url.ok_or(RestError::MissingBaseUrl)?;
        let base_url = Url::parse(&raw).map_err(|e| RestError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        if !base_url.path().ends_with('/') {
            return Err(RestError::InvalidUrl {
                url: raw,
                reason: "base URL must end in /".to_owned(),
            });
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => HyperTransport::build(&self.config.transport)?,
        };

        Ok(RestClient::from_inner(ClientInner {
            base_url,
            chain: ConverterChain::new(self.factories),
            transport,
            max_body_size: self.config.max_body_size,
            validate_eagerly: self.config.validate_eagerly,
        }))
    }
}

impl Default for RestClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
