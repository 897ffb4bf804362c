//! Transport seam between prepared calls and the network.
//!
//! Anything implementing `tower::Service<http::Request<RequestBody>>` can carry
//! calls. [`HyperTransport`] is the default: a pooled hyper-util client over a
//! rustls connector with an optional per-request timeout.

use crate::body::RequestBody;
use crate::config::TransportConfig;
use crate::error::{BoxError, RestError};
use bytes::Bytes;
use http::{Request, Response};
use http_body::Body;
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::sync::Arc;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceBuilder, ServiceExt};

/// Response body as delivered by a [`Transport`].
pub type ResponseBody = BoxBody<Bytes, BoxError>;

/// Type-erased transport service shared by all calls of a client.
pub type Transport = BoxCloneSyncService<Request<RequestBody>, Response<ResponseBody>, BoxError>;

/// Boxes any tower service into a [`Transport`].
///
/// Test doubles are usually built from `tower::service_fn`.
pub fn transport_from<S, B>(service: S) -> Transport
where
    S: Service<Request<RequestBody>, Response = Response<B>> + Clone + Send + Sync + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
    B: Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<BoxError>,
{
    BoxCloneSyncService::new(
        service
            .map_response(box_response)
            .map_err(Into::<BoxError>::into),
    )
}

fn box_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<BoxError>,
{
    let (parts, body) = response.into_parts();
    let boxed: ResponseBody = body.map_err(Into::into).boxed();
    Response::from_parts(parts, boxed)
}

/// Crypto provider for TLS: the process default when one is installed,
/// otherwise aws-lc-rs without installing it globally.
fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// Default transport built on hyper.
pub struct HyperTransport;

impl HyperTransport {
    /// Builds the pooled client described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::Transport`] if TLS initialization fails.
    pub fn build(config: &TransportConfig) -> Result<Transport, RestError> {
        let builder = hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(crypto_provider())
            .map_err(|e| RestError::Transport(Box::new(e)))?;
        let https = if config.allow_http {
            builder.https_or_http().enable_all_versions().build()
        } else {
            builder.https_only().enable_all_versions().build()
        };

        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_idle_timeout needs a timer
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host);
        if let Some(idle_timeout) = config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle_timeout);
        }
        let client = client_builder.build::<_, RequestBody>(https);

        tracing::debug!(
            request_timeout = ?config.request_timeout,
            allow_http = config.allow_http,
            "built hyper transport"
        );

        Ok(match config.request_timeout {
            Some(timeout) => transport_from(
                ServiceBuilder::new()
                    .layer(TimeoutLayer::new(timeout))
                    .service(client),
            ),
            None => transport_from(client),
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_hyper_transport_sends_request_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/echo")
                .header("content-type", "text/plain")
                .body("payload");
            then.status(201).body("created");
        });

        let transport = HyperTransport::build(&TransportConfig::default()).unwrap();
        let body = RequestBody::from_bytes(None, Bytes::from_static(b"payload"));
        let request = Request::post(server.url("/echo"))
            .header(http::header::CONTENT_TYPE, "text/plain")
            .body(body)
            .unwrap();

        let response = transport.oneshot(request).await.unwrap();
        assert_eq!(response.status(), 201);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(bytes, Bytes::from_static(b"created"));
        mock.assert();
    }

    #[tokio::test]
    async fn test_hyper_transport_timeout() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_secs(2));
        });

        let config = TransportConfig {
            request_timeout: Some(Duration::from_millis(100)),
            ..TransportConfig::default()
        };
        let transport = HyperTransport::build(&config).unwrap();
        let request = Request::get(server.url("/slow"))
            .body(RequestBody::empty())
            .unwrap();

        let err = transport.oneshot(request).await.unwrap_err();
        assert!(err.is::<tower::timeout::error::Elapsed>());
    }

    #[tokio::test]
    async fn test_transport_from_service_fn() {
        let transport = transport_from(tower::service_fn(|request: Request<RequestBody>| async move {
            let path = request.uri().path().to_owned();
            Ok::<_, std::convert::Infallible>(Response::new(http_body_util::Full::new(
                Bytes::from(path),
            )))
        }));

        let request = Request::get("http://example.com/abc")
            .body(RequestBody::empty())
            .unwrap();
        let response = transport.oneshot(request).await.unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(bytes, Bytes::from_static(b"/abc"));
    }
}
