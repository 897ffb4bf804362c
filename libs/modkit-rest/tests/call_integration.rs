//! Integration tests for binding, body emission and call dispatch

use bytes::Bytes;
use http::{HeaderValue, Request, Response};
use http_body_util::{BodyExt, Full};
use httpmock::prelude::*;
use modkit_rest::{
    Annotations, AnyValue, BodyEncoder, BodyMode, BodyState, BoxError, CallError, CodecType,
    ConverterChain, ConverterFactory, DecodeFn, Decoded, EncodeError, EncodingConverter,
    HyperTransport, Invocation, MethodDescriptor, RawBody, RequestBody, RequestBodyConverter,
    ResponseBodyConverter, RestClient, RestError, RestResponse, ServiceDescriptor, Transport,
    TransportConfig, args, callback_fn, transport_from,
};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Plain-text codec for `String`, optionally failing on encode.
struct TextFactory {
    mode: BodyMode,
    fail: bool,
    response_lookups: Arc<AtomicUsize>,
}

impl TextFactory {
    fn new(mode: BodyMode) -> Self {
        Self {
            mode,
            fail: false,
            response_lookups: Arc::default(),
        }
    }

    fn failing(mode: BodyMode) -> Self {
        Self {
            fail: true,
            ..Self::new(mode)
        }
    }
}

struct TextEncoder {
    fail: bool,
}

impl BodyEncoder for TextEncoder {
    fn content_type(&self) -> HeaderValue {
        HeaderValue::from_static("text/plain; charset=UTF-8")
    }

    fn encode(&self, value: &AnyValue, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        if self.fail {
            return Err(EncodeError::new(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "oops!",
            )));
        }
        let text = value
            .downcast_ref::<String>()
            .ok_or_else(|| EncodeError::type_mismatch("String"))?;
        out.extend_from_slice(text.as_bytes());
        Ok(())
    }
}

impl ConverterFactory for TextFactory {
    fn name(&self) -> &'static str {
        "tests::TextFactory"
    }

    fn request_body_converter(
        &self,
        ty: &CodecType,
        _method_annotations: &Annotations,
        _chain: &ConverterChain,
    ) -> Option<Arc<dyn RequestBodyConverter>> {
        ty.shape().is::<String>().then(|| {
            Arc::new(EncodingConverter::new(
                Arc::new(TextEncoder { fail: self.fail }),
                self.mode,
            )) as Arc<dyn RequestBodyConverter>
        })
    }

    fn response_body_converter(
        &self,
        ty: &CodecType,
        _chain: &ConverterChain,
    ) -> Option<Arc<dyn ResponseBodyConverter>> {
        if !ty.shape().is::<String>() {
            return None;
        }
        self.response_lookups.fetch_add(1, Ordering::SeqCst);
        Some(Arc::new(DecodeFn(|body: Bytes| {
            Ok(Box::new(String::from_utf8_lossy(&body).into_owned()) as Decoded)
        })))
    }
}

fn echo_service() -> Arc<ServiceDescriptor> {
    Arc::new(
        ServiceDescriptor::builder("Echo")
            .method(
                MethodDescriptor::post("echo", "/echo")
                    .body::<String>()
                    .returns::<String>(),
            )
            .method(
                MethodDescriptor::get("find", "/find/{name}")
                    .path("name")
                    .returns_optional::<String>(),
            )
            .build(),
    )
}

/// Transport that drains the request body, wrapping any body error.
fn draining_transport() -> Transport {
    transport_from(tower::service_fn(|request: Request<RequestBody>| async move {
        let bytes = request
            .into_body()
            .collect()
            .await
            .map_err(|e| -> BoxError { format!("body write aborted: {e}").into() })?
            .to_bytes();
        Ok::<_, BoxError>(Response::new(Full::new(bytes)))
    }))
}

fn client(factory: TextFactory, transport: Transport) -> RestClient {
    RestClient::builder()
        .base_url("http://example.com/")
        .add_converter_factory(factory)
        .transport(transport)
        .build()
        .unwrap()
}

fn assert_oops(err: &EncodeError) {
    let source = err.get_ref().downcast_ref::<io::Error>().unwrap();
    assert_eq!(source.kind(), io::ErrorKind::UnexpectedEof);
    assert_eq!(source.to_string(), "oops!");
}

#[tokio::test]
async fn end_to_end_over_http() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/echo")
            .header("content-type", "text/plain; charset=UTF-8")
            .body("ping");
        then.status(200).body("pong");
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    let hyper = HyperTransport::build(&TransportConfig::default()).unwrap();
    let intercepted = tower::ServiceBuilder::new()
        .map_request(move |request: Request<RequestBody>| {
            if let Some(invocation) = request.extensions().get::<Invocation>() {
                recorder.lock().unwrap().push(invocation.to_string());
            }
            request
        })
        .service(hyper);

    let client = RestClient::builder()
        .base_url(server.base_url() + "/")
        .add_converter_factory(TextFactory::new(BodyMode::Buffered))
        .transport(transport_from(intercepted))
        .build()
        .unwrap();
    let service = client.create(echo_service()).unwrap();

    let response = service
        .invoke::<String>("echo", args!["ping".to_owned()])
        .unwrap()
        .execute()
        .await
        .unwrap();

    assert_eq!(response.body().map(String::as_str), Some("pong"));
    mock.assert();
    assert_eq!(*seen.lock().unwrap(), vec![r#"Echo.echo() ["ping"]"#.to_owned()]);
}

#[tokio::test]
async fn optional_response_maps_empty_body_to_none() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/find/known");
        then.status(200).body("found");
    });
    server.mock(|when, then| {
        when.method(GET).path("/find/unknown");
        then.status(200);
    });

    let client = RestClient::builder()
        .base_url(server.url("/"))
        .add_converter_factory(TextFactory::new(BodyMode::Buffered))
        .build()
        .unwrap();
    let service = client.create(echo_service()).unwrap();

    let found = service
        .invoke::<Option<String>>("find", args!["known"])
        .unwrap()
        .execute()
        .await
        .unwrap();
    assert_eq!(found.into_body(), Some(Some("found".to_owned())));

    let missing = service
        .invoke::<Option<String>>("find", args!["unknown"])
        .unwrap()
        .execute()
        .await
        .unwrap();
    assert_eq!(missing.into_body(), Some(None));
}

#[tokio::test]
async fn non_success_status_keeps_raw_error_body() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/echo");
        then.status(500).body("broken");
    });

    let client = RestClient::builder()
        .base_url(server.url("/"))
        .add_converter_factory(TextFactory::new(BodyMode::Buffered))
        .build()
        .unwrap();
    let response = client
        .create(echo_service())
        .unwrap()
        .invoke::<String>("echo", args!["x".to_owned()])
        .unwrap()
        .execute()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    assert!(response.body().is_none());
    assert_eq!(response.error_body().unwrap(), &Bytes::from_static(b"broken"));
}

#[tokio::test]
async fn raw_body_passes_through_builtins() {
    let service = Arc::new(
        ServiceDescriptor::builder("Raw")
            .method(
                MethodDescriptor::put("upload", "/upload")
                    .body::<RawBody>()
                    .returns::<Bytes>(),
            )
            .build(),
    );
    let client = RestClient::builder()
        .base_url("http://example.com/")
        .transport(draining_transport())
        .build()
        .unwrap();

    let raw = RawBody::new(HeaderValue::from_static("application/octet-stream"), "\x01\x02");
    let response = client
        .create(service)
        .unwrap()
        .invoke::<Bytes>("upload", args![raw])
        .unwrap()
        .execute()
        .await
        .unwrap();
    assert_eq!(response.into_body().unwrap(), Bytes::from_static(b"\x01\x02"));
}

#[test]
fn buffered_encode_failure_is_returned_by_invoke() {
    let service = client(TextFactory::failing(BodyMode::Buffered), draining_transport())
        .create(echo_service())
        .unwrap();

    let err = service
        .invoke::<String>("echo", args!["value".to_owned()])
        .unwrap_err();
    let RestError::Encode(encode) = err else {
        panic!("expected an encode error, got {err}");
    };
    assert_oops(&encode);
}

#[tokio::test]
async fn streaming_encode_failure_is_returned_by_execute() {
    let service = client(TextFactory::failing(BodyMode::Streaming), draining_transport())
        .create(echo_service())
        .unwrap();

    let call = service
        .invoke::<String>("echo", args!["value".to_owned()])
        .unwrap();
    assert_eq!(call.request().body().state(), BodyState::Pending);

    let err = call.execute().await.unwrap_err();
    let CallError::Encode(encode) = err else {
        panic!("expected an encode error, got {err}");
    };
    assert_oops(&encode);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn streaming_encode_failure_reaches_failure_callback_once() {
    let service = client(TextFactory::failing(BodyMode::Streaming), draining_transport())
        .create(echo_service())
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = tokio::sync::oneshot::channel();
    let counter = Arc::clone(&calls);

    let handle = service
        .invoke::<String>("echo", args!["value".to_owned()])
        .unwrap()
        .enqueue(callback_fn(
            |_response: RestResponse<String>| panic!("the call must fail"),
            move |err| {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(err);
            },
        ));

    let err = rx.await.unwrap();
    handle.await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let CallError::Encode(encode) = err else {
        panic!("expected an encode error, got {err}");
    };
    assert_oops(&encode);
}

#[test]
fn concurrent_first_invocations_resolve_once() {
    let factory = TextFactory::new(BodyMode::Buffered);
    let lookups = Arc::clone(&factory.response_lookups);
    let service = client(factory, draining_transport())
        .create(echo_service())
        .unwrap();

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                let _call = service
                    .invoke::<String>("echo", args!["value".to_owned()])
                    .unwrap();
            });
        }
    });

    assert_eq!(lookups.load(Ordering::SeqCst), 1);
}

#[test]
fn first_registered_factory_is_kept_for_the_method() {
    let first = TextFactory::new(BodyMode::Buffered);
    let second = TextFactory::new(BodyMode::Buffered);
    let first_lookups = Arc::clone(&first.response_lookups);
    let second_lookups = Arc::clone(&second.response_lookups);

    let service = RestClient::builder()
        .base_url("http://example.com/")
        .add_converter_factory(first)
        .add_converter_factory(second)
        .transport(draining_transport())
        .build()
        .unwrap()
        .create(echo_service())
        .unwrap();

    for _ in 0..3 {
        let _call = service
            .invoke::<String>("echo", args!["value".to_owned()])
            .unwrap();
    }

    assert_eq!(first_lookups.load(Ordering::SeqCst), 1);
    assert_eq!(second_lookups.load(Ordering::SeqCst), 0);
}
