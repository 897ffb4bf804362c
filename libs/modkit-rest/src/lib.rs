#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Typed REST client infrastructure for `ModKit`
//!
//! A remote service is declared as a table of [`MethodDescriptor`]s. Binding
//! it to a [`RestClient`] resolves, once per method, the converters for its
//! request body and its response through an ordered [`ConverterChain`]:
//! - [`BuiltInConverters`] first (raw bodies, `Bytes`, `()`)
//! - user [`ConverterFactory`]s in registration order
//! - [`OptionalConverterFactory`] last (`Option<T>` responses)
//!
//! Request bodies are encoded either while the call is prepared (buffered,
//! failures returned by [`RestService::invoke`]) or while the transport
//! writes them (streaming, failures returned by [`Call::execute`] or given to
//! [`Callback::on_failure`]). Every request carries an [`Invocation`] in its
//! extensions for transport layers to inspect.
//!
//! Codecs live in separate crates: `modkit-rest-json` and
//! `modkit-rest-protobuf`.
//!
//! # Example
//!
//! ```ignore
//! use modkit_rest::{MethodDescriptor, RestClient, ServiceDescriptor, args};
//! use std::sync::Arc;
//!
//! let service = Arc::new(
//!     ServiceDescriptor::builder("Users")
//!         .method(MethodDescriptor::get("get", "/users/{id}").path("id").returns::<User>())
//!         .build(),
//! );
//!
//! let client = RestClient::builder()
//!     .base_url("https://api.example.com/")
//!     .add_converter_factory(json_factory)
//!     .build()?;
//!
//! let users = client.create(service)?;
//! let response = users.invoke::<User>("get", args!["42"])?.execute().await?;
//! ```

mod argument;
mod body;
mod builder;
mod call;
mod chain;
mod client;
mod config;
mod converter;
mod error;
mod invocation;
mod service;
mod transport;
mod types;

pub use argument::{AnyValue, Argument};
pub use body::{BodyState, RawBody, RequestBody};
pub use builder::RestClientBuilder;
pub use call::{Call, Callback, FnCallback, RestResponse, callback_fn};
pub use chain::{BuiltInConverters, ConverterChain, OptionalConverterFactory};
pub use client::{RestClient, RestService};
pub use config::{DEFAULT_MAX_BODY_SIZE, RestClientConfig, TransportConfig};
pub use converter::{
    BodyEncoder, BodyMode, ConverterFactory, DecodeFn, EncodingConverter, RequestBodyConverter,
    ResponseBodyConverter,
};
pub use error::{
    BindError, BoxError, CallError, DecodeError, DecodeErrorKind, Direction, EncodeError,
    InvocationError, ResolutionError, RestError,
};
pub use invocation::{Instance, Invocation, InvocationBuilder};
pub use service::{MethodDescriptor, Param, ServiceBuilder, ServiceDescriptor};
pub use transport::{HyperTransport, ResponseBody, Transport, transport_from};
pub use types::{Annotation, Annotations, CodecType, Decoded, TypeShape};
