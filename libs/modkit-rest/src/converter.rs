//! Converter SPI consumed from codec libraries.
//!
//! A [`ConverterFactory`] is asked, once per declared method, for a converter
//! able to serve a [`CodecType`]. It either returns one or declines with
//! `None`, in which case the [`ConverterChain`] moves on to the next factory.

use crate::argument::{AnyValue, Argument};
use crate::body::RequestBody;
use crate::chain::ConverterChain;
use crate::error::{DecodeError, EncodeError};
use crate::types::{Annotations, CodecType, Decoded};
use bytes::Bytes;
use http::HeaderValue;
use std::sync::Arc;

/// Turns a request argument into a [`RequestBody`].
pub trait RequestBodyConverter: Send + Sync {
    /// # Errors
    ///
    /// Returns [`EncodeError`] when a buffered encode fails. Streaming
    /// converters never fail here; their errors surface when the body is written.
    fn convert(&self, value: Argument) -> Result<RequestBody, EncodeError>;
}

/// Turns received response bytes into a type-erased value.
pub trait ResponseBodyConverter: Send + Sync {
    /// # Errors
    ///
    /// Returns [`DecodeError`] for truncated or malformed input.
    fn convert(&self, body: Bytes) -> Result<Decoded, DecodeError>;
}

/// The encode half of a codec: writes one value in a fixed media type.
pub trait BodyEncoder: Send + Sync {
    fn content_type(&self) -> HeaderValue;

    /// # Errors
    ///
    /// Returns [`EncodeError`] if the value cannot be serialized.
    fn encode(&self, value: &AnyValue, out: &mut Vec<u8>) -> Result<(), EncodeError>;
}

/// Provider of converters for the types it understands.
///
/// Factories are shared for the whole client lifetime and must not keep
/// per-call state. Both lookups decline by default.
pub trait ConverterFactory: Send + Sync + 'static {
    /// Name listed in resolution diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Converter for a request body parameter. `ty` carries the parameter's
    /// annotations; the method's own annotations are passed separately.
    fn request_body_converter(
        &self,
        ty: &CodecType,
        method_annotations: &Annotations,
        chain: &ConverterChain,
    ) -> Option<Arc<dyn RequestBodyConverter>> {
        let _ = (ty, method_annotations, chain);
        None
    }

    /// Converter for a method's response body. `ty` carries the method's annotations.
    fn response_body_converter(
        &self,
        ty: &CodecType,
        chain: &ConverterChain,
    ) -> Option<Arc<dyn ResponseBodyConverter>> {
        let _ = (ty, chain);
        None
    }
}

/// When a request converter runs its encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyMode {
    /// Encode while the call is prepared; failures are returned synchronously.
    #[default]
    Buffered,
    /// Encode when the transport writes the body; failures surface there.
    Streaming,
}

/// Request converter that applies a [`BodyEncoder`] in the configured [`BodyMode`].
pub struct EncodingConverter {
    encoder: Arc<dyn BodyEncoder>,
    mode: BodyMode,
}

impl EncodingConverter {
    #[must_use]
    pub fn new(encoder: Arc<dyn BodyEncoder>, mode: BodyMode) -> Self {
        Self { encoder, mode }
    }

    #[must_use]
    pub fn mode(&self) -> BodyMode {
        self.mode
    }
}

impl RequestBodyConverter for EncodingConverter {
    fn convert(&self, value: Argument) -> Result<RequestBody, EncodeError> {
        match self.mode {
            BodyMode::Buffered => RequestBody::buffered(self.encoder.as_ref(), &value),
            BodyMode::Streaming => Ok(RequestBody::streaming(Arc::clone(&self.encoder), value)),
        }
    }
}

/// Response converter backed by a plain decode function.
pub struct DecodeFn<F>(pub F);

impl<F> ResponseBodyConverter for DecodeFn<F>
where
    F: Fn(Bytes) -> Result<Decoded, DecodeError> + Send + Sync,
{
    fn convert(&self, body: Bytes) -> Result<Decoded, DecodeError> {
        (self.0)(body)
    }
}
