use crate::mapper::{JsonMapper, SerializeFn};
use bytes::Bytes;
use http::HeaderValue;
use modkit_rest::{
    Annotations, AnyValue, BodyEncoder, BodyMode, CodecType, ConverterChain, ConverterFactory,
    DecodeError, DecodeFn, Decoded, EncodeError, EncodingConverter, RequestBodyConverter,
    ResponseBodyConverter,
};
use std::sync::Arc;

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Converter factory serving the types registered in a [`JsonMapper`].
///
/// Request bodies are sent as `application/json; charset=UTF-8`. By default
/// they are encoded while the call is prepared; [`with_streaming`](Self::with_streaming)
/// defers encoding until the transport writes the body.
#[derive(Debug, Clone)]
pub struct JsonConverterFactory {
    mapper: Arc<JsonMapper>,
    mode: BodyMode,
}

impl JsonConverterFactory {
    #[must_use]
    pub fn new(mapper: JsonMapper) -> Self {
        Self {
            mapper: Arc::new(mapper),
            mode: BodyMode::Buffered,
        }
    }

    #[must_use]
    pub fn with_streaming(mut self) -> Self {
        self.mode = BodyMode::Streaming;
        self
    }

    #[must_use]
    pub fn mapper(&self) -> &JsonMapper {
        &self.mapper
    }
}

impl ConverterFactory for JsonConverterFactory {
    fn name(&self) -> &'static str {
        "modkit_rest_json::JsonConverterFactory"
    }

    fn request_body_converter(
        &self,
        ty: &CodecType,
        _method_annotations: &Annotations,
        _chain: &ConverterChain,
    ) -> Option<Arc<dyn RequestBodyConverter>> {
        let serialize = Arc::clone(self.mapper.serialize_fn(ty.shape())?);
        tracing::trace!(ty = ty.shape().name(), mode = ?self.mode, "json request converter");
        let encoder = Arc::new(JsonEncoder { serialize });
        Some(Arc::new(EncodingConverter::new(encoder, self.mode)))
    }

    fn response_body_converter(
        &self,
        ty: &CodecType,
        _chain: &ConverterChain,
    ) -> Option<Arc<dyn ResponseBodyConverter>> {
        let deserialize = Arc::clone(self.mapper.deserialize_fn(ty.shape())?);
        tracing::trace!(ty = ty.shape().name(), "json response converter");
        Some(Arc::new(DecodeFn(move |body: Bytes| -> Result<Decoded, DecodeError> {
            deserialize(body)
        })))
    }
}

struct JsonEncoder {
    serialize: SerializeFn,
}

impl BodyEncoder for JsonEncoder {
    fn content_type(&self) -> HeaderValue {
        HeaderValue::from_static(JSON_CONTENT_TYPE)
    }

    fn encode(&self, value: &AnyValue, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        (self.serialize)(value, out)
    }
}
