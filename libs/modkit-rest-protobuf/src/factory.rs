use crate::extension::ExtensionRegistry;
use crate::registry::{Codec, EncodeFn, MessageRegistry};
use bytes::Bytes;
use http::HeaderValue;
use modkit_rest::{
    Annotations, AnyValue, BodyEncoder, BodyMode, CodecType, ConverterChain, ConverterFactory,
    DecodeError, DecodeFn, Decoded, EncodeError, EncodingConverter, RequestBodyConverter,
    ResponseBodyConverter,
};
use std::sync::Arc;

pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";

/// Converter factory for `prost` messages, sent as `application/x-protobuf`.
///
/// Serves the types of its [`MessageRegistry`]. `Extended<T>` responses are
/// served only once an [`ExtensionRegistry`] is attached with
/// [`with_registry`](Self::with_registry).
#[derive(Debug, Clone)]
pub struct ProtoConverterFactory {
    messages: Arc<MessageRegistry>,
    extensions: Option<Arc<ExtensionRegistry>>,
    mode: BodyMode,
}

impl ProtoConverterFactory {
    #[must_use]
    pub fn new(messages: MessageRegistry) -> Self {
        Self {
            messages: Arc::new(messages),
            extensions: None,
            mode: BodyMode::Buffered,
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: ExtensionRegistry) -> Self {
        self.extensions = Some(Arc::new(registry));
        self
    }

    /// Encode request bodies while the transport writes them.
    #[must_use]
    pub fn with_streaming(mut self) -> Self {
        self.mode = BodyMode::Streaming;
        self
    }
}

impl ConverterFactory for ProtoConverterFactory {
    fn name(&self) -> &'static str {
        "modkit_rest_protobuf::ProtoConverterFactory"
    }

    fn request_body_converter(
        &self,
        ty: &CodecType,
        _method_annotations: &Annotations,
        _chain: &ConverterChain,
    ) -> Option<Arc<dyn RequestBodyConverter>> {
        let Codec::Message { encode, .. } = self.messages.codec(ty.shape())? else {
            return None;
        };
        Some(Arc::new(EncodingConverter::new(
            Arc::new(ProtoEncoder { encode }),
            self.mode,
        )))
    }

    fn response_body_converter(
        &self,
        ty: &CodecType,
        _chain: &ConverterChain,
    ) -> Option<Arc<dyn ResponseBodyConverter>> {
        match self.messages.codec(ty.shape())? {
            Codec::Message { decode, .. } => Some(Arc::new(DecodeFn(decode))),
            Codec::Extended { decode } => {
                let Some(registry) = self.extensions.clone() else {
                    tracing::debug!(
                        ty = ty.shape().name(),
                        "extended response declined without an extension registry"
                    );
                    return None;
                };
                Some(Arc::new(DecodeFn(
                    move |body: Bytes| -> Result<Decoded, DecodeError> { decode(body, &registry) },
                )))
            }
        }
    }
}

struct ProtoEncoder {
    encode: EncodeFn,
}

impl BodyEncoder for ProtoEncoder {
    fn content_type(&self) -> HeaderValue {
        HeaderValue::from_static(PROTOBUF_CONTENT_TYPE)
    }

    fn encode(&self, value: &AnyValue, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        (self.encode)(value, out)
    }
}
