use crate::argument::Argument;
use crate::body::{RawBody, RequestBody};
use crate::converter::{ConverterFactory, DecodeFn, RequestBodyConverter, ResponseBodyConverter};
use crate::error::{DecodeError, Direction, EncodeError, ResolutionError};
use crate::types::{Annotations, CodecType, Decoded, TypeShape};
use bytes::Bytes;
use std::sync::Arc;

/// Ordered list of converter factories consulted to bind a method's bodies.
///
/// The chain always starts with [`BuiltInConverters`] and always ends with
/// [`OptionalConverterFactory`]; user factories sit in between, in
/// registration order. The first factory that does not decline wins.
#[derive(Clone)]
pub struct ConverterChain {
    factories: Vec<Arc<dyn ConverterFactory>>,
}

impl ConverterChain {
    #[must_use]
    pub fn new(factories: impl IntoIterator<Item = Arc<dyn ConverterFactory>>) -> Self {
        let mut all: Vec<Arc<dyn ConverterFactory>> = vec![Arc::new(BuiltInConverters)];
        all.extend(factories);
        all.push(Arc::new(OptionalConverterFactory));
        Self { factories: all }
    }

    #[must_use]
    pub fn factories(&self) -> &[Arc<dyn ConverterFactory>] {
        &self.factories
    }

    /// Factory names in consultation order.
    #[must_use]
    pub fn factory_names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|f| f.name()).collect()
    }

    /// Resolves the converter for a request body of type `ty`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] listing every factory tried when all decline.
    pub fn request_body_converter(
        &self,
        ty: &CodecType,
        method_annotations: &Annotations,
    ) -> Result<Arc<dyn RequestBodyConverter>, ResolutionError> {
        self.next_request_body_converter(None, ty, method_annotations)
    }

    /// Like [`request_body_converter`](Self::request_body_converter), but only
    /// consults the factories registered after `skip_past`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] listing the skipped and the tried factories.
    pub fn next_request_body_converter(
        &self,
        skip_past: Option<&dyn ConverterFactory>,
        ty: &CodecType,
        method_annotations: &Annotations,
    ) -> Result<Arc<dyn RequestBodyConverter>, ResolutionError> {
        let start = self.start_after(skip_past);
        self.factories[start..]
            .iter()
            .find_map(|f| f.request_body_converter(ty, method_annotations, self))
            .ok_or_else(|| self.not_found(Direction::Request, ty, start))
    }

    /// Resolves the converter for a response body of type `ty`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] listing every factory tried when all decline.
    pub fn response_body_converter(
        &self,
        ty: &CodecType,
    ) -> Result<Arc<dyn ResponseBodyConverter>, ResolutionError> {
        self.next_response_body_converter(None, ty)
    }

    /// Like [`response_body_converter`](Self::response_body_converter), but only
    /// consults the factories registered after `skip_past`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] listing the skipped and the tried factories.
    pub fn next_response_body_converter(
        &self,
        skip_past: Option<&dyn ConverterFactory>,
        ty: &CodecType,
    ) -> Result<Arc<dyn ResponseBodyConverter>, ResolutionError> {
        let start = self.start_after(skip_past);
        self.factories[start..]
            .iter()
            .find_map(|f| f.response_body_converter(ty, self))
            .ok_or_else(|| self.not_found(Direction::Response, ty, start))
    }

    fn start_after(&self, skip_past: Option<&dyn ConverterFactory>) -> usize {
        skip_past
            .and_then(|skip| {
                self.factories
                    .iter()
                    .position(|f| std::ptr::addr_eq(Arc::as_ptr(f), std::ptr::from_ref(skip)))
            })
            .map_or(0, |index| index + 1)
    }

    fn not_found(&self, direction: Direction, ty: &CodecType, start: usize) -> ResolutionError {
        let (skipped, tried) = self.factories.split_at(start);
        ResolutionError {
            direction,
            type_name: ty.shape().name(),
            skipped: skipped.iter().map(|f| f.name()).collect(),
            tried: tried.iter().map(|f| f.name()).collect(),
        }
    }
}

impl Default for ConverterChain {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Baseline converters consulted before any user factory.
///
/// Requests: [`RawBody`] passes through unchanged. Responses: [`Bytes`] are
/// handed over as received and `()` discards the body.
pub struct BuiltInConverters;

impl ConverterFactory for BuiltInConverters {
    fn name(&self) -> &'static str {
        "modkit_rest::BuiltInConverters"
    }

    fn request_body_converter(
        &self,
        ty: &CodecType,
        _method_annotations: &Annotations,
        _chain: &ConverterChain,
    ) -> Option<Arc<dyn RequestBodyConverter>> {
        if ty.shape().is::<RawBody>() {
            return Some(Arc::new(RawBodyConverter));
        }
        None
    }

    fn response_body_converter(
        &self,
        ty: &CodecType,
        _chain: &ConverterChain,
    ) -> Option<Arc<dyn ResponseBodyConverter>> {
        let shape = ty.shape();
        if shape.is::<Bytes>() {
            return Some(Arc::new(DecodeFn(|body: Bytes| Ok(Box::new(body) as Decoded))));
        }
        if shape.is::<()>() {
            return Some(Arc::new(DecodeFn(|_body: Bytes| Ok(Box::new(()) as Decoded))));
        }
        None
    }
}

struct RawBodyConverter;

impl RequestBodyConverter for RawBodyConverter {
    fn convert(&self, value: Argument) -> Result<RequestBody, EncodeError> {
        value
            .downcast_ref::<RawBody>()
            .map(RequestBody::from)
            .ok_or_else(|| EncodeError::type_mismatch(std::any::type_name::<RawBody>()))
    }
}

/// Serves `Option<T>` responses declared with [`TypeShape::optional`] by
/// resolving `T` through the whole chain. An empty body decodes to `None`.
pub struct OptionalConverterFactory;

impl ConverterFactory for OptionalConverterFactory {
    fn name(&self) -> &'static str {
        "modkit_rest::OptionalConverterFactory"
    }

    fn response_body_converter(
        &self,
        ty: &CodecType,
        chain: &ConverterChain,
    ) -> Option<Arc<dyn ResponseBodyConverter>> {
        let inner = ty.shape().inner()?;
        let delegate = chain
            .response_body_converter(&ty.with_shape(inner.clone()))
            .ok()?;
        Some(Arc::new(OptionalConverter {
            shape: ty.shape().clone(),
            delegate,
        }))
    }
}

struct OptionalConverter {
    shape: TypeShape,
    delegate: Arc<dyn ResponseBodyConverter>,
}

impl ResponseBodyConverter for OptionalConverter {
    fn convert(&self, body: Bytes) -> Result<Decoded, DecodeError> {
        let inner = if body.is_empty() {
            None
        } else {
            Some(self.delegate.convert(body)?)
        };
        match self.shape.wrap_optional(inner) {
            Some(Ok(value)) => Ok(value),
            Some(Err(_)) | None => Err(DecodeError::type_mismatch(self.shape.name())),
        }
    }
}
