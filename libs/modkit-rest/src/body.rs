use crate::argument::Argument;
use crate::converter::BodyEncoder;
use crate::error::EncodeError;
use bytes::Bytes;
use http::HeaderValue;
use http_body::{Body, Frame, SizeHint};
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

/// Shared slot where a body records the first encode failure it hit.
pub type FailureSlot = Arc<OnceLock<EncodeError>>;

/// A request body the caller already encoded, passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBody {
    content_type: Option<HeaderValue>,
    bytes: Bytes,
}

impl RawBody {
    #[must_use]
    pub fn new(content_type: HeaderValue, bytes: impl Into<Bytes>) -> Self {
        Self {
            content_type: Some(content_type),
            bytes: bytes.into(),
        }
    }

    /// Raw bytes sent without a `Content-Type` header.
    #[must_use]
    pub fn untyped(bytes: impl Into<Bytes>) -> Self {
        Self {
            content_type: None,
            bytes: bytes.into(),
        }
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&HeaderValue> {
        self.content_type.as_ref()
    }

    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}

impl From<&RawBody> for RequestBody {
    fn from(raw: &RawBody) -> Self {
        RequestBody::from_bytes(raw.content_type.clone(), raw.bytes.clone())
    }
}

/// Observable lifecycle of a [`RequestBody`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyState {
    /// Bytes were produced when the body was built (buffered mode)
    Encoded,
    /// Value is held until the transport polls the body (streaming mode)
    Pending,
    /// All bytes were handed to the transport
    Written,
    /// The encoder failed while the transport polled the body
    Failed,
}

enum State {
    Encoded(Bytes),
    Pending {
        encoder: Arc<dyn BodyEncoder>,
        value: Argument,
    },
    Written,
    Failed,
}

/// Request body handed to the transport.
///
/// A buffered body holds bytes encoded up front, so its length is known and
/// writing it cannot fail. A streaming body holds the value and its encoder
/// and encodes on the first poll, on whatever task the transport drives it.
/// Both produce identical bytes for the same value and encoder.
pub struct RequestBody {
    content_type: Option<HeaderValue>,
    state: State,
    failure: FailureSlot,
}

impl RequestBody {
    /// Encodes `value` now.
    ///
    /// # Errors
    ///
    /// Returns the encoder's [`EncodeError`] before any transport work starts.
    pub fn buffered(encoder: &dyn BodyEncoder, value: &Argument) -> Result<Self, EncodeError> {
        let mut out = Vec::new();
        encoder.encode(value.value(), &mut out)?;
        Ok(Self::from_bytes(Some(encoder.content_type()), Bytes::from(out)))
    }

    /// Defers encoding of `value` until the body is polled.
    #[must_use]
    pub fn streaming(encoder: Arc<dyn BodyEncoder>, value: Argument) -> Self {
        Self {
            content_type: Some(encoder.content_type()),
            state: State::Pending { encoder, value },
            failure: FailureSlot::default(),
        }
    }

    /// Body made of bytes that are already encoded.
    #[must_use]
    pub fn from_bytes(content_type: Option<HeaderValue>, bytes: Bytes) -> Self {
        Self {
            content_type,
            state: State::Encoded(bytes),
            failure: FailureSlot::default(),
        }
    }

    /// Body of a method that declares none.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_bytes(None, Bytes::new())
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&HeaderValue> {
        self.content_type.as_ref()
    }

    /// Exact length, known only for buffered bodies that were not yet written.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        match &self.state {
            State::Encoded(bytes) => Some(bytes.len() as u64),
            State::Pending { .. } | State::Written | State::Failed => None,
        }
    }

    #[must_use]
    pub fn state(&self) -> BodyState {
        match self.state {
            State::Encoded(_) => BodyState::Encoded,
            State::Pending { .. } => BodyState::Pending,
            State::Written => BodyState::Written,
            State::Failed => BodyState::Failed,
        }
    }

    pub(crate) fn failure_slot(&self) -> FailureSlot {
        Arc::clone(&self.failure)
    }
}

impl Default for RequestBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl Body for RequestBody {
    type Data = Bytes;
    type Error = EncodeError;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        match std::mem::replace(&mut this.state, State::Written) {
            State::Encoded(bytes) if bytes.is_empty() => Poll::Ready(None),
            State::Encoded(bytes) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
            State::Pending { encoder, value } => {
                tracing::trace!(
                    value_type = value.type_name(),
                    "encoding streaming request body"
                );
                let mut out = Vec::new();
                match encoder.encode(value.value(), &mut out) {
                    Ok(()) if out.is_empty() => Poll::Ready(None),
                    Ok(()) => Poll::Ready(Some(Ok(Frame::data(Bytes::from(out))))),
                    Err(err) => {
                        this.state = State::Failed;
                        // Only the first failure is kept; a body never encodes twice.
                        this.failure.get_or_init(|| err.clone());
                        Poll::Ready(Some(Err(err)))
                    }
                }
            }
            State::Written => Poll::Ready(None),
            State::Failed => {
                this.state = State::Failed;
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.state {
            State::Encoded(bytes) => bytes.is_empty(),
            State::Pending { .. } => false,
            State::Written | State::Failed => true,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.state {
            State::Encoded(bytes) => SizeHint::with_exact(bytes.len() as u64),
            State::Pending { .. } => SizeHint::default(),
            State::Written | State::Failed => SizeHint::with_exact(0),
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBody")
            .field("content_type", &self.content_type)
            .field("state", &self.state())
            .field("content_length", &self.content_length())
            .finish_non_exhaustive()
    }
}
