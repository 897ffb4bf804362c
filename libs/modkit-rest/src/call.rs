use crate::body::{FailureSlot, RequestBody};
use crate::converter::ResponseBodyConverter;
use crate::error::{BoxError, CallError, DecodeError};
use crate::invocation::Invocation;
use crate::transport::{ResponseBody, Transport};
use bytes::Bytes;
use http::{HeaderMap, Request, StatusCode};
use http_body_util::BodyExt;
use std::any::{Any, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower::ServiceExt;

/// One prepared call of a service method.
///
/// The request, including its [`Invocation`] extension and its request body,
/// is fully built. Run it with [`execute`](Self::execute), or hand it to a
/// background task with [`enqueue`](Self::enqueue).
#[must_use = "a call does nothing until it is executed or enqueued"]
pub struct Call<T> {
    request: Request<RequestBody>,
    transport: Transport,
    response: Arc<dyn ResponseBodyConverter>,
    max_body_size: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send> Call<T> {
    pub(crate) fn new(
        request: Request<RequestBody>,
        transport: Transport,
        response: Arc<dyn ResponseBodyConverter>,
        max_body_size: usize,
    ) -> Self {
        Self {
            request,
            transport,
            response,
            max_body_size,
            _marker: PhantomData,
        }
    }

    /// The request this call sends.
    #[must_use]
    pub fn request(&self) -> &Request<RequestBody> {
        &self.request
    }

    #[must_use]
    pub fn invocation(&self) -> Option<&Invocation> {
        self.request.extensions().get::<Invocation>()
    }

    /// Send the request and decode the response.
    ///
    /// A streaming request body encodes while this future is polled, so its
    /// encode failure is returned here as [`CallError::Encode`].
    ///
    /// # Errors
    ///
    /// Returns [`CallError`] if the body cannot be encoded, the transport
    /// fails, the response is too large, or the response cannot be decoded.
    pub async fn execute(self) -> Result<RestResponse<T>, CallError> {
        let failure = self.request.body().failure_slot();

        tracing::trace!(
            method = %self.request.method(),
            uri = %self.request.uri(),
            "dispatching call"
        );

        let response = match self.transport.oneshot(self.request).await {
            Ok(response) => response,
            Err(err) => return Err(transport_failure(&failure, err)),
        };

        let (parts, body) = response.into_parts();
        let bytes = read_body_limited(body, self.max_body_size).await?;

        if !parts.status.is_success() {
            return Ok(RestResponse {
                status: parts.status,
                headers: parts.headers,
                body: None,
                error_body: Some(bytes),
            });
        }

        if parts.status == StatusCode::NO_CONTENT || parts.status == StatusCode::RESET_CONTENT {
            return Ok(RestResponse {
                status: parts.status,
                headers: parts.headers,
                body: None,
                error_body: None,
            });
        }

        let decoded = self.response.convert(bytes)?;
        let body = decoded
            .downcast::<T>()
            .map_err(|_| DecodeError::type_mismatch(type_name::<T>()))?;

        Ok(RestResponse {
            status: parts.status,
            headers: parts.headers,
            body: Some(*body),
            error_body: None,
        })
    }

    /// Run the call on a spawned Tokio task and report the outcome to
    /// `callback`, exactly once.
    ///
    /// Never fails itself: every error, including a streaming body's encode
    /// failure, reaches [`Callback::on_failure`].
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, like [`tokio::spawn`].
    pub fn enqueue<C>(self, callback: C) -> JoinHandle<()>
    where
        C: Callback<T>,
    {
        tokio::spawn(async move {
            match self.execute().await {
                Ok(response) => callback.on_response(response),
                Err(err) => callback.on_failure(err),
            }
        })
    }
}

impl<T> fmt::Debug for Call<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("request", &self.request)
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

/// A streaming body that failed to encode takes precedence over whatever the
/// transport made of that failure.
fn transport_failure(failure: &FailureSlot, err: BoxError) -> CallError {
    if let Some(encode) = failure.get() {
        return CallError::Encode(encode.clone());
    }
    if err.is::<tower::timeout::error::Elapsed>() {
        return CallError::Timeout;
    }
    CallError::Transport(err)
}

async fn read_body_limited(body: ResponseBody, limit: usize) -> Result<Bytes, CallError> {
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(CallError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(CallError::BodyTooLarge { limit });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}

/// Outcome of a call that reached the server.
///
/// Successful responses carry the decoded body (`None` for 204 and 205);
/// other statuses carry the raw error body instead.
#[derive(Debug)]
pub struct RestResponse<T> {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<T>,
    error_body: Option<Bytes>,
}

impl<T> RestResponse<T> {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.status.is_success()
    }

    #[must_use]
    pub fn body(&self) -> Option<&T> {
        self.body.as_ref()
    }

    #[must_use]
    pub fn into_body(self) -> Option<T> {
        self.body
    }

    #[must_use]
    pub fn error_body(&self) -> Option<&Bytes> {
        self.error_body.as_ref()
    }
}

/// Receiver of an enqueued call's outcome. Exactly one method is called.
pub trait Callback<T>: Send + 'static {
    fn on_response(self, response: RestResponse<T>);

    fn on_failure(self, error: CallError);
}

/// [`Callback`] made of two closures.
pub struct FnCallback<R, F> {
    on_response: R,
    on_failure: F,
}

/// Build a [`Callback`] from a response closure and a failure closure.
pub fn callback_fn<T, R, F>(on_response: R, on_failure: F) -> FnCallback<R, F>
where
    R: FnOnce(RestResponse<T>) + Send + 'static,
    F: FnOnce(CallError) + Send + 'static,
{
    FnCallback {
        on_response,
        on_failure,
    }
}

impl<T, R, F> Callback<T> for FnCallback<R, F>
where
    R: FnOnce(RestResponse<T>) + Send + 'static,
    F: FnOnce(CallError) + Send + 'static,
{
    fn on_response(self, response: RestResponse<T>) {
        (self.on_response)(response);
    }

    fn on_failure(self, error: CallError) {
        (self.on_failure)(error);
    }
}
