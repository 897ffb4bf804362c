use std::error::Error;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error used at the transport boundary.
pub type BoxError = Box<dyn Error + Send + Sync>;

type SharedError = Arc<dyn Error + Send + Sync>;

/// A converter's encode step failed.
///
/// Cloning shares the original error, which stays reachable through
/// [`Error::source`] for downcasting.
#[derive(Clone)]
pub struct EncodeError {
    source: SharedError,
}

impl EncodeError {
    #[must_use]
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self {
            source: Arc::from(source.into()),
        }
    }

    /// The value handed to the converter was not of the type it was bound to.
    #[must_use]
    pub fn type_mismatch(expected: &'static str) -> Self {
        Self::new(format!("request body value is not a {expected}"))
    }

    /// The original error raised by the codec.
    #[must_use]
    pub fn get_ref(&self) -> &(dyn Error + Send + Sync + 'static) {
        &*self.source
    }
}

impl fmt::Debug for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EncodeError").field(&self.source).finish()
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to encode request body: {}", self.source)
    }
}

impl Error for EncodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&*self.source)
    }
}

/// Classification of response decoding failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeErrorKind {
    /// Input ended before a complete value was read
    UnexpectedEof,
    /// Input is not a valid encoding of the target type
    Malformed,
    /// A converter produced a value of a different type than requested
    TypeMismatch,
}

/// A converter's decode step failed.
#[derive(Clone)]
pub struct DecodeError {
    kind: DecodeErrorKind,
    source: Option<SharedError>,
    detail: String,
}

impl DecodeError {
    #[must_use]
    pub fn new(kind: DecodeErrorKind, source: impl Into<BoxError>) -> Self {
        let source: SharedError = Arc::from(source.into());
        Self {
            kind,
            detail: source.to_string(),
            source: Some(source),
        }
    }

    #[must_use]
    pub fn unexpected_eof(source: impl Into<BoxError>) -> Self {
        Self::new(DecodeErrorKind::UnexpectedEof, source)
    }

    #[must_use]
    pub fn malformed(source: impl Into<BoxError>) -> Self {
        Self::new(DecodeErrorKind::Malformed, source)
    }

    #[must_use]
    pub fn type_mismatch(expected: &'static str) -> Self {
        Self {
            kind: DecodeErrorKind::TypeMismatch,
            source: None,
            detail: expected.to_owned(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> DecodeErrorKind {
        self.kind
    }
}

impl fmt::Debug for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeError")
            .field("kind", &self.kind)
            .field("detail", &self.detail)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DecodeErrorKind::UnexpectedEof => {
                write!(f, "response body ended unexpectedly: {}", self.detail)
            }
            DecodeErrorKind::Malformed => write!(f, "malformed response body: {}", self.detail),
            DecodeErrorKind::TypeMismatch => {
                write!(f, "decoded response body is not a {}", self.detail)
            }
        }
    }
}

impl Error for DecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

/// Which side of a method a converter was looked up for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Request,
    Response,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Request => f.write_str("RequestBody"),
            Direction::Response => f.write_str("ResponseBody"),
        }
    }
}

/// No factory in the chain produced a converter.
///
/// Lists, in registration order, the factories skipped by a delegating lookup
/// and every factory that was tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionError {
    pub direction: Direction,
    pub type_name: &'static str,
    pub skipped: Vec<&'static str>,
    pub tried: Vec<&'static str>,
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Could not locate {} converter for {}.\n",
            self.direction, self.type_name
        )?;
        if !self.skipped.is_empty() {
            f.write_str("  Skipped:")?;
            for name in &self.skipped {
                write!(f, "\n   * {name}")?;
            }
            f.write_str("\n")?;
        }
        f.write_str("  Tried:")?;
        for name in &self.tried {
            write!(f, "\n   * {name}")?;
        }
        Ok(())
    }
}

impl Error for ResolutionError {}

/// A service method could not be bound to its converters.
#[derive(Debug, Clone, Error)]
#[error("Unable to create converter for {type_name}\n    for method {service}.{method}")]
pub struct BindError {
    pub type_name: &'static str,
    pub service: String,
    pub method: String,
    pub source: ResolutionError,
}

/// A required field was missing when building an [`Invocation`](crate::Invocation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum InvocationError {
    #[error("service == null")]
    MissingService,
    #[error("instance == null")]
    MissingInstance,
    #[error("method == null")]
    MissingMethod,
    #[error("arguments == null")]
    MissingArguments,
}

/// Errors raised while building a client, binding a service, or preparing a call.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RestError {
    /// Converter resolution failed for a method
    #[error(transparent)]
    Bind(#[from] BindError),

    /// Buffered request body encoding failed
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// Invocation snapshot construction failed
    #[error(transparent)]
    Invocation(#[from] InvocationError),

    /// The service has no method with this name
    #[error("Service {service} has no method named '{method}'")]
    UnknownMethod { service: String, method: String },

    /// Method index out of range
    #[error("Service {service} has no method at index {index}")]
    UnknownMethodIndex { service: String, index: usize },

    /// The caller asked for a different response type than the method declares
    #[error("Method {method} returns {declared}, not {requested}")]
    ReturnTypeMismatch {
        method: String,
        declared: &'static str,
        requested: &'static str,
    },

    /// Wrong number of arguments for the method
    #[error("Method {method} expects {expected} arguments but {actual} were supplied")]
    ArgumentCount {
        method: String,
        expected: usize,
        actual: usize,
    },

    /// An argument could not be bound to its parameter
    #[error("{reason} (parameter #{position})\n    for method {method}")]
    Parameter {
        method: String,
        position: usize,
        reason: String,
    },

    /// Missing base URL at build time
    #[error("Base URL required")]
    MissingBaseUrl,

    /// URL failed to parse or resolve
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Request building failed
    #[error("Failed to build request: {0}")]
    Request(#[from] http::Error),

    /// Transport construction failed (TLS setup, etc)
    #[error("Failed to build transport: {0}")]
    Transport(#[source] BoxError),
}

/// Errors delivered by [`Call::execute`](crate::Call::execute) or through
/// [`Callback::on_failure`](crate::Callback::on_failure).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CallError {
    /// Streaming request body encoding failed while the transport wrote it
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// Response body could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Transport error (network, connection, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// The transport's per-request timeout elapsed
    #[error("Request timed out")]
    Timeout,

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes")]
    BodyTooLarge { limit: usize },
}
