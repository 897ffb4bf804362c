use crate::argument::Argument;
use crate::body::RequestBody;
use crate::builder::RestClientBuilder;
use crate::call::Call;
use crate::chain::ConverterChain;
use crate::converter::{RequestBodyConverter, ResponseBodyConverter};
use crate::error::{BindError, RestError};
use crate::invocation::{Instance, Invocation};
use crate::service::{MethodDescriptor, Param, ServiceDescriptor};
use crate::transport::Transport;
use std::any::{Any, type_name};
use std::fmt;
use std::sync::{Arc, OnceLock};
use url::Url;

pub struct ClientInner {
    pub(crate) base_url: Url,
    pub(crate) chain: ConverterChain,
    pub(crate) transport: Transport,
    pub(crate) max_body_size: usize,
    pub(crate) validate_eagerly: bool,
}

/// Client that turns [`ServiceDescriptor`]s into callable [`RestService`]s.
///
/// `RestClient` is `Clone + Send + Sync`; clones share the converter chain
/// and the transport.
///
/// # Example
///
/// ```ignore
/// let client = RestClient::builder()
///     .base_url("https://api.example.com/")
///     .add_converter_factory(JsonConverterFactory::new(mapper))
///     .build()?;
///
/// let users = client.create(Arc::new(users_service()))?;
/// let user: User = users
///     .invoke::<User>("get", args!["42"])?
///     .execute()
///     .await?
///     .into_body()
///     .unwrap_or_default();
/// ```
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("factories", &self.inner.chain.factory_names())
            .field("max_body_size", &self.inner.max_body_size)
            .field("validate_eagerly", &self.inner.validate_eagerly)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    /// Create a builder for configuring the client
    #[must_use]
    pub fn builder() -> RestClientBuilder {
        RestClientBuilder::new()
    }

    pub(crate) fn from_inner(inner: ClientInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    #[must_use]
    pub fn converter_chain(&self) -> &ConverterChain {
        &self.inner.chain
    }

    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.inner.max_body_size
    }

    #[must_use]
    pub fn validates_eagerly(&self) -> bool {
        self.inner.validate_eagerly
    }

    /// Bind `service` to this client.
    ///
    /// Methods bind on first invocation unless eager validation is enabled,
    /// in which case every method is bound here.
    ///
    /// # Errors
    ///
    /// With eager validation, returns [`RestError::Bind`] for the first
    /// method whose converters cannot be resolved.
    pub fn create(&self, service: Arc<ServiceDescriptor>) -> Result<RestService, RestError> {
        let bound = service.methods().iter().map(|_| OnceLock::new()).collect();
        let rest = RestService {
            inner: Arc::new(ServiceInner {
                client: self.clone(),
                service,
                bound,
            }),
        };

        if self.inner.validate_eagerly {
            for index in 0..rest.inner.bound.len() {
                rest.bound(index)?;
            }
        }
        Ok(rest)
    }
}

/// Converters resolved for one method.
struct BoundMethod {
    request: Option<(usize, Arc<dyn RequestBodyConverter>)>,
    response: Arc<dyn ResponseBodyConverter>,
}

struct ServiceInner {
    client: RestClient,
    service: Arc<ServiceDescriptor>,
    bound: Vec<OnceLock<Result<Arc<BoundMethod>, BindError>>>,
}

/// A service bound to a [`RestClient`].
///
/// Cloning is cheap; clones share the bound methods and count as the same
/// instance in [`Invocation::instance`].
#[derive(Clone)]
pub struct RestService {
    inner: Arc<ServiceInner>,
}

impl RestService {
    #[must_use]
    pub fn descriptor(&self) -> &Arc<ServiceDescriptor> {
        &self.inner.service
    }

    /// This service as the receiver recorded in each call's [`Invocation`].
    #[must_use]
    pub fn instance(&self) -> Instance {
        self.inner.clone()
    }

    /// Prepare a call to the method named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::UnknownMethod`] when the service has no such
    /// method, and otherwise the errors of [`invoke_at`](Self::invoke_at).
    pub fn invoke<T: Any + Send>(
        &self,
        name: &str,
        arguments: Vec<Argument>,
    ) -> Result<Call<T>, RestError> {
        let index =
            self.inner
                .service
                .index_of(name)
                .ok_or_else(|| RestError::UnknownMethod {
                    service: self.inner.service.name().to_owned(),
                    method: name.to_owned(),
                })?;
        self.invoke_at(index, arguments)
    }

    /// Prepare a call to the method at `index`.
    ///
    /// A buffered request body is encoded here, so its encode failure is
    /// returned before any transport work starts.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::Bind`] if the method's converters cannot be
    /// resolved, [`RestError::Encode`] if a buffered body fails to encode,
    /// and a declaration error when `T` or the arguments do not match the
    /// method.
    pub fn invoke_at<T: Any + Send>(
        &self,
        index: usize,
        mut arguments: Vec<Argument>,
    ) -> Result<Call<T>, RestError> {
        let service = &self.inner.service;
        let method = service
            .method(index)
            .ok_or_else(|| RestError::UnknownMethodIndex {
                service: service.name().to_owned(),
                index,
            })?;

        if !method.returns_type().is::<T>() {
            return Err(RestError::ReturnTypeMismatch {
                method: method.to_string(),
                declared: method.returns_type().name(),
                requested: type_name::<T>(),
            });
        }
        if arguments.len() != method.params().len() {
            return Err(RestError::ArgumentCount {
                method: method.to_string(),
                expected: method.params().len(),
                actual: arguments.len(),
            });
        }

        let bound = self.bound(index)?;

        let mut invocation = Invocation::builder()
            .service(Arc::clone(service))
            .instance(self.instance())
            .method(Arc::clone(method))
            .arguments(&arguments);
        if let Some(route) = method.route() {
            invocation = invocation.annotation_url(route);
        }
        let invocation = invocation.build()?;

        let url = self.build_url(method, &arguments)?;

        let body = match &bound.request {
            Some((position, converter)) => converter.convert(arguments.swap_remove(*position))?,
            None => RequestBody::empty(),
        };

        let mut request = http::Request::builder()
            .method(method.http_method().clone())
            .uri(url.as_str())
            .extension(invocation);
        if let Some(content_type) = body.content_type() {
            request = request.header(http::header::CONTENT_TYPE, content_type.clone());
        }
        let request = request.body(body)?;

        let client = &self.inner.client.inner;
        Ok(Call::new(
            request,
            client.transport.clone(),
            Arc::clone(&bound.response),
            client.max_body_size,
        ))
    }

    /// Resolve (once) and return the converters of the method at `index`.
    fn bound(&self, index: usize) -> Result<Arc<BoundMethod>, RestError> {
        let slot = &self.inner.bound[index];
        let method = &self.inner.service.methods()[index];
        slot.get_or_init(|| self.bind(method))
            .clone()
            .map_err(RestError::from)
    }

    fn bind(&self, method: &MethodDescriptor) -> Result<Arc<BoundMethod>, BindError> {
        let chain = &self.inner.client.inner.chain;
        let bind_error = |type_name, source| BindError {
            type_name,
            service: method.declaring_service().to_owned(),
            method: method.name().to_owned(),
            source,
        };

        let request = match method.body_param() {
            Some((position, ty)) => {
                let converter = chain
                    .request_body_converter(ty, method.annotations())
                    .map_err(|e| bind_error(ty.shape().name(), e))?;
                Some((position, converter))
            }
            None => None,
        };

        let response_type = method.response_type();
        let response = chain
            .response_body_converter(&response_type)
            .map_err(|e| bind_error(response_type.shape().name(), e))?;

        tracing::debug!(
            service = self.inner.service.name(),
            method = method.name(),
            response_type = response_type.shape().name(),
            "bound service method"
        );

        Ok(Arc::new(BoundMethod { request, response }))
    }

    fn build_url(&self, method: &MethodDescriptor, arguments: &[Argument]) -> Result<Url, RestError> {
        let parameter_error = |position: usize, reason: String| RestError::Parameter {
            method: method.to_string(),
            position: position + 1,
            reason,
        };

        let mut path = method.route().map(str::to_owned);
        let mut dynamic = None;
        let mut query = Vec::new();

        for (position, (param, argument)) in method.params().iter().zip(arguments).enumerate() {
            let value = || {
                argument.as_param().ok_or_else(|| {
                    parameter_error(
                        position,
                        format!(
                            "parameter value must be a string, integer or boolean, not {}",
                            argument.type_name()
                        ),
                    )
                })
            };

            match param {
                Param::Path(name) => {
                    let value = value()?;
                    let placeholder = format!("{{{name}}}");
                    let template = path
                        .as_mut()
                        .filter(|template| template.contains(&placeholder))
                        .ok_or_else(|| {
                            parameter_error(
                                position,
                                format!(
                                    "URL \"{}\" does not contain \"{placeholder}\"",
                                    method.route().unwrap_or_default()
                                ),
                            )
                        })?;
                    *template = template.replace(&placeholder, &urlencoding::encode(&value));
                }
                Param::Query(name) => query.push((name, value()?)),
                Param::Url => dynamic = Some(value()?),
                Param::Body(_) => {}
            }
        }

        let relative = dynamic.or(path).unwrap_or_default();
        let base = &self.inner.client.inner.base_url;
        let mut url = base.join(&relative).map_err(|e| RestError::InvalidUrl {
            url: relative.clone(),
            reason: e.to_string(),
        })?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }
}
