//! Explicit service and method descriptors.
//!
//! A service is a table of [`MethodDescriptor`]s addressed by index or name.
//! Each method declares its HTTP verb, route template, parameters and the
//! type its response decodes into; converters are resolved from these
//! declarations when the method is first bound.

use crate::types::{Annotation, Annotations, CodecType, TypeShape};
use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// How one positional argument of a method is bound into the request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Param {
    /// Replaces `{name}` in the route template, percent-encoded
    Path(Cow<'static, str>),
    /// Appended to the query string as `name=value`
    Query(Cow<'static, str>),
    /// Encoded into the request body by the bound request converter
    Body(CodecType),
    /// Absolute or base-relative URL used instead of a route template
    Url,
}

/// Declaration of one remote method.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    name: Cow<'static, str>,
    declaring_service: Cow<'static, str>,
    http_method: http::Method,
    route: Option<Cow<'static, str>>,
    params: Vec<Param>,
    returns: TypeShape,
    annotations: Annotations,
}

impl MethodDescriptor {
    #[must_use]
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        http_method: http::Method,
        route: Option<Cow<'static, str>>,
    ) -> Self {
        Self {
            name: name.into(),
            declaring_service: Cow::Borrowed(""),
            http_method,
            route,
            params: Vec::new(),
            returns: TypeShape::of::<()>(),
            annotations: Annotations::new(),
        }
    }

    #[must_use]
    pub fn get(name: impl Into<Cow<'static, str>>, route: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, http::Method::GET, Some(route.into()))
    }

    #[must_use]
    pub fn post(name: impl Into<Cow<'static, str>>, route: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, http::Method::POST, Some(route.into()))
    }

    #[must_use]
    pub fn put(name: impl Into<Cow<'static, str>>, route: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, http::Method::PUT, Some(route.into()))
    }

    #[must_use]
    pub fn delete(name: impl Into<Cow<'static, str>>, route: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, http::Method::DELETE, Some(route.into()))
    }

    /// Method without a route template; its URL comes from a [`Param::Url`] argument.
    #[must_use]
    pub fn dynamic(name: impl Into<Cow<'static, str>>, http_method: http::Method) -> Self {
        Self::new(name, http_method, None).param(Param::Url)
    }

    #[must_use]
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn path(self, name: impl Into<Cow<'static, str>>) -> Self {
        self.param(Param::Path(name.into()))
    }

    #[must_use]
    pub fn query(self, name: impl Into<Cow<'static, str>>) -> Self {
        self.param(Param::Query(name.into()))
    }

    /// Unannotated body parameter of type `T`.
    #[must_use]
    pub fn body<T: Any>(self) -> Self {
        self.param(Param::Body(CodecType::of::<T>()))
    }

    /// Body parameter with explicit annotations.
    #[must_use]
    pub fn body_with(self, ty: CodecType) -> Self {
        self.param(Param::Body(ty))
    }

    #[must_use]
    pub fn returns<T: Any>(mut self) -> Self {
        self.returns = TypeShape::of::<T>();
        self
    }

    /// Declares an `Option<T>` response; an empty body decodes to `None`.
    #[must_use]
    pub fn returns_optional<T: Any + Send>(mut self) -> Self {
        self.returns = TypeShape::optional::<T>();
        self
    }

    #[must_use]
    pub fn returns_shape(mut self, shape: TypeShape) -> Self {
        self.returns = shape;
        self
    }

    #[must_use]
    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.insert(annotation);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the service that declared this method, which differs from the
    /// bound service for methods inherited through [`ServiceBuilder::extends`].
    #[must_use]
    pub fn declaring_service(&self) -> &str {
        &self.declaring_service
    }

    #[must_use]
    pub fn http_method(&self) -> &http::Method {
        &self.http_method
    }

    /// Literal route template before path substitution.
    #[must_use]
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Position and declared type of the body parameter, if any.
    #[must_use]
    pub fn body_param(&self) -> Option<(usize, &CodecType)> {
        self.params.iter().enumerate().find_map(|(i, p)| match p {
            Param::Body(ty) => Some((i, ty)),
            _ => None,
        })
    }

    #[must_use]
    pub fn returns_type(&self) -> &TypeShape {
        &self.returns
    }

    /// Response lookup key: the return shape with the method's annotations.
    #[must_use]
    pub fn response_type(&self) -> CodecType {
        CodecType::new(self.returns.clone(), self.annotations.clone())
    }

    #[must_use]
    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.declaring_service, self.name)
    }
}

/// An ordered table of methods under one service name.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    name: Cow<'static, str>,
    methods: Vec<Arc<MethodDescriptor>>,
}

impl ServiceDescriptor {
    #[must_use]
    pub fn builder(name: impl Into<Cow<'static, str>>) -> ServiceBuilder {
        ServiceBuilder {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Descriptor with no methods, used when only the name is known.
    pub(crate) fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn methods(&self) -> &[Arc<MethodDescriptor>] {
        &self.methods
    }

    #[must_use]
    pub fn method(&self, index: usize) -> Option<&Arc<MethodDescriptor>> {
        self.methods.get(index)
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|m| m.name() == name)
    }
}

impl PartialEq for ServiceDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.methods.len() == other.methods.len()
            && self
                .methods
                .iter()
                .zip(&other.methods)
                .all(|(a, b)| Arc::ptr_eq(a, b) || a.name() == b.name())
    }
}

impl fmt::Display for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Builder for [`ServiceDescriptor`].
#[must_use]
pub struct ServiceBuilder {
    name: Cow<'static, str>,
    methods: Vec<Arc<MethodDescriptor>>,
}

impl ServiceBuilder {
    /// Declares a method on this service.
    pub fn method(mut self, mut method: MethodDescriptor) -> Self {
        method.declaring_service.clone_from(&self.name);
        self.methods.push(Arc::new(method));
        self
    }

    /// Inherits every method of `parent`, keeping its declaring service.
    pub fn extends(mut self, parent: &ServiceDescriptor) -> Self {
        self.methods.extend(parent.methods.iter().cloned());
        self
    }

    #[must_use]
    pub fn build(self) -> ServiceDescriptor {
        ServiceDescriptor {
            name: self.name,
            methods: self.methods,
        }
    }
}
