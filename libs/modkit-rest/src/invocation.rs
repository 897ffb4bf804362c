use crate::argument::Argument;
use crate::error::InvocationError;
use crate::service::{MethodDescriptor, ServiceDescriptor};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Receiver a call was made on, as seen by interceptors.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Immutable record of one service method call.
///
/// Attached to every outgoing request's extensions, so a transport layer can
/// read it back with `request.extensions().get::<Invocation>()`.
#[derive(Clone)]
pub struct Invocation {
    service: Arc<ServiceDescriptor>,
    instance: Option<Instance>,
    method: Arc<MethodDescriptor>,
    arguments: Arc<[Argument]>,
    annotation_url: Option<Arc<str>>,
}

impl Invocation {
    #[must_use]
    pub fn builder() -> InvocationBuilder {
        InvocationBuilder::default()
    }

    /// The service the call was made through. For inherited methods this is
    /// the bound service, not [`MethodDescriptor::declaring_service`].
    #[must_use]
    pub fn service(&self) -> &Arc<ServiceDescriptor> {
        &self.service
    }

    /// Receiver of the call; `None` only for snapshots built with
    /// [`InvocationBuilder::build_without_instance`].
    #[must_use]
    pub fn instance(&self) -> Option<&Instance> {
        self.instance.as_ref()
    }

    #[must_use]
    pub fn method(&self) -> &Arc<MethodDescriptor> {
        &self.method
    }

    #[must_use]
    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// Route template before path substitution.
    #[must_use]
    pub fn annotation_url(&self) -> Option<&str> {
        self.annotation_url.as_deref()
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("service", &self.service.name())
            .field("method", &self.method.name())
            .field("arguments", &self.arguments)
            .field("annotation_url", &self.annotation_url)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}() [", self.service.name(), self.method.name())?;
        for (i, argument) in self.arguments.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            fmt::Debug::fmt(argument, f)?;
        }
        f.write_str("]")
    }
}

/// Builder for [`Invocation`]. Every field except the route template is required.
#[derive(Default)]
#[must_use]
pub struct InvocationBuilder {
    service: Option<Arc<ServiceDescriptor>>,
    instance: Option<Instance>,
    method: Option<Arc<MethodDescriptor>>,
    arguments: Option<Arc<[Argument]>>,
    annotation_url: Option<Arc<str>>,
}

impl InvocationBuilder {
    pub fn service(mut self, service: Arc<ServiceDescriptor>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn instance(mut self, instance: Instance) -> Self {
        self.instance = Some(instance);
        self
    }

    pub fn method(mut self, method: Arc<MethodDescriptor>) -> Self {
        self.method = Some(method);
        self
    }

    /// Copies the arguments; later changes to the source are not observed.
    pub fn arguments<'a>(mut self, arguments: impl IntoIterator<Item = &'a Argument>) -> Self {
        self.arguments = Some(arguments.into_iter().cloned().collect());
        self
    }

    pub fn annotation_url(mut self, url: impl Into<Arc<str>>) -> Self {
        self.annotation_url = Some(url.into());
        self
    }

    /// # Errors
    ///
    /// Returns the [`InvocationError`] naming the first missing field, checked
    /// in the order service, instance, method, arguments.
    pub fn build(self) -> Result<Invocation, InvocationError> {
        let service = self.service.ok_or(InvocationError::MissingService)?;
        let instance = self.instance.ok_or(InvocationError::MissingInstance)?;
        let method = self.method.ok_or(InvocationError::MissingMethod)?;
        let arguments = self.arguments.ok_or(InvocationError::MissingArguments)?;

        Ok(Invocation {
            service,
            instance: Some(instance),
            method,
            arguments,
            annotation_url: self.annotation_url,
        })
    }

    /// Builds a snapshot from a method and its arguments alone. The service is
    /// a descriptor named after the method's declaring service, and there is
    /// no instance.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::MissingMethod`] or
    /// [`InvocationError::MissingArguments`].
    #[deprecated(note = "use `build` with an explicit service and instance")]
    pub fn build_without_instance(self) -> Result<Invocation, InvocationError> {
        let method = self.method.ok_or(InvocationError::MissingMethod)?;
        let arguments = self.arguments.ok_or(InvocationError::MissingArguments)?;
        let service = Arc::new(ServiceDescriptor::named(
            method.declaring_service().to_owned(),
        ));

        Ok(Invocation {
            service,
            instance: None,
            method,
            arguments,
            annotation_url: self.annotation_url,
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn example() -> Arc<ServiceDescriptor> {
        Arc::new(
            ServiceDescriptor::builder("Example")
                .method(
                    MethodDescriptor::post("postMethod", "/{p1}")
                        .path("p1")
                        .query("p2"),
                )
                .build(),
        )
    }

    fn method() -> Arc<MethodDescriptor> {
        example().methods()[0].clone()
    }

    fn args() -> Vec<Argument> {
        crate::args!["one", "two"]
    }

    #[test]
    fn test_built_with_all_fields() {
        let service = example();
        let instance: Instance = Arc::new(());
        let arguments = args();

        let invocation = Invocation::builder()
            .service(service.clone())
            .instance(instance.clone())
            .method(method())
            .arguments(&arguments)
            .annotation_url("/abc")
            .build()
            .unwrap();

        assert!(Arc::ptr_eq(invocation.service(), &service));
        assert!(Arc::ptr_eq(invocation.instance().unwrap(), &instance));
        assert_eq!(invocation.method().name(), "postMethod");
        assert_eq!(invocation.arguments(), arguments.as_slice());
        assert_eq!(invocation.annotation_url(), Some("/abc"));
        assert_eq!(invocation.to_string(), r#"Example.postMethod() ["one", "two"]"#);
    }

    #[test]
    fn test_missing_service() {
        let err = Invocation::builder()
            .instance(Arc::new(()))
            .method(method())
            .arguments(&args())
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "service == null");
    }

    #[test]
    fn test_missing_instance() {
        let err = Invocation::builder()
            .service(example())
            .method(method())
            .arguments(&args())
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "instance == null");
    }

    #[test]
    fn test_missing_method() {
        let err = Invocation::builder()
            .service(example())
            .instance(Arc::new(()))
            .arguments(&args())
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "method == null");
    }

    #[test]
    fn test_missing_arguments() {
        let err = Invocation::builder()
            .service(example())
            .instance(Arc::new(()))
            .method(method())
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "arguments == null");
    }

    #[test]
    fn test_missing_fields_reported_in_order() {
        let err = Invocation::builder().build().unwrap_err();
        assert_eq!(err, InvocationError::MissingService);
    }

    #[test]
    #[allow(deprecated)]
    fn test_without_instance_uses_declaring_service() {
        let invocation = Invocation::builder()
            .method(method())
            .arguments(&args())
            .build_without_instance()
            .unwrap();

        assert_eq!(invocation.service().name(), "Example");
        assert!(invocation.instance().is_none());
        assert_eq!(invocation.annotation_url(), None);
    }

    #[test]
    #[allow(deprecated)]
    fn test_without_instance_missing_fields() {
        let err = Invocation::builder()
            .arguments(&args())
            .build_without_instance()
            .unwrap_err();
        assert_eq!(err.to_string(), "method == null");

        let err = Invocation::builder()
            .method(method())
            .build_without_instance()
            .unwrap_err();
        assert_eq!(err.to_string(), "arguments == null");
    }

    #[test]
    #[allow(deprecated)]
    fn test_arguments_are_copied() {
        let mut arguments = args();
        let invocation = Invocation::builder()
            .method(method())
            .arguments(&arguments)
            .build_without_instance()
            .unwrap();

        arguments.push(Argument::new("three"));

        assert_eq!(invocation.arguments().len(), 2);
        assert_eq!(invocation.arguments(), &arguments[..2]);
    }
}
