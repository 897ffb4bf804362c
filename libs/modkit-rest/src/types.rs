use std::any::{Any, TypeId, type_name};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Type-erased value produced by a response converter.
pub type Decoded = Box<dyn Any + Send>;

/// Wraps an optional erased inner value into the erased `Option<T>`.
type WrapOptional = fn(Option<Decoded>) -> Result<Decoded, Decoded>;

#[derive(Clone, Copy)]
enum ShapeKind {
    Plain,
    Optional { wrap: WrapOptional },
}

/// Semantic type descriptor used as a converter lookup key.
///
/// Built from a Rust type with [`TypeShape::of`]. `Option<T>` should be
/// declared with [`TypeShape::optional`] so the optional converter factory can
/// see through it and delegate to the converter for `T`.
#[derive(Clone)]
pub struct TypeShape {
    id: TypeId,
    name: &'static str,
    kind: ShapeKind,
    inner: Option<Box<TypeShape>>,
}

impl TypeShape {
    /// Plain descriptor for `T`.
    #[must_use]
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            kind: ShapeKind::Plain,
            inner: None,
        }
    }

    /// Descriptor for `Option<T>` that exposes `T` as its inner shape.
    #[must_use]
    pub fn optional<T: Any + Send>() -> Self {
        fn wrap<T: Any + Send>(inner: Option<Decoded>) -> Result<Decoded, Decoded> {
            match inner {
                None => Ok(Box::new(None::<T>)),
                Some(value) => value
                    .downcast::<T>()
                    .map(|value| Box::new(Some(*value)) as Decoded),
            }
        }

        Self {
            id: TypeId::of::<Option<T>>(),
            name: type_name::<Option<T>>(),
            kind: ShapeKind::Optional { wrap: wrap::<T> },
            inner: Some(Box::new(Self::of::<T>())),
        }
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified Rust type name, as printed in diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` if this shape describes exactly `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    /// Inner shape of an optional descriptor.
    #[must_use]
    pub fn inner(&self) -> Option<&TypeShape> {
        self.inner.as_deref()
    }

    /// Wraps a decoded inner value (or its absence) into the erased `Option<T>`.
    ///
    /// Returns `None` for non-optional shapes. The inner value is handed back
    /// unchanged in `Some(Err(..))` when it is not of the declared inner type.
    #[must_use]
    pub fn wrap_optional(&self, inner: Option<Decoded>) -> Option<Result<Decoded, Decoded>> {
        match self.kind {
            ShapeKind::Plain => None,
            ShapeKind::Optional { wrap } => Some(wrap(inner)),
        }
    }
}

impl PartialEq for TypeShape {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.inner == other.inner
    }
}

impl Eq for TypeShape {}

impl Hash for TypeShape {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.inner.hash(state);
    }
}

impl fmt::Debug for TypeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeShape").field(&self.name).finish()
    }
}

impl fmt::Display for TypeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A declared modifier on a parameter or method (the counterpart of a source
/// annotation), optionally carrying a value.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Annotation {
    name: Cow<'static, str>,
    value: Option<Cow<'static, str>>,
}

impl Annotation {
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: impl Into<Cow<'static, str>>) -> Self {
        self.value = Some(value.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

/// Ordered set of annotations, compared by value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Annotations(BTreeSet<Annotation>);

impl Annotations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, annotation: Annotation) -> Self {
        self.0.insert(annotation);
        self
    }

    pub fn insert(&mut self, annotation: Annotation) {
        self.0.insert(annotation);
    }

    /// Returns `true` if any annotation with this name is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|a| a.name() == name)
    }

    /// Value of the first annotation with this name.
    #[must_use]
    pub fn value_of(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|a| a.name() == name)
            .and_then(Annotation::value)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.0.iter()
    }
}

impl FromIterator<Annotation> for Annotations {
    fn from_iter<I: IntoIterator<Item = Annotation>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Converter lookup key: a type shape together with its declared annotations.
///
/// Two codec types are equal only if both the shape and the annotation set
/// match, since annotations may select an alternate codec for the same type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CodecType {
    shape: TypeShape,
    annotations: Annotations,
}

impl CodecType {
    #[must_use]
    pub fn new(shape: TypeShape, annotations: Annotations) -> Self {
        Self { shape, annotations }
    }

    /// Unannotated codec type for `T`.
    #[must_use]
    pub fn of<T: Any>() -> Self {
        Self::new(TypeShape::of::<T>(), Annotations::new())
    }

    #[must_use]
    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.insert(annotation);
        self
    }

    #[must_use]
    pub fn shape(&self) -> &TypeShape {
        &self.shape
    }

    #[must_use]
    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    /// Same annotations, different shape. Used when delegating to an inner type.
    #[must_use]
    pub fn with_shape(&self, shape: TypeShape) -> Self {
        Self {
            shape,
            annotations: self.annotations.clone(),
        }
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.shape, f)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_shape_identity() {
        assert_eq!(TypeShape::of::<String>(), TypeShape::of::<String>());
        assert_ne!(TypeShape::of::<String>(), TypeShape::of::<Vec<String>>());
        assert_eq!(
            TypeShape::of::<Vec<String>>().name(),
            "alloc::vec::Vec<alloc::string::String>"
        );
    }

    #[test]
    fn test_optional_shape_exposes_inner() {
        let shape = TypeShape::optional::<u32>();
        assert!(shape.is::<Option<u32>>());
        assert_eq!(shape.inner(), Some(&TypeShape::of::<u32>()));
        assert!(TypeShape::of::<u32>().inner().is_none());
    }

    #[test]
    fn test_wrap_optional() {
        let shape = TypeShape::optional::<u32>();

        let some = shape
            .wrap_optional(Some(Box::new(7_u32)))
            .unwrap()
            .unwrap();
        assert_eq!(*some.downcast::<Option<u32>>().unwrap(), Some(7));

        let none = shape.wrap_optional(None).unwrap().unwrap();
        assert_eq!(*none.downcast::<Option<u32>>().unwrap(), None);

        let mismatch = shape.wrap_optional(Some(Box::new("nope"))).unwrap();
        assert!(mismatch.is_err());

        assert!(TypeShape::of::<u32>().wrap_optional(None).is_none());
    }

    #[test]
    fn test_codec_type_equality_includes_annotations() {
        let plain = CodecType::of::<String>();
        let annotated = CodecType::of::<String>().with_annotation(Annotation::new("xml"));

        assert_ne!(plain, annotated);
        assert_eq!(
            annotated,
            CodecType::of::<String>().with_annotation(Annotation::new("xml"))
        );
    }

    #[test]
    fn test_annotation_lookup() {
        let annotations = Annotations::new()
            .with(Annotation::new("format").with_value("compact"))
            .with(Annotation::new("lenient"));

        assert!(annotations.contains("lenient"));
        assert_eq!(annotations.value_of("format"), Some("compact"));
        assert_eq!(annotations.value_of("lenient"), None);
        assert!(!annotations.contains("strict"));
    }
}
