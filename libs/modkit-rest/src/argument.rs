use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

/// Shared, type-erased value as seen by converters.
pub type AnyValue = dyn Any + Send + Sync;

type DebugFn = fn(&AnyValue, &mut fmt::Formatter<'_>) -> fmt::Result;

/// One argument of a service method call.
///
/// Cloning shares the underlying value. Two arguments are equal when they
/// share the same value allocation.
#[derive(Clone)]
pub struct Argument {
    value: Arc<AnyValue>,
    type_name: &'static str,
    debug: DebugFn,
}

impl Argument {
    #[must_use]
    pub fn new<T: Any + Send + Sync + fmt::Debug>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wraps an already shared value without copying it.
    #[must_use]
    pub fn from_arc<T: Any + Send + Sync + fmt::Debug>(value: Arc<T>) -> Self {
        fn debug<T: Any + fmt::Debug>(value: &AnyValue, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match value.downcast_ref::<T>() {
                Some(value) => fmt::Debug::fmt(value, f),
                None => f.write_str("<?>"),
            }
        }

        Self {
            value,
            type_name: type_name::<T>(),
            debug: debug::<T>,
        }
    }

    #[must_use]
    pub fn value(&self) -> &AnyValue {
        &*self.value
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Renders scalar values for URL building: strings, integers and booleans.
    pub(crate) fn as_param(&self) -> Option<String> {
        let value = &*self.value;
        if let Some(s) = value.downcast_ref::<String>() {
            return Some(s.clone());
        }
        if let Some(s) = value.downcast_ref::<&'static str>() {
            return Some((*s).to_owned());
        }
        macro_rules! scalar {
            ($($ty:ty),*) => {
                $(if let Some(v) = value.downcast_ref::<$ty>() {
                    return Some(v.to_string());
                })*
            };
        }
        scalar!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, bool);
        None
    }
}

impl PartialEq for Argument {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.value), Arc::as_ptr(&other.value))
    }
}

impl Eq for Argument {}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (self.debug)(&*self.value, f)
    }
}

/// Builds a `Vec<Argument>` from heterogeneous values.
///
/// ```ignore
/// let args = modkit_rest::args!["one", 2_u32, body];
/// ```
#[macro_export]
macro_rules! args {
    () => { ::std::vec::Vec::<$crate::Argument>::new() };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::Argument::new($value)),+]
    };
}
