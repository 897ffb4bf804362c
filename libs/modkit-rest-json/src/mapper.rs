//! Registry of the types a [`JsonConverterFactory`](crate::JsonConverterFactory) serves.

use bytes::Bytes;
use modkit_rest::{AnyValue, BoxError, DecodeError, Decoded, EncodeError, TypeShape};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type SerializeFn =
    Arc<dyn Fn(&AnyValue, &mut Vec<u8>) -> Result<(), EncodeError> + Send + Sync>;
pub type DeserializeFn = Arc<dyn Fn(Bytes) -> Result<Decoded, DecodeError> + Send + Sync>;

#[derive(Default, Clone)]
struct Entry {
    name: &'static str,
    serialize: Option<SerializeFn>,
    deserialize: Option<DeserializeFn>,
}

/// JSON configuration shared by a converter factory: which Rust types map to
/// JSON and how.
///
/// Types are served through their serde implementations by default
/// ([`register`](Self::register)); a custom [`serializer`](Self::serializer)
/// or [`deserializer`](Self::deserializer) replaces serde for one type, which
/// is how trait objects and foreign types are mapped.
///
/// A factory only serves registered types and declines everything else, so a
/// later factory in the chain gets its chance.
#[derive(Default, Clone)]
pub struct JsonMapper {
    entries: HashMap<TypeId, Entry>,
}

impl JsonMapper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `T` in both directions through serde.
    #[must_use]
    pub fn register<T>(self) -> Self
    where
        T: Serialize + DeserializeOwned + Any + Send,
    {
        self.register_serialize::<T>().register_deserialize::<T>()
    }

    /// Serve `T` as a request body through serde.
    #[must_use]
    pub fn register_serialize<T: Serialize + Any>(self) -> Self {
        self.serializer::<T, _>(|value, out| serde_json::to_writer(out, value).map_err(Into::into))
    }

    /// Serve `T` as a response body through serde.
    #[must_use]
    pub fn register_deserialize<T: DeserializeOwned + Any + Send>(mut self) -> Self {
        let deserialize: DeserializeFn = Arc::new(|body: Bytes| {
            serde_json::from_slice::<T>(&body)
                .map(|value| Box::new(value) as Decoded)
                .map_err(decode_error)
        });
        self.entry::<T>().deserialize = Some(deserialize);
        self
    }

    /// Serve `T` as a request body with a custom writer.
    #[must_use]
    pub fn serializer<T, F>(mut self, write: F) -> Self
    where
        T: Any,
        F: Fn(&T, &mut Vec<u8>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let serialize: SerializeFn = Arc::new(move |value: &AnyValue, out: &mut Vec<u8>| {
            let value = value
                .downcast_ref::<T>()
                .ok_or_else(|| EncodeError::type_mismatch(type_name::<T>()))?;
            write(value, out).map_err(unwrap_json_io)
        });
        self.entry::<T>().serialize = Some(serialize);
        self
    }

    /// Serve `T` as a response body with a custom reader.
    #[must_use]
    pub fn deserializer<T, F>(mut self, read: F) -> Self
    where
        T: Any + Send,
        F: Fn(&[u8]) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let deserialize: DeserializeFn = Arc::new(move |body: Bytes| {
            read(&body)
                .map(|value| Box::new(value) as Decoded)
                .map_err(|err| match err.downcast::<serde_json::Error>() {
                    Ok(json) => decode_error(*json),
                    Err(other) => DecodeError::malformed(other),
                })
        });
        self.entry::<T>().deserialize = Some(deserialize);
        self
    }

    #[must_use]
    pub fn serializes(&self, shape: &TypeShape) -> bool {
        self.serialize_fn(shape).is_some()
    }

    #[must_use]
    pub fn deserializes(&self, shape: &TypeShape) -> bool {
        self.deserialize_fn(shape).is_some()
    }

    pub(crate) fn serialize_fn(&self, shape: &TypeShape) -> Option<&SerializeFn> {
        self.entries.get(&shape.type_id())?.serialize.as_ref()
    }

    pub(crate) fn deserialize_fn(&self, shape: &TypeShape) -> Option<&DeserializeFn> {
        self.entries.get(&shape.type_id())?.deserialize.as_ref()
    }

    fn entry<T: Any>(&mut self) -> &mut Entry {
        self.entries.entry(TypeId::of::<T>()).or_insert_with(|| Entry {
            name: type_name::<T>(),
            ..Entry::default()
        })
    }
}

impl fmt::Debug for JsonMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.values().map(|e| e.name).collect();
        names.sort_unstable();
        f.debug_struct("JsonMapper").field("types", &names).finish()
    }
}

/// serde_json reports writer failures as its own error; hand back the
/// writer's `io::Error` so callers see what the serializer raised.
fn unwrap_json_io(err: BoxError) -> EncodeError {
    match err.downcast::<serde_json::Error>() {
        Ok(json) if json.is_io() => EncodeError::new(std::io::Error::from(*json)),
        Ok(json) => EncodeError::new(json),
        Err(other) => EncodeError::new(other),
    }
}

fn decode_error(err: serde_json::Error) -> DecodeError {
    if err.is_eof() {
        DecodeError::unexpected_eof(err)
    } else {
        DecodeError::malformed(err)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use modkit_rest::DecodeErrorKind;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn test_registered_types_only() {
        let mapper = JsonMapper::new()
            .register::<Point>()
            .register_serialize::<String>();

        assert!(mapper.serializes(&TypeShape::of::<Point>()));
        assert!(mapper.deserializes(&TypeShape::of::<Point>()));
        assert!(mapper.serializes(&TypeShape::of::<String>()));
        assert!(!mapper.deserializes(&TypeShape::of::<String>()));
        assert!(!mapper.serializes(&TypeShape::of::<u64>()));
    }

    #[test]
    fn test_serialize_and_decode() {
        let mapper = JsonMapper::new().register::<Point>();

        let point: &AnyValue = &Point { x: 1, y: -2 };
        let mut out = Vec::new();
        mapper.serialize_fn(&TypeShape::of::<Point>()).unwrap()(point, &mut out).unwrap();
        assert_eq!(out, br#"{"x":1,"y":-2}"#);

        let decoded = mapper.deserialize_fn(&TypeShape::of::<Point>()).unwrap()(Bytes::from(out))
            .unwrap();
        assert_eq!(*decoded.downcast::<Point>().unwrap(), Point { x: 1, y: -2 });
    }

    #[test]
    fn test_decode_error_kinds() {
        let mapper = JsonMapper::new().register::<Point>();
        let decode = mapper.deserialize_fn(&TypeShape::of::<Point>()).unwrap();

        let err = decode(Bytes::from_static(br#"{"x":1"#)).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::UnexpectedEof);

        let err = decode(Bytes::new()).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::UnexpectedEof);

        let err = decode(Bytes::from_static(br#"{"x":"one","y":2}"#)).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::Malformed);
    }

    #[test]
    fn test_custom_serializer_error_is_preserved() {
        let mapper = JsonMapper::new().serializer::<Point, _>(|_point, _out| {
            Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "oops!").into())
        });

        let point: &AnyValue = &Point { x: 0, y: 0 };
        let mut out = Vec::new();
        let err = mapper.serialize_fn(&TypeShape::of::<Point>()).unwrap()(point, &mut out)
            .unwrap_err();
        let io = err.get_ref().downcast_ref::<std::io::Error>().unwrap();
        assert_eq!(io.kind(), std::io::ErrorKind::UnexpectedEof);
        assert_eq!(io.to_string(), "oops!");
    }
}
