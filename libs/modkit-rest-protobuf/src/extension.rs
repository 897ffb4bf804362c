//! Protocol Buffers extensions on decoded messages.
//!
//! `prost` messages have no notion of extensions: extension fields arrive as
//! unknown fields and are skipped. A response declared as [`Extended<T>`]
//! decodes `T` as usual and then collects the fields its [`ExtensionRegistry`]
//! knows for `T`.

use crate::registry::decode_failure;
use bytes::{Buf, Bytes};
use modkit_rest::{DecodeError, Decoded};
use prost::Message;
use prost::encoding::{self, DecodeContext, WireType, decode_key, skip_field};
use std::any::{Any, TypeId, type_name};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Scalar type of an extension field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExtensionKind {
    Bool,
    Int64,
    Uint64,
    String,
    Bytes,
}

/// A decoded extension value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExtensionValue {
    Bool(bool),
    Int64(i64),
    Uint64(u64),
    String(String),
    Bytes(Vec<u8>),
}

/// Declaration of one extension field of a message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionField {
    name: &'static str,
    tag: u32,
    kind: ExtensionKind,
}

impl ExtensionField {
    #[must_use]
    pub const fn new(name: &'static str, tag: u32, kind: ExtensionKind) -> Self {
        Self { name, tag, kind }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn tag(&self) -> u32 {
        self.tag
    }

    #[must_use]
    pub fn kind(&self) -> ExtensionKind {
        self.kind
    }
}

/// Extension fields known per extended message type.
///
/// Built once and handed to
/// [`ProtoConverterFactory::with_registry`](crate::ProtoConverterFactory::with_registry),
/// which owns it from then on.
#[derive(Debug, Default, Clone)]
pub struct ExtensionRegistry {
    fields: HashMap<(TypeId, u32), ExtensionField>,
}

impl ExtensionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `field` as an extension of message `T`.
    #[must_use]
    pub fn extension<T: Message + 'static>(mut self, field: ExtensionField) -> Self {
        self.fields.insert((TypeId::of::<T>(), field.tag), field);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn field<T: 'static>(&self, tag: u32) -> Option<&ExtensionField> {
        self.fields.get(&(TypeId::of::<T>(), tag))
    }
}

/// A message together with the registered extensions found in its encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Extended<T> {
    message: T,
    extensions: BTreeMap<u32, ExtensionValue>,
}

impl<T> Extended<T> {
    #[must_use]
    pub fn message(&self) -> &T {
        &self.message
    }

    #[must_use]
    pub fn into_message(self) -> T {
        self.message
    }

    #[must_use]
    pub fn extension(&self, field: &ExtensionField) -> Option<&ExtensionValue> {
        self.extensions.get(&field.tag)
    }

    /// Value of a `bool` extension, `None` if absent.
    #[must_use]
    pub fn bool_extension(&self, field: &ExtensionField) -> Option<bool> {
        match self.extension(field)? {
            ExtensionValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn has_extension(&self, field: &ExtensionField) -> bool {
        self.extensions.contains_key(&field.tag)
    }
}

#[derive(Debug, Error)]
#[error("invalid extension {field} (tag {tag}) of {message}: {source}")]
pub struct ExtensionDecodeError {
    pub message: &'static str,
    pub field: &'static str,
    pub tag: u32,
    #[source]
    pub source: prost::DecodeError,
}

pub fn decode_extended<T>(
    body: Bytes,
    registry: &ExtensionRegistry,
) -> Result<Decoded, DecodeError>
where
    T: Message + Default + Any + Send,
{
    let message = T::decode(body.clone()).map_err(|err| decode_failure(&body, err))?;
    let extensions = scan_extensions::<T>(body, registry)?;
    Ok(Box::new(Extended {
        message,
        extensions,
    }))
}

fn scan_extensions<T: 'static>(
    mut buf: Bytes,
    registry: &ExtensionRegistry,
) -> Result<BTreeMap<u32, ExtensionValue>, DecodeError> {
    let mut extensions = BTreeMap::new();

    while buf.has_remaining() {
        let (tag, wire_type) = decode_key(&mut buf).map_err(DecodeError::malformed)?;
        let Some(field) = registry.field::<T>(tag) else {
            skip_field(wire_type, tag, &mut buf, DecodeContext::default())
                .map_err(DecodeError::malformed)?;
            continue;
        };

        let value = merge_value(field.kind, wire_type, &mut buf).map_err(|source| {
            DecodeError::malformed(ExtensionDecodeError {
                message: type_name::<T>(),
                field: field.name,
                tag,
                source,
            })
        })?;
        extensions.insert(tag, value);
    }

    Ok(extensions)
}

fn merge_value(
    kind: ExtensionKind,
    wire_type: WireType,
    buf: &mut Bytes,
) -> Result<ExtensionValue, prost::DecodeError> {
    let ctx = DecodeContext::default();
    Ok(match kind {
        ExtensionKind::Bool => {
            let mut value = false;
            encoding::bool::merge(wire_type, &mut value, buf, ctx)?;
            ExtensionValue::Bool(value)
        }
        ExtensionKind::Int64 => {
            let mut value = 0;
            encoding::int64::merge(wire_type, &mut value, buf, ctx)?;
            ExtensionValue::Int64(value)
        }
        ExtensionKind::Uint64 => {
            let mut value = 0;
            encoding::uint64::merge(wire_type, &mut value, buf, ctx)?;
            ExtensionValue::Uint64(value)
        }
        ExtensionKind::String => {
            let mut value = String::new();
            encoding::string::merge(wire_type, &mut value, buf, ctx)?;
            ExtensionValue::String(value)
        }
        ExtensionKind::Bytes => {
            let mut value = Vec::new();
            encoding::bytes::merge(wire_type, &mut value, buf, ctx)?;
            ExtensionValue::Bytes(value)
        }
    })
}
