use crate::extension::{Extended, ExtensionRegistry};
use bytes::Bytes;
use modkit_rest::{AnyValue, DecodeError, Decoded, EncodeError, TypeShape};
use prost::Message;
use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;

pub type EncodeFn = fn(&AnyValue, &mut Vec<u8>) -> Result<(), EncodeError>;
pub type DecodeMessageFn = fn(Bytes) -> Result<Decoded, DecodeError>;
pub type DecodeExtendedFn = fn(Bytes, &ExtensionRegistry) -> Result<Decoded, DecodeError>;

#[derive(Clone, Copy)]
pub enum Codec {
    Message {
        encode: EncodeFn,
        decode: DecodeMessageFn,
    },
    Extended {
        decode: DecodeExtendedFn,
    },
}

/// The `prost` message types a [`ProtoConverterFactory`](crate::ProtoConverterFactory) serves.
///
/// Registering `T` serves `T` in both directions and `Extended<T>` as a
/// response.
#[derive(Default, Clone)]
pub struct MessageRegistry {
    codecs: HashMap<TypeId, (&'static str, Codec)>,
}

impl MessageRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn message<T>(mut self) -> Self
    where
        T: Message + Default + Any + Send,
    {
        self.codecs.insert(
            TypeId::of::<T>(),
            (
                type_name::<T>(),
                Codec::Message {
                    encode: encode::<T>,
                    decode: decode::<T>,
                },
            ),
        );
        self.codecs.insert(
            TypeId::of::<Extended<T>>(),
            (
                type_name::<Extended<T>>(),
                Codec::Extended {
                    decode: crate::extension::decode_extended::<T>,
                },
            ),
        );
        self
    }

    #[must_use]
    pub fn contains(&self, shape: &TypeShape) -> bool {
        self.codecs.contains_key(&shape.type_id())
    }

    pub(crate) fn codec(&self, shape: &TypeShape) -> Option<Codec> {
        self.codecs.get(&shape.type_id()).map(|(_, codec)| *codec)
    }
}

impl fmt::Debug for MessageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.codecs.values().map(|(name, _)| *name).collect();
        names.sort_unstable();
        f.debug_struct("MessageRegistry")
            .field("types", &names)
            .finish()
    }
}

fn encode<T: Message + Any>(value: &AnyValue, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    let message = value
        .downcast_ref::<T>()
        .ok_or_else(|| EncodeError::type_mismatch(type_name::<T>()))?;
    out.reserve(message.encoded_len());
    message.encode(out).map_err(EncodeError::new)
}

fn decode<T: Message + Default + Any + Send>(body: Bytes) -> Result<Decoded, DecodeError> {
    T::decode(body.clone())
        .map(|message| Box::new(message) as Decoded)
        .map_err(|err| decode_failure(&body, err))
}

/// Classify a `prost` failure: input that stops inside a field is
/// [`UnexpectedEof`](modkit_rest::DecodeErrorKind::UnexpectedEof), anything
/// else is malformed.
#[must_use]
pub fn decode_failure(body: &[u8], err: prost::DecodeError) -> DecodeError {
    if ends_mid_field(body) {
        DecodeError::unexpected_eof(err)
    } else {
        DecodeError::malformed(err)
    }
}

/// Walk the top-level fields of `body` and report whether the last one is cut short.
fn ends_mid_field(mut body: &[u8]) -> bool {
    while !body.is_empty() {
        let key = match read_varint(&mut body) {
            Varint::Value(key) => key,
            Varint::Truncated => return true,
            Varint::Invalid => return false,
        };
        let needed = match key & 0x7 {
            0 => match read_varint(&mut body) {
                Varint::Value(_) => 0,
                Varint::Truncated => return true,
                Varint::Invalid => return false,
            },
            1 => 8,
            2 => match read_varint(&mut body) {
                Varint::Value(len) => len,
                Varint::Truncated => return true,
                Varint::Invalid => return false,
            },
            // Group markers carry no payload.
            3 | 4 => 0,
            5 => 4,
            _ => return false,
        };
        let Ok(needed) = usize::try_from(needed) else {
            return true;
        };
        if needed > body.len() {
            return true;
        }
        body = &body[needed..];
    }
    false
}

enum Varint {
    Value(u64),
    Truncated,
    Invalid,
}

fn read_varint(body: &mut &[u8]) -> Varint {
    let bytes: &[u8] = *body;
    let mut value = 0u64;
    for (i, byte) in bytes.iter().enumerate().take(10) {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            *body = &bytes[i + 1..];
            return Varint::Value(value);
        }
    }
    if bytes.len() < 10 {
        Varint::Truncated
    } else {
        Varint::Invalid
    }
}
