#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Protocol Buffers body converters for `modkit-rest`, built on `prost`.
//!
//! Messages are served once listed in a [`MessageRegistry`]. A response
//! declared as [`Extended<T>`] also exposes the extension fields an
//! [`ExtensionRegistry`] declares for `T`.

mod extension;
mod factory;
mod registry;

pub use extension::{
    Extended, ExtensionDecodeError, ExtensionField, ExtensionKind, ExtensionRegistry,
    ExtensionValue,
};
pub use factory::{PROTOBUF_CONTENT_TYPE, ProtoConverterFactory};
pub use registry::MessageRegistry;
