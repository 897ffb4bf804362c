#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! JSON body converters for `modkit-rest`, built on `serde_json`.
//!
//! ```ignore
//! let json = JsonConverterFactory::new(
//!     JsonMapper::new()
//!         .register::<User>()
//!         .register::<Vec<User>>(),
//! );
//! let client = RestClient::builder()
//!     .base_url("https://api.example.com/")
//!     .add_converter_factory(json)
//!     .build()?;
//! ```

mod factory;
mod mapper;

pub use factory::{JSON_CONTENT_TYPE, JsonConverterFactory};
pub use mapper::JsonMapper;
