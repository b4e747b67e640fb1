//! # cotguard
//!
//! A hardened Cursor on Target codec. This crate re-exports the public
//! surface of the workspace:
//!
//! - [`cot`]: decoding, validation, encoding and the event model
//! - [`types`]: the type catalog and type/how/relation validators
//! - [`core`]: errors, configuration and security limits
//! - [`pool`]: the object pool behind pooled decode and encode
//!
//! ## Example
//!
//! ```
//! use cotguard::{Codec, EventBuilder};
//! use cotguard::cot::detail::Contact;
//!
//! let event = EventBuilder::new("ANDROID-12345678", "a-f-G-U-C", 37.7749, -122.4194, 100.0)
//!     .contact(Contact::new("Bravo-2"))
//!     .build()
//!     .unwrap();
//!
//! let codec = Codec::new();
//! let xml = codec.encode(&event).unwrap();
//! let decoded = cotguard::decode(xml.as_bytes()).unwrap();
//! assert_eq!(decoded, event);
//! ```

pub use cotguard_core as core;
pub use cotguard_cot as cot;
pub use cotguard_pool as pool;
pub use cotguard_types as types;

pub use cotguard_core::{
    CodecConfig, ConfigError, CotError, DecodeError, EncodeError, ExtensionError, LimitKind,
    Limits, Result, TypeError, ValidationError,
};
pub use cotguard_cot::{
    decode, encode, Codec, Detail, DetailElement, Event, EventBuilder, Extension, ExtensionKind,
    Link, Point, RawXml, SchemaValidator, Validator,
};
pub use cotguard_types::{
    type_matches, validate_how, validate_relation, validate_type, Affiliation, Catalog,
};
