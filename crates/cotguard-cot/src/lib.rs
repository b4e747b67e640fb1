//! Hardened Cursor on Target (CoT) XML codec
//!
//! This crate decodes, validates and encodes CoT events. Every inbound
//! document is treated as hostile: it is read through a token stream that
//! enforces size, depth, element count and length ceilings, refuses DTDs and
//! strips markup smuggled inside values before the event is built.
//!
//! # Features
//!
//! - Streaming decode on quick-xml with runtime-adjustable security limits
//! - Event validation: identity, type catalog, timing window, position
//! - ~30 detail extensions, typed or verbatim, with unknown elements kept
//!   byte for byte in their original position
//! - Schema checks for chat extensions behind a pluggable validator
//! - Pooled decode and encode for sustained throughput
//!
//! # Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use cotguard_cot::Codec;
//!
//! let cot_xml = r#"<?xml version="1.0"?>
//! <event version="2.0" uid="test-1" type="a-f-G"
//!        time="2024-01-15T10:30:00Z"
//!        start="2024-01-15T10:30:00Z"
//!        stale="2024-01-15T10:35:00Z" how="h-e">
//!     <point lat="37.7749" lon="-122.4194" hae="100.0" ce="10.0" le="5.0"/>
//! </event>"#;
//!
//! let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 31, 0).unwrap();
//! let codec = Codec::new();
//! let event = codec.decode_at(cot_xml.as_bytes(), now).expect("valid CoT");
//! assert_eq!(event.uid, "test-1");
//! assert_eq!(event.point.lat, 37.7749);
//!
//! let xml = codec.encode(&event).unwrap();
//! assert_eq!(codec.decode_at(xml.as_bytes(), now).unwrap(), event);
//! ```

pub mod builder;
pub mod codec;
pub mod detail;
pub mod event;
pub mod parser;
pub mod serializer;
pub mod token;
pub mod validate;

pub use builder::EventBuilder;
pub use codec::{decode, encode, Codec};
pub use detail::{
    BuiltinSchemas, Detail, DetailElement, Extension, ExtensionKind, RawXml, SchemaError,
    SchemaValidator, Typed, TypedExtension,
};
pub use event::{Event, Link, Point, UNKNOWN_ERROR};
pub use token::{Token, TokenKind, TokenStream};
pub use validate::{validate_point, validate_uid, Validator};
