//! # cotguard types
//!
//! The CoT type taxonomy: a concurrent catalog of registered type codes, the
//! how and relation vocabularies, and the validators that classify codes
//! against them.
//!
//! ## Example
//!
//! ```
//! use cotguard_types::{validate_type, Catalog};
//!
//! assert!(validate_type("a-f-G-E-V-C").is_ok());
//! assert!(validate_type("a-f-G-*").is_ok());
//! assert!(validate_type("a-*-G").is_err());
//!
//! // Affiliation wildcards expand to friend/hostile/neutral/unknown.
//! let ground = Catalog::global().find("a-.-G").unwrap();
//! assert_eq!(ground.len(), 4);
//! ```

pub mod affiliation;
pub mod catalog;
pub mod pattern;
pub mod validate;

pub use affiliation::{Affiliation, Category, CotType, Dimension, EXPANDED_AFFILIATIONS};
pub use catalog::{Catalog, LoadSummary, Type, VocabEntry};
pub use pattern::{type_matches, TypePattern, MAX_TYPE_LEN};
pub use validate::{
    validate_how, validate_how_in, validate_relation, validate_relation_in, validate_type,
    validate_type_in,
};
