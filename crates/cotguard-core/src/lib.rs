//! # cotguard core
//!
//! Error handling, configuration and security limits shared by the cotguard
//! crates.
//!
//! - **Errors**: the codec's error taxonomy (`DecodeError`, `ValidationError`,
//!   `TypeError`, `ExtensionError`, `EncodeError`) built with `thiserror` and
//!   serializable for API responses.
//! - **Configuration**: YAML and environment driven `CodecConfig`.
//! - **Limits**: atomically adjustable token stream ceilings with safety floors.
//!
//! ## Example
//!
//! ```
//! use cotguard_core::limits::Limits;
//!
//! let limits = Limits::new();
//! // Values below the floor are clamped rather than accepted.
//! assert_eq!(limits.set_max_value_len(1), 1024);
//! ```

pub mod config;
pub mod error;
pub mod limits;

pub use config::{CatalogConfig, CodecConfig, LimitsConfig, ValidationConfig, SUPPORTED_VERSION};
pub use error::{
    ConfigError, CotError, DecodeError, EncodeError, ExtensionError, Result, TypeError,
    ValidationError,
};
pub use limits::{LimitKind, Limits, LimitsSnapshot};
