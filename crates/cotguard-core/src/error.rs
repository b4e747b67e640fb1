//! Error types for the cotguard CoT codec.
//!
//! Every failure the codec can report is a value of one of these enums. They
//! are grouped by the taxonomy callers branch on:
//!
//! - [`DecodeError`]: malformed input (not well-formed XML, a security limit
//!   exceeded, a DOCTYPE) or a structural problem while building an event
//! - [`ValidationError`]: a well-formed event that violates an invariant
//! - [`TypeError`]: a type, how or relation code that is malformed or unknown
//! - [`ExtensionError`]: a detail extension whose payload is rejected
//! - [`EncodeError`]: an event that cannot be written as XML
//!
//! All errors are serializable so they can be forwarded in API responses and
//! structured logs.

use crate::limits::LimitKind;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Result type alias using CotError as the error type.
pub type Result<T> = std::result::Result<T, CotError>;

/// Top-level error type for all cotguard operations.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum CotError {
    /// Decoding errors
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Encoding errors
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Type catalog errors
    #[error("Type error: {0}")]
    Type(#[from] TypeError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors produced while turning bytes into an event.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum DecodeError {
    /// The tokenizer rejected the document
    #[error("XML error at byte {position}: {message}")]
    Xml { position: usize, message: String },

    /// A security limit was exceeded
    #[error("{limit} limit exceeded: {actual} > {max}")]
    LimitExceeded {
        limit: LimitKind,
        max: usize,
        actual: usize,
    },

    /// The document declares a DTD or entity
    #[error("DOCTYPE and ENTITY declarations are not accepted")]
    DoctypeRejected,

    /// The declared character set is not supported
    #[error("Unsupported document encoding: {encoding}")]
    UnsupportedEncoding { encoding: String },

    /// An element appeared where the event structure does not allow it
    #[error("Unexpected element <{name}>: {reason}")]
    UnexpectedElement { name: String, reason: String },

    /// A required attribute is absent
    #[error("Missing required attribute '{attribute}' on <{element}>")]
    MissingAttribute { element: String, attribute: String },

    /// An attribute value could not be parsed
    #[error("Invalid value for '{attribute}' on <{element}>: {reason}")]
    InvalidAttribute {
        element: String,
        attribute: String,
        reason: String,
    },

    /// A detail extension was rejected
    #[error("Detail extension error: {0}")]
    Extension(#[from] ExtensionError),

    /// The decoded event failed validation
    #[error("Event failed validation: {0}")]
    Validation(#[from] ValidationError),
}

impl DecodeError {
    /// Creates a tokenizer error.
    pub fn xml(position: usize, message: impl Into<String>) -> Self {
        Self::Xml {
            position,
            message: message.into(),
        }
    }

    /// Creates a limit exceeded error.
    pub fn limit(limit: LimitKind, max: usize, actual: usize) -> Self {
        Self::LimitExceeded { limit, max, actual }
    }

    /// Creates an unexpected element error.
    pub fn unexpected(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnexpectedElement {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a missing attribute error.
    pub fn missing(element: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::MissingAttribute {
            element: element.into(),
            attribute: attribute.into(),
        }
    }

    /// Creates an invalid attribute error.
    pub fn invalid(
        element: impl Into<String>,
        attribute: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidAttribute {
            element: element.into(),
            attribute: attribute.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the input itself was rejected as malformed or hostile.
    ///
    /// These failures are final: the same bytes will always be rejected.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            DecodeError::Xml { .. }
                | DecodeError::LimitExceeded { .. }
                | DecodeError::DoctypeRejected
                | DecodeError::UnsupportedEncoding { .. }
                | DecodeError::UnexpectedElement { .. }
                | DecodeError::MissingAttribute { .. }
                | DecodeError::InvalidAttribute { .. }
        )
    }
}

/// Event invariant violations. Each variant names the invariant that failed.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unsupported version '{found}' (expected '{expected}')")]
    UnsupportedVersion { found: String, expected: String },

    #[error("Invalid uid '{uid}': {reason}")]
    InvalidUid { uid: String, reason: String },

    #[error("Invalid type: {0}")]
    Type(#[from] TypeError),

    #[error("Wildcard type '{0}' is only valid in queries")]
    WildcardType(String),

    #[error("Invalid how: {0}")]
    How(TypeError),

    #[error("Start ({start}) is after time ({time})")]
    StartAfterTime { start: String, time: String },

    #[error("Stale is {offset_ms}ms after time (minimum {min_ms}ms)")]
    StaleTooSoon { offset_ms: i64, min_ms: i64 },

    #[error("Stale is {offset_ms}ms after time (maximum {max_ms}ms)")]
    StaleTooFar { offset_ms: i64, max_ms: i64 },

    #[error("Time {time} is outside the accepted window around {now}")]
    TimeOutOfWindow { time: String, now: String },

    #[error("Invalid latitude: {0} (must be between -90 and 90)")]
    InvalidLatitude(f64),

    #[error("Invalid longitude: {0} (must be between -180 and 180)")]
    InvalidLongitude(f64),

    #[error("Invalid height above ellipsoid: {0}")]
    InvalidHae(f64),

    #[error("Invalid circular error: {0} (must be non-negative)")]
    InvalidCircularError(f64),

    #[error("Invalid linear error: {0} (must be non-negative)")]
    InvalidLinearError(f64),

    #[error("Invalid detail: {0}")]
    Extension(#[from] ExtensionError),

    #[error("Invalid link {index}: {source}")]
    Link {
        index: usize,
        source: Box<ValidationError>,
    },
}

impl ValidationError {
    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    /// Creates an invalid uid error.
    pub fn invalid_uid(uid: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUid {
            uid: uid.into(),
            reason: reason.into(),
        }
    }

    /// Wraps an error with the index of the link it came from.
    pub fn link(index: usize, source: ValidationError) -> Self {
        Self::Link {
            index,
            source: Box::new(source),
        }
    }
}

/// Type, how and relation code errors.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TypeError {
    #[error("Empty type code")]
    Empty,

    #[error("Type code exceeds {max} characters")]
    TooLong { max: usize },

    #[error("Invalid type code '{code}': {reason}")]
    InvalidSyntax { code: String, reason: String },

    #[error("Invalid wildcard in '{code}': {reason}")]
    InvalidWildcard { code: String, reason: String },

    #[error("Unknown type code '{0}'")]
    Unknown(String),

    #[error("Type '{0}' not found")]
    NotFound(String),

    #[error("Unknown how code '{0}'")]
    UnknownHow(String),

    #[error("Unknown relation code '{0}'")]
    UnknownRelation(String),

    #[error("Relation must not be empty")]
    EmptyRelation,
}

impl TypeError {
    /// Creates an invalid syntax error.
    pub fn syntax(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSyntax {
            code: code.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid wildcard error.
    pub fn wildcard(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidWildcard {
            code: code.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the code was well-formed but absent from the catalog.
    pub fn is_unknown(&self) -> bool {
        matches!(
            self,
            TypeError::Unknown(_)
                | TypeError::NotFound(_)
                | TypeError::UnknownHow(_)
                | TypeError::UnknownRelation(_)
        )
    }
}

/// Detail extension errors.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ExtensionError {
    /// The payload does not conform to the extension's schema
    #[error("<{element}> rejected by schema '{schema}': {reason}")]
    SchemaRejected {
        element: String,
        schema: String,
        reason: String,
    },

    /// A typed attribute could not be parsed
    #[error("Invalid value for '{attribute}' on <{element}>: {reason}")]
    InvalidAttribute {
        element: String,
        attribute: String,
        reason: String,
    },

    /// A typed attribute is required but absent
    #[error("Missing attribute '{attribute}' on <{element}>")]
    MissingAttribute { element: String, attribute: String },

    /// The typed value violates an extension invariant
    #[error("Invalid <{element}>: {reason}")]
    Invalid { element: String, reason: String },
}

impl ExtensionError {
    /// Creates a schema rejection error.
    pub fn schema(
        element: impl Into<String>,
        schema: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::SchemaRejected {
            element: element.into(),
            schema: schema.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid attribute error.
    pub fn attribute(
        element: impl Into<String>,
        attribute: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidAttribute {
            element: element.into(),
            attribute: attribute.into(),
            reason: reason.into(),
        }
    }

    /// Creates a missing attribute error.
    pub fn missing(element: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::MissingAttribute {
            element: element.into(),
            attribute: attribute.into(),
        }
    }

    /// Creates an invariant violation error.
    pub fn invalid(element: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            element: element.into(),
            reason: reason.into(),
        }
    }
}

/// Errors produced while writing an event as XML.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum EncodeError {
    #[error("Field '{field}' is not a finite number")]
    NonFinite { field: String },

    #[error("'{name}' is not a valid XML name")]
    InvalidName { name: String },

    #[error("I/O error: {message}")]
    Io { message: String },
}

impl From<io::Error> for EncodeError {
    fn from(err: io::Error) -> Self {
        EncodeError::Io {
            message: err.to_string(),
        }
    }
}

/// Errors related to configuration.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {reason}")]
    InvalidFormat { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_classification() {
        assert!(DecodeError::DoctypeRejected.is_malformed());
        assert!(DecodeError::limit(LimitKind::Depth, 32, 33).is_malformed());
        assert!(DecodeError::xml(10, "unexpected eof").is_malformed());

        let validation = DecodeError::Validation(ValidationError::InvalidLatitude(95.0));
        assert!(!validation.is_malformed());

        let extension = DecodeError::Extension(ExtensionError::schema("__chat", "chat", "x"));
        assert!(!extension.is_malformed());
    }

    #[test]
    fn test_type_error_unknown() {
        assert!(TypeError::Unknown("a-f-Z".into()).is_unknown());
        assert!(TypeError::UnknownHow("x".into()).is_unknown());
        assert!(!TypeError::Empty.is_unknown());
        assert!(!TypeError::wildcard("a-*-G", "non-final").is_unknown());
    }

    #[test]
    fn test_link_error_display() {
        let err = ValidationError::link(2, TypeError::EmptyRelation.into());
        let display = err.to_string();
        assert!(display.contains("link 2"));
        assert!(display.contains("Relation"));
    }

    #[test]
    fn test_error_serialization() {
        let err = CotError::Decode(DecodeError::limit(LimitKind::ElementCount, 10, 11));
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("Decode"));
        assert!(json.contains("ElementCount"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::WriteZero, "short write");
        let err: EncodeError = io_err.into();
        assert!(matches!(err, EncodeError::Io { .. }));
    }
}
