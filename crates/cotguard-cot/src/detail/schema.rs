//! Schema validation boundary for safety-relevant detail extensions.
//!
//! Full schema validation lives outside this crate. The decoder only needs a
//! yes/no answer for a named schema and a raw element, which is what
//! [`SchemaValidator`] expresses. [`BuiltinSchemas`] covers the chat
//! extensions with attribute rules so they are checked even when no external
//! validator is wired in.

use crate::detail::RawXml;
use thiserror::Error;

/// Reason a payload was rejected by a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct SchemaError {
    pub reason: String,
}

impl SchemaError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Validates a raw extension element against a named schema.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, schema: &str, xml: &[u8]) -> Result<(), SchemaError>;
}

/// One accepted shape: every listed attribute must be present and non-empty.
type AttributeSet = &'static [&'static str];

struct SchemaRule {
    schema: &'static str,
    one_of: &'static [AttributeSet],
}

const RULES: &[SchemaRule] = &[
    SchemaRule {
        schema: "__chat",
        one_of: &[&["sender", "message"], &["chatroom", "id", "senderCallsign"]],
    },
    SchemaRule {
        schema: "__chatreceipt",
        one_of: &[&["chatroom", "id", "senderCallsign"], &["sender", "messageId"]],
    },
    SchemaRule {
        schema: "__chatReceipt",
        one_of: &[&["chatroom", "id", "senderCallsign"], &["sender", "messageId"]],
    },
];

/// Attribute-rule schemas for `__chat`, `__chatreceipt` and `__chatReceipt`.
///
/// The root element must carry the schema's name and satisfy one of its
/// required attribute sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinSchemas;

impl SchemaValidator for BuiltinSchemas {
    fn validate(&self, schema: &str, xml: &[u8]) -> Result<(), SchemaError> {
        let rule = RULES
            .iter()
            .find(|r| r.schema == schema)
            .ok_or_else(|| SchemaError::new(format!("no schema named '{schema}'")))?;

        let raw = RawXml::from_utf8(xml).ok_or_else(|| SchemaError::new("payload is not UTF-8"))?;
        let root = raw.root().ok_or_else(|| SchemaError::new("payload has no element"))?;

        if root.name != schema {
            return Err(SchemaError::new(format!(
                "root element is <{}>, expected <{}>",
                root.name, schema
            )));
        }

        let present = |name: &str| {
            root.attributes
                .iter()
                .any(|(k, v)| k == name && !v.trim().is_empty())
        };

        if rule.one_of.iter().any(|set| set.iter().all(|a| present(a))) {
            return Ok(());
        }

        let expected: Vec<String> = rule.one_of.iter().map(|set| set.join("+")).collect();
        Err(SchemaError::new(format!(
            "missing required attributes (expected one of: {})",
            expected.join(" | ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_sender_message() {
        let schemas = BuiltinSchemas;
        assert!(schemas
            .validate("__chat", br#"<__chat sender="A" message="hi"/>"#)
            .is_ok());
    }

    #[test]
    fn test_chat_room_form() {
        let xml = br#"<__chat chatroom="All Chat Rooms" id="All Chat Rooms" senderCallsign="ALPHA"><chatgrp uid0="A"/></__chat>"#;
        assert!(BuiltinSchemas.validate("__chat", xml).is_ok());
    }

    #[test]
    fn test_chat_missing_attributes() {
        let err = BuiltinSchemas
            .validate("__chat", br#"<__chat unknown="x"/>"#)
            .unwrap_err();
        assert!(err.reason.contains("sender+message"));
    }

    #[test]
    fn test_empty_values_do_not_count() {
        assert!(BuiltinSchemas
            .validate("__chat", br#"<__chat sender="" message="hi"/>"#)
            .is_err());
    }

    #[test]
    fn test_root_must_match_schema() {
        assert!(BuiltinSchemas
            .validate("__chatreceipt", br#"<__chat sender="A" messageId="1"/>"#)
            .is_err());
        assert!(BuiltinSchemas
            .validate("__chatReceipt", br#"<__chatReceipt sender="A" messageId="1"/>"#)
            .is_ok());
    }

    #[test]
    fn test_unknown_schema() {
        assert!(BuiltinSchemas.validate("__nope", b"<__nope/>").is_err());
    }
}
