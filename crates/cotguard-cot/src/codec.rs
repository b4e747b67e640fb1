//! Codec facade
//!
//! A [`Codec`] owns the services a decode needs: the type catalog, the
//! security limits, the validation policy and the schema validator. The
//! default codec shares the process-wide catalog and limits, so adjusting
//! [`Limits::global`] affects it immediately.

use crate::detail::{BuiltinSchemas, SchemaValidator};
use crate::event::Event;
use crate::parser;
use crate::serializer;
use crate::validate::Validator;
use chrono::{DateTime, Utc};
use cotguard_core::{CodecConfig, DecodeError, EncodeError, Limits, ValidationConfig};
use cotguard_pool::{Pool, PoolConfig, Pooled};
use cotguard_types::Catalog;
use once_cell::sync::Lazy;
use std::fmt;
use std::io;
use std::sync::Arc;
use tracing::{debug, info};

static DEFAULT_CODEC: Lazy<Codec> = Lazy::new(Codec::new);

/// Decodes and validates one event at the wall clock with the default codec.
pub fn decode(bytes: &[u8]) -> Result<Event, DecodeError> {
    DEFAULT_CODEC.decode(bytes)
}

/// Encodes an event with the default codec.
pub fn encode(event: &Event) -> Result<String, EncodeError> {
    DEFAULT_CODEC.encode(event)
}

/// Decoder, validator and encoder for CoT XML.
pub struct Codec {
    limits: Arc<Limits>,
    validator: Validator,
    schemas: Arc<dyn SchemaValidator>,
    events: Pool<Event>,
    buffers: Pool<Vec<u8>>,
}

impl Codec {
    /// Codec over the global catalog and limits with the default policy and
    /// built-in schemas.
    pub fn new() -> Self {
        Self::with_services(
            Catalog::shared(),
            Limits::shared(),
            ValidationConfig::default(),
            Arc::new(BuiltinSchemas),
        )
    }

    pub fn with_services(
        catalog: Arc<Catalog>,
        limits: Arc<Limits>,
        policy: ValidationConfig,
        schemas: Arc<dyn SchemaValidator>,
    ) -> Self {
        Self {
            limits,
            validator: Validator::new(catalog, policy, Arc::clone(&schemas)),
            schemas,
            events: Pool::with_config(PoolConfig::default()),
            buffers: Pool::with_config(PoolConfig::default()),
        }
    }

    /// Assembles a codec from configuration.
    ///
    /// With no extra catalog sources the global catalog is shared. Otherwise
    /// a private catalog is built from the bundled datasets followed by each
    /// listed file, in order.
    pub fn from_config(config: &CodecConfig) -> cotguard_core::Result<Self> {
        config.validate()?;

        let catalog = if config.catalog.extra_sources.is_empty() {
            Catalog::shared()
        } else {
            let catalog = Catalog::bundled()?;
            for path in &config.catalog.extra_sources {
                let summary = catalog.load_file(path)?;
                info!(
                    path = %path.display(),
                    types = summary.types,
                    hows = summary.hows,
                    relations = summary.relations,
                    "Loaded extra catalog source"
                );
            }
            Arc::new(catalog)
        };

        Ok(Self::with_services(
            catalog,
            Arc::new(Limits::from_config(&config.limits)),
            config.validation.clone(),
            Arc::new(BuiltinSchemas),
        ))
    }

    /// Replaces the schema validator used for schema-checked extensions.
    pub fn with_schemas(self, schemas: Arc<dyn SchemaValidator>) -> Self {
        let catalog = self.validator.catalog_handle();
        let policy = self.validator.policy().clone();
        Self::with_services(catalog, self.limits, policy, schemas)
    }

    pub fn catalog(&self) -> &Catalog {
        self.validator.catalog()
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn event_pool(&self) -> &Pool<Event> {
        &self.events
    }

    pub fn buffer_pool(&self) -> &Pool<Vec<u8>> {
        &self.buffers
    }

    /// Decodes without validating.
    pub fn parse(&self, bytes: &[u8]) -> Result<Event, DecodeError> {
        parser::parse(bytes, self.limits.snapshot(), self.schemas.as_ref())
            .inspect_err(|err| log_rejection(bytes, err))
    }

    /// Decodes and validates against the wall clock.
    pub fn decode(&self, bytes: &[u8]) -> Result<Event, DecodeError> {
        self.decode_at(bytes, Utc::now())
    }

    /// Decodes and validates against `now`.
    pub fn decode_at(&self, bytes: &[u8], now: DateTime<Utc>) -> Result<Event, DecodeError> {
        let event = self.parse(bytes)?;
        self.validator
            .validate(&event, now)
            .map_err(DecodeError::from)
            .inspect_err(|err| log_rejection(bytes, err))?;
        Ok(event)
    }

    /// Decodes and validates into an event checked out of the codec's pool.
    ///
    /// The event goes back to the pool, reset, when the guard is dropped. A
    /// failed decode returns it straight away.
    pub fn decode_pooled(&self, bytes: &[u8]) -> Result<Pooled<'_, Event>, DecodeError> {
        self.decode_pooled_at(bytes, Utc::now())
    }

    pub fn decode_pooled_at(
        &self,
        bytes: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Pooled<'_, Event>, DecodeError> {
        let mut event = self.events.checkout();
        parser::parse_into(bytes, self.limits.snapshot(), self.schemas.as_ref(), &mut event)
            .and_then(|()| self.validator.validate(&event, now).map_err(DecodeError::from))
            .inspect_err(|err| log_rejection(bytes, err))?;
        Ok(event)
    }

    pub fn encode(&self, event: &Event) -> Result<String, EncodeError> {
        serializer::encode(event)
    }

    pub fn encode_into<W: io::Write>(&self, event: &Event, writer: &mut W) -> Result<(), EncodeError> {
        serializer::encode_into(event, writer)
    }

    /// Encodes into a buffer checked out of the codec's pool.
    pub fn encode_pooled(&self, event: &Event) -> Result<Pooled<'_, Vec<u8>>, EncodeError> {
        let mut buffer = self.buffers.checkout();
        serializer::encode_into(event, &mut *buffer)?;
        Ok(buffer)
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("limits", &self.limits.snapshot())
            .field("validator", &self.validator)
            .field("events", &self.events)
            .field("buffers", &self.buffers)
            .finish_non_exhaustive()
    }
}

fn log_rejection(bytes: &[u8], err: &DecodeError) {
    debug!(
        error = %err,
        malformed = err.is_malformed(),
        bytes = bytes.len(),
        "Rejected CoT message"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detail::SchemaError;
    use chrono::TimeZone;
    use cotguard_core::{CotError, LimitKind, ValidationError};

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<event version="2.0" uid="ANDROID-12345678" type="a-f-G-U-C" time="2024-01-15T10:30:00Z" start="2024-01-15T10:30:00Z" stale="2024-01-15T10:35:00Z" how="m-g">
  <point lat="37.7749" lon="-122.4194" hae="100.0" ce="10.0" le="5.0"/>
  <detail>
    <contact callsign="Bravo-2"/>
  </detail>
</event>"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 31, 0).unwrap()
    }

    #[test]
    fn test_decode_at() {
        let codec = Codec::new();
        let event = codec.decode_at(SAMPLE.as_bytes(), now()).unwrap();
        assert_eq!(event.callsign(), Some("Bravo-2"));
    }

    #[test]
    fn test_decode_at_wall_clock_rejects_old_event() {
        let err = Codec::new().decode(SAMPLE.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Validation(ValidationError::TimeOutOfWindow { .. })
        ));
        assert!(!err.is_malformed());
    }

    #[test]
    fn test_parse_skips_validation() {
        let stale_soon = SAMPLE.replace("10:35:00Z", "10:30:03Z");
        let codec = Codec::new();
        assert!(codec.parse(stale_soon.as_bytes()).is_ok());
        assert!(matches!(
            codec.decode_at(stale_soon.as_bytes(), now()),
            Err(DecodeError::Validation(ValidationError::StaleTooSoon { .. }))
        ));
    }

    #[test]
    fn test_pooled_decode_returns_event() {
        let codec = Codec::new();
        {
            let event = codec.decode_pooled_at(SAMPLE.as_bytes(), now()).unwrap();
            assert_eq!(event.uid, "ANDROID-12345678");
        }
        assert_eq!(codec.event_pool().idle(), 1);

        assert!(codec.decode_pooled_at(b"<event/>", now()).is_err());
        assert_eq!(codec.event_pool().idle(), 1);
        assert!(codec.event_pool().checkout().uid.is_empty());
    }

    #[test]
    fn test_encode_pooled() {
        let codec = Codec::new();
        let event = codec.decode_at(SAMPLE.as_bytes(), now()).unwrap();
        let encoded = codec.encode(&event).unwrap();
        {
            let buffer = codec.encode_pooled(&event).unwrap();
            assert_eq!(&buffer[..], encoded.as_bytes());
        }
        assert_eq!(codec.buffer_pool().idle(), 1);
    }

    #[test]
    fn test_from_config_limits() {
        let config = CodecConfig::from_yaml("limits:\n  max_depth: 4\n").unwrap();
        let codec = Codec::from_config(&config).unwrap();
        assert_eq!(codec.limits().max_depth(), 4);

        let deep = SAMPLE.replace(
            "<contact callsign=\"Bravo-2\"/>",
            "<a><b><c/></b></a>",
        );
        assert!(matches!(
            codec.parse(deep.as_bytes()),
            Err(DecodeError::LimitExceeded {
                limit: LimitKind::Depth,
                ..
            })
        ));
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let config = CodecConfig::from_yaml("limits:\n  max_depth: 1\n").unwrap();
        assert!(matches!(
            Codec::from_config(&config),
            Err(CotError::Config(_))
        ));
    }

    #[test]
    fn test_custom_schema_validator() {
        struct RejectAll;
        impl SchemaValidator for RejectAll {
            fn validate(&self, _schema: &str, _xml: &[u8]) -> Result<(), SchemaError> {
                Err(SchemaError::new("closed"))
            }
        }

        let chat = SAMPLE.replace(
            "<contact callsign=\"Bravo-2\"/>",
            "<__chat sender=\"A\" message=\"hi\"/>",
        );
        assert!(Codec::new().parse(chat.as_bytes()).is_ok());

        let codec = Codec::new().with_schemas(Arc::new(RejectAll));
        assert!(matches!(
            codec.parse(chat.as_bytes()),
            Err(DecodeError::Extension(_))
        ));
    }
}
