//! Validation for CoT events
//!
//! Checks run in a fixed order and the first violation is returned:
//! required fields, version, uid, type, how, times, point, detail, links.

use crate::detail::{BuiltinSchemas, DecodeStrategy, Extension, SchemaValidator};
use crate::event::{Event, Link, Point};
use chrono::{DateTime, Utc};
use cotguard_core::{ExtensionError, ValidationConfig, ValidationError};
use cotguard_types::{validate_how_in, validate_relation_in, validate_type_in, Catalog, TypePattern};
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;

/// Longest uid accepted.
pub const MAX_UID_LEN: usize = 128;

/// Lowest height above ellipsoid accepted, in meters.
pub const MIN_HAE: f64 = -12_000.0;

/// Highest height above ellipsoid accepted, in meters.
pub const MAX_HAE: f64 = 9_999_999.0;

static GLOBAL_VALIDATOR: Lazy<Validator> = Lazy::new(Validator::default);

/// Event validator with injectable services.
#[derive(Clone)]
pub struct Validator {
    catalog: Arc<Catalog>,
    policy: ValidationConfig,
    schemas: Arc<dyn SchemaValidator>,
}

impl Validator {
    pub fn new(
        catalog: Arc<Catalog>,
        policy: ValidationConfig,
        schemas: Arc<dyn SchemaValidator>,
    ) -> Self {
        Self {
            catalog,
            policy,
            schemas,
        }
    }

    /// Global catalog, default policy and built-in schemas.
    pub fn global() -> &'static Validator {
        &GLOBAL_VALIDATOR
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_handle(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog)
    }

    pub fn policy(&self) -> &ValidationConfig {
        &self.policy
    }

    pub fn schemas(&self) -> &dyn SchemaValidator {
        self.schemas.as_ref()
    }

    /// Validates an event against `now`.
    pub fn validate(&self, event: &Event, now: DateTime<Utc>) -> Result<(), ValidationError> {
        check_presence(event)?;

        if event.version != self.policy.version {
            return Err(ValidationError::UnsupportedVersion {
                found: event.version.clone(),
                expected: self.policy.version.clone(),
            });
        }

        validate_uid(&event.uid)?;
        validate_event_type(&self.catalog, &event.event_type)?;
        validate_how_in(&self.catalog, &event.how).map_err(ValidationError::How)?;
        self.check_times(event, now)?;
        validate_point(&event.point)?;

        if let Some(detail) = &event.detail {
            for extension in detail.extensions() {
                self.check_extension(extension)?;
            }
        }

        for (index, link) in event.links.iter().enumerate() {
            self.check_link(link)
                .map_err(|err| ValidationError::link(index, err))?;
        }

        Ok(())
    }

    fn check_times(&self, event: &Event, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if event.start > event.time {
            return Err(ValidationError::StartAfterTime {
                start: event.start.to_rfc3339(),
                time: event.time.to_rfc3339(),
            });
        }

        let offset_ms = (event.stale - event.time).num_milliseconds();
        let min_ms = millis(self.policy.min_stale_offset);
        let max_ms = millis(self.policy.max_stale_offset);
        if offset_ms < min_ms {
            return Err(ValidationError::StaleTooSoon { offset_ms, min_ms });
        }
        if offset_ms > max_ms {
            return Err(ValidationError::StaleTooFar { offset_ms, max_ms });
        }

        let drift_ms = (event.time - now).num_milliseconds().saturating_abs();
        if drift_ms > millis(self.policy.clock_window) {
            return Err(ValidationError::TimeOutOfWindow {
                time: event.time.to_rfc3339(),
                now: now.to_rfc3339(),
            });
        }
        Ok(())
    }

    fn check_extension(&self, extension: &Extension) -> Result<(), ValidationError> {
        extension.check()?;

        let kind = extension.kind();
        if let (DecodeStrategy::SchemaChecked(schema), Some(raw)) =
            (kind.strategy(), extension.raw())
        {
            self.schemas
                .validate(schema, raw.as_bytes())
                .map_err(|err| ExtensionError::schema(kind.element_name(), schema, err.reason))?;
        }
        Ok(())
    }

    fn check_link(&self, link: &Link) -> Result<(), ValidationError> {
        validate_uid(&link.uid)?;
        validate_type_in(&self.catalog, &link.link_type)?;
        validate_relation_in(&self.catalog, &link.relation)?;
        Ok(())
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(
            Catalog::shared(),
            ValidationConfig::default(),
            Arc::new(BuiltinSchemas),
        )
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("catalog_types", &self.catalog.len())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn millis(duration: std::time::Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn check_presence(event: &Event) -> Result<(), ValidationError> {
    if event.version.is_empty() {
        return Err(ValidationError::missing_field("version"));
    }
    if event.uid.is_empty() {
        return Err(ValidationError::missing_field("uid"));
    }
    if event.event_type.is_empty() {
        return Err(ValidationError::missing_field("type"));
    }
    for (field, value) in [("time", event.time), ("start", event.start), ("stale", event.stale)] {
        if value == DateTime::UNIX_EPOCH {
            return Err(ValidationError::missing_field(field));
        }
    }
    Ok(())
}

/// Checks uid syntax: 1 to 128 printable characters other than the markup
/// characters `<>&"'`, with no leading or trailing hyphen or whitespace and
/// no `..`. Interior spaces are allowed, as in GeoChat room uids.
///
/// ```
/// use cotguard_cot::validate::validate_uid;
///
/// assert!(validate_uid("GeoChat.ANDROID-1.All Chat Rooms.5d2f").is_ok());
/// assert!(validate_uid("a<b").is_err());
/// ```
pub fn validate_uid(uid: &str) -> Result<(), ValidationError> {
    if uid.is_empty() {
        return Err(ValidationError::invalid_uid(uid, "empty"));
    }
    if uid.chars().count() > MAX_UID_LEN {
        return Err(ValidationError::invalid_uid(
            uid,
            format!("longer than {} characters", MAX_UID_LEN),
        ));
    }
    if let Some(c) = uid
        .chars()
        .find(|&c| c.is_control() || matches!(c, '<' | '>' | '&' | '"' | '\''))
    {
        return Err(ValidationError::invalid_uid(
            uid,
            format!("character {:?} is not allowed", c),
        ));
    }
    if uid.starts_with('-') || uid.ends_with('-') {
        return Err(ValidationError::invalid_uid(
            uid,
            "must not start or end with '-'",
        ));
    }
    if uid.starts_with(char::is_whitespace) || uid.ends_with(char::is_whitespace) {
        return Err(ValidationError::invalid_uid(
            uid,
            "must not start or end with whitespace",
        ));
    }
    if uid.contains("..") {
        return Err(ValidationError::invalid_uid(uid, "must not contain '..'"));
    }
    Ok(())
}

/// Validates a Point
pub fn validate_point(point: &Point) -> Result<(), ValidationError> {
    if !point.lat.is_finite() || !(-90.0..=90.0).contains(&point.lat) {
        return Err(ValidationError::InvalidLatitude(point.lat));
    }
    if !point.lon.is_finite() || !(-180.0..=180.0).contains(&point.lon) {
        return Err(ValidationError::InvalidLongitude(point.lon));
    }
    if !point.hae.is_finite() || !(MIN_HAE..=MAX_HAE).contains(&point.hae) {
        return Err(ValidationError::InvalidHae(point.hae));
    }
    if !point.ce.is_finite() || point.ce < 0.0 {
        return Err(ValidationError::InvalidCircularError(point.ce));
    }
    if !point.le.is_finite() || point.le < 0.0 {
        return Err(ValidationError::InvalidLinearError(point.le));
    }
    Ok(())
}

/// Validates a type code for a live event: known to the catalog and not a
/// wildcard.
pub fn validate_event_type(catalog: &Catalog, code: &str) -> Result<(), ValidationError> {
    validate_type_in(catalog, code)?;
    if TypePattern::parse(code).is_ok_and(|p| p.is_wildcard()) {
        return Err(ValidationError::WildcardType(code.to_string()));
    }
    Ok(())
}
