//! CoT event structures

use crate::detail::{Detail, Extension, TypedExtension};
use crate::validate::Validator;
use chrono::{DateTime, Duration, Utc};
use cotguard_core::{EncodeError, ValidationError};
use cotguard_pool::Reset;
use cotguard_types::{type_matches, Affiliation, CotType};
use serde::{Deserialize, Serialize};

/// CoT convention for an unknown circular or linear error.
pub const UNKNOWN_ERROR: f64 = 9_999_999.0;

/// Default `how` for events created by this library: machine, GPS
pub const DEFAULT_HOW: &str = "m-g";

/// Gap between time and stale for [`Event::new`].
pub const DEFAULT_STALE_SECS: i64 = 6;

/// CoT Event represents a Cursor on Target message
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Event {
    /// CoT version, always "2.0" once validated
    pub version: String,
    /// Unique identifier for this event
    pub uid: String,
    /// CoT type (e.g., "a-f-G" for atom-friendly-ground)
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event timestamp
    pub time: DateTime<Utc>,
    /// Event start time
    pub start: DateTime<Utc>,
    /// Event stale time (when the event becomes invalid)
    pub stale: DateTime<Utc>,
    /// How the event was generated (e.g., "h-e" for human-entered). Empty
    /// means unspecified.
    pub how: String,
    /// Access control marking
    pub access: Option<String>,
    /// Geographic location and accuracy
    pub point: Point,
    /// Related events, in document order
    pub links: Vec<Link>,
    /// Optional detail section
    pub detail: Option<Detail>,
    /// Unrecognized `<event>` attributes, kept for round trip
    pub extra_attributes: Vec<(String, String)>,
}

/// Geographic point with accuracy metrics
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// Latitude in decimal degrees (-90 to 90)
    pub lat: f64,
    /// Longitude in decimal degrees (-180 to 180)
    pub lon: f64,
    /// Height above ellipsoid in meters
    pub hae: f64,
    /// Circular error in meters (95% confidence)
    pub ce: f64,
    /// Linear error in meters (95% confidence)
    pub le: f64,
}

/// A `<link>` to another event
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Link {
    /// UID of the linked event
    pub uid: String,
    /// CoT type of the linked event
    #[serde(rename = "type")]
    pub link_type: String,
    /// Relationship code (e.g., "p-p" for parent-producer)
    pub relation: String,
    /// Other attributes such as `production_time` or `parent_callsign`
    pub extra_attributes: Vec<(String, String)>,
}

impl Link {
    pub fn new(
        uid: impl Into<String>,
        link_type: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            uid: uid.into(),
            link_type: link_type.into(),
            relation: relation.into(),
            extra_attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_attributes.push((name.into(), value.into()));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.extra_attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

impl Event {
    /// Creates an event stamped now and validates it.
    ///
    /// Time and start are the current time truncated to milliseconds, stale
    /// is six seconds later, `how` is `m-g` and both error radii are unknown.
    pub fn new(
        uid: impl Into<String>,
        event_type: impl Into<String>,
        lat: f64,
        lon: f64,
        hae: f64,
    ) -> Result<Self, ValidationError> {
        let now = now_millis();
        let event = Self {
            version: cotguard_core::SUPPORTED_VERSION.to_string(),
            uid: uid.into(),
            event_type: event_type.into(),
            time: now,
            start: now,
            stale: now + Duration::seconds(DEFAULT_STALE_SECS),
            how: DEFAULT_HOW.to_string(),
            point: Point::new(lat, lon, hae),
            ..Self::default()
        };
        event.validate(now)?;
        Ok(event)
    }

    /// Validates against the global catalog, default policy and built-in
    /// schemas.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        Validator::global().validate(self, now)
    }

    /// Writes the event as an XML document.
    pub fn encode(&self) -> Result<String, EncodeError> {
        crate::serializer::encode(self)
    }

    /// Replaces zero error radii with [`UNKNOWN_ERROR`].
    pub fn normalize(&mut self) {
        self.point = self.point.normalized();
    }

    /// Get the affiliation from the event type
    pub fn affiliation(&self) -> Option<Affiliation> {
        CotType::parse(&self.event_type).affiliation
    }

    pub fn is_friendly(&self) -> bool {
        CotType::parse(&self.event_type).is_friendly()
    }

    pub fn is_hostile(&self) -> bool {
        CotType::parse(&self.event_type).is_hostile()
    }

    pub fn is_atom(&self) -> bool {
        CotType::parse(&self.event_type).is_atom()
    }

    /// True if the event type matches `pattern` (exact, `a-.-X` or `X-*`).
    pub fn matches_type(&self, pattern: &str) -> bool {
        type_matches(pattern, &self.event_type)
    }

    /// True once `now` has reached the stale time.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now >= self.stale
    }

    /// Get the callsign from the contact detail, if present
    pub fn callsign(&self) -> Option<&str> {
        self.detail
            .as_ref()
            .and_then(Detail::contact)
            .map(|c| c.callsign.as_str())
            .filter(|callsign| !callsign.is_empty())
    }

    /// Get the group name from the group detail, if present
    pub fn group_name(&self) -> Option<&str> {
        self.detail
            .as_ref()
            .and_then(Detail::group)
            .map(|g| g.name.as_str())
    }

    /// The detail section, created empty if absent.
    pub fn detail_mut(&mut self) -> &mut Detail {
        self.detail.get_or_insert_with(Detail::default)
    }

    /// Sets a typed detail extension, replacing one of the same kind.
    pub fn set_extension<T: TypedExtension>(&mut self, value: T) {
        self.detail_mut().set(value);
    }

    pub fn push_extension(&mut self, extension: Extension) {
        self.detail_mut().push(extension);
    }

    pub fn add_link(&mut self, link: Link) {
        self.links.push(link);
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.extra_attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Event time in milliseconds since the Unix epoch
    pub fn time_millis(&self) -> i64 {
        self.time.timestamp_millis()
    }

    /// Start time in milliseconds since the Unix epoch
    pub fn start_millis(&self) -> i64 {
        self.start.timestamp_millis()
    }

    /// Stale time in milliseconds since the Unix epoch
    pub fn stale_millis(&self) -> i64 {
        self.stale.timestamp_millis()
    }
}

impl Reset for Event {
    fn reset(&mut self) {
        self.version.clear();
        self.uid.clear();
        self.event_type.clear();
        self.time = DateTime::UNIX_EPOCH;
        self.start = DateTime::UNIX_EPOCH;
        self.stale = DateTime::UNIX_EPOCH;
        self.how.clear();
        self.access = None;
        self.point = Point::default();
        self.links.clear();
        self.detail = None;
        self.extra_attributes.clear();
    }
}

impl Point {
    /// Create a new Point with unknown accuracy
    pub fn new(lat: f64, lon: f64, hae: f64) -> Self {
        Self {
            lat,
            lon,
            hae,
            ce: UNKNOWN_ERROR,
            le: UNKNOWN_ERROR,
        }
    }

    /// Create a new Point with specified accuracy
    pub fn with_accuracy(lat: f64, lon: f64, hae: f64, ce: f64, le: f64) -> Self {
        Self {
            lat,
            lon,
            hae,
            ce,
            le,
        }
    }

    /// A copy with zero error radii replaced by [`UNKNOWN_ERROR`].
    pub fn normalized(self) -> Self {
        let sentinel = |v: f64| if v == 0.0 { UNKNOWN_ERROR } else { v };
        Self {
            ce: sentinel(self.ce),
            le: sentinel(self.le),
            ..self
        }
    }
}

/// The current time truncated to whole milliseconds, the precision CoT
/// timestamps are exchanged at.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detail::{Contact, Group};
    use cotguard_types::Affiliation;

    #[test]
    fn test_new_event_is_valid() {
        let event = Event::new("ANDROID-12345678", "a-f-G-E-V-C", 37.7749, -122.4194, 100.0)
            .unwrap();
        assert_eq!(event.version, "2.0");
        assert_eq!(event.how, "m-g");
        assert_eq!(event.time, event.start);
        assert_eq!(event.stale - event.time, Duration::seconds(6));
        assert_eq!(event.time.timestamp_subsec_nanos() % 1_000_000, 0);
        assert_eq!(event.point.ce, UNKNOWN_ERROR);
        assert!(event.is_friendly());
        assert!(event.is_atom());
    }

    #[test]
    fn test_new_event_rejects_bad_latitude() {
        let err = Event::new("ANDROID-1", "a-f-G", 95.0, 0.0, 0.0).unwrap_err();
        assert_eq!(err, ValidationError::InvalidLatitude(95.0));
    }

    #[test]
    fn test_affiliation_helpers() {
        let mut event = Event {
            event_type: "a-h-A-M-F".into(),
            ..Event::default()
        };
        assert_eq!(event.affiliation(), Some(Affiliation::Hostile));
        assert!(event.is_hostile());
        assert!(event.matches_type("a-.-A-*"));
        assert!(event.matches_type("a-.-A-M-F"));
        assert!(!event.matches_type("a-.-A"));
        assert!(event.matches_type("a-h-*"));
        assert!(!event.matches_type("a-f-*"));

        event.event_type = "b-t-f".into();
        assert_eq!(event.affiliation(), None);
        assert!(!event.is_atom());
    }

    #[test]
    fn test_point_normalized() {
        let point = Point::with_accuracy(1.0, 2.0, 3.0, 0.0, 5.0).normalized();
        assert_eq!(point.ce, UNKNOWN_ERROR);
        assert_eq!(point.le, 5.0);
    }

    #[test]
    fn test_detail_helpers() {
        let mut event = Event::default();
        assert_eq!(event.callsign(), None);
        event.set_extension(Contact::new("Bravo-2"));
        event.set_extension(Group::new("Cyan", "Team Member"));
        assert_eq!(event.callsign(), Some("Bravo-2"));
        assert_eq!(event.group_name(), Some("Cyan"));
    }

    #[test]
    fn test_is_stale() {
        let event = Event::new("ANDROID-1", "a-f-G", 0.0, 0.0, 0.0).unwrap();
        assert!(!event.is_stale(event.time));
        assert!(event.is_stale(event.stale));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut event = Event::new("ANDROID-1", "a-f-G", 1.0, 2.0, 3.0).unwrap();
        event.access = Some("Unclassified".into());
        event.add_link(Link::new("SERVER-1", "a-f-G", "p-p"));
        event.set_extension(Contact::new("Bravo-2"));
        event.extra_attributes.push(("qos".into(), "1-r-c".into()));

        event.reset();
        assert_eq!(event, Event::default());
    }

    #[test]
    fn test_millis() {
        let event = Event {
            time: DateTime::from_timestamp_millis(1_705_314_600_123).unwrap(),
            ..Event::default()
        };
        assert_eq!(event.time_millis(), 1_705_314_600_123);
        assert_eq!(event.stale_millis(), 0);
    }
}
