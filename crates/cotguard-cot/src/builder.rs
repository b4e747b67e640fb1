//! Fluent construction of validated events.

use crate::detail::{Contact, Extension, Group, TypedExtension};
use crate::event::{now_millis, Event, Link, Point, DEFAULT_HOW, DEFAULT_STALE_SECS};
use crate::validate::Validator;
use chrono::{DateTime, Duration, Utc};
use cotguard_core::{ValidationError, SUPPORTED_VERSION};

/// Builds an [`Event`] and validates it on [`build`](EventBuilder::build).
///
/// Unset times default to the validating clock: time and start are `now`
/// and stale is six seconds later.
///
/// # Examples
///
/// ```
/// use cotguard_cot::{EventBuilder, detail::Contact};
///
/// let event = EventBuilder::new("ANDROID-12345678", "a-f-G-U-C", 37.7749, -122.4194, 100.0)
///     .how("h-e")
///     .contact(Contact::new("Bravo-2"))
///     .build()
///     .unwrap();
/// assert_eq!(event.callsign(), Some("Bravo-2"));
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct EventBuilder {
    event: Event,
    time: Option<DateTime<Utc>>,
    start: Option<DateTime<Utc>>,
    stale_after: Duration,
}

impl EventBuilder {
    pub fn new(
        uid: impl Into<String>,
        event_type: impl Into<String>,
        lat: f64,
        lon: f64,
        hae: f64,
    ) -> Self {
        Self {
            event: Event {
                version: SUPPORTED_VERSION.to_string(),
                uid: uid.into(),
                event_type: event_type.into(),
                how: DEFAULT_HOW.to_string(),
                point: Point::new(lat, lon, hae),
                ..Event::default()
            },
            time: None,
            start: None,
            stale_after: Duration::seconds(DEFAULT_STALE_SECS),
        }
    }

    pub fn how(mut self, how: impl Into<String>) -> Self {
        self.event.how = how.into();
        self
    }

    pub fn access(mut self, access: impl Into<String>) -> Self {
        self.event.access = Some(access.into());
        self
    }

    /// Event time. Start follows it unless set separately.
    pub fn time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Stale time as an offset from the event time.
    pub fn stale_after(mut self, offset: Duration) -> Self {
        self.stale_after = offset;
        self
    }

    pub fn point_accuracy(mut self, ce: f64, le: f64) -> Self {
        self.event.point.ce = ce;
        self.event.point.le = le;
        self
    }

    pub fn contact(self, contact: Contact) -> Self {
        self.extension(contact)
    }

    pub fn group(self, group: Group) -> Self {
        self.extension(group)
    }

    /// Sets a typed detail extension, replacing one of the same kind.
    pub fn extension<T: TypedExtension>(mut self, value: T) -> Self {
        self.event.set_extension(value);
        self
    }

    /// Appends a detail extension as is.
    pub fn raw_extension(mut self, extension: Extension) -> Self {
        self.event.push_extension(extension);
        self
    }

    pub fn link(mut self, link: Link) -> Self {
        self.event.add_link(link);
        self
    }

    /// Adds an attribute to `<event>` that the model has no field for.
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.event.extra_attributes.push((name.into(), value.into()));
        self
    }

    /// Builds and validates against the wall clock.
    pub fn build(self) -> Result<Event, ValidationError> {
        self.build_at(now_millis())
    }

    /// Builds and validates against `now`. Nothing is returned unless the
    /// event is valid.
    pub fn build_at(self, now: DateTime<Utc>) -> Result<Event, ValidationError> {
        self.build_with(Validator::global(), now)
    }

    /// Builds and validates with a specific validator.
    pub fn build_with(
        self,
        validator: &Validator,
        now: DateTime<Utc>,
    ) -> Result<Event, ValidationError> {
        let mut event = self.event;
        let time = self.time.unwrap_or(now);
        event.time = time;
        event.start = self.start.unwrap_or(time);
        event.stale = time + self.stale_after;
        event.normalize();

        validator.validate(&event, now)?;
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detail::Track;
    use crate::event::UNKNOWN_ERROR;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let event = EventBuilder::new("ANDROID-1", "a-f-G", 1.0, 2.0, 3.0)
            .build_at(now())
            .unwrap();
        assert_eq!(event.time, now());
        assert_eq!(event.start, now());
        assert_eq!(event.stale, now() + Duration::seconds(6));
        assert_eq!(event.how, "m-g");
        assert_eq!(event.version, "2.0");
    }

    #[test]
    fn test_builder_full() {
        let event = EventBuilder::new("ANDROID-1", "a-f-G-U-C", 1.0, 2.0, 3.0)
            .how("h-e")
            .access("Unclassified")
            .time(now() - Duration::minutes(1))
            .stale_after(Duration::minutes(10))
            .point_accuracy(0.0, 4.5)
            .contact(Contact::new("Bravo-2"))
            .group(Group::new("Cyan", "Team Member"))
            .extension(Track {
                speed: 3.0,
                course: 45.0,
            })
            .link(Link::new("SERVER-1", "a-f-G", "p-p"))
            .attribute("qos", "1-r-c")
            .build_at(now())
            .unwrap();

        assert_eq!(event.access.as_deref(), Some("Unclassified"));
        assert_eq!(event.point.ce, UNKNOWN_ERROR);
        assert_eq!(event.point.le, 4.5);
        assert_eq!(event.group_name(), Some("Cyan"));
        assert_eq!(event.links.len(), 1);
        assert_eq!(event.attribute("qos"), Some("1-r-c"));
        assert_eq!(event.stale - event.time, Duration::minutes(10));
    }

    #[test]
    fn test_builder_fails_atomically() {
        let err = EventBuilder::new("ANDROID-1", "a-f-G", 1.0, 2.0, 3.0)
            .stale_after(Duration::seconds(3))
            .build_at(now())
            .unwrap_err();
        assert!(matches!(err, ValidationError::StaleTooSoon { .. }));

        let err = EventBuilder::new("ANDROID-1", "a-f-G", 95.0, 2.0, 3.0)
            .build_at(now())
            .unwrap_err();
        assert_eq!(err, ValidationError::InvalidLatitude(95.0));
    }

    #[test]
    fn test_builder_wall_clock() {
        let event = EventBuilder::new("ANDROID-1", "a-f-G", 1.0, 2.0, 3.0)
            .build()
            .unwrap();
        assert!(!event.is_stale(event.time));
    }
}
