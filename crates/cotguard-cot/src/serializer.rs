//! XML serialization for CoT messages
//!
//! Output is a complete document: XML declaration, then the event with
//! two-space indentation. Attribute values escape all five XML special
//! characters. Detail extensions that still carry the bytes they were
//! decoded from are written back verbatim.

use crate::detail::{Detail, DetailElement, Extension, Typed, TypedExtension};
use crate::event::{Event, Link, Point};
use chrono::{DateTime, SecondsFormat, Utc};
use cotguard_core::EncodeError;
use quick_xml::escape::{escape, partial_escape};
use std::io;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const INDENT: &str = "  ";

/// Serialize an Event to an XML string
pub fn encode(event: &Event) -> Result<String, EncodeError> {
    let mut xml = String::with_capacity(512);
    write_event(&mut xml, event)?;
    Ok(xml)
}

/// Serialize an Event into a writer
pub fn encode_into<W: io::Write>(event: &Event, writer: &mut W) -> Result<(), EncodeError> {
    let xml = encode(event)?;
    writer.write_all(xml.as_bytes())?;
    Ok(())
}

/// Formats a timestamp as RFC 3339 UTC with a `Z` suffix. Millisecond
/// precision when the value is millisecond aligned, otherwise as much as
/// needed.
pub fn format_time(time: &DateTime<Utc>) -> String {
    let format = if time.timestamp_subsec_nanos() % 1_000_000 == 0 {
        SecondsFormat::Millis
    } else {
        SecondsFormat::AutoSi
    };
    time.to_rfc3339_opts(format, true)
}

fn write_event(xml: &mut String, event: &Event) -> Result<(), EncodeError> {
    xml.push_str(XML_DECLARATION);
    xml.push('\n');

    let mut tag = Tag::open(xml, "event");
    tag.attr("version", &event.version);
    tag.attr("uid", &event.uid);
    tag.attr("type", &event.event_type);
    tag.attr("time", &format_time(&event.time));
    tag.attr("start", &format_time(&event.start));
    tag.attr("stale", &format_time(&event.stale));
    if !event.how.is_empty() {
        tag.attr("how", &event.how);
    }
    if let Some(access) = &event.access {
        tag.attr("access", access);
    }
    tag.extra(&event.extra_attributes)?;
    tag.finish_open();
    xml.push('\n');

    write_point(xml, &event.point)?;
    for link in &event.links {
        write_link(xml, link)?;
    }
    if let Some(detail) = &event.detail {
        write_detail(xml, detail)?;
    }

    xml.push_str("</event>\n");
    Ok(())
}

fn write_point(xml: &mut String, point: &Point) -> Result<(), EncodeError> {
    xml.push_str(INDENT);
    let mut tag = Tag::open(xml, "point");
    tag.number("lat", "point.lat", point.lat)?;
    tag.number("lon", "point.lon", point.lon)?;
    tag.number("hae", "point.hae", point.hae)?;
    tag.number("ce", "point.ce", point.ce)?;
    tag.number("le", "point.le", point.le)?;
    tag.finish_empty();
    xml.push('\n');
    Ok(())
}

fn write_link(xml: &mut String, link: &Link) -> Result<(), EncodeError> {
    xml.push_str(INDENT);
    let mut tag = Tag::open(xml, "link");
    tag.attr("uid", &link.uid);
    tag.attr("type", &link.link_type);
    tag.attr("relation", &link.relation);
    tag.extra(&link.extra_attributes)?;
    tag.finish_empty();
    xml.push('\n');
    Ok(())
}

fn write_detail(xml: &mut String, detail: &Detail) -> Result<(), EncodeError> {
    xml.push_str(INDENT);
    let mut tag = Tag::open(xml, "detail");
    tag.extra(&detail.attributes)?;
    if detail.is_empty() {
        tag.finish_empty();
        xml.push('\n');
        return Ok(());
    }
    tag.finish_open();
    xml.push('\n');

    for element in &detail.elements {
        xml.push_str(INDENT);
        xml.push_str(INDENT);
        match element {
            DetailElement::Unknown(raw) => xml.push_str(raw.as_str()),
            DetailElement::Known(extension) => write_extension(xml, extension)?,
        }
        xml.push('\n');
    }

    xml.push_str(INDENT);
    xml.push_str("</detail>\n");
    Ok(())
}

fn write_extension(xml: &mut String, extension: &Extension) -> Result<(), EncodeError> {
    match extension {
        Extension::Contact(t) => write_typed(xml, t),
        Extension::Group(t) => write_typed(xml, t),
        Extension::Track(t) => write_typed(xml, t),
        Extension::Status(t) => write_typed(xml, t),
        Extension::Takv(t) => write_typed(xml, t),
        Extension::PrecisionLocation(t) => write_typed(xml, t),
        Extension::Uid(t) => write_typed(xml, t),
        Extension::UserIcon(t) => write_typed(xml, t),
        Extension::Color(t) => write_typed(xml, t),
        Extension::Remarks(t) => write_typed(xml, t),
        Extension::Emergency(t) => write_typed(xml, t),
        Extension::Height(t) => write_typed(xml, t),
        Extension::Raw(_, raw) => {
            xml.push_str(raw.as_str());
            Ok(())
        }
    }
}

fn write_typed<T: TypedExtension>(xml: &mut String, typed: &Typed<T>) -> Result<(), EncodeError> {
    if let Some(raw) = typed.raw() {
        xml.push_str(raw.as_str());
        return Ok(());
    }

    let name = T::KIND.element_name();
    let attributes = typed.attributes()?;
    let mut tag = Tag::open(xml, name);
    for (key, value) in &attributes {
        tag.attr(key, value);
    }
    tag.extra(typed.extra_attributes())?;

    let text = typed.text().filter(|text| !text.is_empty());
    if text.is_none() && typed.children().is_empty() {
        tag.finish_empty();
    } else {
        tag.finish_open();
        if let Some(text) = text {
            xml.push_str(&partial_escape(text));
        }
        for child in typed.children() {
            xml.push_str(child.as_str());
        }
        xml.push_str("</");
        xml.push_str(name);
        xml.push('>');
    }
    Ok(())
}

/// An element start tag being written.
struct Tag<'a> {
    xml: &'a mut String,
}

impl<'a> Tag<'a> {
    fn open(xml: &'a mut String, name: &str) -> Self {
        xml.push('<');
        xml.push_str(name);
        Self { xml }
    }

    fn attr(&mut self, name: &str, value: &str) {
        self.xml.push(' ');
        self.xml.push_str(name);
        self.xml.push_str("=\"");
        self.xml.push_str(&escape(value));
        self.xml.push('"');
    }

    fn number(&mut self, name: &str, field: &str, value: f64) -> Result<(), EncodeError> {
        if !value.is_finite() {
            return Err(EncodeError::NonFinite {
                field: field.to_string(),
            });
        }
        self.attr(name, &value.to_string());
        Ok(())
    }

    /// Preserved attributes. Their names came from outside the codec, so
    /// they are checked before being written.
    fn extra(&mut self, attributes: &[(String, String)]) -> Result<(), EncodeError> {
        for (name, value) in attributes {
            if !is_xml_name(name) {
                return Err(EncodeError::InvalidName { name: name.clone() });
            }
            self.attr(name, value);
        }
        Ok(())
    }

    fn finish_open(self) {
        self.xml.push('>');
    }

    fn finish_empty(self) {
        self.xml.push_str("/>");
    }
}

fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detail::{Contact, Remarks, RawXml, Track};
    use chrono::TimeZone;

    fn sample_event() -> Event {
        let time = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        Event {
            version: "2.0".to_string(),
            uid: "test-1".to_string(),
            event_type: "a-f-G".to_string(),
            time,
            start: time,
            stale: time + chrono::Duration::minutes(5),
            how: "h-e".to_string(),
            point: Point::with_accuracy(37.7749, -122.4194, 100.0, 10.0, 5.0),
            ..Event::default()
        }
    }

    #[test]
    fn test_serialize_event_minimal() {
        let xml = encode(&sample_event()).unwrap();
        assert!(xml.starts_with(XML_DECLARATION));
        assert!(xml.contains(r#"uid="test-1""#));
        assert!(xml.contains(r#"time="2024-01-15T10:30:00.000Z""#));
        assert!(xml.contains(r#"stale="2024-01-15T10:35:00.000Z""#));
        assert!(xml.contains(
            r#"  <point lat="37.7749" lon="-122.4194" hae="100" ce="10" le="5"/>"#
        ));
        assert!(xml.ends_with("</event>\n"));
        assert!(!xml.contains("<detail"));
    }

    #[test]
    fn test_time_precision() {
        let time = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(format_time(&time), "2024-01-15T10:30:00.000Z");
        let micro = time + chrono::Duration::microseconds(1_500);
        assert_eq!(format_time(&micro), "2024-01-15T10:30:00.001500Z");
    }

    #[test]
    fn test_attributes_escaped() {
        let mut event = sample_event();
        event.set_extension(Contact::new(r#"A&B <"x"> 'y'"#));
        let xml = encode(&event).unwrap();
        assert!(xml.contains(r#"callsign="A&amp;B &lt;&quot;x&quot;&gt; &apos;y&apos;""#));
    }

    #[test]
    fn test_typed_with_text() {
        let mut event = sample_event();
        event.set_extension(Remarks::new("a < b & c"));
        let xml = encode(&event).unwrap();
        assert!(xml.contains("<remarks>a &lt; b &amp; c</remarks>"));
    }

    #[test]
    fn test_raw_spans_verbatim() {
        let mut event = sample_event();
        let raw = RawXml::new(r#"<__custom  b='1'   a="2"><x/></__custom>"#);
        event.detail_mut().push_unknown(raw.clone());
        let xml = encode(&event).unwrap();
        assert!(xml.contains(raw.as_str()));
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut event = sample_event();
        event.point.hae = f64::NAN;
        assert_eq!(
            encode(&event).unwrap_err(),
            EncodeError::NonFinite {
                field: "point.hae".into()
            }
        );

        let mut event = sample_event();
        event.set_extension(Track {
            speed: f64::INFINITY,
            course: 0.0,
        });
        assert!(matches!(
            encode(&event),
            Err(EncodeError::NonFinite { .. })
        ));
    }

    #[test]
    fn test_invalid_extra_name_rejected() {
        let mut event = sample_event();
        event
            .extra_attributes
            .push(("bad name".into(), "x".into()));
        assert!(matches!(
            encode(&event),
            Err(EncodeError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_encode_into_writer() {
        let mut buf = Vec::new();
        encode_into(&sample_event(), &mut buf).unwrap();
        assert_eq!(buf, encode(&sample_event()).unwrap().into_bytes());
    }

    #[test]
    fn test_empty_detail() {
        let mut event = sample_event();
        event.detail = Some(Detail::default());
        let xml = encode(&event).unwrap();
        assert!(xml.contains("  <detail/>\n"));
    }
}
