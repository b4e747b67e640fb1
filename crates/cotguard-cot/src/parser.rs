//! Structural decoder for CoT XML
//!
//! Builds an [`Event`] from the security-limited token stream. The document
//! must have a single `<event>` root whose children are one `<point>`, any
//! number of `<link>` elements and at most one `<detail>`. Anything else is
//! malformed.
//!
//! Decoding does not validate; see [`crate::validate`].

use crate::detail::{self, Detail, SchemaValidator};
use crate::event::{Event, Link, Point, UNKNOWN_ERROR};
use crate::token::{prepare_input, Token, TokenKind, TokenStream};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cotguard_core::{DecodeError, LimitsSnapshot};
use cotguard_pool::Reset;

const EVENT: &str = "event";
const POINT: &str = "point";
const LINK: &str = "link";
const DETAIL: &str = "detail";

/// Decodes one event from raw bytes.
pub fn parse(
    input: &[u8],
    limits: LimitsSnapshot,
    schemas: &dyn SchemaValidator,
) -> Result<Event, DecodeError> {
    let mut event = Event::default();
    parse_into(input, limits, schemas, &mut event)?;
    Ok(event)
}

/// Decodes one event into `event`, reusing its allocations.
///
/// `event` is reset first. On error it may hold a partially decoded message.
pub fn parse_into(
    input: &[u8],
    limits: LimitsSnapshot,
    schemas: &dyn SchemaValidator,
    event: &mut Event,
) -> Result<(), DecodeError> {
    event.reset();
    let text = prepare_input(input, &limits)?;
    let mut decoder = Decoder {
        stream: TokenStream::new(&text, limits)?,
        text: &text,
        source: None,
        schemas,
    };
    decoder.document(event)
}

struct Decoder<'a> {
    stream: TokenStream<'a>,
    text: &'a str,
    /// Shared copy of the document, made on first use by a detail span
    source: Option<Bytes>,
    schemas: &'a dyn SchemaValidator,
}

impl<'a> Decoder<'a> {
    fn document(&mut self, event: &mut Event) -> Result<(), DecodeError> {
        let attributes = loop {
            match self.next()? {
                None => return Err(DecodeError::xml(0, "document has no root element")),
                Some(token) if token.is_whitespace() => continue,
                Some(Token {
                    kind: TokenKind::Start {
                        name, attributes, ..
                    },
                    ..
                }) => {
                    if name != EVENT {
                        return Err(DecodeError::unexpected(
                            name,
                            "root element must be <event>",
                        ));
                    }
                    break attributes;
                }
                Some(token) => {
                    return Err(DecodeError::xml(
                        token.span.start,
                        "content before the root element",
                    ))
                }
            }
        };

        event_attributes(event, attributes)?;
        self.event_children(event)?;

        // Only whitespace may follow the root.
        while let Some(token) = self.next()? {
            if !token.is_whitespace() {
                return Err(DecodeError::xml(
                    token.span.start,
                    "content after the root element",
                ));
            }
        }
        Ok(())
    }

    fn event_children(&mut self, event: &mut Event) -> Result<(), DecodeError> {
        let mut point = None;
        loop {
            let token = self
                .next()?
                .ok_or_else(|| DecodeError::xml(self.text.len(), "unterminated <event>"))?;
            match token.kind {
                TokenKind::End { .. } => break,
                TokenKind::Text(text) => {
                    if !text.trim().is_empty() {
                        return Err(DecodeError::unexpected(
                            EVENT,
                            "character data is not allowed inside <event>",
                        ));
                    }
                }
                TokenKind::Start {
                    name, attributes, ..
                } => match name.as_str() {
                    POINT => {
                        if point.is_some() {
                            return Err(DecodeError::unexpected(POINT, "duplicate <point>"));
                        }
                        point = Some(parse_point(attributes)?);
                        self.leaf(POINT)?;
                    }
                    LINK => {
                        event.links.push(parse_link(attributes));
                        self.leaf(LINK)?;
                    }
                    DETAIL => {
                        if event.detail.is_some() {
                            return Err(DecodeError::unexpected(DETAIL, "duplicate <detail>"));
                        }
                        event.detail = Some(self.detail(attributes)?);
                    }
                    _ => {
                        return Err(DecodeError::unexpected(
                            name,
                            "not allowed inside <event>",
                        ))
                    }
                },
            }
        }

        event.point = point.ok_or_else(|| DecodeError::unexpected(EVENT, "missing <point>"))?;
        Ok(())
    }

    /// Consumes an element that may not have element children.
    fn leaf(&mut self, name: &str) -> Result<(), DecodeError> {
        loop {
            let token = self
                .next()?
                .ok_or_else(|| DecodeError::xml(self.text.len(), format!("unterminated <{name}>")))?;
            match token.kind {
                TokenKind::End { .. } => return Ok(()),
                TokenKind::Text(_) => continue,
                TokenKind::Start { name: child, .. } => {
                    return Err(DecodeError::unexpected(
                        child,
                        format!("<{name}> does not take child elements"),
                    ))
                }
            }
        }
    }

    fn detail(&mut self, attributes: Vec<(String, String)>) -> Result<Detail, DecodeError> {
        let mut detail = Detail {
            elements: Vec::new(),
            attributes,
        };
        let text = self.text;
        let source = self
            .source
            .get_or_insert_with(|| Bytes::copy_from_slice(text.as_bytes()))
            .clone();

        loop {
            let token = self
                .next()?
                .ok_or_else(|| DecodeError::xml(text.len(), "unterminated <detail>"))?;
            match token.kind {
                TokenKind::End { .. } => return Ok(detail),
                // Character data between extensions carries no meaning.
                TokenKind::Text(_) => continue,
                TokenKind::Start {
                    name, attributes, ..
                } => {
                    let element = detail::decode_element(
                        &mut self.stream,
                        &source,
                        name,
                        attributes,
                        token.span.start,
                        self.schemas,
                    )?;
                    detail.elements.push(element);
                }
            }
        }
    }

    fn next(&mut self) -> Result<Option<Token>, DecodeError> {
        self.stream.next_token()
    }
}

fn take(attributes: &mut Vec<(String, String)>, name: &str) -> Option<String> {
    let at = attributes.iter().position(|(k, _)| k == name)?;
    Some(attributes.remove(at).1)
}

fn require(
    attributes: &mut Vec<(String, String)>,
    element: &str,
    name: &str,
) -> Result<String, DecodeError> {
    take(attributes, name).ok_or_else(|| DecodeError::missing(element, name))
}

fn parse_datetime(element: &str, name: &str, s: &str) -> Result<DateTime<Utc>, DecodeError> {
    s.trim()
        .parse::<DateTime<Utc>>()
        .map_err(|e| DecodeError::invalid(element, name, format!("'{s}': {e}")))
}

fn parse_f64(element: &str, name: &str, s: &str) -> Result<f64, DecodeError> {
    s.trim()
        .parse::<f64>()
        .map_err(|e| DecodeError::invalid(element, name, format!("'{s}': {e}")))
}

fn event_attributes(
    event: &mut Event,
    mut attributes: Vec<(String, String)>,
) -> Result<(), DecodeError> {
    event.version = require(&mut attributes, EVENT, "version")?;
    event.uid = require(&mut attributes, EVENT, "uid")?;
    event.event_type = require(&mut attributes, EVENT, "type")?;
    event.time = parse_datetime(EVENT, "time", &require(&mut attributes, EVENT, "time")?)?;
    event.start = parse_datetime(EVENT, "start", &require(&mut attributes, EVENT, "start")?)?;
    event.stale = parse_datetime(EVENT, "stale", &require(&mut attributes, EVENT, "stale")?)?;
    event.how = take(&mut attributes, "how").unwrap_or_default();
    event.access = take(&mut attributes, "access");
    event.extra_attributes = attributes;
    Ok(())
}

fn parse_point(mut attributes: Vec<(String, String)>) -> Result<Point, DecodeError> {
    let mut number = |name: &str, default: Option<f64>| match take(&mut attributes, name) {
        Some(value) => parse_f64(POINT, name, &value),
        None => default.ok_or_else(|| DecodeError::missing(POINT, name)),
    };
    Ok(Point {
        lat: number("lat", None)?,
        lon: number("lon", None)?,
        hae: number("hae", Some(0.0))?,
        ce: number("ce", Some(UNKNOWN_ERROR))?,
        le: number("le", Some(UNKNOWN_ERROR))?,
    })
}

fn parse_link(mut attributes: Vec<(String, String)>) -> Link {
    Link {
        uid: take(&mut attributes, "uid").unwrap_or_default(),
        link_type: take(&mut attributes, "type").unwrap_or_default(),
        relation: take(&mut attributes, "relation").unwrap_or_default(),
        extra_attributes: attributes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detail::{BuiltinSchemas, DetailElement, Extension, ExtensionKind};
    use chrono::TimeZone;
    use cotguard_core::{ExtensionError, LimitKind};

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<event version="2.0" uid="ANDROID-12345678" type="a-f-G-U-C" time="2024-01-15T10:30:00Z" start="2024-01-15T10:30:00Z" stale="2024-01-15T10:35:00Z" how="m-g" qos="1-r-c">
  <point lat="37.7749" lon="-122.4194" hae="100.0" ce="10.0" le="5.0"/>
  <detail>
    <contact callsign="Bravo-2" endpoint="192.168.1.100:4242:tcp"/>
    <__group name="Cyan" role="Team Member"/>
    <track speed="5.5" course="270.0"/>
    <status battery="85"/>
  </detail>
</event>"#;

    fn decode(xml: &str) -> Result<Event, DecodeError> {
        parse(xml.as_bytes(), LimitsSnapshot::default(), &BuiltinSchemas)
    }

    #[test]
    fn test_parse_cot() {
        let event = decode(SAMPLE).unwrap();
        assert_eq!(event.version, "2.0");
        assert_eq!(event.uid, "ANDROID-12345678");
        assert_eq!(event.event_type, "a-f-G-U-C");
        assert_eq!(event.time, Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap());
        assert_eq!(event.how, "m-g");
        assert_eq!(event.point.lat, 37.7749);
        assert_eq!(event.point.le, 5.0);
        assert_eq!(event.attribute("qos"), Some("1-r-c"));
        assert_eq!(event.callsign(), Some("Bravo-2"));

        let detail = event.detail.as_ref().unwrap();
        assert_eq!(detail.len(), 4);
        assert_eq!(detail.track().map(|t| t.speed), Some(5.5));
        assert_eq!(detail.status().and_then(|s| s.battery), Some(85));
    }

    #[test]
    fn test_parse_minimal_cot() {
        let xml = r#"<event version="2.0" uid="test-1" type="a-f-G" time="2024-01-15T10:30:00Z" start="2024-01-15T10:30:00Z" stale="2024-01-15T10:35:00Z"><point lat="0" lon="0"/></event>"#;
        let event = decode(xml).unwrap();
        assert_eq!(event.how, "");
        assert_eq!(event.point.hae, 0.0);
        assert_eq!(event.point.ce, UNKNOWN_ERROR);
        assert!(event.detail.is_none());
    }

    #[test]
    fn test_parse_malformed_cot() {
        assert!(decode("<event>").unwrap_err().is_malformed());
        assert!(decode("not xml").is_err());
        assert!(decode("").is_err());
    }

    #[test]
    fn test_missing_attributes() {
        let xml = r#"<event version="2.0" type="a-f-G" time="2024-01-15T10:30:00Z" start="2024-01-15T10:30:00Z" stale="2024-01-15T10:35:00Z"><point lat="0" lon="0"/></event>"#;
        assert_eq!(decode(xml).unwrap_err(), DecodeError::missing("event", "uid"));

        let xml = r#"<event version="2.0" uid="u" type="a-f-G" time="2024-01-15T10:30:00Z" start="2024-01-15T10:30:00Z" stale="2024-01-15T10:35:00Z"><point lon="0"/></event>"#;
        assert_eq!(decode(xml).unwrap_err(), DecodeError::missing("point", "lat"));
    }

    #[test]
    fn test_invalid_values() {
        let xml = r#"<event version="2.0" uid="u" type="a-f-G" time="yesterday" start="2024-01-15T10:30:00Z" stale="2024-01-15T10:35:00Z"><point lat="0" lon="0"/></event>"#;
        assert!(matches!(
            decode(xml).unwrap_err(),
            DecodeError::InvalidAttribute { ref attribute, .. } if attribute == "time"
        ));

        let xml = r#"<event version="2.0" uid="u" type="a-f-G" time="2024-01-15T10:30:00Z" start="2024-01-15T10:30:00Z" stale="2024-01-15T10:35:00Z"><point lat="north" lon="0"/></event>"#;
        assert!(matches!(
            decode(xml).unwrap_err(),
            DecodeError::InvalidAttribute { ref attribute, .. } if attribute == "lat"
        ));
    }

    #[test]
    fn test_structure_rules() {
        let head = r#"<event version="2.0" uid="u" type="a-f-G" time="2024-01-15T10:30:00Z" start="2024-01-15T10:30:00Z" stale="2024-01-15T10:35:00Z">"#;
        let point = r#"<point lat="0" lon="0"/>"#;

        let missing_point = format!("{head}<detail/></event>");
        assert_eq!(
            decode(&missing_point).unwrap_err(),
            DecodeError::unexpected("event", "missing <point>")
        );

        let dup_point = format!("{head}{point}{point}</event>");
        assert!(matches!(
            decode(&dup_point).unwrap_err(),
            DecodeError::UnexpectedElement { ref name, .. } if name == "point"
        ));

        let dup_detail = format!("{head}{point}<detail/><detail/></event>");
        assert!(matches!(
            decode(&dup_detail).unwrap_err(),
            DecodeError::UnexpectedElement { ref name, .. } if name == "detail"
        ));

        let stray = format!("{head}{point}<remarks/></event>");
        assert!(matches!(
            decode(&stray).unwrap_err(),
            DecodeError::UnexpectedElement { ref name, .. } if name == "remarks"
        ));

        let text = format!("{head}{point}hello</event>");
        assert!(decode(&text).unwrap_err().is_malformed());

        let wrong_root = r#"<message uid="x"/>"#;
        assert!(matches!(
            decode(wrong_root).unwrap_err(),
            DecodeError::UnexpectedElement { ref name, .. } if name == "message"
        ));

        let two_roots = format!("{head}{point}</event><event/>");
        assert!(decode(&two_roots).unwrap_err().is_malformed());
    }

    #[test]
    fn test_links_preserved() {
        let xml = r#"<event version="2.0" uid="u" type="a-f-G" time="2024-01-15T10:30:00Z" start="2024-01-15T10:30:00Z" stale="2024-01-15T10:35:00Z"><point lat="0" lon="0"/><link uid="SERVER-1" type="a-f-G" relation="p-p" production_time="2024-01-15T10:29:00Z"/><link uid="ROUTE-1" type="b-m-r" relation="c"/></event>"#;
        let event = decode(xml).unwrap();
        assert_eq!(event.links.len(), 2);
        assert_eq!(event.links[0].relation, "p-p");
        assert_eq!(
            event.links[0].attribute("production_time"),
            Some("2024-01-15T10:29:00Z")
        );
        assert_eq!(event.links[1].uid, "ROUTE-1");
    }

    #[test]
    fn test_unknown_detail_kept_in_position() {
        let xml = r#"<event version="2.0" uid="u" type="a-f-G" time="2024-01-15T10:30:00Z" start="2024-01-15T10:30:00Z" stale="2024-01-15T10:35:00Z"><point lat="0" lon="0"/><detail><__custom x="1"><nested/></__custom><contact callsign="A"/><link uid="x" relation="p-p"/></detail></event>"#;
        let event = decode(xml).unwrap();
        let detail = event.detail.unwrap();
        assert_eq!(detail.len(), 3);
        match &detail.elements[0] {
            DetailElement::Unknown(raw) => {
                assert_eq!(raw.as_str(), r#"<__custom x="1"><nested/></__custom>"#)
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            &detail.elements[1],
            DetailElement::Known(Extension::Contact(_))
        ));
        assert!(matches!(&detail.elements[2], DetailElement::Unknown(_)));
        assert!(event.links.is_empty());
    }

    #[test]
    fn test_chat_schema_at_decode() {
        let head = r#"<event version="2.0" uid="GeoChat.A.All.1" type="b-t-f" time="2024-01-15T10:30:00Z" start="2024-01-15T10:30:00Z" stale="2024-01-15T10:35:00Z"><point lat="0" lon="0"/>"#;
        let ok = format!(r#"{head}<detail><__chat sender="A" message="hi"/></detail></event>"#);
        let event = decode(&ok).unwrap();
        assert!(event
            .detail
            .as_ref()
            .is_some_and(|d| d.contains(ExtensionKind::Chat)));

        let bad = format!(r#"{head}<detail><__chat unknown="x"/></detail></event>"#);
        assert!(matches!(
            decode(&bad).unwrap_err(),
            DecodeError::Extension(ExtensionError::SchemaRejected { .. })
        ));
    }

    #[test]
    fn test_limits_apply() {
        let limits = LimitsSnapshot {
            max_depth: 4,
            ..LimitsSnapshot::default()
        };
        let xml = r#"<event version="2.0" uid="u" type="a-f-G" time="2024-01-15T10:30:00Z" start="2024-01-15T10:30:00Z" stale="2024-01-15T10:35:00Z"><point lat="0" lon="0"/><detail><a><b><c/></b></a></detail></event>"#;
        let err = parse(xml.as_bytes(), limits, &BuiltinSchemas).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::LimitExceeded {
                limit: LimitKind::Depth,
                ..
            }
        ));
    }
}
