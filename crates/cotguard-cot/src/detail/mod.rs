//! The `<detail>` element.
//!
//! A [`Detail`] is an ordered list of sub-elements. Each one is either a
//! recognized [`Extension`] or an unknown element kept as a verbatim
//! [`RawXml`] span, so nothing the sender put in `<detail>` is dropped and
//! the original order survives a round trip.

pub mod extensions;
pub mod schema;

pub use extensions::{
    Attributes, Color, Contact, DecodeStrategy, Emergency, Extension, ExtensionKind, Group,
    Height, PrecisionLocation, Remarks, Status, Takv, Track, TypedExtension, UidAlias, UserIcon,
};
pub use schema::{BuiltinSchemas, SchemaError, SchemaValidator};

use crate::token::{TokenKind, TokenStream};
use bytes::Bytes;
use cotguard_core::{DecodeError, ExtensionError, LimitKind};
use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, Range};

/// A verbatim XML fragment. Always valid UTF-8.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RawXml(Bytes);

/// Name and attributes of a fragment's first element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
}

impl RawXml {
    pub fn new(xml: &str) -> Self {
        Self(Bytes::copy_from_slice(xml.as_bytes()))
    }

    /// Shares a slice of a decoded document without copying it.
    ///
    /// `source` must be UTF-8 and `span` must fall on character boundaries,
    /// which token spans always do.
    pub(crate) fn from_span(source: &Bytes, span: Range<usize>) -> Self {
        Self(source.slice(span))
    }

    pub fn from_utf8(bytes: &[u8]) -> Option<Self> {
        std::str::from_utf8(bytes).ok().map(Self::new)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses the fragment's first element tag.
    pub fn root(&self) -> Option<RootElement> {
        let mut reader = Reader::from_str(self.as_str());
        loop {
            match reader.read_event().ok()? {
                XmlEvent::Start(e) | XmlEvent::Empty(e) => {
                    let name = std::str::from_utf8(e.name().as_ref()).ok()?.to_string();
                    let mut attributes = Vec::new();
                    for attr in e.attributes() {
                        let attr = attr.ok()?;
                        let key = std::str::from_utf8(attr.key.as_ref()).ok()?.to_string();
                        let value = attr.unescape_value().ok()?.into_owned();
                        attributes.push((key, value));
                    }
                    return Some(RootElement { name, attributes });
                }
                XmlEvent::Eof => return None,
                _ => continue,
            }
        }
    }

    /// The fragment's element name.
    pub fn name(&self) -> Option<String> {
        self.root().map(|root| root.name)
    }

    /// Looks up an attribute of the fragment's element.
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.root()?
            .attributes
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }
}

impl fmt::Debug for RawXml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RawXml").field(&self.as_str()).finish()
    }
}

impl fmt::Display for RawXml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<[u8]> for RawXml {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// A typed extension value together with what the decoder saw.
///
/// Attributes the typed decoder did not consume are kept and written back
/// after the canonical ones, and child elements are kept verbatim and written
/// after the text. While the value is unmodified the original span is kept
/// too and re-emitted as is; [`Typed::get_mut`] drops it.
///
/// Equality compares the value, extra attributes and children, not the span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Typed<T> {
    value: T,
    extra: Vec<(String, String)>,
    #[serde(default)]
    children: Vec<RawXml>,
    #[serde(skip)]
    raw: Option<RawXml>,
}

impl<T> Typed<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            extra: Vec::new(),
            children: Vec::new(),
            raw: None,
        }
    }

    pub(crate) fn decoded(
        value: T,
        extra: Vec<(String, String)>,
        children: Vec<RawXml>,
        raw: RawXml,
    ) -> Self {
        Self {
            value,
            extra,
            children,
            raw: Some(raw),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Mutable access. Detaches the retained span so the next encode writes
    /// the value canonically.
    pub fn get_mut(&mut self) -> &mut T {
        self.raw = None;
        &mut self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    /// The span this value will be written as, while it is still attached.
    pub fn raw(&self) -> Option<&RawXml> {
        self.raw.as_ref()
    }

    pub fn extra_attributes(&self) -> &[(String, String)] {
        &self.extra
    }

    /// Child elements of the decoded element, in document order.
    pub fn children(&self) -> &[RawXml] {
        &self.children
    }

    pub fn set_extra_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.raw = None;
        match self.extra.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value.into(),
            None => self.extra.push((name, value.into())),
        }
    }
}

impl<T> Deref for Typed<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: PartialEq> PartialEq for Typed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.extra == other.extra && self.children == other.children
    }
}

impl<T> From<T> for Typed<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

/// One `<detail>` sub-element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DetailElement {
    Known(Extension),
    /// An element with no entry in the extension table
    Unknown(RawXml),
}

/// Detail section with extensions
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Detail {
    /// Sub-elements in document order
    pub elements: Vec<DetailElement>,
    /// Attributes on `<detail>` itself
    pub attributes: Vec<(String, String)>,
}

impl Detail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DetailElement> {
        self.elements.iter()
    }

    /// Recognized extensions in document order.
    pub fn extensions(&self) -> impl Iterator<Item = &Extension> {
        self.elements.iter().filter_map(|element| match element {
            DetailElement::Known(ext) => Some(ext),
            DetailElement::Unknown(_) => None,
        })
    }

    /// Unknown elements in document order.
    pub fn unknown(&self) -> impl Iterator<Item = &RawXml> {
        self.elements.iter().filter_map(|element| match element {
            DetailElement::Unknown(raw) => Some(raw),
            DetailElement::Known(_) => None,
        })
    }

    /// First extension of `kind`.
    pub fn extension(&self, kind: ExtensionKind) -> Option<&Extension> {
        self.extensions().find(|ext| ext.kind() == kind)
    }

    pub fn contains(&self, kind: ExtensionKind) -> bool {
        self.extension(kind).is_some()
    }

    /// First typed extension of type `T`, with its retained span.
    pub fn typed<T: TypedExtension>(&self) -> Option<&Typed<T>> {
        self.extensions().find_map(T::unwrap_ref)
    }

    /// First value of type `T`.
    pub fn get<T: TypedExtension>(&self) -> Option<&T> {
        self.typed::<T>().map(Typed::get)
    }

    /// Mutable access to the first value of type `T`. Detaches its span.
    pub fn get_mut<T: TypedExtension>(&mut self) -> Option<&mut T> {
        self.elements
            .iter_mut()
            .find_map(|element| match element {
                DetailElement::Known(ext) => T::unwrap_mut(ext),
                DetailElement::Unknown(_) => None,
            })
            .map(Typed::get_mut)
    }

    /// Replaces the first value of type `T` in place, or appends one.
    pub fn set<T: TypedExtension>(&mut self, value: T) {
        self.set_extension(T::wrap(Typed::new(value)));
    }

    /// Replaces the first extension of the same kind in place, or appends.
    pub fn set_extension(&mut self, extension: Extension) {
        let kind = extension.kind();
        let slot = self.elements.iter_mut().find(
            |element| matches!(element, DetailElement::Known(ext) if ext.kind() == kind),
        );
        match slot {
            Some(slot) => *slot = DetailElement::Known(extension),
            None => self.elements.push(DetailElement::Known(extension)),
        }
    }

    pub fn push(&mut self, extension: Extension) {
        self.elements.push(DetailElement::Known(extension));
    }

    pub fn push_unknown(&mut self, raw: RawXml) {
        self.elements.push(DetailElement::Unknown(raw));
    }

    /// Removes every extension of `kind`, returning how many were removed.
    pub fn remove(&mut self, kind: ExtensionKind) -> usize {
        let before = self.elements.len();
        self.elements
            .retain(|element| !matches!(element, DetailElement::Known(ext) if ext.kind() == kind));
        before - self.elements.len()
    }

    pub fn clear(&mut self) {
        self.elements.clear();
        self.attributes.clear();
    }

    pub fn contact(&self) -> Option<&Contact> {
        self.get()
    }

    pub fn group(&self) -> Option<&Group> {
        self.get()
    }

    pub fn track(&self) -> Option<&Track> {
        self.get()
    }

    pub fn status(&self) -> Option<&Status> {
        self.get()
    }

    pub fn takv(&self) -> Option<&Takv> {
        self.get()
    }

    pub fn precision_location(&self) -> Option<&PrecisionLocation> {
        self.get()
    }

    pub fn remarks(&self) -> Option<&Remarks> {
        self.get()
    }

    /// Checks every typed extension's invariants.
    pub fn check(&self) -> Result<(), ExtensionError> {
        self.extensions().try_for_each(Extension::check)
    }
}

/// Text, children and bytes of one captured element.
struct Captured {
    raw: RawXml,
    text: String,
    children: Vec<RawXml>,
}

/// Progress of decoding one `<detail>` sub-element.
enum DecodeState {
    Start {
        name: String,
        attributes: Vec<(String, String)>,
    },
    CaptureRaw {
        kind: Option<ExtensionKind>,
        attributes: Vec<(String, String)>,
    },
    Typed {
        kind: ExtensionKind,
        attributes: Vec<(String, String)>,
        captured: Captured,
    },
    SchemaChecked {
        kind: ExtensionKind,
        schema: &'static str,
        captured: Captured,
    },
    Unknown(Captured),
    Done(DetailElement),
    Failed(DecodeError),
}

/// Decodes one `<detail>` child whose start tag was just read.
///
/// Consumes tokens up to and including the matching end tag. A typed
/// attribute that does not parse or a schema rejection fails the decode.
pub(crate) fn decode_element(
    stream: &mut TokenStream<'_>,
    source: &Bytes,
    name: String,
    attributes: Vec<(String, String)>,
    start: usize,
    schemas: &dyn SchemaValidator,
) -> Result<DetailElement, DecodeError> {
    let mut state = DecodeState::Start { name, attributes };
    loop {
        state = match state {
            DecodeState::Start { name, attributes } => DecodeState::CaptureRaw {
                kind: ExtensionKind::from_name(&name),
                attributes,
            },
            DecodeState::CaptureRaw { kind, attributes } => {
                match capture(stream, source, start) {
                    Err(err) => DecodeState::Failed(err),
                    Ok(captured) => match kind {
                        None => DecodeState::Unknown(captured),
                        Some(kind) => match kind.strategy() {
                            DecodeStrategy::Typed => DecodeState::Typed {
                                kind,
                                attributes,
                                captured,
                            },
                            DecodeStrategy::SchemaChecked(schema) => DecodeState::SchemaChecked {
                                kind,
                                schema,
                                captured,
                            },
                            DecodeStrategy::Raw => DecodeState::Done(DetailElement::Known(
                                Extension::Raw(kind, captured.raw),
                            )),
                        },
                    },
                }
            }
            DecodeState::Typed {
                kind,
                attributes,
                captured,
            } => match Extension::decode_typed(
                kind,
                attributes,
                &captured.text,
                captured.children,
                captured.raw,
            ) {
                Ok(ext) => DecodeState::Done(DetailElement::Known(ext)),
                Err(err) => DecodeState::Failed(err.into()),
            },
            DecodeState::SchemaChecked {
                kind,
                schema,
                captured,
            } => match schemas.validate(schema, captured.raw.as_bytes()) {
                Ok(()) => DecodeState::Done(DetailElement::Known(Extension::Raw(
                    kind,
                    captured.raw,
                ))),
                Err(err) => DecodeState::Failed(
                    ExtensionError::schema(kind.element_name(), schema, err.reason).into(),
                ),
            },
            DecodeState::Unknown(captured) => {
                DecodeState::Done(DetailElement::Unknown(captured.raw))
            }
            DecodeState::Done(element) => return Ok(element),
            DecodeState::Failed(err) => return Err(err),
        };
    }
}

/// Reads to the end tag matching an already opened element.
///
/// Text directly inside the element may arrive in several chunks split by
/// comments or CDATA; their total is held to the value limit.
fn capture(stream: &mut TokenStream<'_>, source: &Bytes, start: usize) -> Result<Captured, DecodeError> {
    let max_text = stream.limits().max_value_len;
    let mut open = 1usize;
    let mut text = String::new();
    let mut children = Vec::new();
    let mut child_start = start;
    while let Some(token) = stream.next_token()? {
        match token.kind {
            TokenKind::Start { .. } => {
                if open == 1 {
                    child_start = token.span.start;
                }
                open += 1;
            }
            TokenKind::End { .. } => {
                open -= 1;
                match open {
                    0 => {
                        return Ok(Captured {
                            raw: RawXml::from_span(source, start..token.span.end),
                            text,
                            children,
                        })
                    }
                    1 => children.push(RawXml::from_span(source, child_start..token.span.end)),
                    _ => {}
                }
            }
            TokenKind::Text(chunk) if open == 1 => {
                let total = text.len() + chunk.len();
                if total > max_text {
                    return Err(DecodeError::limit(LimitKind::ValueLength, max_text, total));
                }
                text.push_str(&chunk);
            }
            TokenKind::Text(_) => {}
        }
    }
    Err(DecodeError::xml(source.len(), "document ended inside <detail>"))
}
