//! Security-limited XML token stream
//!
//! Wraps `quick_xml::Reader` and checks every token against the decoder
//! [`Limits`](cotguard_core::Limits) as it is produced, before the structural
//! decoder sees it. A limit violation is final: the stream does not recover.
//!
//! The token length limit bounds the raw markup of each tag: its names,
//! quotes and whitespace, with attribute values left to the value limit.
//! Together with the per-element attribute cap this keeps the work spent on
//! one tag proportional to its size.
//!
//! Before the first token the whole document is checked against the size
//! ceiling and scanned for DTD declarations. `<!DOCTYPE` and `<!ENTITY` are
//! rejected in any case and with whitespace between the delimiters, so no
//! entity is ever declared, let alone expanded.
//!
//! Attribute values and character data are unescaped and then sanitized:
//! control characters other than tab, LF and CR are stripped, and markup
//! delimiter sequences smuggled inside content are removed.

use cotguard_core::{DecodeError, LimitKind, LimitsSnapshot};
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader;
use std::borrow::Cow;
use std::ops::Range;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Delimiters removed from content. Matched case-sensitively except the
/// DOCTYPE marker, which is stored lowercase and matched ignoring case.
const DELIMITERS: [&str; 6] = ["<!--", "-->", "<![CDATA[", "]]>", "<?", "?>"];
const DOCTYPE_MARKER: &str = "<!doctype";

/// What a token is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// An opening tag. Self-closing elements produce a `Start` followed by an
    /// `End` covering no further bytes.
    Start {
        name: String,
        /// Unescaped and sanitized, in document order
        attributes: Vec<(String, String)>,
        /// 1 for the root element
        depth: usize,
    },
    End {
        name: String,
    },
    /// Character data or a CDATA section, unescaped and sanitized
    Text(String),
}

/// A token and the byte range of the input it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

impl Token {
    /// Element name for `Start` and `End` tokens.
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Start { name, .. } | TokenKind::End { name } => Some(name),
            TokenKind::Text(_) => None,
        }
    }

    /// True for character data made only of whitespace.
    pub fn is_whitespace(&self) -> bool {
        matches!(&self.kind, TokenKind::Text(text) if text.trim().is_empty())
    }
}

/// Pull-based token stream over a prepared UTF-8 document.
pub struct TokenStream<'a> {
    input: &'a [u8],
    reader: Reader<&'a [u8]>,
    limits: LimitsSnapshot,
    depth: usize,
    elements: usize,
    finished: bool,
}

impl<'a> TokenStream<'a> {
    /// Creates a stream over `input`.
    ///
    /// Fails if the document is larger than the size ceiling or declares a
    /// DTD or entity.
    pub fn new(input: &'a str, limits: LimitsSnapshot) -> Result<Self, DecodeError> {
        if input.len() > limits.max_document_size {
            return Err(DecodeError::limit(
                LimitKind::DocumentSize,
                limits.max_document_size,
                input.len(),
            ));
        }
        if contains_doctype(input.as_bytes()) {
            return Err(DecodeError::DoctypeRejected);
        }

        let mut reader = Reader::from_str(input);
        let config = reader.config_mut();
        config.trim_text(false);
        config.expand_empty_elements = true;
        config.check_end_names = true;

        Ok(Self {
            input: input.as_bytes(),
            reader,
            limits,
            depth: 0,
            elements: 0,
            finished: false,
        })
    }

    pub fn limits(&self) -> &LimitsSnapshot {
        &self.limits
    }

    /// Current element nesting depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Elements opened so far.
    pub fn element_count(&self) -> usize {
        self.elements
    }

    /// Reads the next token. Returns `Ok(None)` once the document ends.
    pub fn next_token(&mut self) -> Result<Option<Token>, DecodeError> {
        if self.finished {
            return Ok(None);
        }

        loop {
            let before = self.reader.buffer_position() as usize;
            let event = self.reader.read_event().map_err(|e| {
                DecodeError::xml(self.reader.error_position() as usize, e.to_string())
            })?;
            let after = self.reader.buffer_position() as usize;
            let (start, end) = self.markup_span(&event, before, after);

            let kind = match event {
                XmlEvent::Start(e) => self.open(&e, start, end)?,
                XmlEvent::End(e) => {
                    self.check_token_len(end - start)?;
                    self.depth = self.depth.saturating_sub(1);
                    TokenKind::End {
                        name: utf8_name(e.name().as_ref(), start)?,
                    }
                }
                XmlEvent::Text(e) => {
                    self.check_value_len(e.len())?;
                    let text = e
                        .unescape()
                        .map_err(|err| DecodeError::xml(start, err.to_string()))?;
                    TokenKind::Text(sanitize(&text).into_owned())
                }
                XmlEvent::CData(e) => {
                    self.check_value_len(e.len())?;
                    let text = std::str::from_utf8(&e)
                        .map_err(|err| DecodeError::xml(start, err.to_string()))?;
                    TokenKind::Text(sanitize(text).into_owned())
                }
                XmlEvent::Empty(_) => {
                    // expand_empty_elements turns these into Start + End.
                    return Err(DecodeError::xml(start, "unexpanded empty element"));
                }
                XmlEvent::DocType(_) => return Err(DecodeError::DoctypeRejected),
                XmlEvent::Decl(_) | XmlEvent::Comment(_) | XmlEvent::PI(_) => continue,
                XmlEvent::Eof => {
                    self.finished = true;
                    if self.depth != 0 {
                        return Err(DecodeError::xml(
                            start,
                            format!("document ended with {} unclosed element(s)", self.depth),
                        ));
                    }
                    return Ok(None);
                }
            };

            return Ok(Some(Token {
                kind,
                span: start..end,
            }));
        }
    }

    /// Aligns a span on markup boundaries: tags start at their `<` and
    /// character data ends before the next one, however the reader accounts
    /// for the `<` it had to look at to end the text.
    fn markup_span(&self, event: &XmlEvent<'_>, start: usize, end: usize) -> (usize, usize) {
        let mut start = start;
        let mut end = end;
        match event {
            XmlEvent::Start(_) | XmlEvent::End(_) | XmlEvent::CData(_) => {
                if self.input.get(start) != Some(&b'<')
                    && start > 0
                    && self.input.get(start - 1) == Some(&b'<')
                {
                    start -= 1;
                }
            }
            XmlEvent::Text(_) => {
                if end > start && self.input.get(end - 1) == Some(&b'<') {
                    end -= 1;
                }
            }
            _ => {}
        }
        (start, end)
    }

    fn open(
        &mut self,
        element: &BytesStart<'_>,
        position: usize,
        end: usize,
    ) -> Result<TokenKind, DecodeError> {
        self.depth += 1;
        if self.depth > self.limits.max_depth {
            return Err(DecodeError::limit(
                LimitKind::Depth,
                self.limits.max_depth,
                self.depth,
            ));
        }

        self.elements += 1;
        if self.elements > self.limits.max_element_count {
            return Err(DecodeError::limit(
                LimitKind::ElementCount,
                self.limits.max_element_count,
                self.elements,
            ));
        }

        let raw_name = element.name();
        self.check_token_len(raw_name.as_ref().len())?;
        let name = utf8_name(raw_name.as_ref(), position)?;

        // The reader checks each key against every earlier one, so the count
        // is capped before the next attribute is pulled.
        let mut attributes = Vec::new();
        let mut value_bytes = 0;
        for attr in element.attributes() {
            if attributes.len() == self.limits.max_attributes {
                return Err(DecodeError::limit(
                    LimitKind::AttributeCount,
                    self.limits.max_attributes,
                    attributes.len() + 1,
                ));
            }
            let attr = attr.map_err(|e| DecodeError::xml(position, e.to_string()))?;
            self.check_token_len(attr.key.as_ref().len())?;
            self.check_value_len(attr.value.len())?;
            value_bytes += attr.value.len();

            let key = utf8_name(attr.key.as_ref(), position)?;
            let value = attr
                .unescape_value()
                .map_err(|e| DecodeError::xml(position, e.to_string()))?;
            attributes.push((key, sanitize(&value).into_owned()));
        }

        // Raw markup of the tag: names, quotes and whitespace. Values are
        // bounded separately.
        self.check_token_len((end - position).saturating_sub(value_bytes))?;

        Ok(TokenKind::Start {
            name,
            attributes,
            depth: self.depth,
        })
    }

    fn check_token_len(&self, len: usize) -> Result<(), DecodeError> {
        if len > self.limits.max_token_len {
            return Err(DecodeError::limit(
                LimitKind::TokenLength,
                self.limits.max_token_len,
                len,
            ));
        }
        Ok(())
    }

    fn check_value_len(&self, len: usize) -> Result<(), DecodeError> {
        if len > self.limits.max_value_len {
            return Err(DecodeError::limit(
                LimitKind::ValueLength,
                self.limits.max_value_len,
                len,
            ));
        }
        Ok(())
    }
}

fn utf8_name(raw: &[u8], position: usize) -> Result<String, DecodeError> {
    std::str::from_utf8(raw)
        .map(str::to_owned)
        .map_err(|e| DecodeError::xml(position, e.to_string()))
}

/// Turns raw input bytes into a UTF-8 document ready for [`TokenStream`].
///
/// Checks the size ceiling, strips a UTF-8 byte order mark and honours the
/// XML declaration's `encoding`: UTF-8 and US-ASCII are validated in place,
/// ISO-8859-1 is transcoded. Any other declared encoding is refused.
pub fn prepare_input<'b>(
    bytes: &'b [u8],
    limits: &LimitsSnapshot,
) -> Result<Cow<'b, str>, DecodeError> {
    if bytes.len() > limits.max_document_size {
        return Err(DecodeError::limit(
            LimitKind::DocumentSize,
            limits.max_document_size,
            bytes.len(),
        ));
    }

    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let encoding = declared_encoding(bytes).map(|e| e.to_ascii_lowercase());

    match encoding.as_deref() {
        None | Some("utf-8") | Some("utf8") | Some("us-ascii") | Some("ascii") => {
            std::str::from_utf8(bytes)
                .map(Cow::Borrowed)
                .map_err(|e| DecodeError::xml(e.valid_up_to(), "invalid UTF-8"))
        }
        Some("iso-8859-1") | Some("iso8859-1") | Some("latin1") | Some("latin-1") => {
            Ok(Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()))
        }
        Some(_) => Err(DecodeError::UnsupportedEncoding {
            encoding: encoding.unwrap_or_default(),
        }),
    }
}

/// The `encoding` pseudo-attribute of a leading XML declaration.
fn declared_encoding(bytes: &[u8]) -> Option<String> {
    let rest = bytes.strip_prefix(b"<?xml")?;
    let end = rest.windows(2).position(|w| w == b"?>")?;
    let decl = &rest[..end];

    let at = decl.windows(8).position(|w| w == b"encoding")?;
    let mut i = skip_whitespace(decl, at + 8);
    if decl.get(i) != Some(&b'=') {
        return None;
    }
    i = skip_whitespace(decl, i + 1);
    let quote = *decl.get(i)?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let value = &decl[i + 1..];
    let close = value.iter().position(|&b| b == quote)?;
    Some(String::from_utf8_lossy(&value[..close]).into_owned())
}

/// True if the document contains a DOCTYPE or ENTITY declaration, matched
/// ignoring case and whitespace around the `!`.
pub fn contains_doctype(input: &[u8]) -> bool {
    let mut from = 0;
    while let Some(offset) = input[from..].iter().position(|&b| b == b'<') {
        let open = from + offset;
        let bang = skip_whitespace(input, open + 1);
        if input.get(bang) == Some(&b'!') {
            let keyword = &input[skip_whitespace(input, bang + 1)..];
            if starts_with_ignore_case(keyword, b"doctype")
                || starts_with_ignore_case(keyword, b"entity")
            {
                return true;
            }
        }
        from = open + 1;
    }
    false
}

fn skip_whitespace(input: &[u8], mut i: usize) -> usize {
    while input.get(i).is_some_and(|b| b.is_ascii_whitespace()) {
        i += 1;
    }
    i
}

fn starts_with_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && haystack[..needle.len()].eq_ignore_ascii_case(needle)
}

fn is_stripped_control(c: char) -> bool {
    c.is_control() && !matches!(c, '\t' | '\n' | '\r')
}

/// Strips control characters and removes markup delimiters from content.
///
/// One pass over the input. After each character the end of the output is
/// checked for a delimiter and cut if one has formed, so a delimiter cannot
/// be rebuilt from the pieces around one that was removed.
pub fn sanitize(value: &str) -> Cow<'_, str> {
    let suspicious = value
        .chars()
        .any(|c| is_stripped_control(c) || c == '<' || c == '>');
    if !suspicious {
        return Cow::Borrowed(value);
    }

    let mut out = String::with_capacity(value.len());
    for c in value.chars().filter(|&c| !is_stripped_control(c)) {
        out.push(c);
        if c.is_ascii() {
            strip_delimiter_suffix(&mut out);
        }
    }

    if out == value {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(out)
    }
}

/// Removes a delimiter ending at the last byte of `out`, if any.
fn strip_delimiter_suffix(out: &mut String) {
    let bytes = out.as_bytes();
    let cut = DELIMITERS
        .iter()
        .map(|d| d.as_bytes())
        .find(|d| bytes.ends_with(d))
        .or_else(|| {
            let marker = DOCTYPE_MARKER.as_bytes();
            (bytes.len() >= marker.len()
                && bytes[bytes.len() - marker.len()..].eq_ignore_ascii_case(marker))
            .then_some(marker)
        })
        .map(<[u8]>::len);

    // Delimiters are ASCII, so the cut lands on a char boundary.
    if let Some(len) = cut {
        out.truncate(out.len() - len);
    }
}
