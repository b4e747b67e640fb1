//! Type code grammar and wildcard patterns.
//!
//! A type code is a hyphen-delimited list of segments. Two wildcard forms
//! exist, both only meaningful in queries:
//!
//! - an affiliation wildcard `.` in the second segment of an atom (`a-.-G`),
//!   standing for every affiliation;
//! - a trailing `*` as the final segment (`a-f-G-*`), matching one or more
//!   further segments. `*` anywhere else is rejected.

use crate::affiliation::{Affiliation, Category, EXPANDED_AFFILIATIONS};
use cotguard_core::TypeError;

/// Longest type code accepted.
pub const MAX_TYPE_LEN: usize = 128;

const AFFILIATION_WILDCARD: &str = ".";
const TRAILING_WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    AnyAffiliation,
}

/// A syntactically valid type code, possibly containing wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypePattern<'a> {
    raw: &'a str,
    segments: Vec<Segment<'a>>,
    trailing: bool,
}

impl<'a> TypePattern<'a> {
    /// Checks `code` against the type code grammar.
    pub fn parse(code: &'a str) -> Result<Self, TypeError> {
        if code.is_empty() {
            return Err(TypeError::Empty);
        }
        if code.len() > MAX_TYPE_LEN {
            return Err(TypeError::TooLong { max: MAX_TYPE_LEN });
        }

        let parts: Vec<&str> = code.split('-').collect();

        let stars = parts.iter().filter(|p| p.contains('*')).count();
        if stars > 1 || code.matches('*').count() > 1 {
            return Err(TypeError::wildcard(code, "more than one '*'"));
        }
        for (idx, part) in parts.iter().enumerate() {
            if part.contains('*') {
                if *part != TRAILING_WILDCARD {
                    return Err(TypeError::wildcard(code, "'*' must be a whole segment"));
                }
                if idx + 1 != parts.len() {
                    return Err(TypeError::wildcard(
                        code,
                        "'*' is only allowed as the final segment",
                    ));
                }
            }
        }

        let trailing = parts.last() == Some(&TRAILING_WILDCARD);
        let literal_parts = if trailing {
            &parts[..parts.len() - 1]
        } else {
            &parts[..]
        };

        // A bare "*" matches every code.
        if literal_parts.is_empty() {
            return Ok(Self {
                raw: code,
                segments: Vec::new(),
                trailing,
            });
        }

        let category = Category::from_segment(literal_parts[0]).ok_or_else(|| {
            TypeError::syntax(code, format!("unknown category '{}'", literal_parts[0]))
        })?;

        let mut segments = Vec::with_capacity(literal_parts.len());
        segments.push(Segment::Literal(literal_parts[0]));

        for (idx, part) in literal_parts.iter().enumerate().skip(1) {
            if part.is_empty() {
                return Err(TypeError::syntax(code, "empty segment"));
            }
            if idx == 1 && category == Category::Atom {
                if *part == AFFILIATION_WILDCARD {
                    segments.push(Segment::AnyAffiliation);
                    continue;
                }
                if Affiliation::from_segment(part).is_none() {
                    return Err(TypeError::syntax(
                        code,
                        format!("invalid affiliation '{}'", part),
                    ));
                }
            }
            if !part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(TypeError::syntax(
                    code,
                    format!("invalid characters in segment '{}'", part),
                ));
            }
            segments.push(Segment::Literal(part));
        }

        Ok(Self {
            raw: code,
            segments,
            trailing,
        })
    }

    /// The code this pattern was parsed from.
    pub fn as_str(&self) -> &'a str {
        self.raw
    }

    /// True if the pattern ends in `*`.
    pub fn is_trailing(&self) -> bool {
        self.trailing
    }

    /// True if the affiliation segment is `.`.
    pub fn has_affiliation_wildcard(&self) -> bool {
        self.segments.contains(&Segment::AnyAffiliation)
    }

    /// True if the pattern matches more than one literal code.
    pub fn is_wildcard(&self) -> bool {
        self.trailing || self.has_affiliation_wildcard()
    }

    /// Checks whether a concrete code is matched by this pattern.
    pub fn matches(&self, code: &str) -> bool {
        let mut parts = code.split('-');
        for segment in &self.segments {
            let Some(part) = parts.next() else {
                return false;
            };
            match segment {
                Segment::Literal(lit) => {
                    if *lit != part {
                        return false;
                    }
                }
                Segment::AnyAffiliation => {
                    if Affiliation::from_segment(part).is_none() {
                        return false;
                    }
                }
            }
        }
        let remaining = parts.count();
        if self.trailing {
            remaining >= 1
        } else {
            remaining == 0
        }
    }

    /// The literal text every match starts with, used to narrow catalog scans.
    pub fn literal_prefix(&self) -> String {
        let mut prefix = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => {
                    prefix.push_str(lit);
                    prefix.push('-');
                }
                Segment::AnyAffiliation => return prefix,
            }
        }
        if self.trailing {
            prefix
        } else {
            // Exact code: drop the separator we appended.
            prefix.pop();
            prefix
        }
    }

    /// Concrete codes produced by replacing `.` with each expanded
    /// affiliation. Returns the code unchanged when there is no `.`.
    pub fn expand_affiliations(&self) -> Vec<String> {
        if !self.has_affiliation_wildcard() {
            return vec![self.raw.to_string()];
        }
        EXPANDED_AFFILIATIONS
            .iter()
            .map(|aff| {
                let mut code = String::with_capacity(self.raw.len());
                for (idx, segment) in self.segments.iter().enumerate() {
                    if idx > 0 {
                        code.push('-');
                    }
                    match segment {
                        Segment::Literal(lit) => code.push_str(lit),
                        Segment::AnyAffiliation => code.push(aff.code()),
                    }
                }
                if self.trailing {
                    code.push_str("-*");
                }
                code
            })
            .collect()
    }
}

/// Checks whether `code` is matched by `pattern`. An invalid pattern matches
/// nothing.
pub fn type_matches(pattern: &str, code: &str) -> bool {
    TypePattern::parse(pattern).is_ok_and(|p| p.matches(code))
}
