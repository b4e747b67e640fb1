//! MIL-STD-2525 CoT type code parser
//!
//! Splits type codes like "a-f-G-E-V-C-U-I" into structured components
//! without allocating.
//!
//! CoT Type Format: [category]-[affiliation]-[dimension]-[function]-[...]
//! Example: a-f-G-E-V-C-U-I
//!   category: 'a' (atom)
//!   affiliation: 'f' (friendly)
//!   dimension: 'G' (ground)
//!   function: 'E-V-C-U-I'

use serde::{Deserialize, Serialize};
use std::fmt;

/// Affiliations a catalog wildcard (`a-.-X`) expands into.
pub const EXPANDED_AFFILIATIONS: [Affiliation; 4] = [
    Affiliation::Friend,
    Affiliation::Hostile,
    Affiliation::Neutral,
    Affiliation::Unknown,
];

/// Leading segment of a type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Atom (a) - a physical thing with an affiliation
    Atom,
    /// Bits (b) - data such as imagery, chat, or map points
    Bits,
    /// Capability (c)
    Capability,
    /// Tasking (t)
    Tasking,
    /// Reply (r)
    Reply,
    /// User drawn graphics (u), used by TAK clients for shapes and routes
    UserDrawn,
}

impl Category {
    /// Parse the category from the first segment of a type code
    #[inline]
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "a" => Some(Category::Atom),
            "b" => Some(Category::Bits),
            "c" => Some(Category::Capability),
            "t" => Some(Category::Tasking),
            "r" => Some(Category::Reply),
            "u" => Some(Category::UserDrawn),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Atom => write!(f, "Atom"),
            Category::Bits => write!(f, "Bits"),
            Category::Capability => write!(f, "Capability"),
            Category::Tasking => write!(f, "Tasking"),
            Category::Reply => write!(f, "Reply"),
            Category::UserDrawn => write!(f, "User Drawn"),
        }
    }
}

/// Affiliation codes from MIL-STD-2525
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Affiliation {
    /// Pending (p) - Not yet categorized
    Pending,
    /// Unknown (u) - Identity unknown
    Unknown,
    /// Assumed Friend (a) - Assumed to be friendly
    AssumedFriend,
    /// Friend (f) - Confirmed friendly
    Friend,
    /// Neutral (n) - Non-combatant
    Neutral,
    /// Suspect (s) - Possibly hostile
    Suspect,
    /// Hostile (h) - Confirmed hostile
    Hostile,
    /// Joker (j) - Friendly for exercise purposes
    Joker,
    /// Faker (k) - Hostile for exercise purposes
    Faker,
    /// None specified (o)
    None,
}

impl Affiliation {
    /// Parse affiliation from a single character. Type codes are
    /// case-sensitive, so only the lowercase letters are accepted.
    #[inline]
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            'p' => Some(Affiliation::Pending),
            'u' => Some(Affiliation::Unknown),
            'a' => Some(Affiliation::AssumedFriend),
            'f' => Some(Affiliation::Friend),
            'n' => Some(Affiliation::Neutral),
            's' => Some(Affiliation::Suspect),
            'h' => Some(Affiliation::Hostile),
            'j' => Some(Affiliation::Joker),
            'k' => Some(Affiliation::Faker),
            'o' => Some(Affiliation::None),
            _ => None,
        }
    }

    /// Parse affiliation from a whole type code segment
    #[inline]
    pub fn from_segment(segment: &str) -> Option<Self> {
        let mut chars = segment.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_char(c),
            _ => None,
        }
    }

    /// The letter used in type codes
    #[inline]
    pub const fn code(&self) -> char {
        match self {
            Affiliation::Pending => 'p',
            Affiliation::Unknown => 'u',
            Affiliation::AssumedFriend => 'a',
            Affiliation::Friend => 'f',
            Affiliation::Neutral => 'n',
            Affiliation::Suspect => 's',
            Affiliation::Hostile => 'h',
            Affiliation::Joker => 'j',
            Affiliation::Faker => 'k',
            Affiliation::None => 'o',
        }
    }

    /// Check if this affiliation is considered friendly
    #[inline]
    pub const fn is_friendly(&self) -> bool {
        matches!(
            self,
            Affiliation::Friend | Affiliation::AssumedFriend | Affiliation::Joker
        )
    }

    /// Check if this affiliation is considered hostile
    #[inline]
    pub const fn is_hostile(&self) -> bool {
        matches!(
            self,
            Affiliation::Hostile | Affiliation::Suspect | Affiliation::Faker
        )
    }

    /// Check if this affiliation is neutral
    #[inline]
    pub const fn is_neutral(&self) -> bool {
        matches!(self, Affiliation::Neutral)
    }
}

impl fmt::Display for Affiliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Affiliation::Pending => write!(f, "Pending"),
            Affiliation::Unknown => write!(f, "Unknown"),
            Affiliation::AssumedFriend => write!(f, "Assumed Friend"),
            Affiliation::Friend => write!(f, "Friend"),
            Affiliation::Neutral => write!(f, "Neutral"),
            Affiliation::Suspect => write!(f, "Suspect"),
            Affiliation::Hostile => write!(f, "Hostile"),
            Affiliation::Joker => write!(f, "Joker"),
            Affiliation::Faker => write!(f, "Faker"),
            Affiliation::None => write!(f, "None"),
        }
    }
}

/// Dimension codes from MIL-STD-2525
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Space,
    Air,
    Ground,
    SeaSurface,
    SeaSubsurface,
    SOF,
    Other,
}

impl Dimension {
    /// Parse dimension from a single character
    #[inline]
    pub const fn from_char(c: char) -> Self {
        match c {
            'P' => Dimension::Space,
            'A' => Dimension::Air,
            'G' => Dimension::Ground,
            'S' => Dimension::SeaSurface,
            'U' => Dimension::SeaSubsurface,
            'F' => Dimension::SOF,
            _ => Dimension::Other,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Space => write!(f, "Space"),
            Dimension::Air => write!(f, "Air"),
            Dimension::Ground => write!(f, "Ground"),
            Dimension::SeaSurface => write!(f, "Sea Surface"),
            Dimension::SeaSubsurface => write!(f, "Sea Subsurface"),
            Dimension::SOF => write!(f, "SOF"),
            Dimension::Other => write!(f, "Other"),
        }
    }
}

/// Parsed CoT type information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CotType<'a> {
    /// Raw CoT type string (zero-copy reference)
    pub raw: &'a str,
    /// Leading category segment
    pub category: Option<Category>,
    /// Affiliation, only present for atoms
    pub affiliation: Option<Affiliation>,
    /// Dimension (ground, air, sea, etc.), only present for atoms
    pub dimension: Option<Dimension>,
    /// Function code (equipment, vehicle, etc.)
    pub function: Option<&'a str>,
}

impl<'a> CotType<'a> {
    /// Parse a CoT type string with zero allocations
    ///
    /// This is a lenient structural split; use
    /// [`validate_type`](crate::validate_type) to check a code.
    ///
    /// # Examples
    /// ```
    /// use cotguard_types::affiliation::CotType;
    ///
    /// let cot = CotType::parse("a-f-G-E-V-C-U-I");
    /// assert!(cot.affiliation.unwrap().is_friendly());
    /// ```
    #[inline]
    pub fn parse(type_str: &'a str) -> Self {
        let mut parts = type_str.split('-');

        let category = parts.next().and_then(Category::from_segment);
        let is_atom = category == Some(Category::Atom);

        let affiliation = parts
            .next()
            .filter(|_| is_atom)
            .and_then(Affiliation::from_segment);
        let dimension = parts
            .next()
            .filter(|_| is_atom)
            .and_then(|s| s.chars().next())
            .map(Dimension::from_char);

        // Remaining parts form the function code
        let function = type_str
            .char_indices()
            .filter(|(_, c)| *c == '-')
            .nth(2)
            .map(|(idx, _)| &type_str[idx + 1..]);

        CotType {
            raw: type_str,
            category,
            affiliation,
            dimension,
            function,
        }
    }

    /// Fast check if this CoT type is friendly
    #[inline]
    pub fn is_friendly(&self) -> bool {
        self.affiliation.is_some_and(|a| a.is_friendly())
    }

    /// Fast check if this CoT type is hostile
    #[inline]
    pub fn is_hostile(&self) -> bool {
        self.affiliation.is_some_and(|a| a.is_hostile())
    }

    /// Fast check if this CoT type is neutral
    #[inline]
    pub fn is_neutral(&self) -> bool {
        self.affiliation.is_some_and(|a| a.is_neutral())
    }

    /// Fast check if this CoT type is an atom
    #[inline]
    pub fn is_atom(&self) -> bool {
        self.category == Some(Category::Atom)
    }

    /// Fast check if this CoT type matches a dimension
    #[inline]
    pub fn matches_dimension(&self, target: Dimension) -> bool {
        self.dimension == Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_friendly_ground() {
        let cot = CotType::parse("a-f-G-E-V-C-U-I");
        assert_eq!(cot.category, Some(Category::Atom));
        assert_eq!(cot.affiliation, Some(Affiliation::Friend));
        assert_eq!(cot.dimension, Some(Dimension::Ground));
        assert_eq!(cot.function, Some("E-V-C-U-I"));
        assert!(cot.is_friendly());
        assert!(!cot.is_hostile());
    }

    #[test]
    fn test_parse_hostile_air() {
        let cot = CotType::parse("a-h-A-M-F");
        assert_eq!(cot.affiliation, Some(Affiliation::Hostile));
        assert!(cot.matches_dimension(Dimension::Air));
        assert!(cot.is_hostile());
    }

    #[test]
    fn test_non_atom_has_no_affiliation() {
        let cot = CotType::parse("b-m-p-s-p-loc");
        assert_eq!(cot.category, Some(Category::Bits));
        assert_eq!(cot.affiliation, None);
        assert_eq!(cot.dimension, None);
        assert!(!cot.is_atom());
    }

    #[test]
    fn test_zero_allocation() {
        let type_str = "a-f-G-E-V-C-U-I";
        let cot = CotType::parse(type_str);
        assert_eq!(cot.raw.as_ptr(), type_str.as_ptr());
    }

    #[test]
    fn test_affiliation_is_case_sensitive() {
        assert_eq!(Affiliation::from_char('f'), Some(Affiliation::Friend));
        assert_eq!(Affiliation::from_char('F'), None);
        assert_eq!(Affiliation::from_segment("fh"), None);
        assert_eq!(Affiliation::from_segment("o"), Some(Affiliation::None));
    }

    #[test]
    fn test_affiliation_code_roundtrip() {
        for aff in EXPANDED_AFFILIATIONS {
            assert_eq!(Affiliation::from_char(aff.code()), Some(aff));
        }
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!(Category::from_segment("t"), Some(Category::Tasking));
        assert_eq!(Category::from_segment("u"), Some(Category::UserDrawn));
        assert_eq!(Category::from_segment("x"), None);
        assert_eq!(Category::from_segment("ab"), None);
    }
}
