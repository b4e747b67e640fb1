//! Type catalog: the registry of known type codes and the how/relation
//! vocabularies.
//!
//! The catalog is read-mostly. It is filled once at startup from the bundled
//! datasets (and any configured extras) and afterwards only sees occasional
//! registrations, so every table sits behind a `parking_lot::RwLock` and
//! lookups take shared read guards.

use crate::pattern::TypePattern;
use cotguard_core::{ConfigError, Result, TypeError};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, trace};

/// MITRE CoT type definitions.
pub const MITRE_DATASET: &str = include_str!("../data/mitre-types.xml");
/// TAK client type definitions and vocabularies. Loaded after MITRE.
pub const TAK_DATASET: &str = include_str!("../data/tak-types.xml");

static GLOBAL_CATALOG: Lazy<Arc<Catalog>> = Lazy::new(|| match Catalog::bundled() {
    Ok(catalog) => Arc::new(catalog),
    Err(e) => {
        error!(error = %e, "bundled type datasets failed to load");
        Arc::new(Catalog::new())
    }
});

/// One taxonomy entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Type {
    /// Canonical code, e.g. `a-f-G-E-X-N`
    pub name: String,
    /// Hierarchical display path, e.g. `Gnd/Equip/Sensor/NBC`
    pub full_name: String,
    /// Human readable description
    pub description: String,
}

impl Type {
    pub fn new(
        name: impl Into<String>,
        full_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            description: description.into(),
        }
    }
}

/// A how or relation code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabEntry {
    pub code: String,
    pub description: String,
    /// Dataset the entry was loaded from
    pub source: String,
}

/// Counts of entries a dataset contributed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub types: usize,
    pub hows: usize,
    pub relations: usize,
}

/// Concurrent registry of type codes and vocabularies.
#[derive(Debug, Default)]
pub struct Catalog {
    types: RwLock<BTreeMap<String, Type>>,
    hows: RwLock<HashMap<String, VocabEntry>>,
    relations: RwLock<HashMap<String, VocabEntry>>,
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog from the bundled MITRE and TAK datasets.
    pub fn bundled() -> Result<Self> {
        let catalog = Self::new();
        catalog.load_xml("mitre", MITRE_DATASET)?;
        catalog.load_xml("tak", TAK_DATASET)?;
        Ok(catalog)
    }

    /// The process-wide catalog built from the bundled datasets.
    pub fn global() -> &'static Catalog {
        &GLOBAL_CATALOG
    }

    /// A handle to the process-wide catalog.
    pub fn shared() -> Arc<Catalog> {
        Arc::clone(&*GLOBAL_CATALOG)
    }

    /// Number of concrete type entries.
    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }

    /// True if `name` is a registered concrete code.
    pub fn contains(&self, name: &str) -> bool {
        self.types.read().contains_key(name)
    }

    /// Looks up a type by exact code.
    pub fn get(&self, name: &str) -> std::result::Result<Type, TypeError> {
        self.types
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TypeError::NotFound(name.to_string()))
    }

    /// Case-insensitive substring search over descriptions. An empty needle
    /// returns every entry.
    pub fn find_by_description(&self, needle: &str) -> Vec<Type> {
        self.find_by(needle, |t| &t.description)
    }

    /// Case-insensitive substring search over full names. An empty needle
    /// returns every entry.
    pub fn find_by_full_name(&self, needle: &str) -> Vec<Type> {
        self.find_by(needle, |t| &t.full_name)
    }

    fn find_by<F>(&self, needle: &str, field: F) -> Vec<Type>
    where
        F: Fn(&Type) -> &String,
    {
        let needle = needle.to_lowercase();
        self.types
            .read()
            .values()
            .filter(|t| needle.is_empty() || field(t).to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    /// Returns every entry matched by a code or wildcard pattern, sorted by
    /// code.
    pub fn find(&self, pattern: &str) -> std::result::Result<Vec<Type>, TypeError> {
        let pattern = TypePattern::parse(pattern)?;
        if !pattern.is_wildcard() {
            return Ok(self.get(pattern.as_str()).into_iter().collect());
        }

        let prefix = pattern.literal_prefix();
        let types = self.types.read();
        Ok(types
            .range(prefix.clone()..)
            .take_while(|(name, _)| name.starts_with(&prefix))
            .filter(|(name, _)| pattern.matches(name))
            .map(|(_, t)| t.clone())
            .collect())
    }

    /// Inserts or replaces an entry. Idempotent; the last write wins.
    pub fn upsert(&self, name: impl Into<String>, mut entry: Type) {
        let name = name.into();
        entry.name.clone_from(&name);
        trace!(type_code = %name, "catalog upsert");
        self.types.write().insert(name, entry);
    }

    /// Registers an organization-specific type code.
    ///
    /// The code must satisfy the type grammar and must not be a wildcard.
    pub fn register_custom(
        &self,
        name: &str,
        full_name: &str,
        description: &str,
    ) -> std::result::Result<(), TypeError> {
        let pattern = TypePattern::parse(name)?;
        if pattern.is_wildcard() {
            return Err(TypeError::wildcard(name, "custom types must be concrete"));
        }
        self.upsert(name, Type::new(name, full_name, description));
        Ok(())
    }

    /// Looks up a how code. Exact, case-sensitive.
    pub fn how(&self, code: &str) -> Option<VocabEntry> {
        self.hows.read().get(code).cloned()
    }

    /// Looks up a relation code. Exact, case-sensitive.
    pub fn relation(&self, code: &str) -> Option<VocabEntry> {
        self.relations.read().get(code).cloned()
    }

    /// Registers a how code; replaces any earlier definition.
    pub fn upsert_how(&self, code: &str, description: &str, source: &str) {
        trace!(how = code, source, "how upsert");
        self.hows.write().insert(code.to_string(), vocab(code, description, source));
    }

    /// Registers a relation code; replaces any earlier definition.
    pub fn upsert_relation(&self, code: &str, description: &str, source: &str) {
        trace!(relation = code, source, "relation upsert");
        self.relations
            .write()
            .insert(code.to_string(), vocab(code, description, source));
    }

    /// Loads a dataset file from disk.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<LoadSummary> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.load_xml(&path.display().to_string(), &xml)
    }

    /// Loads a dataset document.
    ///
    /// Recognized elements: `<cot cot=".." full=".." desc=".."/>`,
    /// `<how value=".." desc=".."/>` and `<relation value=".." desc=".."/>`.
    /// Type entries with an affiliation wildcard are expanded into one entry
    /// per affiliation. Entries from later loads replace earlier ones.
    ///
    /// The document is parsed completely before anything is inserted, so a
    /// broken dataset leaves the catalog unchanged.
    pub fn load_xml(&self, source: &str, xml: &str) -> Result<LoadSummary> {
        let parsed = parse_dataset(source, xml)?;

        let mut summary = LoadSummary::default();
        {
            let mut types = self.types.write();
            for entry in parsed.types {
                for name in expand(&entry.name) {
                    trace!(type_code = %name, source, "catalog upsert");
                    types.insert(
                        name.clone(),
                        Type::new(name, entry.full_name.clone(), entry.description.clone()),
                    );
                    summary.types += 1;
                }
            }
        }
        {
            let mut hows = self.hows.write();
            for (code, desc) in parsed.hows {
                hows.insert(code.clone(), vocab(&code, &desc, source));
                summary.hows += 1;
            }
        }
        {
            let mut relations = self.relations.write();
            for (code, desc) in parsed.relations {
                relations.insert(code.clone(), vocab(&code, &desc, source));
                summary.relations += 1;
            }
        }

        info!(
            source,
            types = summary.types,
            hows = summary.hows,
            relations = summary.relations,
            "type dataset loaded"
        );
        Ok(summary)
    }
}

fn vocab(code: &str, description: &str, source: &str) -> VocabEntry {
    VocabEntry {
        code: code.to_string(),
        description: description.to_string(),
        source: source.to_string(),
    }
}

fn expand(name: &str) -> Vec<String> {
    match TypePattern::parse(name) {
        Ok(pattern) if pattern.has_affiliation_wildcard() && !pattern.is_trailing() => {
            trace!(type_code = name, "expanding affiliation wildcard");
            pattern.expand_affiliations()
        }
        _ => vec![name.to_string()],
    }
}

#[derive(Default)]
struct Dataset {
    types: Vec<Type>,
    hows: Vec<(String, String)>,
    relations: Vec<(String, String)>,
}

fn parse_dataset(source: &str, xml: &str) -> Result<Dataset> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut dataset = Dataset::default();
    loop {
        match reader.read_event() {
            Ok(XmlEvent::Start(e)) | Ok(XmlEvent::Empty(e)) => match e.name().as_ref() {
                b"cot" => {
                    let name = required_attr(source, &e, "cot")?;
                    TypePattern::parse(&name).map_err(|err| dataset_error(source, err.to_string()))?;
                    dataset.types.push(Type::new(
                        name,
                        optional_attr(source, &e, "full")?,
                        optional_attr(source, &e, "desc")?,
                    ));
                }
                b"how" => {
                    dataset.hows.push((
                        required_attr(source, &e, "value")?,
                        optional_attr(source, &e, "desc")?,
                    ));
                }
                b"relation" => {
                    dataset.relations.push((
                        required_attr(source, &e, "value")?,
                        optional_attr(source, &e, "desc")?,
                    ));
                }
                _ => {}
            },
            Ok(XmlEvent::DocType(_)) => {
                return Err(dataset_error(source, "DOCTYPE not allowed in datasets"));
            }
            Ok(XmlEvent::Eof) => break,
            Err(e) => return Err(dataset_error(source, e.to_string())),
            _ => {}
        }
    }
    Ok(dataset)
}

fn optional_attr(source: &str, element: &BytesStart, key: &str) -> Result<String> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| dataset_error(source, e.to_string()))?;
        if attr.key.as_ref() == key.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|e| dataset_error(source, e.to_string()))?;
            return Ok(value.into_owned());
        }
    }
    Ok(String::new())
}

fn required_attr(source: &str, element: &BytesStart, key: &str) -> Result<String> {
    let value = optional_attr(source, element, key)?;
    if value.is_empty() {
        return Err(dataset_error(
            source,
            format!(
                "<{}> is missing '{}'",
                String::from_utf8_lossy(element.name().as_ref()),
                key
            ),
        ));
    }
    Ok(value)
}

fn dataset_error(source: &str, reason: impl Into<String>) -> cotguard_core::CotError {
    ConfigError::LoadFailed {
        path: source.to_string(),
        reason: reason.into(),
    }
    .into()
}
