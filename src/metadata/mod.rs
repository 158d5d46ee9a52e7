//! # Instrument metadata documents
//!
//! Typed, hierarchical representation of instrument header text, and the parsers that build it.
//!
//! ## Overview
//! -----------------
//! A [`MetadataDocument`] maps a **section name** to a [`Section`], which maps a **key** to a
//! typed [`MetaValue`]. Three header dialects are supported:
//!
//! * [`header_parser`] – line-oriented state machine for CASCADE binary headers (`###section`)
//!   and NICOS ASCII scan headers (`# ##section`), sharing one value classifier,
//! * [`ill_parser`] – dispatch-table parser for ILL fixed-format files (5-character line
//!   prefixes, `DATA_` marker, whitespace-delimited numeric table),
//! * [`classifier`] – the regular-expression based type inference used by both line parsers.
//!
//! Documents are built once per file read and are not mutated afterwards; selection and
//! renaming ([`MetadataDocument::apply_selection`]) produce a new document.
//!
//! ## Lookups
//! -----------------
//! * [`MetadataDocument::get_section`] – borrow one section,
//! * [`MetadataDocument::get`] – section + key,
//! * [`MetadataDocument::find`] – section name, else the first key match in file order,
//! * [`MetadataDocument::find_float`] – numeric view of [`MetadataDocument::find`].
//!
//! ## See also
//! ------------
//! * [`MetadataSelection`](crate::instrument::MetadataSelection) – filter/alias specification.
//! * [`FileLoader`](crate::file_loader::FileLoader) – loaders producing documents from files.
pub mod classifier;
pub mod header_parser;
pub mod ill_parser;

use std::collections::BTreeMap;
use std::fmt;

use log::warn;

use crate::constants::{MetaKey, SectionName};
use crate::instrument::MetadataSelection;

/// Typed value of a single metadata entry.
///
/// Variants
/// -----------------
/// * `Int` – a lone integer literal (`"161027"`).
/// * `Float` – a lone non-integer literal (`"5.00"`).
/// * `Str` – free text, or any value without a numeric literal.
/// * `Quantity` – one number with a trailing unit (`"5.7 s"`).
/// * `QuantityTuple` – several numbers sharing a trailing unit (`"1 2 3 mm"`).
/// * `FloatTuple` – several numbers without unit.
/// * `StrTuple` – several strings (colon-separated values, unconvertible number tuples).
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Int(i64),
    Float(f64),
    Str(String),
    Quantity(f64, String),
    QuantityTuple(Vec<f64>, String),
    FloatTuple(Vec<f64>),
    StrTuple(Vec<String>),
}

impl MetaValue {
    /// Return the value as `f64` when it is a scalar number.
    ///
    /// `Int`, `Float` and the magnitude of a `Quantity` are numeric; every other variant
    /// yields `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Int(i) => Some(*i as f64),
            MetaValue::Float(f) => Some(*f),
            MetaValue::Quantity(f, _) => Some(*f),
            _ => None,
        }
    }

    /// Return the value only when it is a bare `Float`.
    ///
    /// Integers and quantities yield `None`; see [`MetaValue::as_f64`] for the lenient view.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            MetaValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Return the value as a string slice when it is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Return the unit of a `Quantity` / `QuantityTuple`.
    pub fn unit(&self) -> Option<&str> {
        match self {
            MetaValue::Quantity(_, u) | MetaValue::QuantityTuple(_, u) => Some(u.as_str()),
            _ => None,
        }
    }

    /// Return the list of strings held by a `StrTuple`.
    pub fn as_str_tuple(&self) -> Option<&[String]> {
        match self {
            MetaValue::StrTuple(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Int(i) => write!(f, "{i}"),
            MetaValue::Float(v) => write!(f, "{v}"),
            MetaValue::Str(s) => write!(f, "{s}"),
            MetaValue::Quantity(v, u) => write!(f, "{v} {u}"),
            MetaValue::QuantityTuple(vs, u) => {
                write!(f, "(")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ") {u}")
            }
            MetaValue::FloatTuple(vs) => {
                let joined: Vec<String> = vs.iter().map(|v| v.to_string()).collect();
                write!(f, "({})", joined.join(", "))
            }
            MetaValue::StrTuple(vs) => write!(f, "({})", vs.join(", ")),
        }
    }
}

/// Key → value mapping of one header section.
pub type Section = BTreeMap<MetaKey, MetaValue>;

/// Result of [`MetadataDocument::find`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    /// The key named a whole section.
    Section(&'a Section),
    /// The key was found inside `section`.
    Entry {
        section: &'a str,
        value: &'a MetaValue,
    },
}

impl<'a> Lookup<'a> {
    /// The entry value, `None` for a whole section.
    pub fn value(&self) -> Option<&'a MetaValue> {
        match *self {
            Lookup::Section(_) => None,
            Lookup::Entry { value, .. } => Some(value),
        }
    }
}

/// Section name → [`Section`] mapping built from one file header.
///
/// Sections keep the order in which the file opened them. Section names are unique: a
/// repeated section header empties the earlier section in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetadataDocument {
    sections: Vec<(SectionName, Section)>,
}

impl MetadataDocument {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.sections.iter().position(|(n, _)| n == name)
    }

    /// Section `name`, appended at the end when the document does not hold it yet.
    fn entry(&mut self, name: &str) -> &mut Section {
        let idx = match self.position(name) {
            Some(idx) => idx,
            None => {
                self.sections.push((name.to_string(), Section::new()));
                self.sections.len() - 1
            }
        };
        &mut self.sections[idx].1
    }

    /// Open an empty section (clearing any section of the same name).
    pub(crate) fn open_section(&mut self, name: &str) {
        self.entry(name).clear();
    }

    /// Insert a value, creating the section on demand.
    pub(crate) fn insert(&mut self, section: &str, key: &str, value: MetaValue) {
        self.entry(section).insert(key.to_string(), value);
    }

    pub(crate) fn remove_section(&mut self, name: &str) -> Option<Section> {
        self.position(name).map(|idx| self.sections.remove(idx).1)
    }

    pub(crate) fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.sections
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, section)| section)
    }

    pub fn get_section(&self, name: &str) -> Option<&Section> {
        self.sections().find(|(n, _)| *n == name).map(|(_, s)| s)
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&MetaValue> {
        self.get_section(section).and_then(|s| s.get(key))
    }

    /// Section names in file order.
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|(k, _)| k.as_str())
    }

    /// `(name, section)` pairs in file order.
    pub fn sections(&self) -> impl Iterator<Item = (&str, &Section)> {
        self.sections.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Look `key` up as a section name, then as a key of every section.
    ///
    /// Sections are searched in file order and the first one holding `key` wins.
    ///
    /// Arguments
    /// -----------------
    /// * `key` – section name or metadata key.
    ///
    /// Return
    /// ----------
    /// * `Some(Lookup::Section)` when a section is named `key`, else
    ///   `Some(Lookup::Entry)` for the first section holding it, `None` otherwise.
    pub fn find(&self, key: &str) -> Option<Lookup<'_>> {
        if let Some(section) = self.get_section(key) {
            return Some(Lookup::Section(section));
        }
        self.sections().find_map(|(name, section)| {
            section
                .get(key)
                .map(|value| Lookup::Entry { section: name, value })
        })
    }

    /// Numeric view of [`MetadataDocument::find`] (see [`MetaValue::as_f64`]).
    pub fn find_float(&self, key: &str) -> Option<f64> {
        self.find(key)
            .and_then(|found| found.value())
            .and_then(MetaValue::as_f64)
    }

    /// Restrict (and optionally rename) the document according to a [`MetadataSelection`].
    ///
    /// Arguments
    /// -----------------
    /// * `selection` – `All` keeps a copy of the document, `Nothing` returns an empty one,
    ///   `Filter` keeps only the listed `(key, alias)` pairs of each listed section, renaming
    ///   the key to `alias` when one is given.
    ///
    /// Return
    /// ----------
    /// * A new [`MetadataDocument`]. Listed keys absent from the source are skipped with a
    ///   warning.
    pub fn apply_selection(&self, selection: &MetadataSelection) -> MetadataDocument {
        match selection {
            MetadataSelection::All => self.clone(),
            MetadataSelection::Nothing => MetadataDocument::new(),
            MetadataSelection::Filter(filter) => {
                let mut out = MetadataDocument::new();
                for (section, entries) in filter {
                    out.open_section(section);
                    for entry in entries {
                        match self.get(section, &entry.key) {
                            Some(value) => {
                                let name = entry.alias.as_deref().unwrap_or(&entry.key);
                                out.insert(section, name, value.clone());
                            }
                            None => warn!(
                                "metadata filter: key '{}' not found in section '{}'",
                                entry.key, section
                            ),
                        }
                    }
                }
                out
            }
        }
    }
}
