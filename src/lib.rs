//! A library for creating, combining, completing and cleaning BibTeX bibliographies.
//!
//! `bibmerge` merges bibliographic records coming from heterogeneous sources
//! (existing `.bib` files, DOI/ISBN lookups, free-text catalog searches and
//! document scans) into a single de-duplicated collection, and gives every
//! surviving record a short, stable, collision-free AYC (author-year-character)
//! key such as `smith2010c`.
//!
//! # Key Features
//!
//! - **Identity resolution**: records are matched by DOI, then ISBN, then by the
//!   (first surname, year, title) triple. Different kinds never compare equal.
//! - **First-seen merging**: a duplicate only fills the gaps of the record it
//!   matches; populated fields are never overwritten.
//! - **Stable keys**: keys already present in a bibliography are kept, new
//!   records are keyed in arrival order.
//! - **BibTeX in and out**: the persisted bibliography is read and written as
//!   plain BibTeX.
//!
//! # Basic Usage
//!
//! ```rust
//! use bibmerge::{CollectionBuilder, Record};
//!
//! let mut builder = CollectionBuilder::default();
//! builder.add(
//!     Record::new()
//!         .with_field("author", "Smith, John")
//!         .with_field("year", "2010")
//!         .with_field("month", "mar")
//!         .with_field("title", "A Paper"),
//! );
//! let report = builder.finish();
//! assert_eq!(report.collection.records()[0].key.as_deref(), Some("smith2010c"));
//! ```
//!
//! # Merging Into An Existing Bibliography
//!
//! ```rust
//! use bibmerge::{bibtex, build, CollectionBuilder, Record};
//!
//! let existing = bibtex::parse("@article{smith2010c, author = {Smith, John}, year = 2010, doi = {10.1/x}}").unwrap();
//! let existing = CollectionBuilder::default().with_existing(existing).finish().collection;
//!
//! let incoming = Record::new()
//!     .with_field("doi", "10.1/X")
//!     .with_field("publisher", "ACME");
//! let report = build(existing, [incoming]);
//!
//! let merged = &report.collection.records()[0];
//! assert_eq!(merged.key.as_deref(), Some("smith2010c"));
//! assert_eq!(merged.get("publisher"), Some("ACME"));
//! ```
//!
//! # Error Handling
//!
//! Fallible I/O and parsing return the crate [`Result`] wrapping [`BibError`].
//! Conditions that only affect a single record (an exhausted key space, an
//! ambiguous merge target) never abort a build; they are reported as
//! [`BuildWarning`]s next to the resulting collection.

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod bibtex;
pub mod collection;
pub mod config;
pub mod keys;
pub mod merge;
pub mod normalize;
mod regex;
pub mod signature;
pub mod sources;

// Reexports
pub use collection::{BuildReport, BuildWarning, Collection, CollectionBuilder, Resolution, build};
pub use config::{BuilderConfig, Config, HarvestConfig};
pub use keys::{KeyError, KeyIndex, assign_keys};
pub use merge::merge;
pub use signature::{Signature, SignatureKind, is_duplicate, signature};

/// A specialized Result type for bibliography operations.
pub type Result<T> = std::result::Result<T, BibError>;

/// Represents errors that can occur while reading, writing or configuring.
#[derive(Error, Debug)]
pub enum BibError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    InvalidFormat(String),

    #[error("Malformed input: {message} at line {line}")]
    MalformedInput { message: String, line: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for BibError {
    fn from(err: toml::de::Error) -> Self {
        BibError::Config(err.to_string())
    }
}

/// A single bibliographic record: an open, ordered mapping of field names to values.
///
/// Field names are stored lower-cased. A field whose value is empty or only
/// whitespace is treated as absent by every accessor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Entry type tag (`article`, `book`, ...) as supplied by the source.
    pub entry_type: Option<CompactString>,
    /// Assigned AYC key, if any.
    pub key: Option<CompactString>,
    /// Field values in insertion order.
    pub fields: IndexMap<CompactString, String>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Record::insert`].
    #[must_use]
    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_entry_type(mut self, entry_type: &str) -> Self {
        self.entry_type = Some(entry_type.to_lowercase().into());
        self
    }

    #[must_use]
    pub fn with_key(mut self, key: &str) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets a field, replacing any previous value.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.fields.insert(field_name(name), value.into());
    }

    /// Removes a field and returns its previous value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.fields.shift_remove(field_name(name).as_str())
    }

    /// Returns the value of a field, or `None` if it is missing or blank.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(field_name(name).as_str())
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    /// Whether the field is present with a non-blank value.
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Whether the record carries no usable field at all.
    pub fn is_empty(&self) -> bool {
        self.fields.values().all(|value| value.trim().is_empty())
    }

    /// Iterates over populated fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

fn field_name(name: &str) -> CompactString {
    compact_str::format_compact!("{}", name.trim().to_lowercase())
}
