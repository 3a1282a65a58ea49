//! Building a de-duplicated, keyed collection of records.
//!
//! A [`CollectionBuilder`] owns one [`Collection`] while it is being built.
//! Candidates are resolved one at a time, in the order they are added:
//!
//! 1. an empty candidate is dropped;
//! 2. a candidate whose primary [`Signature`] matches a member is merged into
//!    that member (first-seen values win);
//! 3. anything else is appended as a new member.
//!
//! Keys are assigned once, by [`CollectionBuilder::finish`], over the final
//! membership in arrival order. Members that came in through
//! [`CollectionBuilder::with_existing`] keep the key they already had, so
//! rebuilding an unchanged bibliography leaves every key in place.
//!
//! # Examples
//!
//! ```
//! use bibmerge::{CollectionBuilder, Record, Resolution};
//!
//! let mut builder = CollectionBuilder::default();
//! let first = builder.add(Record::new().with_field("doi", "10.1/x").with_field("title", "First"));
//! let second = builder.add(Record::new().with_field("doi", "10.1/X").with_field("title", "Second"));
//!
//! assert_eq!(first, Resolution::Inserted(0));
//! assert_eq!(second, Resolution::Merged(0));
//!
//! let report = builder.finish();
//! assert_eq!(report.collection.len(), 1);
//! assert_eq!(report.collection.records()[0].get("title"), Some("First"));
//! ```

use crate::config::BuilderConfig;
use crate::keys::{self, KeyIndex};
use crate::merge::{drop_doi_url, merge};
use crate::signature::{Signature, SignatureKind, signature, signatures};
use crate::Record;
use compact_str::CompactString;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Lookup indices from primary signature to member position.
///
/// Each member is indexed under its primary signature only. Merging never
/// changes a member's primary signature: a candidate only merges into a member
/// whose primary signature has the same kind, so the candidate cannot bring a
/// higher-precedence identifier with it.
#[derive(Debug, Clone, Default)]
struct SignatureIndex {
    by_doi: HashMap<String, usize>,
    by_isbn: HashMap<String, usize>,
    by_triple: HashMap<(String, String, String), usize>,
}

impl SignatureIndex {
    fn get(&self, signature: &Signature) -> Option<usize> {
        match signature {
            Signature::Doi(doi) => self.by_doi.get(doi),
            Signature::Isbn(isbn) => self.by_isbn.get(isbn),
            Signature::AuthorYearTitle {
                surname,
                year,
                title,
            } => self
                .by_triple
                .get(&(surname.clone(), year.clone(), title.clone())),
        }
        .copied()
    }

    fn insert(&mut self, signature: Signature, position: usize) {
        match signature {
            Signature::Doi(doi) => self.by_doi.insert(doi, position),
            Signature::Isbn(isbn) => self.by_isbn.insert(isbn, position),
            Signature::AuthorYearTitle {
                surname,
                year,
                title,
            } => self.by_triple.insert((surname, year, title), position),
        };
    }
}

/// An ordered, de-duplicated set of records.
///
/// Records keep the order in which their first occurrence arrived.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    records: Vec<Record>,
    index: SignatureIndex,
    keys: KeyIndex,
    config: BuilderConfig,
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
    }
}

impl Collection {
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Finds the member carrying `key`.
    pub fn get(&self, key: &str) -> Option<&Record> {
        self.records
            .iter()
            .find(|record| record.key.as_deref() == Some(key))
    }

    /// Finds the member a record would be merged into.
    pub fn find_duplicate(&self, record: &Record) -> Option<&Record> {
        signature(record)
            .and_then(|sig| self.index.get(&sig))
            .map(|position| &self.records[position])
    }
}

/// What happened to a candidate passed to [`CollectionBuilder::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Appended as a new member at this position.
    Inserted(usize),
    /// Merged into the member at this position.
    Merged(usize),
    /// Discarded because it had no populated field.
    Dropped,
}

/// Non-fatal conditions met while building, each tied to a member position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildWarning {
    /// No free key was left for the member's base; it stays unkeyed.
    KeySpaceExhausted { position: usize, base: String },
    /// A candidate merged into `position` by its `kind` signature, but one of
    /// its lower-precedence signatures matched the member at `other`.
    AmbiguousMerge {
        position: usize,
        other: usize,
        kind: SignatureKind,
    },
    /// An existing record carried a key already used by an earlier member;
    /// the key was discarded and the member re-keyed.
    DuplicateExistingKey { position: usize, key: CompactString },
}

impl BuildWarning {
    pub fn position(&self) -> usize {
        match self {
            BuildWarning::KeySpaceExhausted { position, .. }
            | BuildWarning::AmbiguousMerge { position, .. }
            | BuildWarning::DuplicateExistingKey { position, .. } => *position,
        }
    }
}

/// The outcome of a build: the collection plus everything worth reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    pub collection: Collection,
    pub warnings: Vec<BuildWarning>,
}

impl BuildReport {
    /// Warnings attached to the member at `position`.
    pub fn warnings_for(&self, position: usize) -> impl Iterator<Item = &BuildWarning> {
        self.warnings
            .iter()
            .filter(move |warning| warning.position() == position)
    }
}

/// Resolves candidates into a [`Collection`] and keys it.
#[derive(Debug, Clone, Default)]
pub struct CollectionBuilder {
    collection: Collection,
    warnings: Vec<BuildWarning>,
}

impl CollectionBuilder {
    /// Creates a builder over an empty collection.
    #[must_use]
    pub fn new(config: BuilderConfig) -> Self {
        Self {
            collection: Collection {
                config,
                ..Default::default()
            },
            warnings: Vec::new(),
        }
    }

    /// Continues building on top of a previously built collection.
    #[must_use]
    pub fn from_collection(collection: Collection) -> Self {
        Self {
            collection,
            warnings: Vec::new(),
        }
    }

    /// Adds records read from a persisted bibliography, keeping their keys.
    ///
    /// Existing records go through the same identity resolution as any
    /// candidate, so duplicates inside the file itself are merged too.
    #[must_use]
    pub fn with_existing(mut self, records: impl IntoIterator<Item = Record>) -> Self {
        for record in records {
            self.resolve(record, true);
        }
        self
    }

    /// Resolves one candidate against the collection.
    ///
    /// Any key the candidate carries is discarded; it is re-keyed by
    /// [`CollectionBuilder::finish`].
    pub fn add(&mut self, candidate: Record) -> Resolution {
        self.resolve(candidate, false)
    }

    /// Resolves candidates in iteration order.
    pub fn extend(&mut self, candidates: impl IntoIterator<Item = Record>) {
        for candidate in candidates {
            self.add(candidate);
        }
    }

    /// Assigns keys to every member lacking one and returns the result.
    pub fn finish(mut self) -> BuildReport {
        let sentinel = self.collection.config.year_sentinel;
        let failures = keys::assign_keys(
            &mut self.collection.records,
            &mut self.collection.keys,
            sentinel,
        );
        for (position, err) in failures {
            let keys::KeyError::Exhausted { base } = err;
            warn!(position, base = %base, "key space exhausted, record left unkeyed");
            self.warnings
                .push(BuildWarning::KeySpaceExhausted { position, base });
        }
        BuildReport {
            collection: self.collection,
            warnings: self.warnings,
        }
    }

    /// Clears every key and re-keys the whole collection in arrival order.
    pub fn rekey_all(mut self) -> BuildReport {
        self.collection.keys.clear();
        for record in &mut self.collection.records {
            record.key = None;
        }
        self.finish()
    }

    fn resolve(&mut self, mut record: Record, keep_key: bool) -> Resolution {
        if record.is_empty() {
            debug!("dropped empty candidate");
            return Resolution::Dropped;
        }
        if !keep_key {
            record.key = None;
        }

        // primary signature first, then the lower-precedence ones
        let mut candidate_signatures = signatures(&record).into_iter();
        let primary = candidate_signatures.next();

        let matched = primary.as_ref().and_then(|sig| self.collection.index.get(sig));
        match matched {
            Some(position) => {
                self.check_ambiguity(position, candidate_signatures);
                let member = &mut self.collection.records[position];
                merge(member, &record);
                if let Some(key) = record.key.as_deref() {
                    debug!(position, key, "discarded key of merged duplicate");
                }
                Resolution::Merged(position)
            }
            None => {
                drop_doi_url(&mut record);
                let position = self.collection.records.len();
                if let Some(key) = record.key.clone() {
                    if !self.collection.keys.reserve(&key) {
                        warn!(position, key = %key, "duplicate key in existing records, re-keying");
                        record.key = None;
                        self.warnings
                            .push(BuildWarning::DuplicateExistingKey { position, key });
                    }
                }
                if let Some(sig) = primary {
                    self.collection.index.insert(sig, position);
                }
                self.collection.records.push(record);
                Resolution::Inserted(position)
            }
        }
    }

    fn check_ambiguity(&mut self, position: usize, lower: impl Iterator<Item = Signature>) {
        for sig in lower {
            let Some(other) = self.collection.index.get(&sig) else {
                continue;
            };
            if other != position {
                let kind = sig.kind();
                warn!(
                    position,
                    other,
                    kind = ?kind,
                    "candidate also matches another member, kept the higher-precedence match"
                );
                self.warnings.push(BuildWarning::AmbiguousMerge {
                    position,
                    other,
                    kind,
                });
                return;
            }
        }
    }
}

/// Resolves `candidates` into `existing` and keys the result.
///
/// Members of `existing` keep their keys; new members are keyed in arrival order.
pub fn build(existing: Collection, candidates: impl IntoIterator<Item = Record>) -> BuildReport {
    let mut builder = CollectionBuilder::from_collection(existing);
    builder.extend(candidates);
    builder.finish()
}
