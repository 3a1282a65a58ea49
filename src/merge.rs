//! Merging duplicate records.
//!
//! Merging is gap-filling: every field the incoming record has and the
//! existing record lacks (or has blank) is copied over, in the incoming
//! record's field order. Populated fields are never overwritten, so the
//! first-seen value always wins. Keys are never copied.
//!
//! After a merge a `url` that merely points at the record's DOI is dropped.

use crate::{Record, normalize};
use compact_str::CompactString;
use tracing::debug;

/// What a call to [`merge`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Fields copied from the incoming record.
    pub added: Vec<CompactString>,
    /// Whether the entry type was taken from the incoming record.
    pub entry_type_added: bool,
    /// Whether a DOI-duplicating `url` field was removed.
    pub url_dropped: bool,
}

impl MergeOutcome {
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && !self.entry_type_added && !self.url_dropped
    }
}

/// Fills the gaps of `existing` with the fields of `incoming`.
///
/// # Examples
///
/// ```
/// use bibmerge::{Record, merge};
///
/// let mut existing = Record::new().with_field("title", "First");
/// let incoming = Record::new()
///     .with_field("title", "Second")
///     .with_field("year", "2010");
///
/// merge(&mut existing, &incoming);
/// assert_eq!(existing.get("title"), Some("First"));
/// assert_eq!(existing.get("year"), Some("2010"));
/// ```
pub fn merge(existing: &mut Record, incoming: &Record) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    for (name, value) in incoming.iter() {
        if !existing.has(name) {
            existing.insert(name, value);
            outcome.added.push(name.into());
        }
    }

    if existing.entry_type.is_none() && incoming.entry_type.is_some() {
        existing.entry_type = incoming.entry_type.clone();
        outcome.entry_type_added = true;
    }

    outcome.url_dropped = drop_doi_url(existing);

    if !outcome.is_unchanged() {
        debug!(
            added = ?outcome.added,
            url_dropped = outcome.url_dropped,
            "merged duplicate record"
        );
    }
    outcome
}

/// Removes the `url` field when it only encodes the record's own DOI.
///
/// Returns whether the field was removed.
pub fn drop_doi_url(record: &mut Record) -> bool {
    let Some(doi) = record.get("doi").and_then(normalize::doi) else {
        return false;
    };
    let Some(url) = record.get("url") else {
        return false;
    };
    if url_encodes_doi(url, &doi) {
        record.remove("url");
        true
    } else {
        false
    }
}

fn url_encodes_doi(url: &str, doi: &str) -> bool {
    let decoded = urlencoding::decode(url)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| url.to_string());
    decoded.to_lowercase().contains(doi)
}
