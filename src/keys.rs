//! AYC (author-year-character) key generation.
//!
//! A key is `<surname><year><char>`:
//!
//! - `surname`: letters-only form of the first author's surname, or of the
//!   first editor's, or nothing at all;
//! - `year`: the record's four-digit year, or a synthesized `9ddd` where `ddd`
//!   is the title checksum modulo 1000;
//! - `char`: `a`..`l` for the months January..December, else the last digit of
//!   `pages` (or of `page`), else one of `m`..`y` picked by the title checksum modulo 13.
//!
//! When that key is already taken, the first free letter `a`..`z` for the same
//! base is used instead. Keys are handed out in a single sequential pass, so
//! the order in which records are visited is part of the result.

use crate::{Record, normalize, signature};
use compact_str::{CompactString, format_compact};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

/// Month names as found in BibTeX month macros.
pub const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Default first digit of a synthesized year.
pub const YEAR_SENTINEL: char = '9';

/// Number of checksum buckets used for the fallback character.
const FALLBACK_BUCKETS: u32 = 13;

/// Errors raised while keying a single record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("all 26 letters are already used for key base '{base}'")]
    Exhausted { base: String },
}

/// Set of keys already handed out in one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyIndex {
    used: HashSet<CompactString>,
}

impl KeyIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index holding every key already carried by `records`.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Record>) -> Self {
        Self {
            used: records
                .into_iter()
                .filter_map(|r| r.key.clone())
                .collect(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.used.contains(key)
    }

    /// Marks a key as used. Returns `false` if it already was.
    pub fn reserve(&mut self, key: &str) -> bool {
        self.used.insert(key.into())
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    pub fn clear(&mut self) {
        self.used.clear();
    }
}

/// Deterministic checksum of a title.
///
/// The title is reduced to its comparison form first, then hashed with the
/// classic `h * 31 + byte` polynomial over wrapping 32-bit arithmetic. The
/// value only depends on the normalized title, so keys derived from it are
/// stable across runs and platforms.
pub fn checksum(title: &str) -> u32 {
    normalize::comparison_token(title)
        .bytes()
        .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(u32::from(b)))
}

/// Computes `surname + year` for a record.
pub fn base_key(record: &Record, year_sentinel: char) -> String {
    let surname = signature::first_surname(record).unwrap_or_default();
    let year = record
        .get("year")
        .and_then(normalize::year)
        .unwrap_or_else(|| {
            let title = record.get("title").unwrap_or_default();
            format!("{year_sentinel}{:03}", checksum(title) % 1000)
        });
    surname + &year
}

/// Picks the preferred tie-break character for a record.
pub fn tie_break(record: &Record) -> char {
    if let Some(month) = record.get("month").and_then(month_index) {
        return char::from(b'a' + month);
    }
    let page_digit = ["pages", "page"]
        .into_iter()
        .filter_map(|field| record.get(field))
        .filter_map(|pages| pages.trim_end().chars().last())
        .find(char::is_ascii_digit);
    if let Some(digit) = page_digit {
        return digit;
    }
    let title = record.get("title").unwrap_or_default();
    let bucket = (checksum(title) % FALLBACK_BUCKETS) as u8;
    char::from(b'm' + bucket)
}

/// Maps `jan`..`dec` (any case, any suffix) or `1`..`12` to `0`..`11`.
fn month_index(month: &str) -> Option<u8> {
    let month = month.trim();
    if let Ok(number) = month.parse::<u8>() {
        return (1..=12).contains(&number).then(|| number - 1);
    }
    let prefix: String = month.chars().take(3).collect::<String>().to_lowercase();
    MONTHS
        .iter()
        .position(|&name| name == prefix)
        .map(|i| i as u8)
}

/// Assigns a key to one record and reserves it in `index`.
///
/// The preferred character from [`tie_break`] is kept whenever it is free;
/// otherwise the first unused letter `a`..`z` for the same base is taken.
pub fn assign_key(
    record: &Record,
    index: &mut KeyIndex,
    year_sentinel: char,
) -> Result<CompactString, KeyError> {
    let base = base_key(record, year_sentinel);
    let preferred = format_compact!("{base}{}", tie_break(record));

    let key = if !index.contains(&preferred) {
        preferred
    } else {
        ('a'..='z')
            .map(|c| format_compact!("{base}{c}"))
            .find(|candidate| !index.contains(candidate))
            .ok_or_else(|| KeyError::Exhausted { base: base.clone() })?
    };

    index.reserve(&key);
    Ok(key)
}

/// Keys every record that does not carry a key yet, in slice order.
///
/// Records that already have a key keep it untouched; their keys must already
/// be present in `index` (see [`KeyIndex::from_records`]). Returns the
/// position and error of every record that could not be keyed; those records
/// are left without a key.
///
/// # Examples
///
/// ```
/// use bibmerge::{KeyIndex, Record, assign_keys};
/// use bibmerge::keys::YEAR_SENTINEL;
///
/// let mut records = vec![
///     Record::new().with_field("author", "Smith").with_field("year", "2010").with_field("pages", "42"),
///     Record::new().with_field("author", "Smith").with_field("year", "2010").with_field("pages", "12"),
/// ];
/// let mut index = KeyIndex::from_records(&records);
/// let failures = assign_keys(&mut records, &mut index, YEAR_SENTINEL);
///
/// assert!(failures.is_empty());
/// assert_eq!(records[0].key.as_deref(), Some("smith20102"));
/// assert_eq!(records[1].key.as_deref(), Some("smith2010a"));
/// ```
pub fn assign_keys(
    records: &mut [Record],
    index: &mut KeyIndex,
    year_sentinel: char,
) -> Vec<(usize, KeyError)> {
    let mut failures = Vec::new();
    for (i, record) in records.iter_mut().enumerate() {
        if record.key.is_some() {
            continue;
        }
        match assign_key(record, index, year_sentinel) {
            Ok(key) => {
                debug!(position = i, key = %key, "assigned key");
                record.key = Some(key);
            }
            Err(err) => failures.push((i, err)),
        }
    }
    failures
}
