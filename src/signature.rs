//! Record identity signatures.
//!
//! A signature is the value used to decide whether two records denote the
//! same work. Each record has at most one *primary* signature, chosen in
//! precedence order:
//!
//! 1. the DOI, compared case-insensitively;
//! 2. the ISBN, digits only;
//! 3. the (first surname, year, title) triple, when both a name list and a
//!    title are present.
//!
//! Two records are duplicates only when their primary signatures are of the
//! same kind and equal. A DOI never matches an ISBN, and a record that has a
//! DOI is never matched by its triple, even if the DOIs differ.
//!
//! ```
//! use bibmerge::{Record, Signature, signature};
//!
//! let record = Record::new()
//!     .with_field("doi", "https://doi.org/10.1000/ABC")
//!     .with_field("isbn", "978-0-553-10953-5");
//! assert_eq!(signature(&record), Some(Signature::Doi("10.1000/abc".to_string())));
//! ```

use crate::Record;
use crate::normalize;
use serde::{Deserialize, Serialize};

/// The kind of a [`Signature`], in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignatureKind {
    Doi,
    Isbn,
    AuthorYearTitle,
}

/// A normalized identity value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signature {
    Doi(String),
    Isbn(String),
    AuthorYearTitle {
        surname: String,
        /// Four-digit year, or empty when the record has none.
        year: String,
        title: String,
    },
}

impl Signature {
    pub fn kind(&self) -> SignatureKind {
        match self {
            Signature::Doi(_) => SignatureKind::Doi,
            Signature::Isbn(_) => SignatureKind::Isbn,
            Signature::AuthorYearTitle { .. } => SignatureKind::AuthorYearTitle,
        }
    }
}

/// Computes the primary signature of a record.
pub fn signature(record: &Record) -> Option<Signature> {
    doi_signature(record)
        .or_else(|| isbn_signature(record))
        .or_else(|| triple_signature(record))
}

/// Computes every signature a record has, in precedence order.
///
/// Only the first one is used for matching; the others let the collection
/// notice candidates that would have matched a different member.
pub fn signatures(record: &Record) -> Vec<Signature> {
    [
        doi_signature(record),
        isbn_signature(record),
        triple_signature(record),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Returns true iff both records have primary signatures of the same kind with equal values.
pub fn is_duplicate(a: &Record, b: &Record) -> bool {
    match (signature(a), signature(b)) {
        (Some(sa), Some(sb)) => sa == sb,
        _ => false,
    }
}

fn doi_signature(record: &Record) -> Option<Signature> {
    record.get("doi").and_then(normalize::doi).map(Signature::Doi)
}

fn isbn_signature(record: &Record) -> Option<Signature> {
    record.get("isbn").and_then(normalize::isbn).map(Signature::Isbn)
}

fn triple_signature(record: &Record) -> Option<Signature> {
    let surname = first_surname(record)?;
    let title = record
        .get("title")
        .map(normalize::comparison_token)
        .filter(|t| !t.is_empty())?;
    let year = record
        .get("year")
        .and_then(normalize::year)
        .unwrap_or_default();
    Some(Signature::AuthorYearTitle {
        surname,
        year,
        title,
    })
}

/// Normalized surname of the first author, falling back to the first editor.
pub(crate) fn first_surname(record: &Record) -> Option<String> {
    ["author", "editor"]
        .into_iter()
        .filter_map(|field| record.get(field))
        .filter_map(normalize::first_surname)
        .map(|surname| normalize::key_token(&surname))
        .find(|surname| !surname.is_empty())
}
