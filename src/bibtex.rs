//! BibTeX reading and writing.
//!
//! The persisted bibliography is a plain BibTeX file: one `@type{key, ...}`
//! entry per record. Reading is lenient: malformed entries are skipped and
//! logged, the rest of the file is still read. Use [`parse_strict`] to turn the
//! first malformed entry into an error instead.
//!
//! # Example
//!
//! ```
//! use bibmerge::bibtex;
//!
//! let input = r#"
//! @string{acme = "ACME Press"}
//! @book{knuth1984m,
//!     author = {Donald E. Knuth},
//!     title = {The {\TeX}book},
//!     publisher = acme,
//!     year = 1984,
//! }"#;
//!
//! let records = bibtex::parse(input).unwrap();
//! assert_eq!(records[0].key.as_deref(), Some("knuth1984m"));
//! assert_eq!(records[0].get("publisher"), Some("ACME Press"));
//!
//! let output = bibtex::write(&records, "misc");
//! assert!(output.starts_with("@book{knuth1984m,\n"));
//! ```

mod parse;
mod write;

use crate::{Record, Result};
use parse::bibtex_parse;
use std::path::Path;
use tracing::warn;

pub use write::{format_record, write};

/// Parses BibTeX text into records, skipping malformed entries.
pub fn parse(input: &str) -> Result<Vec<Record>> {
    let parsed = bibtex_parse(input);
    for (line, message) in &parsed.ignored {
        warn!(line, message = %message, "skipped malformed BibTeX entry");
    }
    Ok(parsed.records)
}

/// Parses BibTeX text into records, failing on the first malformed entry.
pub fn parse_strict(input: &str) -> Result<Vec<Record>> {
    let parsed = bibtex_parse(input);
    match parsed.ignored.into_iter().next() {
        Some((line, message)) => Err(crate::BibError::MalformedInput { message, line }),
        None => Ok(parsed.records),
    }
}

/// Reads a bibliography file. A missing file reads as an empty bibliography.
pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    match std::fs::read_to_string(path.as_ref()) {
        Ok(content) => parse(&content),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err.into()),
    }
}

/// Writes records to a bibliography file, replacing its content.
pub fn write_file(
    path: impl AsRef<Path>,
    records: &[Record],
    default_entry_type: &str,
) -> Result<()> {
    std::fs::write(path, write(records, default_entry_type))?;
    Ok(())
}
