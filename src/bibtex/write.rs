//! BibTeX output.

use crate::Record;
use itertools::Itertools;
use std::borrow::Cow;
use tracing::debug;

/// Formats records as a BibTeX document, one entry per record.
///
/// Entries are separated by a blank line and the document ends with a newline.
/// `default_entry_type` is written for records without an entry type.
pub fn write(records: &[Record], default_entry_type: &str) -> String {
    if records.is_empty() {
        return String::new();
    }
    let mut output = records
        .iter()
        .map(|record| format_record(record, default_entry_type))
        .join("\n\n");
    output.push('\n');
    output
}

/// Formats a single record. Unkeyed records are written with an empty key.
pub fn format_record(record: &Record, default_entry_type: &str) -> String {
    let mut result = String::new();

    result.push('@');
    result.push_str(record.entry_type.as_deref().unwrap_or(default_entry_type));
    result.push('{');
    result.push_str(record.key.as_deref().unwrap_or_default());
    result.push_str(",\n");

    for (name, value) in record.iter() {
        result.push_str("    ");
        result.push_str(name);
        result.push_str(" = ");
        result.push_str(&format_value(value));
        result.push_str(",\n");
    }

    result.push('}');
    result
}

fn format_value(value: &str) -> String {
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        return value.to_string();
    }
    format!("{{{}}}", balance_braces(value))
}

/// Drops closing braces with no opening match and closes any group left open,
/// so that the braced value reads back as a single field.
fn balance_braces(value: &str) -> Cow<'_, str> {
    let mut depth = 0usize;
    let mut balanced = String::with_capacity(value.len());
    let mut changed = false;
    for c in value.chars() {
        match c {
            '{' => depth += 1,
            '}' if depth == 0 => {
                changed = true;
                continue;
            }
            '}' => depth -= 1,
            _ => {}
        }
        balanced.push(c);
    }
    if depth == 0 && !changed {
        return Cow::Borrowed(value);
    }
    balanced.extend(std::iter::repeat_n('}', depth));
    debug!(value, balanced = %balanced, "balanced braces in field value");
    Cow::Owned(balanced)
}
