//! Canonical comparison forms for field values.
//!
//! Two flavours are provided:
//!
//! - [`key_token`] keeps lowercase ASCII letters only. It is used for
//!   surnames and anything else that ends up inside an AYC key.
//! - [`comparison_token`] keeps lowercase ASCII letters and digits. It is used
//!   for titles in identity signatures and checksums, where digits may be the
//!   only thing telling two works apart ("Part 1" / "Part 2").
//!
//! Both fold case, strip diacritics to their base letter and drop LaTeX
//! control sequences. Blank input yields the empty string, which every caller
//! treats as "field absent".

use crate::regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

/// LaTeX control words such as `\v` or `\textit`. `\i` (dotless i) is kept
/// so that its letter survives.
static LATEX_COMMAND_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\[a-hj-z][a-z]*").unwrap());

static YEAR_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{4}").unwrap());

static DOI_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://(?:dx\.)?doi\.org/(.+)$").unwrap());

/// Normalizes text into letters-only form, for key generation.
pub fn key_token(text: &str) -> String {
    fold(text, |c| c.is_ascii_lowercase())
}

/// Normalizes text into alphanumeric form, for identity comparison.
pub fn comparison_token(text: &str) -> String {
    fold(text, |c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

fn fold(text: &str, keep: impl Fn(char) -> bool) -> String {
    if text.trim().is_empty() {
        return String::new();
    }
    let lowered = text.to_lowercase();
    let stripped = LATEX_COMMAND_REGEX.replace_all(&lowered, "");
    stripped.chars().nfkd().filter(|&c| keep(c)).collect()
}

/// Extracts the first four-digit run of a year field.
pub fn year(text: &str) -> Option<String> {
    YEAR_REGEX.find(text).map(|m| m.as_str().to_string())
}

/// Formats a DOI string by removing URL prefixes, `doi:` labels and `[doi]` suffixes.
///
/// The result is lower-cased so that DOIs compare case-insensitively.
///
/// # Arguments
///
/// * `doi_str` - The DOI string to format
pub fn doi(doi_str: &str) -> Option<String> {
    if doi_str.trim().is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(doi_str)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| doi_str.to_string());
    let doi = decoded
        .trim()
        .trim_end_matches("[doi]")
        .trim()
        .replace(|c: char| c.is_whitespace(), "")
        .to_lowercase();

    if let Some(captures) = DOI_URL_REGEX.captures(&doi) {
        return Some(captures[1].to_string());
    }
    doi.find("10.").map(|pos| doi[pos..].to_string())
}

/// Reduces an ISBN to its digits (and a trailing check `X`).
pub fn isbn(isbn_str: &str) -> Option<String> {
    let mut digits: String = isbn_str.chars().filter(|c| c.is_ascii_digit()).collect();
    if isbn_str.trim_end().ends_with(['x', 'X']) && !digits.is_empty() {
        digits.push('X');
    }
    (!digits.is_empty()).then_some(digits)
}

/// Splits a BibTeX name list on `and`, ignoring `and` inside brace groups.
pub fn split_names(names: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = Vec::new();
    for token in tokens(names) {
        if token.eq_ignore_ascii_case("and") {
            if !current.is_empty() {
                result.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(token);
        }
    }
    if !current.is_empty() {
        result.push(current.join(" "));
    }
    result
}

/// Returns the surname (BibTeX "last" part) of the first name in a name list,
/// still in its original spelling.
///
/// Handles formats:
/// - "Last, First" and "von Last, Jr, First"
/// - "First Last" and "First von Last"
///
/// The "von" particle is not part of the surname: `"Ludwig van Beethoven"` → `"Beethoven"`.
pub fn first_surname(names: &str) -> Option<String> {
    let first = split_names(names).into_iter().next()?;

    let comma = first
        .match_indices(',')
        .map(|(pos, _)| pos)
        .find(|&pos| brace_depth_at(&first, pos) == 0);
    let last_part = match comma {
        Some(pos) => first[..pos].to_string(),
        None => first.clone(),
    };

    let words = tokens(&last_part);
    let (last, init) = words.split_last()?;
    let von_end = init.iter().rposition(|word| starts_lowercase(word));
    let surname = match von_end {
        Some(pos) => words[pos + 1..].join(" "),
        None => last.to_string(),
    };
    (!surname.trim().is_empty()).then_some(surname)
}

/// Whitespace-separated tokens, keeping brace groups whole.
fn tokens(text: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            c if c.is_whitespace() && depth == 0 => {
                if let Some(s) = start.take() {
                    result.push(&text[s..i]);
                }
                continue;
            }
            _ => {}
        }
        if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        result.push(&text[s..]);
    }
    result
}

fn brace_depth_at(text: &str, pos: usize) -> usize {
    text[..pos].chars().fold(0usize, |depth, c| match c {
        '{' => depth + 1,
        '}' => depth.saturating_sub(1),
        _ => depth,
    })
}

fn starts_lowercase(word: &str) -> bool {
    word.chars().next().is_some_and(char::is_lowercase)
}
