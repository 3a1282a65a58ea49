//! BibTeX parsing implementation.
//!
//! This module handles the low-level parsing of BibTeX formatted text:
//! entries delimited by braces or parentheses, braced / quoted / bare values,
//! `#` concatenation, `@string` macros, and skipped `@comment` / `@preamble`
//! blocks.

use crate::Record;
use itertools::Itertools;
use std::collections::HashMap;

/// Records read from a BibTeX text, plus the entries that had to be skipped.
#[derive(Debug, Default)]
pub(crate) struct ParsedBibtex {
    pub(crate) records: Vec<Record>,
    /// Malformed entries, as (line number of the `@`, message).
    pub(crate) ignored: Vec<(usize, String)>,
}

enum Block {
    Entry(Record),
    Skipped,
}

/// Parse the content of a BibTeX file.
pub(crate) fn bibtex_parse(text: &str) -> ParsedBibtex {
    let mut parsed = ParsedBibtex::default();
    let mut strings: HashMap<String, String> = HashMap::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find('@') {
        let start = pos + offset;
        let mut cursor = Cursor::new(text, start + 1);
        match parse_block(&mut cursor, &mut strings) {
            Ok(Block::Entry(record)) => {
                parsed.records.push(record);
                pos = cursor.pos;
            }
            Ok(Block::Skipped) => pos = cursor.pos,
            Err(message) => {
                parsed.ignored.push((line_number(text, start), message));
                // resume right after this '@' so a following entry is not lost
                pos = start + 1;
            }
        }
    }

    parsed
}

fn line_number(text: &str, pos: usize) -> usize {
    text[..pos].matches('\n').count() + 1
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, pos: usize) -> Self {
        Self { text, pos }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
        &self.text[start..self.pos]
    }

    fn expect_more(&self) -> Result<char, String> {
        self.peek()
            .ok_or_else(|| "unexpected end of input".to_string())
    }
}

fn parse_block(
    cursor: &mut Cursor,
    strings: &mut HashMap<String, String>,
) -> Result<Block, String> {
    let entry_type = cursor.take_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if entry_type.is_empty() {
        return Ok(Block::Skipped);
    }
    cursor.skip_whitespace();
    let close = match cursor.peek() {
        Some('{') => '}',
        Some('(') => ')',
        // a stray '@' in free text between entries
        _ => return Ok(Block::Skipped),
    };
    cursor.bump();

    match entry_type.to_lowercase().as_str() {
        "comment" | "preamble" => {
            skip_balanced(cursor, close)?;
            Ok(Block::Skipped)
        }
        "string" => {
            parse_string_definition(cursor, strings, close)?;
            Ok(Block::Skipped)
        }
        _ => parse_entry(cursor, strings, entry_type, close).map(Block::Entry),
    }
}

/// Skip a block body up to its matching closing delimiter.
fn skip_balanced(cursor: &mut Cursor, close: char) -> Result<(), String> {
    let mut depth = 0usize;
    loop {
        match cursor.bump() {
            None => return Err("unterminated block".to_string()),
            Some('{') => depth += 1,
            Some('}') if depth > 0 => depth -= 1,
            Some(c) if c == close && depth == 0 => return Ok(()),
            Some(_) => {}
        }
    }
}

fn parse_string_definition(
    cursor: &mut Cursor,
    strings: &mut HashMap<String, String>,
    close: char,
) -> Result<(), String> {
    cursor.skip_whitespace();
    let name = cursor.take_while(is_name_char);
    if name.is_empty() {
        return Err("expected @string name".to_string());
    }
    cursor.skip_whitespace();
    if !cursor.eat('=') {
        return Err(format!("expected '=' after @string name '{}'", name));
    }
    let value = parse_value(cursor, strings)?;
    cursor.skip_whitespace();
    if !cursor.eat(close) {
        return Err(format!("expected '{}' to close @string", close));
    }
    strings.insert(name.to_lowercase(), value);
    Ok(())
}

fn parse_entry(
    cursor: &mut Cursor,
    strings: &HashMap<String, String>,
    entry_type: &str,
    close: char,
) -> Result<Record, String> {
    let mut record = Record::new().with_entry_type(entry_type);

    cursor.skip_whitespace();
    let key = cursor.take_while(|c| c != ',' && c != close && !c.is_whitespace());
    if !key.is_empty() {
        record.key = Some(key.into());
    }

    loop {
        cursor.skip_whitespace();
        match cursor.expect_more()? {
            c if c == close => {
                cursor.bump();
                return Ok(record);
            }
            ',' => {
                cursor.bump();
                continue;
            }
            _ => {}
        }

        let name = cursor.take_while(is_name_char);
        if name.is_empty() {
            return Err(format!("expected field name in entry '{}'", key));
        }
        cursor.skip_whitespace();
        if !cursor.eat('=') {
            return Err(format!("expected '=' after field '{}'", name));
        }
        let value = parse_value(cursor, strings)?;
        // first occurrence wins
        if !record.has(name) {
            record.insert(name, value.split_whitespace().join(" "));
        }

        cursor.skip_whitespace();
        match cursor.expect_more()? {
            ',' => {
                cursor.bump();
            }
            c if c == close => {}
            c => return Err(format!("unexpected '{}' after field '{}'", c, name)),
        }
    }
}

fn is_name_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '=' | ',' | '{' | '}' | '(' | ')' | '"' | '#' | '@')
}

/// Parse a field value: one or more `#`-joined parts, concatenated as written.
fn parse_value(cursor: &mut Cursor, strings: &HashMap<String, String>) -> Result<String, String> {
    let mut value = String::new();
    loop {
        cursor.skip_whitespace();
        match cursor.expect_more()? {
            '{' => {
                cursor.bump();
                value.push_str(&delimited(cursor, '}')?);
            }
            '"' => {
                cursor.bump();
                value.push_str(&delimited(cursor, '"')?);
            }
            c if c.is_ascii_digit() => {
                value.push_str(cursor.take_while(|c| c.is_ascii_digit()));
            }
            c if c.is_alphabetic() => {
                let name = cursor.take_while(is_name_char);
                match strings.get(&name.to_lowercase()) {
                    Some(expansion) => value.push_str(expansion),
                    None => value.push_str(&name.to_lowercase()),
                }
            }
            c => return Err(format!("expected field value, found '{}'", c)),
        }
        cursor.skip_whitespace();
        if !cursor.eat('#') {
            break;
        }
    }
    Ok(value)
}

/// Read up to the closing delimiter at brace depth zero; inner braces are kept.
fn delimited(cursor: &mut Cursor, close: char) -> Result<String, String> {
    let mut content = String::new();
    let mut depth = 0usize;
    loop {
        let c = cursor
            .bump()
            .ok_or_else(|| "unterminated field value".to_string())?;
        match c {
            '{' => depth += 1,
            '}' if depth > 0 => depth -= 1,
            c if c == close && depth == 0 => return Ok(content),
            '}' => return Err("unbalanced '}' in field value".to_string()),
            _ => {}
        }
        content.push(c);
    }
}
