//! Candidate sources.
//!
//! Records reach a collection from four kinds of collaborators: identifier
//! lookups (DOI/ISBN), free-text catalog searches, document scanners and the
//! user confirming low-confidence results. This crate performs no network or
//! PDF work itself; callers plug those in through the traits below, and
//! [`Harvester`] routes each input item to the right one.
//!
//! Every collaborator returns zero or more records. "Not found" is an empty
//! result, never an error.
//!
//! # Example
//!
//! ```
//! use bibmerge::{HarvestConfig, Record};
//! use bibmerge::sources::{ConfirmPolicy, Harvester};
//!
//! let config = HarvestConfig { confirm: ConfirmPolicy::AcceptAll, ..Default::default() };
//! let harvester = Harvester::new(config).with_identifier_lookup(|id: &str| {
//!     vec![Record::new().with_field("doi", id).with_field("title", "Found")]
//! });
//!
//! let records = harvester.harvest("10.1000/xyz123");
//! assert_eq!(records[0].get("title"), Some("Found"));
//! ```

use crate::regex::Regex;
use crate::{HarvestConfig, Record, bibtex};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static DOI_ITEM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^10\.\d{4,}/[A-Za-z\d()\[\]{}<>%._/#:;-]+[A-Za-z\d]\b").unwrap()
});

static ISBN_ITEM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d[\d-]{8,15}[\dX]$").unwrap());

static PARAGRAPH_BREAK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t\r]*\n\s*").unwrap());

static KEYED_FILE_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^([a-z]+\d{2,4}[a-z\d]?)([_-].+)$").unwrap());

/// Minimum number of words for an item to be taken as search text.
const SEARCH_TEXT_WORDS: usize = 5;

/// Nesting limit for item list files referring to other list files.
const MAX_LIST_DEPTH: usize = 4;

/// One user-supplied input, classified by what it looks like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Empty,
    Doi(String),
    Isbn(String),
    SearchText(String),
    BibFile(PathBuf),
    /// Any other file: a PDF to scan, or a text file listing more items.
    Document(PathBuf),
}

impl Item {
    pub fn classify(text: &str) -> Self {
        let text = text.trim();
        if text.chars().count() < 2 {
            return Item::Empty;
        }
        if let Some(doi) = DOI_ITEM_REGEX.find(text) {
            return Item::Doi(doi.as_str().to_string());
        }
        if ISBN_ITEM_REGEX.is_match(text) {
            return Item::Isbn(text.to_string());
        }
        if text.split_whitespace().count() >= SEARCH_TEXT_WORDS {
            return Item::SearchText(text.to_string());
        }
        if has_extension(text, &["bib", "bibtex"]) {
            return Item::BibFile(PathBuf::from(text));
        }
        Item::Document(PathBuf::from(text))
    }
}

fn has_extension(path: impl AsRef<Path>, extensions: &[&str]) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

/// Resolves a DOI or ISBN into records.
pub trait IdentifierLookup {
    fn records_from_identifier(&self, id: &str) -> Vec<Record>;
}

/// Runs a free-text catalog search.
pub trait SearchLookup {
    fn records_from_search_text(&self, text: &str) -> Vec<Record>;
}

/// Extracts records from a document such as a PDF.
pub trait DocumentScanner {
    fn records_from_document(&self, path: &Path) -> Vec<Record>;
}

/// Acceptance gate for low-confidence records.
pub trait Confirm {
    fn confirm(&self, record: &Record) -> bool;
}

impl<F: Fn(&str) -> Vec<Record>> IdentifierLookup for F {
    fn records_from_identifier(&self, id: &str) -> Vec<Record> {
        self(id)
    }
}

impl<F: Fn(&str) -> Vec<Record>> SearchLookup for F {
    fn records_from_search_text(&self, text: &str) -> Vec<Record> {
        self(text)
    }
}

impl<F: Fn(&Path) -> Vec<Record>> DocumentScanner for F {
    fn records_from_document(&self, path: &Path) -> Vec<Record> {
        self(path)
    }
}

impl<F: Fn(&Record) -> bool> Confirm for F {
    fn confirm(&self, record: &Record) -> bool {
        self(record)
    }
}

/// Collaborator used when none was plugged in: finds nothing, confirms nothing.
struct Nothing;

impl IdentifierLookup for Nothing {
    fn records_from_identifier(&self, _id: &str) -> Vec<Record> {
        Vec::new()
    }
}

impl SearchLookup for Nothing {
    fn records_from_search_text(&self, _text: &str) -> Vec<Record> {
        Vec::new()
    }
}

impl DocumentScanner for Nothing {
    fn records_from_document(&self, _path: &Path) -> Vec<Record> {
        Vec::new()
    }
}

impl Confirm for Nothing {
    fn confirm(&self, _record: &Record) -> bool {
        false
    }
}

/// How search-text results are accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfirmPolicy {
    /// Ask the [`Confirm`] collaborator for every record.
    #[default]
    Ask,
    AcceptAll,
    RejectAll,
}

/// Turns input items into candidate records.
pub struct Harvester<'a> {
    config: HarvestConfig,
    identifiers: Box<dyn IdentifierLookup + 'a>,
    search: Box<dyn SearchLookup + 'a>,
    documents: Box<dyn DocumentScanner + 'a>,
    confirm: Box<dyn Confirm + 'a>,
}

impl<'a> Harvester<'a> {
    /// Creates a harvester with no collaborators: only `.bib` files and item
    /// lists produce records until lookups are plugged in.
    pub fn new(config: HarvestConfig) -> Self {
        Self {
            config,
            identifiers: Box::new(Nothing),
            search: Box::new(Nothing),
            documents: Box::new(Nothing),
            confirm: Box::new(Nothing),
        }
    }

    #[must_use]
    pub fn with_identifier_lookup(mut self, lookup: impl IdentifierLookup + 'a) -> Self {
        self.identifiers = Box::new(lookup);
        self
    }

    #[must_use]
    pub fn with_search_lookup(mut self, lookup: impl SearchLookup + 'a) -> Self {
        self.search = Box::new(lookup);
        self
    }

    #[must_use]
    pub fn with_document_scanner(mut self, scanner: impl DocumentScanner + 'a) -> Self {
        self.documents = Box::new(scanner);
        self
    }

    #[must_use]
    pub fn with_confirm(mut self, confirm: impl Confirm + 'a) -> Self {
        self.confirm = Box::new(confirm);
        self
    }

    pub fn policy(&self) -> ConfirmPolicy {
        self.config.confirm
    }

    /// Switches the confirmation policy for the items harvested from now on.
    pub fn set_policy(&mut self, policy: ConfirmPolicy) {
        self.config.confirm = policy;
    }

    /// Harvests one item.
    pub fn harvest(&self, item: &str) -> Vec<Record> {
        self.harvest_at_depth(item, 0)
    }

    /// Harvests items in order, concatenating their records.
    pub fn harvest_all<'i>(&self, items: impl IntoIterator<Item = &'i str>) -> Vec<Record> {
        items
            .into_iter()
            .flat_map(|item| self.harvest(item))
            .collect()
    }

    /// Looks up a doi for every record lacking one.
    ///
    /// Each query goes through the search lookup and the confirmation policy.
    /// The returned records are candidates; feed them to
    /// [`build`](crate::build) to merge them into their originals.
    pub fn complete_dois(&self, records: &[Record]) -> Vec<Record> {
        doi_queries(records)
            .into_iter()
            .flat_map(|(position, query)| {
                let mut found = self.search_text(&query);
                if let Some(path) = records[position].get("file").and_then(document_path) {
                    for record in &mut found {
                        if !record.has("file") {
                            set_document_path(record, path);
                        }
                    }
                }
                found
            })
            .collect()
    }

    fn harvest_at_depth(&self, item: &str, depth: usize) -> Vec<Record> {
        let records = match Item::classify(item) {
            Item::Empty => Vec::new(),
            Item::Doi(id) | Item::Isbn(id) => self.identifiers.records_from_identifier(&id),
            Item::SearchText(text) => self.search_text(&text),
            Item::BibFile(path) => bibtex::read_file(&path).unwrap_or_else(|err| {
                warn!(path = %path.display(), error = %err, "cannot read bibliography");
                Vec::new()
            }),
            Item::Document(path) if has_extension(&path, &["pdf"]) => self.scan_document(&path),
            Item::Document(path) => self.item_list(&path, depth),
        };
        debug!(item, count = records.len(), "harvested item");
        records
    }

    fn search_text(&self, text: &str) -> Vec<Record> {
        if self.config.confirm == ConfirmPolicy::RejectAll {
            return Vec::new();
        }
        self.search
            .records_from_search_text(text)
            .into_iter()
            .filter(|record| match self.config.confirm {
                ConfirmPolicy::AcceptAll => true,
                ConfirmPolicy::RejectAll => false,
                ConfirmPolicy::Ask => {
                    let accepted = self.confirm.confirm(record);
                    if !accepted {
                        info!(query = text, "search result not confirmed");
                    }
                    accepted
                }
            })
            .collect()
    }

    fn scan_document(&self, path: &Path) -> Vec<Record> {
        let mut records = self.documents.records_from_document(path);
        if self.config.tag_documents {
            let path = path.to_string_lossy();
            for record in &mut records {
                if !record.has("file") {
                    set_document_path(record, &path);
                }
            }
        }
        records
    }

    fn item_list(&self, path: &Path, depth: usize) -> Vec<Record> {
        if depth >= MAX_LIST_DEPTH {
            warn!(path = %path.display(), "item lists nested too deeply, skipping");
            return Vec::new();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => split_items(&content)
                .iter()
                .flat_map(|item| self.harvest_at_depth(item, depth + 1))
                .collect(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cannot read item");
                Vec::new()
            }
        }
    }
}

/// Splits the content of an item list file into items.
///
/// Items are separated by blank lines when the file has any, otherwise by
/// line breaks. Whitespace inside an item is collapsed.
pub fn split_items(content: &str) -> Vec<String> {
    let content = content.trim();
    let paragraphs = PARAGRAPH_BREAK_REGEX.split(content).collect_vec();
    let parts = if paragraphs.len() > 1 {
        paragraphs
    } else {
        content.lines().collect_vec()
    };
    parts
        .into_iter()
        .map(|part| part.split_whitespace().join(" "))
        .filter(|part| !part.is_empty())
        .collect()
}

/// Search texts for the records lacking a doi, with their positions.
///
/// A query is the record's year, title and author joined by spaces.
pub fn doi_queries(records: &[Record]) -> Vec<(usize, String)> {
    records
        .iter()
        .enumerate()
        .filter(|(_, record)| !record.has("doi"))
        .filter_map(|(position, record)| {
            let query = ["year", "title", "author"]
                .iter()
                .filter_map(|field| record.get(field))
                .join(" ");
            (!query.is_empty()).then_some((position, query))
        })
        .collect()
}

/// Path stored in a JabRef `file` field (`:path:`).
pub fn document_path(file_field: &str) -> Option<&str> {
    let path = file_field.trim();
    let path = path.strip_prefix(':').unwrap_or(path);
    let path = path.strip_suffix(':').unwrap_or(path);
    (!path.is_empty()).then_some(path)
}

pub fn set_document_path(record: &mut Record, path: &str) {
    record.insert("file", format!(":{path}:"));
}

/// A document to rename so that its name starts with its record's key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRename {
    pub position: usize,
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Plans the renames that give every linked document its record's key as
/// base name, and points the `file` fields at the new names.
///
/// A name already starting with a key (`smith2010c_notes.pdf`) has that
/// prefix replaced; any other name has its stem replaced. No file is touched;
/// the caller performs the returned renames.
pub fn plan_document_renames(records: &mut [Record]) -> Vec<DocumentRename> {
    let mut renames = Vec::new();
    for (position, record) in records.iter_mut().enumerate() {
        let Some(key) = record.key.clone() else {
            continue;
        };
        let Some(from) = record
            .get("file")
            .and_then(document_path)
            .map(PathBuf::from)
        else {
            continue;
        };
        let Some(name) = from.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        let suffix = match KEYED_FILE_NAME_REGEX.captures(name) {
            Some(caps) => caps.get(2).map_or("", |m| m.as_str()).to_string(),
            None => from
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| format!(".{ext}"))
                .unwrap_or_default(),
        };
        let to = from.with_file_name(format!("{key}{suffix}"));
        if to == from {
            continue;
        }

        set_document_path(record, &to.to_string_lossy());
        renames.push(DocumentRename { position, from, to });
    }
    renames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bibtex;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::cell::Cell;

    #[rstest]
    #[case("", Item::Empty)]
    #[case(" x ", Item::Empty)]
    #[case("10.1103/PhysRev.47.777", Item::Doi("10.1103/PhysRev.47.777".into()))]
    #[case(" 10.1000/xyz123 ", Item::Doi("10.1000/xyz123".into()))]
    #[case("978-0-201-89683-1", Item::Isbn("978-0-201-89683-1".into()))]
    #[case("020189683X", Item::Isbn("020189683X".into()))]
    #[case(
        "Fermi tentativo di una teoria dei raggi beta",
        Item::SearchText("Fermi tentativo di una teoria dei raggi beta".into())
    )]
    #[case("refs.bib", Item::BibFile("refs.bib".into()))]
    #[case("Old.BibTeX", Item::BibFile("Old.BibTeX".into()))]
    #[case("fermi1932.pdf", Item::Document("fermi1932.pdf".into()))]
    #[case("reading list.txt", Item::Document("reading list.txt".into()))]
    fn test_classify(#[case] input: &str, #[case] expected: Item) {
        assert_eq!(Item::classify(input), expected);
    }

    fn found(title: &str) -> Vec<Record> {
        vec![Record::new().with_field("title", title)]
    }

    #[test]
    fn test_identifiers_are_routed_to_lookup() {
        let harvester = Harvester::new(HarvestConfig::default())
            .with_identifier_lookup(|id: &str| found(id));

        let records = harvester.harvest_all(["10.1000/xyz123", "978-0-201-89683-1", ""]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("title"), Some("10.1000/xyz123"));
        assert_eq!(records[1].get("title"), Some("978-0-201-89683-1"));
    }

    #[rstest]
    #[case(ConfirmPolicy::AcceptAll, true, 1, 0)]
    #[case(ConfirmPolicy::RejectAll, true, 0, 0)]
    #[case(ConfirmPolicy::Ask, true, 1, 1)]
    #[case(ConfirmPolicy::Ask, false, 0, 1)]
    fn test_search_results_pass_confirmation(
        #[case] policy: ConfirmPolicy,
        #[case] answer: bool,
        #[case] expected: usize,
        #[case] asked: usize,
    ) {
        let questions = Cell::new(0);
        let config = HarvestConfig {
            confirm: policy,
            ..Default::default()
        };
        let harvester = Harvester::new(config)
            .with_search_lookup(|text: &str| found(text))
            .with_confirm(|_: &Record| {
                questions.set(questions.get() + 1);
                answer
            });

        let records = harvester.harvest("quantum theory of the electron spin");
        assert_eq!(records.len(), expected);
        assert_eq!(questions.get(), asked);
    }

    #[test]
    fn test_ask_without_confirm_collaborator_rejects() {
        let harvester =
            Harvester::new(HarvestConfig::default()).with_search_lookup(|text: &str| found(text));
        assert!(harvester.harvest("one two three four five").is_empty());
    }

    #[test]
    fn test_set_policy() {
        let mut harvester =
            Harvester::new(HarvestConfig::default()).with_search_lookup(|text: &str| found(text));
        harvester.set_policy(ConfirmPolicy::AcceptAll);
        assert_eq!(harvester.policy(), ConfirmPolicy::AcceptAll);
        assert_eq!(harvester.harvest("one two three four five").len(), 1);
    }

    #[test]
    fn test_pdf_records_are_tagged() {
        let harvester = Harvester::new(HarvestConfig::default()).with_document_scanner(
            |_: &Path| {
                vec![
                    Record::new().with_field("title", "Scanned"),
                    Record::new().with_field("file", ":elsewhere.pdf:"),
                ]
            },
        );

        let records = harvester.harvest("papers/fermi1932.PDF");
        assert_eq!(records[0].get("file"), Some(":papers/fermi1932.PDF:"));
        assert_eq!(records[1].get("file"), Some(":elsewhere.pdf:"));
    }

    #[test]
    fn test_pdf_tagging_can_be_disabled() {
        let config = HarvestConfig {
            tag_documents: false,
            ..Default::default()
        };
        let harvester =
            Harvester::new(config).with_document_scanner(|_: &Path| found("Scanned"));
        assert!(!harvester.harvest("fermi1932.pdf")[0].has("file"));
    }

    #[test]
    fn test_bib_files_and_item_lists_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let bib = dir.path().join("old.bib");
        bibtex::write_file(
            &bib,
            &[Record::new().with_key("fermi1934b").with_field("year", "1934")],
            "misc",
        )
        .unwrap();
        let list = dir.path().join("items.txt");
        std::fs::write(&list, format!("{}\n10.1000/xyz123\n", bib.display())).unwrap();

        let harvester = Harvester::new(HarvestConfig::default())
            .with_identifier_lookup(|id: &str| found(id));
        let records = harvester.harvest(&list.to_string_lossy());

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key.as_deref(), Some("fermi1934b"));
        assert_eq!(records[1].get("title"), Some("10.1000/xyz123"));
    }

    #[test]
    fn test_missing_item_file_yields_nothing() {
        let harvester = Harvester::new(HarvestConfig::default());
        assert!(harvester.harvest("no-such-file.txt").is_empty());
        assert!(harvester.harvest("no-such-file.bib").is_empty());
    }

    #[test]
    fn test_split_items() {
        assert_eq!(
            split_items("10.1/abcd\nrefs.bib\n\n"),
            vec!["10.1/abcd", "refs.bib"]
        );
        assert_eq!(
            split_items("Fermi 1934\n  beta decay theory\n\n \nrefs.bib\n"),
            vec!["Fermi 1934 beta decay theory", "refs.bib"]
        );
        assert!(split_items("  \n ").is_empty());
    }

    #[test]
    fn test_doi_queries() {
        let records = vec![
            Record::new()
                .with_field("author", "Fermi, E.")
                .with_field("title", "Beta decay")
                .with_field("year", "1934"),
            Record::new().with_field("doi", "10.1/x").with_field("title", "Has one"),
            Record::new(),
            Record::new().with_field("title", "Only a title"),
        ];
        assert_eq!(
            doi_queries(&records),
            vec![
                (0, "1934 Beta decay Fermi, E.".to_string()),
                (3, "Only a title".to_string()),
            ]
        );
    }

    #[test]
    fn test_complete_dois_carries_document_path() {
        let records = vec![
            Record::new()
                .with_field("title", "Beta decay")
                .with_field("file", ":fermi.pdf:"),
        ];
        let harvester = Harvester::new(HarvestConfig {
            confirm: ConfirmPolicy::AcceptAll,
            ..Default::default()
        })
        .with_search_lookup(|_: &str| vec![Record::new().with_field("doi", "10.1/beta")]);

        let completed = harvester.complete_dois(&records);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].get("file"), Some(":fermi.pdf:"));
    }

    #[rstest]
    #[case(":papers/a.pdf:", Some("papers/a.pdf"))]
    #[case("papers/a.pdf", Some("papers/a.pdf"))]
    #[case("::", None)]
    fn test_document_path(#[case] field: &str, #[case] expected: Option<&str>) {
        assert_eq!(document_path(field), expected);
    }

    #[test]
    fn test_plan_document_renames() {
        let mut records = vec![
            Record::new()
                .with_key("fermi1934b")
                .with_field("file", ":papers/scan.pdf:"),
            Record::new()
                .with_key("fermi1934c")
                .with_field("file", ":papers/fermi1934a_notes.pdf:"),
            Record::new()
                .with_key("smith2010c")
                .with_field("file", ":smith2010c.pdf:"),
            Record::new().with_field("file", ":unkeyed.pdf:"),
        ];

        let renames = plan_document_renames(&mut records);

        assert_eq!(
            renames,
            vec![
                DocumentRename {
                    position: 0,
                    from: "papers/scan.pdf".into(),
                    to: "papers/fermi1934b.pdf".into(),
                },
                DocumentRename {
                    position: 1,
                    from: "papers/fermi1934a_notes.pdf".into(),
                    to: "papers/fermi1934c_notes.pdf".into(),
                },
            ]
        );
        assert_eq!(records[0].get("file"), Some(":papers/fermi1934b.pdf:"));
        assert_eq!(records[2].get("file"), Some(":smith2010c.pdf:"));
    }
}
