use bibmerge::{BuildWarning, Collection, CollectionBuilder, Record, bibtex, build};
use pretty_assertions::assert_eq;
use std::collections::{BTreeSet, HashSet};

const LIBRARY: &str = r#"
@comment{Managed by bibmerge}

@article{fermi1934b,
    author = {Fermi, Enrico},
    title = {Versuch einer Theorie der {$\beta$}-Strahlen},
    journal = {Zeitschrift f{\"u}r Physik},
    year = 1934,
    doi = {10.1007/BF01351864},
}

@book{knuth1984m,
    author = {Donald E. Knuth},
    title = {The {\TeX}book},
    isbn = {0-201-13447-0},
    year = 1984,
}

@misc{,
    author = {Smith, John},
    title = {Notes},
    year = 2010,
    month = mar,
}
"#;

fn load(text: &str) -> Collection {
    CollectionBuilder::default()
        .with_existing(bibtex::parse(text).unwrap())
        .finish()
        .collection
}

fn keys(collection: &Collection) -> Vec<String> {
    collection
        .records()
        .iter()
        .map(|r| r.key.clone().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn loading_keeps_existing_keys_and_keys_the_rest() {
    let collection = load(LIBRARY);
    assert_eq!(keys(&collection), vec!["fermi1934b", "knuth1984m", "smith2010c"]);
}

#[test]
fn building_without_candidates_is_identity() {
    let collection = load(LIBRARY);
    let report = build(collection.clone(), Vec::<Record>::new());
    assert!(report.warnings.is_empty());
    assert_eq!(report.collection, collection);
}

#[test]
fn keys_are_stable_across_write_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.bib");

    let first = load(LIBRARY);
    bibtex::write_file(&path, first.records(), "misc").unwrap();

    let reloaded = CollectionBuilder::default()
        .with_existing(bibtex::read_file(&path).unwrap())
        .finish()
        .collection;
    assert_eq!(reloaded, first);

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("@misc{smith2010c,\n"));
}

#[test]
fn candidates_merge_into_existing_members() {
    let candidates = vec![
        // same doi, resolver url form, different casing
        Record::new()
            .with_field("doi", "https://doi.org/10.1007/bf01351864")
            .with_field("title", "Attempt at a theory of beta rays")
            .with_field("volume", "88"),
        // same isbn without hyphens
        Record::new()
            .with_field("isbn", "0201134470")
            .with_field("publisher", "Addison-Wesley"),
        // same author, year and title
        Record::new()
            .with_field("author", "John Smith")
            .with_field("title", "NOTES")
            .with_field("year", "2010")
            .with_field("note", "draft"),
    ];

    let report = build(load(LIBRARY), candidates);
    let collection = report.collection;

    assert_eq!(collection.len(), 3);
    let fermi = collection.get("fermi1934b").unwrap();
    assert_eq!(fermi.get("title"), Some("Versuch einer Theorie der {$\\beta$}-Strahlen"));
    assert_eq!(fermi.get("volume"), Some("88"));
    assert_eq!(
        collection.get("knuth1984m").unwrap().get("publisher"),
        Some("Addison-Wesley")
    );
    assert_eq!(collection.get("smith2010c").unwrap().get("note"), Some("draft"));
}

#[test]
fn new_candidates_are_appended_and_keyed_in_arrival_order() {
    let candidates = vec![
        Record::new()
            .with_field("author", "Smith, John")
            .with_field("year", "2010")
            .with_field("month", "March")
            .with_field("title", "Other notes"),
        Record::new()
            .with_field("author", "Smith, John")
            .with_field("year", "2010")
            .with_field("pages", "40--42")
            .with_field("title", "Yet another paper"),
    ];

    let report = build(load(LIBRARY), candidates);
    assert_eq!(
        keys(&report.collection),
        vec!["fermi1934b", "knuth1984m", "smith2010c", "smith2010a", "smith20102"]
    );
}

#[test]
fn doi_duplicates_keep_first_title() {
    let report = build(
        Collection::default(),
        [
            Record::new().with_field("doi", "10.1/x").with_field("title", "First"),
            Record::new().with_field("doi", "10.1/x").with_field("title", "Second"),
        ],
    );
    assert_eq!(report.collection.len(), 1);
    assert_eq!(report.collection.records()[0].get("title"), Some("First"));
}

#[test]
fn merge_order_only_changes_conflicting_values() {
    let x = Record::new()
        .with_field("doi", "10.1/x")
        .with_field("title", "From x")
        .with_field("volume", "3");
    let y = Record::new()
        .with_field("doi", "10.1/X")
        .with_field("title", "From y")
        .with_field("pages", "1--9");

    let xy = build(Collection::default(), [x.clone(), y.clone()]).collection;
    let yx = build(Collection::default(), [y, x]).collection;

    let names = |c: &Collection| -> BTreeSet<String> {
        c.records()[0].iter().map(|(name, _)| name.to_string()).collect()
    };
    assert_eq!(names(&xy), names(&yx));
    assert_eq!(xy.records()[0].get("title"), Some("From x"));
    assert_eq!(yx.records()[0].get("title"), Some("From y"));
}

#[test]
fn doi_takes_precedence_over_isbn() {
    let report = build(
        Collection::default(),
        [
            Record::new()
                .with_field("doi", "10.1/a")
                .with_field("isbn", "978-3-16-148410-0"),
            Record::new()
                .with_field("doi", "10.1/b")
                .with_field("isbn", "978-3-16-148410-0"),
        ],
    );
    assert_eq!(report.collection.len(), 2);
}

#[test]
fn keys_are_unique() {
    let candidates = (0..40).map(|i| {
        Record::new()
            .with_field("author", "Smith, John")
            .with_field("year", "2010")
            .with_field("title", format!("Paper number {i}"))
    });
    let report = build(Collection::default(), candidates);

    let keyed: Vec<_> = report
        .collection
        .records()
        .iter()
        .filter_map(|r| r.key.clone())
        .collect();
    let distinct: HashSet<_> = keyed.iter().collect();
    assert_eq!(distinct.len(), keyed.len());

    // month and page characters are absent, so only a..z exist for this base
    let exhausted = report
        .warnings
        .iter()
        .filter(|w| matches!(w, BuildWarning::KeySpaceExhausted { .. }))
        .count();
    assert_eq!(keyed.len() + exhausted, 40);
    assert_eq!(keyed.len(), 26);
}

#[test]
fn untitled_anonymous_record_gets_synthesized_year() {
    let report = build(Collection::default(), [Record::new().with_field("title", "X")]);
    assert_eq!(keys(&report.collection), vec!["9120p"]);
}

#[test]
fn colliding_fallback_letters_take_next_free_letter() {
    // "beta" and "gamma" share checksum bucket 'u'
    let report = build(
        Collection::default(),
        [
            Record::new()
                .with_field("author", "Smith")
                .with_field("year", "2010")
                .with_field("title", "beta"),
            Record::new()
                .with_field("author", "Smith")
                .with_field("year", "2010")
                .with_field("title", "gamma"),
        ],
    );
    assert_eq!(keys(&report.collection), vec!["smith2010u", "smith2010a"]);
}

#[test]
fn every_record_survives_write_and_reread() {
    let report = build(
        Collection::default(),
        [
            Record::new()
                .with_field("author", "Doe, Jane")
                .with_field("year", "2021")
                .with_field("title", "Sets {A and B"),
            Record::new()
                .with_field("author", "Roe, Richard")
                .with_field("year", "2022")
                .with_field("title", "Plain"),
        ],
    );
    let text = bibtex::write(report.collection.records(), "misc");
    let reread = bibtex::parse_strict(&text).unwrap();

    assert_eq!(reread.len(), 2);
    assert_eq!(
        reread.iter().map(|r| r.key.clone()).collect::<Vec<_>>(),
        report
            .collection
            .records()
            .iter()
            .map(|r| r.key.clone())
            .collect::<Vec<_>>()
    );
}
