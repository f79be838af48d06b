use std::fs;

use chrono::NaiveDate;
use tally_core::{
    CATALOG_COLUMNS, CategoryCatalog, CategoryEntry, CsvTable, HISTORY_COLUMNS, SourceBatch, SourceKind,
    TableStore, TransactionRecord,
};
use tally_finance::testing::{ScriptedOperator, ScriptedOracle};
use tally_finance::{CategoryResolver, LearnedMapping, MAPPING_COLUMNS, MappingEntry, Pipeline};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

struct DataDir {
    _dir: tempfile::TempDir,
    categories: CsvTable<CategoryEntry>,
    mapping: CsvTable<MappingEntry>,
    history: CsvTable<TransactionRecord>,
}

fn data_dir() -> DataDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("categories.csv"),
        "category,description\n\
         groceries,\n\
         dining,Restaurants and cafes\n\
         car/bike/metro,Any transit\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("categorized_businesses.csv"),
        "business_or_person,category\ncoffee shop ,dining\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("transactions_history.csv"),
        HISTORY_COLUMNS.join(",") + "\n",
    )
    .unwrap();

    DataDir {
        categories: CsvTable::new("categories", dir.path().join("categories.csv"), CATALOG_COLUMNS),
        mapping: CsvTable::new(
            "categorized businesses",
            dir.path().join("categorized_businesses.csv"),
            MAPPING_COLUMNS,
        ),
        history: CsvTable::new(
            "history",
            dir.path().join("transactions_history.csv"),
            HISTORY_COLUMNS,
        ),
        _dir: dir,
    }
}

fn statement() -> SourceBatch {
    SourceBatch::new(
        SourceKind::Statement,
        "2024-03.csv",
        vec![
            TransactionRecord::new(day(5), 4321, "COFFEE SHOP #2")
                .with_debit(Some(4.5))
                .with_category_original(Some("Dining")),
            TransactionRecord::new(day(5), 4321, "COFFEE SHOP #2")
                .with_debit(Some(4.5))
                .with_category_original(Some("Dining")),
            TransactionRecord::new(day(7), 4321, "WHOLE FOODS 123")
                .with_debit(Some(62.18))
                .with_category_original(Some("Merchandise")),
            TransactionRecord::new(day(8), 4321, "CAPITAL ONE AUTOPAY").with_credit(Some(500.0)),
        ],
    )
}

fn cash() -> SourceBatch {
    SourceBatch::new(
        SourceKind::Cash,
        "cash ledger",
        vec![
            TransactionRecord::cash(day(6), "Farmers Market")
                .with_debit(Some(12.0))
                .with_category_original(Some("Groceries"))
                .with_category(Some("Groceries")),
        ],
    )
}

fn pipeline(d: &DataDir, oracle: ScriptedOracle, operator: ScriptedOperator) -> Pipeline<&CsvTable<TransactionRecord>, &CsvTable<MappingEntry>> {
    let catalog = CategoryCatalog::load(&d.categories).unwrap();
    let mapping = LearnedMapping::load(&d.mapping).unwrap();
    let resolver = CategoryResolver::new(catalog, mapping, Box::new(operator)).with_oracle(Box::new(oracle));
    Pipeline::new(resolver, &d.history)
}

#[test]
fn test_full_run_against_csv_tables() {
    let d = data_dir();
    let oracle = ScriptedOracle::new([("whole foods 123", Ok("Groceriez"))]);
    let operator = ScriptedOperator::new(["groceries"]);

    let report = pipeline(&d, oracle, operator).run(vec![statement(), cash()]).unwrap();
    assert_eq!(report.batches, 2);
    assert_eq!(report.ingested, 4);
    assert_eq!(report.dropped_missing_debit, 1);
    assert_eq!(report.resolve.learned_mapping, 2);
    assert_eq!(report.resolve.source_reported, 1);
    assert_eq!(report.resolve.operator, 1);
    assert_eq!(report.resolve.oracle_rejected, 1);
    assert!(report.unapproved.is_empty());

    let history = d.history.load().unwrap();
    assert_eq!(history.len(), 4);
    // newest first
    assert_eq!(history[0].counterparty_original, "whole foods 123");
    assert_eq!(history[0].category.as_deref(), Some("groceries"));
    assert_eq!(history[0].category_original.as_deref(), Some("merchandise"));
    assert!(history.iter().any(|r| r.is_cash() && r.category.as_deref() == Some("groceries")));

    let coffee: Vec<u32> = history
        .iter()
        .filter(|r| r.counterparty_normalized == "coffee shop ")
        .map(|r| r.sequence)
        .collect();
    assert_eq!(coffee, vec![1, 2]);

    // The operator's answer was learned and persisted.
    let learned = d.mapping.load().unwrap();
    assert!(learned.contains(&MappingEntry::new("whole foods ", "groceries")));
}

#[test]
fn test_second_import_needs_no_one_and_changes_nothing() {
    let d = data_dir();
    pipeline(
        &d,
        ScriptedOracle::new([("whole foods 123", Ok("groceries"))]),
        ScriptedOperator::silent(),
    )
    .run(vec![statement(), cash()])
    .unwrap();
    let first = fs::read_to_string(d.history.path()).unwrap();

    let oracle = ScriptedOracle::new([]);
    let calls = oracle.calls();
    let report = pipeline(&d, oracle, ScriptedOperator::silent())
        .run(vec![statement(), cash()])
        .unwrap();

    assert_eq!(calls.get(), 0);
    assert_eq!(report.merge.added, 0);
    assert_eq!(fs::read_to_string(d.history.path()).unwrap(), first);
}

#[test]
fn test_abort_keeps_history_and_earlier_learning() {
    let d = data_dir();
    let batch = SourceBatch::new(
        SourceKind::Statement,
        "2024-04.csv",
        vec![
            TransactionRecord::new(day(9), 4321, "BART CLIPPER").with_debit(Some(2.5)),
            TransactionRecord::new(day(9), 4321, "MYSTERY VENDOR").with_debit(Some(9.0)),
        ],
    );
    let oracle = ScriptedOracle::new([("bart clipper", Ok("car/bike/metro")), ("mystery vendor", Err("503"))]);

    let err = pipeline(&d, oracle, ScriptedOperator::silent())
        .run(vec![batch])
        .unwrap_err();
    assert!(matches!(err, tally_core::Error::Aborted(_)));

    assert!(d.history.load().unwrap().is_empty());
    assert!(
        d.mapping
            .load()
            .unwrap()
            .contains(&MappingEntry::new("bart clipper", "car/bike/metro"))
    );
}
