//! Capital One credit card CSV export.
//!
//! Expected header:
//!   Transaction Date,Posted Date,Card No.,Description,Category,Debit,Credit
//!   2024-01-05,2024-01-06,1234,COFFEE SHOP #2,Dining,4.50,
//!
//! Exports are latin-1 encoded. Payments and refunds have an empty Debit; they
//! are kept here and dropped by the pipeline.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use tally_core::{SourceBatch, SourceKind, TransactionRecord};

const TRANSACTION_DATE: &str = "Transaction Date";
const CARD_NUMBER: &str = "Card No.";
const DESCRIPTION: &str = "Description";
const CATEGORY: &str = "Category";
const DEBIT: &str = "Debit";
const CREDIT: &str = "Credit";

const REQUIRED: &[&str] = &[TRANSACTION_DATE, CARD_NUMBER, DESCRIPTION, CATEGORY, DEBIT, CREDIT];

/// Parse a Capital One export from disk. The batch label is the file name.
pub fn parse_capital_one_csv(path: impl AsRef<Path>) -> Result<SourceBatch> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).with_context(|| format!("opening {}", path.display()))?;
    let label = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    parse_capital_one_reader(&label, bytes.as_slice())
}

/// Parse a Capital One export from any reader.
pub fn parse_capital_one_reader(label: &str, mut reader: impl Read) -> Result<SourceBatch> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).with_context(|| format!("reading {label}"))?;
    let text = decode_latin1(&bytes);

    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = rdr.headers().with_context(|| format!("{label}: reading header"))?.clone();
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);

    let missing: Vec<&str> = REQUIRED.iter().copied().filter(|c| column(*c).is_none()).collect();
    if !missing.is_empty() {
        bail!("{label}: missing expected columns: {}", missing.join(", "));
    }
    // All present, checked above.
    let idx = |name: &str| column(name).unwrap_or_default();
    let (date_i, card_i, desc_i, cat_i, debit_i, credit_i) = (
        idx(TRANSACTION_DATE),
        idx(CARD_NUMBER),
        idx(DESCRIPTION),
        idx(CATEGORY),
        idx(DEBIT),
        idx(CREDIT),
    );

    let mut records = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let row = i + 2;
        let record = result.with_context(|| format!("{label}: row {row}"))?;
        let field = |col: usize| record.get(col).unwrap_or("").trim();

        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        let date = parse_date(field(date_i))
            .with_context(|| format!("{label}: row {row}: bad transaction date '{}'", field(date_i)))?;
        let card: i64 = field(card_i)
            .parse()
            .with_context(|| format!("{label}: row {row}: bad card number '{}'", field(card_i)))?;

        let category = field(cat_i);
        records.push(
            TransactionRecord::new(date, card, field(desc_i))
                .with_category_original(Some(category))
                .with_debit(parse_amount(field(debit_i)))
                .with_credit(parse_amount(field(credit_i))),
        );
    }

    tracing::debug!(source = label, rows = records.len(), "parsed capital one export");
    Ok(SourceBatch::new(SourceKind::Statement, label, records))
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    ["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Empty or unparseable amounts are absent.
fn parse_amount(s: &str) -> Option<f64> {
    let cleaned = s.replace([',', '$'], "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = "\
Transaction Date,Posted Date,Card No.,Description,Category,Debit,Credit
2024-01-05,2024-01-06,1234,COFFEE SHOP #2,Dining,4.50,
2024-01-05,2024-01-06,1234,COFFEE SHOP #2,Dining,4.50,
2024-01-07,2024-01-08,1234,CAPITAL ONE MOBILE PYMT,Payment/Credit,,250.00
2024-01-08,2024-01-09,5678,H-E-B #455SAN MARCOSTX,Merchandise,\"1,005.82\",
";

    #[test]
    fn test_parses_rows() {
        let batch = parse_capital_one_reader("jan.csv", EXPORT.as_bytes()).unwrap();
        assert_eq!(batch.kind, SourceKind::Statement);
        assert_eq!(batch.label, "jan.csv");
        assert_eq!(batch.records.len(), 4);

        let first = &batch.records[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(first.card_or_account_number, 1234);
        assert_eq!(first.counterparty_original, "coffee shop #2");
        assert_eq!(first.counterparty_normalized, "coffee shop ");
        assert_eq!(first.category_original.as_deref(), Some("dining"));
        assert_eq!(first.category, None);
        assert_eq!(first.debit, Some(4.50));

        assert_eq!(batch.records[2].debit, None);
        assert_eq!(batch.records[2].credit, Some(250.0));
        assert_eq!(batch.records[3].debit, Some(1005.82));
        assert_eq!(batch.records[3].counterparty_normalized, "h-e-b san marcostx");
    }

    #[test]
    fn test_missing_columns_is_an_error() {
        let text = "Date,Description,Amount\n2024-01-05,COFFEE,4.50\n";
        let err = parse_capital_one_reader("amex.csv", text.as_bytes()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("missing expected columns"), "{msg}");
        assert!(msg.contains("Card No."), "{msg}");
    }

    #[test]
    fn test_bad_date_is_an_error() {
        let text = "Transaction Date,Posted Date,Card No.,Description,Category,Debit,Credit\n\
                    yesterday,,1234,COFFEE,Dining,4.50,\n";
        assert!(parse_capital_one_reader("bad.csv", text.as_bytes()).is_err());
    }

    #[test]
    fn test_latin1_descriptions() {
        let mut bytes = b"Transaction Date,Posted Date,Card No.,Description,Category,Debit,Credit\n".to_vec();
        bytes.extend_from_slice(b"2024-02-01,2024-02-02,1234,CAF\xC9 LUMI\xC8RE,Dining,9.00,\n");
        let batch = parse_capital_one_reader("fr.csv", bytes.as_slice()).unwrap();
        assert_eq!(batch.records[0].counterparty_original, "café lumière");
    }

    #[test]
    fn test_parse_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024-01.csv");
        std::fs::write(&path, EXPORT).unwrap();
        let batch = parse_capital_one_csv(&path).unwrap();
        assert_eq!(batch.label, "2024-01.csv");
        assert_eq!(batch.records.len(), 4);
    }
}
