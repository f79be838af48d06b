//! Canonical transaction record shared by every source.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Card number used for cash ledger entries. Real card numbers are never negative.
pub const CASH_ACCOUNT: i64 = -1;

/// Column order of the persisted history table.
pub const HISTORY_COLUMNS: &[&str] = &[
    "date",
    "card_number",
    "business_or_person_original",
    "business_or_person",
    "category_original",
    "category",
    "debit",
    "credit",
    "sequence",
];

static STRIP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\d#]+").expect("static regex"));

/// Where a batch came from. Statement rows must carry a debit; cash rows may not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Statement,
    Cash,
}

/// One transaction in canonical form.
///
/// Column names follow the history file layout, so existing history and
/// snapshot files load unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction date as reported by the source (not the posting date).
    pub date: NaiveDate,
    #[serde(rename = "card_number")]
    pub card_or_account_number: i64,
    /// Lower-cased merchant or payee text.
    #[serde(rename = "business_or_person_original")]
    pub counterparty_original: String,
    /// `counterparty_original` without digits and `#`; key into the learned mapping.
    #[serde(rename = "business_or_person")]
    pub counterparty_normalized: String,
    pub category_original: Option<String>,
    /// Resolved category. `None` only before resolution.
    pub category: Option<String>,
    pub debit: Option<f64>,
    pub credit: Option<f64>,
    /// 1-based rank among identical rows of one batch.
    pub sequence: u32,
}

impl TransactionRecord {
    /// Statement-style record: counterparty is lower-cased and normalized.
    pub fn new(date: NaiveDate, card_number: i64, counterparty: &str) -> Self {
        let original = counterparty.to_lowercase();
        Self {
            date,
            card_or_account_number: card_number,
            counterparty_normalized: normalize_counterparty(&original),
            counterparty_original: original,
            category_original: None,
            category: None,
            debit: None,
            credit: None,
            sequence: 1,
        }
    }

    /// Cash ledger record. Payee names are typed by hand, so the normalized
    /// form is the lower-cased original.
    pub fn cash(date: NaiveDate, counterparty: &str) -> Self {
        let original = counterparty.to_lowercase();
        Self {
            date,
            card_or_account_number: CASH_ACCOUNT,
            counterparty_normalized: original.clone(),
            counterparty_original: original,
            category_original: None,
            category: None,
            debit: None,
            credit: None,
            sequence: 1,
        }
    }

    pub fn with_debit(mut self, debit: Option<f64>) -> Self {
        self.debit = debit.filter(|v| !v.is_nan());
        self
    }

    pub fn with_credit(mut self, credit: Option<f64>) -> Self {
        self.credit = credit.filter(|v| !v.is_nan());
        self
    }

    /// Source-reported category, lower-cased. Empty strings count as absent.
    pub fn with_category_original(mut self, category: Option<&str>) -> Self {
        self.category_original = clean_label(category);
        self
    }

    pub fn with_category(mut self, category: Option<&str>) -> Self {
        self.category = clean_label(category);
        self
    }

    pub fn is_cash(&self) -> bool {
        self.card_or_account_number == CASH_ACCOUNT
    }

    /// Key used to spot the same transaction across merges.
    pub fn identity_key(&self) -> IdentityKey<'_> {
        IdentityKey {
            date: self.date,
            counterparty_original: &self.counterparty_original,
            debit: AmountKey::from(self.debit),
            sequence: self.sequence,
        }
    }

    /// Key used to rank otherwise identical rows inside one batch.
    pub fn group_key(&self) -> GroupKey<'_> {
        GroupKey {
            date: self.date,
            card_or_account_number: self.card_or_account_number,
            counterparty_original: &self.counterparty_original,
            debit: AmountKey::from(self.debit),
        }
    }

    /// Checks the canonical field set for a record coming from `kind`.
    pub fn check_shape(&self, kind: SourceKind) -> std::result::Result<(), String> {
        if self.counterparty_original.trim().is_empty() {
            return Err("empty counterparty".to_string());
        }
        if self.counterparty_original != self.counterparty_original.to_lowercase() {
            return Err(format!(
                "counterparty '{}' is not lower-cased",
                self.counterparty_original
            ));
        }
        match kind {
            SourceKind::Statement if self.is_cash() => {
                return Err("statement row uses the cash account sentinel".to_string());
            }
            SourceKind::Cash if !self.is_cash() => {
                return Err(format!(
                    "cash row carries card number {}",
                    self.card_or_account_number
                ));
            }
            _ => {}
        }
        for (name, value) in [("debit", self.debit), ("credit", self.credit)] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(format!("{name} is not a finite number"));
            }
        }
        if self.sequence == 0 {
            return Err("sequence must start at 1".to_string());
        }
        Ok(())
    }
}

/// Lower-case and strip digits and `#`, e.g. `"h-e-b #455"` becomes `"h-e-b "`.
///
/// Surrounding whitespace is kept so keys match mappings learned earlier.
pub fn normalize_counterparty(raw: &str) -> String {
    STRIP_RE.replace_all(&raw.to_lowercase(), "").into_owned()
}

fn clean_label(label: Option<&str>) -> Option<String> {
    label
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}

/// Amount wrapper with total equality. Absent and NaN amounts compare equal
/// to each other and `-0.0` equals `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AmountKey(Option<u64>);

impl From<Option<f64>> for AmountKey {
    fn from(value: Option<f64>) -> Self {
        AmountKey(
            value
                .filter(|v| !v.is_nan())
                .map(|v| if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() }),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityKey<'a> {
    pub date: NaiveDate,
    pub counterparty_original: &'a str,
    pub debit: AmountKey,
    pub sequence: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupKey<'a> {
    pub date: NaiveDate,
    pub card_or_account_number: i64,
    pub counterparty_original: &'a str,
    pub debit: AmountKey,
}

/// Records normalized from one source file or one ledger query.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBatch {
    pub kind: SourceKind,
    /// Human-readable origin, e.g. a file name.
    pub label: String,
    pub records: Vec<TransactionRecord>,
}

impl SourceBatch {
    pub fn new(kind: SourceKind, label: impl Into<String>, records: Vec<TransactionRecord>) -> Self {
        Self {
            kind,
            label: label.into(),
            records,
        }
    }

    /// Fails on the first row that does not fit the canonical shape.
    pub fn validate(&self) -> Result<()> {
        for (row, record) in self.records.iter().enumerate() {
            record
                .check_shape(self.kind)
                .map_err(|msg| Error::source_format(&self.label, format!("row {}: {msg}", row + 1)))?;
        }
        Ok(())
    }

    /// Statement rows without a debit (payments, refunds) never reach history.
    /// Returns how many rows were dropped.
    pub fn drop_missing_debit(&mut self) -> usize {
        if self.kind != SourceKind::Statement {
            return 0;
        }
        let before = self.records.len();
        self.records.retain(|r| r.debit.is_some());
        before - self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_normalize_strips_digits_and_hash() {
        assert_eq!(normalize_counterparty("COFFEE SHOP #2"), "coffee shop ");
        assert_eq!(normalize_counterparty("h-e-b #455san marcostx"), "h-e-b san marcostx");
        assert_eq!(normalize_counterparty("uber"), "uber");
    }

    #[test]
    fn test_new_lowercases_and_normalizes() {
        let r = TransactionRecord::new(day(5), 1234, "Coffee Shop #2").with_debit(Some(4.5));
        assert_eq!(r.counterparty_original, "coffee shop #2");
        assert_eq!(r.counterparty_normalized, "coffee shop ");
        assert_eq!(r.sequence, 1);
        assert!(!r.is_cash());
    }

    #[test]
    fn test_cash_keeps_original_as_normalized() {
        let r = TransactionRecord::cash(day(5), "Farmer Market 2");
        assert_eq!(r.counterparty_normalized, "farmer market 2");
        assert_eq!(r.card_or_account_number, CASH_ACCOUNT);
        assert!(r.is_cash());
    }

    #[test]
    fn test_nan_amount_is_absent() {
        let r = TransactionRecord::cash(day(1), "x").with_debit(Some(f64::NAN));
        assert_eq!(r.debit, None);
    }

    #[test]
    fn test_amount_key_equality() {
        assert_eq!(AmountKey::from(None), AmountKey::from(Some(f64::NAN)));
        assert_eq!(AmountKey::from(Some(0.0)), AmountKey::from(Some(-0.0)));
        assert_ne!(AmountKey::from(Some(4.5)), AmountKey::from(Some(4.51)));
    }

    #[test]
    fn test_empty_category_is_absent() {
        let r = TransactionRecord::cash(day(1), "x").with_category_original(Some("  "));
        assert_eq!(r.category_original, None);
        let r = r.with_category(Some("Dining"));
        assert_eq!(r.category.as_deref(), Some("dining"));
    }

    #[test]
    fn test_validate_rejects_cash_sentinel_in_statement() {
        let r = TransactionRecord::new(day(1), CASH_ACCOUNT, "x").with_debit(Some(1.0));
        let batch = SourceBatch::new(SourceKind::Statement, "bad.csv", vec![r]);
        let err = batch.validate().unwrap_err();
        assert!(matches!(err, Error::SourceFormat { .. }));
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_validate_rejects_empty_counterparty() {
        let r = TransactionRecord::cash(day(1), "   ");
        let batch = SourceBatch::new(SourceKind::Cash, "notion", vec![r]);
        assert!(batch.validate().is_err());
    }

    #[test]
    fn test_drop_missing_debit_only_for_statements() {
        let rows = vec![
            TransactionRecord::new(day(1), 1, "a").with_debit(Some(3.0)),
            TransactionRecord::new(day(1), 1, "payment").with_credit(Some(50.0)),
        ];
        let mut statement = SourceBatch::new(SourceKind::Statement, "s", rows);
        assert_eq!(statement.drop_missing_debit(), 1);
        assert_eq!(statement.records.len(), 1);

        let mut cash = SourceBatch::new(
            SourceKind::Cash,
            "c",
            vec![TransactionRecord::cash(day(1), "gift").with_credit(Some(20.0))],
        );
        assert_eq!(cash.drop_missing_debit(), 0);
        assert_eq!(cash.records.len(), 1);
    }
}
