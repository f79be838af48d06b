//! Approved category set and the post-merge audit.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::record::TransactionRecord;
use crate::storage::TableStore;

/// Label accepted everywhere even if the catalog file does not list it.
pub const NO_CATEGORY: &str = "no category";

pub const CATALOG_COLUMNS: &[&str] = &["category", "description"];

/// One row of `categories.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl CategoryEntry {
    pub fn new(category: &str, description: Option<&str>) -> Self {
        Self {
            category: category.to_string(),
            description: description.map(str::to_string),
        }
    }
}

/// The approved category set. Read once per run and never mutated.
#[derive(Debug, Clone, Default)]
pub struct CategoryCatalog {
    entries: Vec<CategoryEntry>,
    labels: BTreeSet<String>,
}

impl CategoryCatalog {
    /// Labels are trimmed and lower-cased; blanks and repeats are skipped.
    pub fn new(entries: Vec<CategoryEntry>) -> Self {
        let mut labels = BTreeSet::new();
        let mut kept = Vec::with_capacity(entries.len());
        for mut entry in entries {
            let label = entry.category.trim().to_lowercase();
            if label.is_empty() || !labels.insert(label.clone()) {
                continue;
            }
            entry.category = label;
            entry.description = entry
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty());
            kept.push(entry);
        }
        Self { entries: kept, labels }
    }

    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(
            labels
                .into_iter()
                .map(|l| CategoryEntry::new(l.as_ref(), None))
                .collect(),
        )
    }

    pub fn load(store: &impl TableStore<CategoryEntry>) -> Result<Self> {
        let catalog = Self::new(store.load()?);
        tracing::info!(categories = catalog.len(), "loaded approved categories");
        Ok(catalog)
    }

    pub fn entries(&self) -> &[CategoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Case-insensitive membership. Returns the stored (lower-case) label.
    pub fn canonical(&self, candidate: &str) -> Option<String> {
        let wanted = candidate.trim().to_lowercase();
        if wanted == NO_CATEGORY || self.labels.contains(&wanted) {
            Some(wanted)
        } else {
            None
        }
    }

    pub fn is_approved(&self, candidate: &str) -> bool {
        self.canonical(candidate).is_some()
    }

    /// Categories that are not in the approved set, exact match on the stored label.
    pub fn unapproved<'a>(&self, categories: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
        categories
            .into_iter()
            .filter(|c| *c != NO_CATEGORY && !self.labels.contains(*c))
            .map(str::to_string)
            .collect()
    }

    /// Post-merge audit. Only reports; the history is already written.
    ///
    /// Anything returned here slipped past resolution, usually a learned
    /// mapping that points at a category later removed from the catalog.
    pub fn audit(&self, records: &[TransactionRecord]) -> BTreeSet<String> {
        let offending = self.unapproved(records.iter().filter_map(|r| r.category.as_deref()));
        if offending.is_empty() {
            tracing::info!("history contains no unapproved categories");
        } else {
            tracing::warn!(
                categories = ?offending,
                "history contains categories missing from the approved set"
            );
        }
        offending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryTable;
    use chrono::NaiveDate;

    fn catalog() -> CategoryCatalog {
        CategoryCatalog::new(vec![
            CategoryEntry::new("Groceries", None),
            CategoryEntry::new("dining", Some("restaurants, bakeries, cafes")),
            CategoryEntry::new("car/bike/metro", Some("  ")),
            CategoryEntry::new("groceries", None),
            CategoryEntry::new("", None),
        ])
    }

    #[test]
    fn test_new_normalizes_and_dedupes() {
        let c = catalog();
        assert_eq!(c.len(), 3);
        assert_eq!(c.entries()[0].category, "groceries");
        assert_eq!(c.entries()[2].description, None);
    }

    #[test]
    fn test_canonical_is_case_insensitive() {
        let c = catalog();
        assert_eq!(c.canonical(" Dining "), Some("dining".to_string()));
        assert_eq!(c.canonical("CAR/BIKE/METRO"), Some("car/bike/metro".to_string()));
        assert_eq!(c.canonical("groceriez"), None);
        assert_eq!(c.canonical("car"), None);
    }

    #[test]
    fn test_no_category_is_always_approved() {
        let c = CategoryCatalog::from_labels(["dining"]);
        assert!(c.is_approved("No Category"));
        assert!(c.unapproved(["no category"]).is_empty());
    }

    #[test]
    fn test_audit_reports_stale_categories() {
        let c = catalog();
        let d = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let rows = vec![
            TransactionRecord::new(d, 1, "a").with_category(Some("dining")),
            TransactionRecord::new(d, 1, "b").with_category(Some("takeout")),
            TransactionRecord::new(d, 1, "c").with_category(Some("takeout")),
        ];
        let offending = c.audit(&rows);
        assert_eq!(offending.into_iter().collect::<Vec<_>>(), vec!["takeout".to_string()]);
    }

    #[test]
    fn test_load_from_store() {
        let store = MemoryTable::new(
            "categories",
            vec![CategoryEntry::new("home", Some("Any home improvements or furniture"))],
        );
        let c = CategoryCatalog::load(&store).unwrap();
        assert!(c.is_approved("HOME"));
    }
}
