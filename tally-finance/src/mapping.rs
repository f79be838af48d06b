//! Learned counterparty → category mapping (`categorized_businesses.csv`).
//!
//! Append-only with last-write-wins: re-categorizing a counterparty appends a
//! new row, and repeating an existing (counterparty, category) pair collapses
//! onto one row. Every change is saved immediately so an interrupted run keeps
//! what it learned.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tally_core::{Result, TableStore};

pub const MAPPING_COLUMNS: &[&str] = &["business_or_person", "category"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Normalized counterparty.
    #[serde(rename = "business_or_person")]
    pub counterparty: String,
    pub category: String,
}

impl MappingEntry {
    pub fn new(counterparty: &str, category: &str) -> Self {
        Self {
            counterparty: counterparty.to_string(),
            category: category.to_string(),
        }
    }
}

pub struct LearnedMapping<S> {
    store: S,
    entries: Vec<MappingEntry>,
    /// counterparty -> position of its latest entry
    index: HashMap<String, usize>,
}

impl<S: TableStore<MappingEntry>> LearnedMapping<S> {
    /// Read the mapping once at the start of a run.
    pub fn load(store: S) -> Result<Self> {
        let rows = store.load()?;

        // Collapse repeated pairs onto their last occurrence.
        let mut entries: Vec<MappingEntry> = Vec::with_capacity(rows.len());
        for (i, row) in rows.into_iter().enumerate() {
            if row.counterparty.trim().is_empty() || row.category.trim().is_empty() {
                tracing::warn!(
                    table = %store.name(),
                    row = i + 1,
                    counterparty = %row.counterparty,
                    "skipping learned mapping row with a blank field"
                );
                continue;
            }
            entries.retain(|e| e != &row);
            entries.push(row);
        }

        let mut mapping = Self {
            store,
            entries,
            index: HashMap::new(),
        };
        mapping.reindex();
        tracing::info!(
            table = %mapping.store.name(),
            entries = mapping.entries.len(),
            "loaded learned mapping"
        );
        Ok(mapping)
    }

    pub fn lookup(&self, counterparty: &str) -> Option<&str> {
        self.index
            .get(counterparty)
            .map(|&i| self.entries[i].category.as_str())
            .filter(|c| !c.trim().is_empty())
    }

    /// Record `counterparty → category` and save the table.
    /// Returns false (and writes nothing) when that is already the current mapping.
    pub fn learn(&mut self, counterparty: &str, category: &str) -> Result<bool> {
        if self.lookup(counterparty) == Some(category) {
            return Ok(false);
        }

        let entry = MappingEntry::new(counterparty, category);
        self.entries.retain(|e| e != &entry);
        self.entries.push(entry);
        self.reindex();
        self.store.save(&self.entries)?;

        tracing::info!(counterparty, category, "learned category mapping");
        Ok(true)
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (i, e) in self.entries.iter().enumerate() {
            self.index.insert(e.counterparty.clone(), i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::MemoryTable;

    fn store(rows: &[(&str, &str)]) -> MemoryTable<MappingEntry> {
        MemoryTable::new(
            "mapping",
            rows.iter().map(|(b, c)| MappingEntry::new(b, c)).collect(),
        )
    }

    #[test]
    fn test_lookup_uses_last_entry() {
        let m = LearnedMapping::load(store(&[("uber", "travel"), ("uber", "car/bike/metro")])).unwrap();
        assert_eq!(m.lookup("uber"), Some("car/bike/metro"));
        assert_eq!(m.lookup("lyft"), None);
    }

    #[test]
    fn test_learn_persists_immediately() {
        let table = store(&[]);
        let mut m = LearnedMapping::load(table.clone()).unwrap();
        assert!(m.learn("unknown vendor xyz", "no category").unwrap());
        assert_eq!(
            table.snapshot(),
            vec![MappingEntry::new("unknown vendor xyz", "no category")]
        );
    }

    #[test]
    fn test_relearning_same_pair_is_a_noop() {
        let table = store(&[("bart", "car/bike/metro")]);
        let mut m = LearnedMapping::load(table.clone()).unwrap();
        assert!(!m.learn("bart", "car/bike/metro").unwrap());
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn test_recategorize_appends_and_wins() {
        let table = store(&[("amazon", "merchandise")]);
        let mut m = LearnedMapping::load(table.clone()).unwrap();
        m.learn("amazon", "home").unwrap();
        assert_eq!(m.lookup("amazon"), Some("home"));
        assert_eq!(table.snapshot().len(), 2);

        // Switching back collapses the old pair instead of adding a third row.
        m.learn("amazon", "merchandise").unwrap();
        assert_eq!(m.lookup("amazon"), Some("merchandise"));
        assert_eq!(
            table.snapshot(),
            vec![
                MappingEntry::new("amazon", "home"),
                MappingEntry::new("amazon", "merchandise"),
            ]
        );
    }

    #[test]
    fn test_blank_rows_are_skipped_on_load() {
        let m = LearnedMapping::load(store(&[("lidl", ""), ("aldi", " "), ("", "groceries"), ("bart", "car/bike/metro")]))
            .unwrap();
        assert_eq!(m.lookup("lidl"), None);
        assert_eq!(m.lookup("aldi"), None);
        assert_eq!(m.lookup(""), None);
        assert_eq!(m.entries(), &[MappingEntry::new("bart", "car/bike/metro")]);
    }

    #[test]
    fn test_load_collapses_duplicate_pairs() {
        let m = LearnedMapping::load(store(&[("a", "x"), ("a", "x"), ("b", "y")])).unwrap();
        assert_eq!(m.len(), 2);
    }
}
