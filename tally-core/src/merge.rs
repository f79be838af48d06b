//! History merge engine.
//!
//! New records go in front of the stored history, duplicates by identity key
//! are dropped keeping the first occurrence, and the result is sorted by date
//! (newest first), then category, then normalized counterparty.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::record::{IdentityKey, TransactionRecord};
use crate::storage::TableStore;

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Full history as persisted.
    pub history: Vec<TransactionRecord>,
    /// Rows in storage before the merge.
    pub previous_len: usize,
    /// Incoming records whose identity key was not in storage.
    pub added: usize,
    /// Incoming records that replaced a stored row with the same identity key.
    pub replaced: usize,
}

/// Pure merge: no storage involved.
pub fn merge_records(
    new_records: Vec<TransactionRecord>,
    existing: Vec<TransactionRecord>,
) -> MergeOutcome {
    let previous_len = existing.len();
    let incoming = new_records.len();

    let mut combined = new_records;
    combined.extend(existing);

    let (keep, added, replaced) = {
        let stored: HashSet<IdentityKey<'_>> =
            combined[incoming..].iter().map(|r| r.identity_key()).collect();
        let mut seen: HashSet<IdentityKey<'_>> = HashSet::with_capacity(combined.len());
        let mut added = 0;
        let mut replaced = 0;

        let keep: Vec<bool> = combined
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let key = r.identity_key();
                let first = seen.insert(key);
                if first && i < incoming {
                    if stored.contains(&key) {
                        replaced += 1;
                    } else {
                        added += 1;
                    }
                }
                first
            })
            .collect();
        (keep, added, replaced)
    };

    let mut history: Vec<TransactionRecord> = combined
        .into_iter()
        .zip(keep)
        .filter_map(|(r, k)| k.then_some(r))
        .collect();
    sort_history(&mut history);

    MergeOutcome {
        history,
        previous_len,
        added,
        replaced,
    }
}

/// Stable sort: date descending, category ascending, normalized counterparty ascending.
pub fn sort_history(records: &mut [TransactionRecord]) {
    records.sort_by(history_order);
}

fn history_order(a: &TransactionRecord, b: &TransactionRecord) -> Ordering {
    b.date
        .cmp(&a.date)
        .then_with(|| a.category.cmp(&b.category))
        .then_with(|| a.counterparty_normalized.cmp(&b.counterparty_normalized))
}

/// Merges batches into a history table. History is read fresh on every call.
pub struct HistoryMerger<S> {
    store: S,
}

impl<S: TableStore<TransactionRecord>> HistoryMerger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Load the stored history without merging anything.
    pub fn load(&self) -> Result<Vec<TransactionRecord>> {
        self.store
            .load()
            .map_err(|e| Error::HistoryUnavailable(e.to_string()))
    }

    /// Merge `new_records` into storage and overwrite it with the result.
    ///
    /// Every record must already carry a category. A missing or unreadable
    /// history aborts before anything is written.
    pub fn merge(&self, new_records: Vec<TransactionRecord>) -> Result<MergeOutcome> {
        let unresolved = new_records
            .iter()
            .find(|r| r.category.as_deref().is_none_or(|c| c.trim().is_empty()));
        if let Some(unresolved) = unresolved {
            return Err(Error::UnresolvedCategory(unresolved.counterparty_original.clone()));
        }

        let existing = self.load()?;
        let outcome = merge_records(new_records, existing);
        self.store.save(&outcome.history)?;

        tracing::info!(
            table = %self.store.name(),
            before = outcome.previous_len,
            after = outcome.history.len(),
            added = outcome.added,
            replaced = outcome.replaced,
            "merged transactions into history"
        );
        Ok(outcome)
    }
}
