//! Per-batch sequence numbers.
//!
//! Statements often list the same charge twice on one day (two tolls, two
//! coffees). Ranking identical rows by arrival order keeps them apart during
//! deduplication, while re-importing the same file yields the same numbers.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::record::{AmountKey, TransactionRecord};

type OwnedGroupKey = (NaiveDate, i64, String, AmountKey);

/// Assign `sequence` as the 1-based arrival rank within each
/// (date, card, counterparty_original, debit) group.
///
/// Only looks at the given slice; history is never consulted.
pub fn assign_sequences(records: &mut [TransactionRecord]) {
    let mut seen: HashMap<OwnedGroupKey, u32> = HashMap::new();

    for record in records.iter_mut() {
        let key = record.group_key();
        let owned = (
            key.date,
            key.card_or_account_number,
            key.counterparty_original.to_string(),
            key.debit,
        );
        let rank = seen.entry(owned).or_insert(0);
        *rank += 1;
        record.sequence = *rank;
    }
}
