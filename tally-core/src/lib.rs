//! tally-core: canonical transaction records, identity assignment, history merge,
//! and the approved category catalog.

pub mod catalog;
pub mod error;
pub mod identity;
pub mod merge;
pub mod record;
pub mod storage;

pub use catalog::{CATALOG_COLUMNS, CategoryCatalog, CategoryEntry, NO_CATEGORY};
pub use error::{Error, Result};
pub use identity::assign_sequences;
pub use merge::{HistoryMerger, MergeOutcome, merge_records, sort_history};
pub use record::{
    AmountKey, CASH_ACCOUNT, HISTORY_COLUMNS, IdentityKey, SourceBatch, SourceKind,
    TransactionRecord, normalize_counterparty,
};
pub use storage::{CsvTable, MemoryTable, TableStore};
