//! One categorization run: validate, identify, resolve, snapshot, merge, audit.

use std::collections::BTreeSet;

use tally_core::{
    HistoryMerger, MergeOutcome, Result, SourceBatch, TableStore, TransactionRecord, assign_sequences,
};

use crate::mapping::MappingEntry;
use crate::resolver::{CategoryResolver, ResolveStats};

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub batches: usize,
    /// Records that went through resolution.
    pub ingested: usize,
    pub dropped_missing_debit: usize,
    pub resolve: ResolveStats,
    pub merge: MergeOutcome,
    /// Categories in the merged history that are not approved.
    pub unapproved: BTreeSet<String>,
}

pub struct Pipeline<H, M> {
    resolver: CategoryResolver<M>,
    merger: HistoryMerger<H>,
    snapshot: Option<Box<dyn TableStore<TransactionRecord>>>,
}

impl<H, M> Pipeline<H, M>
where
    H: TableStore<TransactionRecord>,
    M: TableStore<MappingEntry>,
{
    pub fn new(resolver: CategoryResolver<M>, history: H) -> Self {
        Self {
            resolver,
            merger: HistoryMerger::new(history),
            snapshot: None,
        }
    }

    /// Also write this run's categorized records, before merging, to `table`.
    pub fn with_snapshot(mut self, table: Box<dyn TableStore<TransactionRecord>>) -> Self {
        self.snapshot = Some(table);
        self
    }

    pub fn resolver(&self) -> &CategoryResolver<M> {
        &self.resolver
    }

    /// Every batch is validated before any record is resolved, and the history
    /// must be readable before the operator is asked anything. Learned
    /// mappings survive a failed merge.
    pub fn run(mut self, mut batches: Vec<SourceBatch>) -> Result<RunReport> {
        for batch in &batches {
            batch.validate()?;
        }
        // Parse it now so a broken history fails before anyone is prompted.
        // The merge reads it again, since the interactive tier can run long.
        self.merger.load()?;

        let mut dropped_missing_debit = 0;
        let mut records = Vec::new();
        for batch in &mut batches {
            let dropped = batch.drop_missing_debit();
            if dropped > 0 {
                tracing::info!(source = %batch.label, dropped, "skipped rows without a debit");
            }
            dropped_missing_debit += dropped;
            assign_sequences(&mut batch.records);
            records.append(&mut batch.records);
        }
        let ingested = records.len();
        tracing::info!(batches = batches.len(), records = ingested, "categorizing transactions");

        let resolve = self.resolver.resolve_all(&mut records)?;

        if let Some(snapshot) = self.snapshot.as_ref().filter(|_| !records.is_empty()) {
            snapshot.save(&records)?;
            tracing::info!(table = %snapshot.name(), records = records.len(), "wrote run snapshot");
        }

        let merge = self.merger.merge(records)?;
        let unapproved = self.resolver.catalog().audit(&merge.history);

        Ok(RunReport {
            batches: batches.len(),
            ingested,
            dropped_missing_debit,
            resolve,
            merge,
            unapproved,
        })
    }
}
