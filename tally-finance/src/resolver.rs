//! Tiered category resolution.
//!
//! ```text
//!   Lookup ──hit──────────────────────────────► Resolved (mapping / source)
//!     │ miss
//!     ▼
//!   Oracle ──approved answer, learn───────────► Resolved (oracle)
//!     │ rejected answer or error
//!     ▼
//!   Interactive ──approved input, learn──────► Resolved (operator)
//!     ▲   │ invalid input
//!     └───┘
//! ```
//!
//! Oracle and operator answers are written to the learned mapping as soon as
//! they are accepted.

use tally_core::{CategoryCatalog, Error, Result, TableStore, TransactionRecord};

use crate::mapping::{LearnedMapping, MappingEntry};
use crate::operator::{CategoryRequest, Fallback, Operator};
use crate::oracle::{CategoryOracle, clean_response, instruction_prompt, user_query};

/// Which tier produced a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    LearnedMapping,
    /// The source's own category, already approved. Cash ledger entries mostly.
    SourceReported,
    Oracle,
    Operator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub category: String,
    pub tier: Tier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveState {
    Lookup,
    Oracle,
    Interactive(Fallback),
    Resolved(Resolution),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub learned_mapping: usize,
    pub source_reported: usize,
    pub oracle: usize,
    pub operator: usize,
    pub oracle_rejected: usize,
    pub oracle_failed: usize,
}

impl ResolveStats {
    fn count(&mut self, tier: Tier) {
        match tier {
            Tier::LearnedMapping => self.learned_mapping += 1,
            Tier::SourceReported => self.source_reported += 1,
            Tier::Oracle => self.oracle += 1,
            Tier::Operator => self.operator += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.learned_mapping + self.source_reported + self.oracle + self.operator
    }
}

pub struct CategoryResolver<M> {
    catalog: CategoryCatalog,
    mapping: LearnedMapping<M>,
    oracle: Option<Box<dyn CategoryOracle>>,
    operator: Box<dyn Operator>,
    instruction: String,
    stats: ResolveStats,
}

impl<M: TableStore<MappingEntry>> CategoryResolver<M> {
    pub fn new(catalog: CategoryCatalog, mapping: LearnedMapping<M>, operator: Box<dyn Operator>) -> Self {
        let instruction = instruction_prompt(&catalog);
        Self {
            catalog,
            mapping,
            oracle: None,
            operator,
            instruction,
            stats: ResolveStats::default(),
        }
    }

    pub fn with_oracle(mut self, oracle: Box<dyn CategoryOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn catalog(&self) -> &CategoryCatalog {
        &self.catalog
    }

    pub fn mapping(&self) -> &LearnedMapping<M> {
        &self.mapping
    }

    pub fn stats(&self) -> ResolveStats {
        self.stats
    }

    /// Advance one transition. `Resolved` is terminal and returned unchanged.
    pub fn step(&mut self, state: ResolveState, record: &TransactionRecord) -> Result<ResolveState> {
        match state {
            ResolveState::Lookup => Ok(self.lookup(record)),
            ResolveState::Oracle => self.ask_oracle(record),
            ResolveState::Interactive(reason) => self.ask_operator(record, reason),
            resolved @ ResolveState::Resolved(_) => Ok(resolved),
        }
    }

    /// Run the state machine to completion for one record.
    pub fn resolve(&mut self, record: &TransactionRecord) -> Result<Resolution> {
        let mut state = ResolveState::Lookup;
        loop {
            state = self.step(state, record)?;
            if let ResolveState::Resolved(resolution) = state {
                self.stats.count(resolution.tier);
                return Ok(resolution);
            }
        }
    }

    /// Resolve every record in place. Stops at the first abort.
    pub fn resolve_all(&mut self, records: &mut [TransactionRecord]) -> Result<ResolveStats> {
        for record in records.iter_mut() {
            let resolution = self.resolve(record)?;
            tracing::debug!(
                counterparty = %record.counterparty_original,
                category = %resolution.category,
                tier = ?resolution.tier,
                "resolved category"
            );
            record.category = Some(resolution.category);
        }
        Ok(self.stats)
    }

    fn lookup(&self, record: &TransactionRecord) -> ResolveState {
        if let Some(category) = self.mapping.lookup(&record.counterparty_normalized) {
            return ResolveState::Resolved(Resolution {
                category: category.to_string(),
                tier: Tier::LearnedMapping,
            });
        }

        if let Some(category) = record.category.as_deref().and_then(|c| self.catalog.canonical(c)) {
            return ResolveState::Resolved(Resolution {
                category,
                tier: Tier::SourceReported,
            });
        }

        if self.oracle.is_some() {
            ResolveState::Oracle
        } else {
            ResolveState::Interactive(Fallback::NoOracle)
        }
    }

    fn ask_oracle(&mut self, record: &TransactionRecord) -> Result<ResolveState> {
        let Some(oracle) = self.oracle.as_ref() else {
            return Ok(ResolveState::Interactive(Fallback::NoOracle));
        };

        let query = user_query(&record.counterparty_original);
        match oracle.classify(&self.instruction, &query) {
            Ok(raw) => {
                let candidate = clean_response(&raw);
                match self.catalog.canonical(&candidate) {
                    Some(category) => {
                        tracing::info!(
                            counterparty = %record.counterparty_normalized,
                            category = %category,
                            "oracle labeled counterparty"
                        );
                        self.mapping.learn(&record.counterparty_normalized, &category)?;
                        Ok(ResolveState::Resolved(Resolution {
                            category,
                            tier: Tier::Oracle,
                        }))
                    }
                    None => {
                        tracing::warn!(
                            counterparty = %record.counterparty_original,
                            answer = %candidate,
                            "oracle answered with an unapproved category"
                        );
                        self.stats.oracle_rejected += 1;
                        Ok(ResolveState::Interactive(Fallback::Rejected(candidate)))
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    counterparty = %record.counterparty_original,
                    error = %format!("{e:#}"),
                    "oracle call failed"
                );
                self.stats.oracle_failed += 1;
                Ok(ResolveState::Interactive(Fallback::Failed(format!("{e:#}"))))
            }
        }
    }

    fn ask_operator(&mut self, record: &TransactionRecord, reason: Fallback) -> Result<ResolveState> {
        let request = CategoryRequest {
            record,
            reason: &reason,
        };
        let answer = self.operator.ask_category(request).map_err(|e| {
            tracing::warn!(error = %format!("{e:#}"), "reading operator input failed");
            Error::Aborted(record.counterparty_original.clone())
        })?;

        let Some(input) = answer else {
            return Err(Error::Aborted(record.counterparty_original.clone()));
        };

        match self.catalog.canonical(&input) {
            Some(category) => {
                self.mapping.learn(&record.counterparty_normalized, &category)?;
                Ok(ResolveState::Resolved(Resolution {
                    category,
                    tier: Tier::Operator,
                }))
            }
            None => {
                self.operator.reject(&input);
                Ok(ResolveState::Interactive(reason))
            }
        }
    }
}
