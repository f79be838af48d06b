//! Human-in-the-loop seam for the last categorization tier.

use tally_core::TransactionRecord;

/// Why the resolver is asking a person.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fallback {
    /// The oracle answered with a label outside the approved set.
    Rejected(String),
    /// The oracle call failed.
    Failed(String),
    /// No oracle is configured for this run.
    NoOracle,
}

/// Context shown to the operator for one transaction.
#[derive(Debug, Clone, Copy)]
pub struct CategoryRequest<'a> {
    pub record: &'a TransactionRecord,
    pub reason: &'a Fallback,
}

/// Blocking prompt. There is no timeout; a run waits for an answer.
pub trait Operator {
    /// Ask for a category. `Ok(None)` means input was closed, which aborts the run.
    fn ask_category(&mut self, request: CategoryRequest<'_>) -> anyhow::Result<Option<String>>;

    /// Tell the operator their last answer is not an approved category.
    fn reject(&mut self, input: &str);
}

impl<T: Operator + ?Sized> Operator for Box<T> {
    fn ask_category(&mut self, request: CategoryRequest<'_>) -> anyhow::Result<Option<String>> {
        (**self).ask_category(request)
    }

    fn reject(&mut self, input: &str) {
        (**self).reject(input)
    }
}
