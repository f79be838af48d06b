//! Scripted oracle and operator for unit and integration tests. Not used by the binary.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use anyhow::anyhow;

use crate::operator::{CategoryRequest, Fallback, Operator};
use crate::oracle::CategoryOracle;

/// Answers by counterparty. Unknown counterparties get an error.
pub struct ScriptedOracle {
    answers: Vec<(String, Result<String, String>)>,
    calls: Rc<Cell<usize>>,
}

impl ScriptedOracle {
    pub fn new<'a>(answers: impl IntoIterator<Item = (&'a str, Result<&'a str, &'a str>)>) -> Self {
        Self {
            answers: answers
                .into_iter()
                .map(|(who, a)| (who.to_string(), a.map(str::to_string).map_err(str::to_string)))
                .collect(),
            calls: Rc::new(Cell::new(0)),
        }
    }

    pub fn calls(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.calls)
    }
}

impl CategoryOracle for ScriptedOracle {
    fn classify(&self, _system: &str, query: &str) -> anyhow::Result<String> {
        self.calls.set(self.calls.get() + 1);
        let answer = self
            .answers
            .iter()
            .find(|(who, _)| query.contains(&format!("'{who}'")))
            .map(|(_, a)| a.clone())
            .ok_or_else(|| anyhow!("no scripted answer for query: {query}"))?;
        answer.map_err(|e| anyhow!(e))
    }
}

/// Replays a fixed list of answers, then reports closed input.
pub struct ScriptedOperator {
    answers: VecDeque<String>,
    requests: Rc<RefCell<Vec<Fallback>>>,
    rejected: Rc<RefCell<Vec<String>>>,
}

impl ScriptedOperator {
    pub fn new<'a>(answers: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            answers: answers.into_iter().map(str::to_string).collect(),
            requests: Rc::default(),
            rejected: Rc::default(),
        }
    }

    /// An operator whose input is already closed.
    pub fn silent() -> Self {
        Self::new([])
    }

    pub fn requests(&self) -> Rc<RefCell<Vec<Fallback>>> {
        Rc::clone(&self.requests)
    }

    pub fn rejected(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.rejected)
    }
}

impl Operator for ScriptedOperator {
    fn ask_category(&mut self, request: CategoryRequest<'_>) -> anyhow::Result<Option<String>> {
        self.requests.borrow_mut().push(request.reason.clone());
        Ok(self.answers.pop_front())
    }

    fn reject(&mut self, input: &str) {
        self.rejected.borrow_mut().push(input.to_string());
    }
}
