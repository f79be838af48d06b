use std::io::{self, BufRead, Write};

use tally_core::{CategoryCatalog, TransactionRecord};
use tally_finance::{CategoryRequest, Fallback, Operator};

/// Asks for categories on a terminal. Also used with in-memory streams in tests.
pub struct TerminalOperator<R, W> {
    input: R,
    output: W,
    catalog_hint: String,
}

impl TerminalOperator<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio(catalog: &CategoryCatalog) -> Self {
        Self::new(io::stdin().lock(), io::stdout(), catalog)
    }
}

impl<R: BufRead, W: Write> TerminalOperator<R, W> {
    pub fn new(input: R, output: W, catalog: &CategoryCatalog) -> Self {
        let labels: Vec<&str> = catalog.entries().iter().map(|e| e.category.as_str()).collect();
        Self {
            input,
            output,
            catalog_hint: labels.join(", "),
        }
    }

    fn describe(&mut self, record: &TransactionRecord, reason: &Fallback) -> io::Result<()> {
        let amount = match (record.debit, record.credit) {
            (Some(d), _) => format!("${d:.2}"),
            (None, Some(c)) => format!("credit ${c:.2}"),
            (None, None) => "no amount".to_string(),
        };
        writeln!(self.output)?;
        writeln!(
            self.output,
            "{} | {} | {}",
            record.date, record.counterparty_original, amount
        )?;
        if let Some(orig) = &record.category_original {
            writeln!(self.output, "source category: {orig}")?;
        }
        match reason {
            Fallback::Rejected(answer) => writeln!(self.output, "suggested '{answer}' is not an approved category")?,
            Fallback::Failed(err) => writeln!(self.output, "automatic categorization failed: {err}")?,
            Fallback::NoOracle => {}
        }
        writeln!(self.output, "categories: {}", self.catalog_hint)
    }
}

impl<R: BufRead, W: Write> Operator for TerminalOperator<R, W> {
    fn ask_category(&mut self, request: CategoryRequest<'_>) -> anyhow::Result<Option<String>> {
        self.describe(request.record, request.reason)?;
        write!(self.output, "category: ")?;
        self.output.flush().ok();

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn reject(&mut self, input: &str) {
        writeln!(self.output, "'{input}' is not an approved category, try again").ok();
    }
}
