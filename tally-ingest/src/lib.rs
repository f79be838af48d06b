//! tally-ingest: source adapters that normalize statement exports and the cash
//! ledger into canonical transaction batches.

pub mod inbox;
pub mod parsers;

pub use inbox::{archive_processed, list_statement_files};
pub use parsers::capital_one::{parse_capital_one_csv, parse_capital_one_reader};
pub use parsers::notion_cash::{CashLedgerPage, cash_ledger_batch, parse_cash_ledger_page};
