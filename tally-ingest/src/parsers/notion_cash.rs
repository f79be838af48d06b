//! Cash ledger kept in a Notion database.
//!
//! Parses the JSON body of `POST /v1/databases/{id}/query`. Each page carries:
//!   person_or_business  title   -> counterparty
//!   date                date    -> date (start, date part only)
//!   category            select  -> source category
//!   debit / credit      number  -> amounts, either may be empty

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::Deserialize;
use tally_core::{SourceBatch, SourceKind, TransactionRecord};

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<Page>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    properties: Properties,
}

#[derive(Debug, Default, Deserialize)]
struct Properties {
    person_or_business: Option<TitleProperty>,
    date: Option<DateProperty>,
    category: Option<SelectProperty>,
    debit: Option<NumberProperty>,
    credit: Option<NumberProperty>,
}

#[derive(Debug, Deserialize)]
struct TitleProperty {
    #[serde(default)]
    title: Vec<RichText>,
}

#[derive(Debug, Deserialize)]
struct RichText {
    #[serde(default)]
    plain_text: String,
}

#[derive(Debug, Deserialize)]
struct DateProperty {
    date: Option<DateValue>,
}

#[derive(Debug, Deserialize)]
struct DateValue {
    start: String,
}

#[derive(Debug, Deserialize)]
struct SelectProperty {
    select: Option<SelectValue>,
}

#[derive(Debug, Deserialize)]
struct SelectValue {
    name: String,
}

#[derive(Debug, Deserialize)]
struct NumberProperty {
    number: Option<f64>,
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq)]
pub struct CashLedgerPage {
    pub records: Vec<TransactionRecord>,
    /// Cursor for the next request, present only when more pages exist.
    pub next_cursor: Option<String>,
}

/// Parse one query response body into cash records.
pub fn parse_cash_ledger_page(body: &str) -> Result<CashLedgerPage> {
    let resp: QueryResponse = serde_json::from_str(body).context("parse notion query response")?;

    let mut records = Vec::with_capacity(resp.results.len());
    for (i, page) in resp.results.into_iter().enumerate() {
        let props = page.properties;

        let name = props
            .person_or_business
            .and_then(|t| t.title.into_iter().next())
            .map(|t| t.plain_text)
            .unwrap_or_default();

        let Some(start) = props.date.and_then(|d| d.date).map(|d| d.start) else {
            bail!("cash ledger entry {} ('{}') has no date", i + 1, name);
        };
        let date = parse_start_date(&start)
            .with_context(|| format!("cash ledger entry {} has a bad date '{start}'", i + 1))?;

        let category = props.category.and_then(|c| c.select).map(|s| s.name);

        records.push(
            TransactionRecord::cash(date, &name)
                .with_category_original(category.as_deref())
                .with_category(category.as_deref())
                .with_debit(props.debit.and_then(|n| n.number))
                .with_credit(props.credit.and_then(|n| n.number)),
        );
    }

    Ok(CashLedgerPage {
        records,
        next_cursor: if resp.has_more { resp.next_cursor } else { None },
    })
}

/// Collect pages into one batch.
pub fn cash_ledger_batch(label: &str, pages: Vec<CashLedgerPage>) -> SourceBatch {
    let records = pages.into_iter().flat_map(|p| p.records).collect();
    SourceBatch::new(SourceKind::Cash, label, records)
}

/// `"2024-01-05"` or `"2024-01-05T09:30:00.000-05:00"`.
fn parse_start_date(start: &str) -> Option<NaiveDate> {
    let day = start.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}
