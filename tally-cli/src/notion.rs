use anyhow::{Context, Result, bail};
use reqwest::header::AUTHORIZATION;
use serde_json::json;

use tally_core::SourceBatch;
use tally_ingest::{CashLedgerPage, cash_ledger_batch, parse_cash_ledger_page};

use crate::config::NotionSection;
use crate::state::secret_from_env;

pub const CASH_LEDGER_LABEL: &str = "notion cash ledger";

pub struct NotionClient {
    client: reqwest::Client,
    base_url: String,
    version: String,
    api_key: String,
    database_id: String,
}

impl NotionClient {
    /// `Ok(None)` when the ledger is disabled or its credentials are not set.
    pub fn from_config(cfg: &NotionSection) -> Result<Option<Self>> {
        if !cfg.enabled {
            return Ok(None);
        }
        let (Some(api_key), Some(database_id)) =
            (secret_from_env(&cfg.api_key_env), secret_from_env(&cfg.database_id_env))
        else {
            tracing::warn!(
                key_var = %cfg.api_key_env,
                database_var = %cfg.database_id_env,
                "notion credentials not set; skipping cash ledger"
            );
            return Ok(None);
        };

        Ok(Some(Self {
            client: reqwest::Client::new(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            version: cfg.version.clone(),
            api_key,
            database_id,
        }))
    }

    /// Query every page of the cash ledger database.
    pub async fn fetch_cash_ledger(&self) -> Result<SourceBatch> {
        let url = format!("{}/v1/databases/{}/query", self.base_url, self.database_id);
        let mut pages: Vec<CashLedgerPage> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let body = match &cursor {
                Some(c) => json!({ "start_cursor": c }),
                None => json!({}),
            };
            let resp = self
                .client
                .post(&url)
                .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
                .header("Notion-Version", &self.version)
                .json(&body)
                .send()
                .await
                .context("notion request")?;

            let status = resp.status();
            let txt = resp.text().await.context("read notion response")?;
            if !status.is_success() {
                bail!("notion error: {status} {txt}");
            }

            let page = parse_cash_ledger_page(&txt).context("parse notion response")?;
            cursor = page.next_cursor.clone();
            pages.push(page);
            if cursor.is_none() {
                break;
            }
        }

        let batch = cash_ledger_batch(CASH_LEDGER_LABEL, pages);
        tracing::info!(records = batch.records.len(), "fetched cash ledger");
        Ok(batch)
    }
}
