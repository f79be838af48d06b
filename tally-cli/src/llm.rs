use anyhow::{Context, Result, bail};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use tally_finance::CategoryOracle;

use crate::config::OracleSection;
use crate::state::secret_from_env;

/// Chat-completions client used as the categorization oracle.
pub struct OpenAiOracle {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MsgOut,
}

#[derive(Debug, Deserialize)]
struct MsgOut {
    content: Option<String>,
}

impl OpenAiOracle {
    /// `Ok(None)` when the oracle is disabled or no API key is set.
    pub fn from_config(cfg: &OracleSection) -> Result<Option<Self>> {
        if !cfg.enabled {
            return Ok(None);
        }
        let Some(api_key) = secret_from_env(&cfg.api_key_env) else {
            tracing::warn!(var = %cfg.api_key_env, "oracle API key not set; unknown counterparties go to the operator");
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build http client")?;

        Ok(Some(Self {
            client,
            url: completions_url(&cfg.base_url),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            api_key,
        }))
    }

    async fn complete(&self, system: &str, query: &str) -> Result<String> {
        let body = Req {
            model: &self.model,
            messages: vec![
                Msg { role: "system", content: system },
                Msg { role: "user", content: query },
            ],
            temperature: self.temperature,
        };

        let resp = self
            .client
            .post(&self.url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("openai request")?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            bail!("openai error: {status} {txt}");
        }

        let out: Resp = resp.json().await.context("parse openai response")?;
        first_choice(out)
    }
}

impl CategoryOracle for OpenAiOracle {
    fn classify(&self, system: &str, query: &str) -> Result<String> {
        // Called from inside the #[tokio::main] runtime; a nested block_on would panic.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            tokio::task::block_in_place(|| handle.block_on(self.complete(system, query)))
        } else {
            let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
            rt.block_on(self.complete(system, query))
        }
    }
}

fn completions_url(base_url: &str) -> String {
    format!("{}/v1/chat/completions", base_url.trim_end_matches('/'))
}

fn first_choice(out: Resp) -> Result<String> {
    let content = out
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();
    let content = content.trim();
    if content.is_empty() {
        bail!("openai returned an empty completion");
    }
    Ok(content.to_string())
}
