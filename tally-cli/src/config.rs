use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::state::ensure_tally_home;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataSection,
    pub oracle: OracleSection,
    pub notion: NotionSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    /// Relative paths resolve against the working directory.
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSection {
    pub enabled: bool,
    /// OpenAI-compatible API root; `/v1/chat/completions` is appended.
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotionSection {
    pub enabled: bool,
    pub base_url: String,
    pub version: String,
    pub api_key_env: String,
    pub database_id_env: String,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
        }
    }
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.1,
            timeout_secs: 30,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

impl Default for NotionSection {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.notion.com".to_string(),
            version: "2022-06-28".to_string(),
            api_key_env: "NOTION_API_KEY".to_string(),
            database_id_env: "CASH_TRANSACTIONS_DATABASE_ID".to_string(),
        }
    }
}

impl DataSection {
    pub fn categories_path(&self) -> PathBuf {
        self.dir.join("categories.csv")
    }

    pub fn mapping_path(&self) -> PathBuf {
        self.dir.join("categorized_businesses.csv")
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join("transactions_history.csv")
    }

    /// Incoming statement exports.
    pub fn temp_dir(&self) -> PathBuf {
        self.dir.join("temp")
    }

    pub fn snapshot_path(&self, day: NaiveDate) -> PathBuf {
        self.dir
            .join("imported_transactions")
            .join(format!("transactions_{}.csv", day.format("%Y-%m-%d")))
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_tally_home()?.join("config.toml"))
}

pub fn parse_config(s: &str) -> Result<Config> {
    toml::from_str(s).context("parse config.toml")
}

pub fn load_config() -> Result<Config> {
    let p = config_path()?;
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    parse_config(&s)
}

pub fn save_config(cfg: &Config) -> Result<()> {
    let p = config_path()?;
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(&Config::default())?;
    println!("Wrote {}", p.display());
    Ok(())
}

pub fn show_config(cfg: &Config) -> Result<()> {
    print!("{}", toml::to_string_pretty(cfg).context("serialize config")?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_roundtrip() {
        let cfg = Config::default();
        let s = toml::to_string_pretty(&cfg).unwrap();
        assert_eq!(parse_config(&s).unwrap(), cfg);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let cfg = parse_config(
            r#"
            [data]
            dir = "/srv/finance"

            [oracle]
            model = "gpt-4o-mini"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.data.dir, PathBuf::from("/srv/finance"));
        assert_eq!(cfg.oracle.model, "gpt-4o-mini");
        assert_eq!(cfg.oracle.api_key_env, "OPENAI_API_KEY");
        assert!(cfg.notion.enabled);
        assert_eq!(cfg.notion.version, "2022-06-28");
    }

    #[test]
    fn test_data_paths() {
        let data = DataSection::default();
        assert_eq!(data.history_path(), PathBuf::from("data/transactions_history.csv"));
        assert_eq!(
            data.snapshot_path(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()),
            PathBuf::from("data/imported_transactions/transactions_2024-03-09.csv")
        );
    }
}
