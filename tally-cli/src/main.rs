use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use tally_core::{
    CATALOG_COLUMNS, CategoryCatalog, CategoryEntry, CsvTable, HISTORY_COLUMNS, SourceBatch, TableStore,
    TransactionRecord,
};
use tally_finance::{CategoryResolver, LearnedMapping, MAPPING_COLUMNS, MappingEntry, Pipeline, RunReport};
use tally_ingest::{archive_processed, list_statement_files, parse_capital_one_csv};

mod config;
mod llm;
mod notion;
mod prompt;
mod state;

use config::{Config, DataSection};

#[derive(Parser, Debug)]
#[command(
    name = "tally",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("TALLY_BUILD_SHA"), ")"),
    about = "Categorize card statements and the cash ledger into one transaction history"
)]
struct Cli {
    /// Data directory (overrides [data].dir from the config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import statements from <data>/temp and the cash ledger, categorize, merge into history
    Run {
        /// Skip the Notion cash ledger
        #[arg(long)]
        no_cash: bool,

        /// Never call the oracle; unknown counterparties go straight to the prompt
        #[arg(long)]
        no_oracle: bool,

        /// Leave imported statement files in <data>/temp
        #[arg(long)]
        keep_files: bool,
    },

    /// Create the data directory and empty tables (existing files are left alone)
    Init,

    /// Report categories in the history that are not approved
    Audit,

    /// List approved categories
    Categories,

    /// Config file commands
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write ~/.tally/config.toml with defaults
    Init,
    /// Print the effective config
    Show,
}

struct Tables {
    categories: CsvTable<CategoryEntry>,
    mapping: CsvTable<MappingEntry>,
    history: CsvTable<TransactionRecord>,
}

impl Tables {
    fn new(data: &DataSection) -> Self {
        Self {
            categories: CsvTable::new("categories", data.categories_path(), CATALOG_COLUMNS),
            mapping: CsvTable::new("categorized businesses", data.mapping_path(), MAPPING_COLUMNS),
            history: CsvTable::new("transactions history", data.history_path(), HISTORY_COLUMNS),
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TALLY_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut cfg = config::load_config()?;
    if let Some(dir) = cli.data_dir {
        cfg.data.dir = dir;
    }

    match cli.command {
        Command::Run {
            no_cash,
            no_oracle,
            keep_files,
        } => {
            run(&cfg, no_cash, no_oracle, keep_files).await?;
        }
        Command::Init => init_data(&cfg.data)?,
        Command::Audit => audit(&cfg.data)?,
        Command::Categories => list_categories(&cfg.data)?,
        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => config::show_config(&cfg)?,
        },
    }

    Ok(())
}

async fn run(cfg: &Config, no_cash: bool, no_oracle: bool, keep_files: bool) -> Result<()> {
    let data = &cfg.data;
    let tables = Tables::new(data);

    let files = list_statement_files(&data.temp_dir())?;
    let mut batches: Vec<SourceBatch> = Vec::with_capacity(files.len() + 1);
    for path in &files {
        let batch = parse_capital_one_csv(path)
            .map_err(|e| tally_core::Error::source_format(path.display().to_string(), format!("{e:#}")))?;
        println!("Parsed {} rows from {}", batch.records.len(), path.display());
        batches.push(batch);
    }

    if !no_cash {
        if let Some(client) = notion::NotionClient::from_config(&cfg.notion)? {
            let batch = client.fetch_cash_ledger().await?;
            println!("Fetched {} cash ledger entries", batch.records.len());
            batches.push(batch);
        }
    }

    if batches.is_empty() {
        println!("No new transactions; re-sorting history.");
    }

    let catalog = CategoryCatalog::load(&tables.categories)?;
    if catalog.is_empty() {
        tracing::warn!(path = %data.categories_path().display(), "approved category list is empty");
    }
    let mapping = LearnedMapping::load(&tables.mapping)?;
    let operator = prompt::TerminalOperator::stdio(&catalog);
    let mut resolver = CategoryResolver::new(catalog, mapping, Box::new(operator));
    if !no_oracle {
        if let Some(oracle) = llm::OpenAiOracle::from_config(&cfg.oracle)? {
            resolver = resolver.with_oracle(Box::new(oracle));
        }
    }

    let today = chrono::Local::now().date_naive();
    let snapshot: CsvTable<TransactionRecord> =
        CsvTable::new("imported transactions", data.snapshot_path(today), HISTORY_COLUMNS);
    let report = Pipeline::new(resolver, &tables.history)
        .with_snapshot(Box::new(snapshot))
        .run(batches)?;

    print_report(&report, &data.history_path());

    if !keep_files && !files.is_empty() {
        let moved = archive_processed(&data.temp_dir(), &files)?;
        let archive = data.temp_dir().join(tally_ingest::inbox::PROCESSED_DIR);
        println!("Archived {} statement file(s) to {}", moved.len(), archive.display());
    }

    Ok(())
}

fn print_report(report: &RunReport, history: &Path) {
    let r = &report.resolve;
    println!();
    println!(
        "Categorized {} transaction(s) from {} source(s) (skipped {} without a debit)",
        report.ingested, report.batches, report.dropped_missing_debit
    );
    println!(
        "  learned mapping: {} | source category: {} | oracle: {} | you: {}",
        r.learned_mapping, r.source_reported, r.oracle, r.operator
    );
    if r.oracle_rejected + r.oracle_failed > 0 {
        println!(
            "  oracle answers rejected: {} | oracle failures: {}",
            r.oracle_rejected, r.oracle_failed
        );
    }
    println!(
        "History {}: {} -> {} rows ({} new, {} updated)",
        history.display(),
        report.merge.previous_len,
        report.merge.history.len(),
        report.merge.added,
        report.merge.replaced
    );
    print_unapproved(&report.unapproved);
}

fn print_unapproved<'a>(categories: impl IntoIterator<Item = &'a String>) {
    let list: Vec<&str> = categories.into_iter().map(String::as_str).collect();
    if list.is_empty() {
        println!("All categories in history are approved.");
    } else {
        println!("Categories not in the approved list: {}", list.join(", "));
    }
}

fn init_data(data: &DataSection) -> Result<()> {
    let temp = data.temp_dir();
    fs::create_dir_all(&temp).with_context(|| format!("create {}", temp.display()))?;
    let tables = Tables::new(data);

    let mut created = Vec::new();
    if !tables.categories.exists() {
        tables.categories.save(&[])?;
        created.push(tables.categories.path().to_path_buf());
    }
    if !tables.mapping.exists() {
        tables.mapping.save(&[])?;
        created.push(tables.mapping.path().to_path_buf());
    }
    if !tables.history.exists() {
        tables.history.save(&[])?;
        created.push(tables.history.path().to_path_buf());
    }

    if created.is_empty() {
        println!("Data directory already set up: {}", data.dir.display());
    } else {
        println!("Created:");
        for p in &created {
            println!("- {}", p.display());
        }
    }
    println!("\nNext:");
    println!("- add approved categories to {}", data.categories_path().display());
    println!("- drop statement exports into {}", temp.display());
    println!("- tally run");
    Ok(())
}

fn audit(data: &DataSection) -> Result<()> {
    let tables = Tables::new(data);
    let catalog = CategoryCatalog::load(&tables.categories)?;
    let history = tables
        .history
        .load()
        .map_err(|e| tally_core::Error::HistoryUnavailable(e.to_string()))?;
    println!("{} row(s) in {}", history.len(), data.history_path().display());
    print_unapproved(&catalog.audit(&history));
    Ok(())
}

fn list_categories(data: &DataSection) -> Result<()> {
    let tables = Tables::new(data);
    let catalog = CategoryCatalog::load(&tables.categories)?;
    if catalog.is_empty() {
        bail!("no approved categories in {}", data.categories_path().display());
    }
    for e in catalog.entries() {
        match &e.description {
            Some(d) => println!("{} ({})", e.category, d),
            None => println!("{}", e.category),
        }
    }
    Ok(())
}
