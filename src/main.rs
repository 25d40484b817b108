use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dashsql::config::Config;
use dashsql::db::{create_pool, PgStore};
use dashsql::export::{render, ExportFormat};
use dashsql::gateway::{self, Gateway, SafetyReport};
use dashsql::ingest::CsvImporter;
use dashsql::model::{ParamValue, Params};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Run stored dashboard queries safely and load CSV files into PostgreSQL
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the catalog tables
    Migrate,
    /// Validate SQL offline and preview the bound statement
    Check {
        sql: String,
        /// Parameter as name=value (repeatable)
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
    /// Execute a stored query
    Execute {
        query_id: i64,
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
        /// Parameters as a JSON object, merged under any -p values
        #[arg(long)]
        params_json: Option<String>,
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
    },
    /// Import a CSV file as a new table, query and dashboard
    Import {
        file: PathBuf,
        /// Name recorded for the upload (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Show recent executions of a query
    Audit {
        query_id: i64,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected name=value, got {:?}", raw))
}

fn collect_params(pairs: Vec<(String, String)>, json: Option<&str>) -> Result<Params> {
    let mut params: Params = match json {
        Some(raw) => serde_json::from_str(raw).context("--params-json must be an object of scalars")?,
        None => Params::new(),
    };
    for (name, value) in pairs {
        params.insert(name, ParamValue::Text(value));
    }
    Ok(params)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Check { sql, params } => check(&sql, params)?,
        Command::Migrate => {
            let (_, store) = connect(cli.config.as_deref())?;
            store.migrate().await.map_err(|e| anyhow::anyhow!(e.display_full()))?;
            println!("Catalog is up to date");
        }
        Command::Execute {
            query_id,
            params,
            params_json,
            format,
        } => {
            let params = collect_params(params, params_json.as_deref())?;
            let (config, store) = connect(cli.config.as_deref())?;
            let gateway = Gateway::new(store, config.execution);
            let result = gateway
                .execute(query_id, &params)
                .await
                .map_err(|e| anyhow::anyhow!("{} ({})", e, e.code()))?;
            println!("{}", render(&result, format)?);
        }
        Command::Import { file, name } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let name = name.unwrap_or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file.display().to_string())
            });
            let (config, store) = connect(cli.config.as_deref())?;
            let importer = CsvImporter::new(store.pool().clone(), config.ingest);
            let result = importer
                .import_csv(&name, &bytes)
                .await
                .map_err(|e| anyhow::anyhow!("{} ({})", e, e.code()))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Audit { query_id, limit } => {
            let (_, store) = connect(cli.config.as_deref())?;
            let records = store
                .recent_executions(query_id, limit)
                .await
                .map_err(|e| anyhow::anyhow!(e.display_full()))?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    Ok(())
}

fn connect(config_path: Option<&Path>) -> Result<(Config, PgStore)> {
    let config = Config::load(config_path)?;
    tracing::debug!(database = %config.database.display_string(), "configuration loaded");
    let pool = create_pool(&config.database)?;
    Ok((config, PgStore::new(pool)))
}

fn check(sql: &str, pairs: Vec<(String, String)>) -> Result<()> {
    let sql = gateway::trim_statement(sql);
    let verdict = gateway::check_sql_safety(sql);
    println!("{}", SafetyReport(&verdict));
    if verdict.is_err() {
        std::process::exit(2);
    }

    let params = collect_params(pairs, None)?;
    let names = gateway::placeholder_names(sql);
    let missing: Vec<&String> = names.iter().filter(|n| !params.contains_key(*n)).collect();
    if !missing.is_empty() {
        println!("Parameters: {:?} (missing: {:?})", names, missing);
        return Ok(());
    }

    let compiled = gateway::compile_named_params(sql, &params)?;
    println!("{}", compiled.sql);
    for (idx, value) in compiled.values.iter().enumerate() {
        println!("  ${} = {}", idx + 1, value);
    }
    Ok(())
}
