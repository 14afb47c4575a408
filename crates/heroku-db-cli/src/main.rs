//! Heroku DB CLI
//!
//! Inspect and edit a userbot database from a shell.
//!
//! # Usage
//! ```bash
//! herokudb --identity 123456 owners
//! herokudb --identity 123456 set heroku.main lang '"en"'
//! herokudb --identity 123456 dump heroku.main
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use heroku_db::backend::file::to_pretty_json;
use heroku_db::{Database, DbConfig, DbError, EnvConfig};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Heroku DB - inspect and edit the userbot database
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Account identity; selects config-<identity>.json or the remote blob
    #[arg(short, long, default_value = "0")]
    identity: String,

    /// Directory holding the database file
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    data_dir: PathBuf,

    /// Remote cache URI; REDIS_URL is used when omitted
    #[arg(long, value_name = "URI")]
    redis_url: Option<String>,

    /// JSON file with database settings, overrides the flags above
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List owners that have a namespace
    Owners,

    /// Print a single value as JSON
    Get {
        owner: String,
        key: String,

        /// JSON printed when the key is absent
        #[arg(long)]
        default: Option<String>,
    },

    /// Store a value; input that isn't valid JSON is stored as a string
    Set {
        owner: String,
        key: String,
        value: String,
    },

    /// Append a value to the list at owner/key
    Append {
        owner: String,
        key: String,
        value: String,
    },

    /// Print a namespace, or the whole store
    Dump { owner: Option<String> },
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let fatal = e
                .downcast_ref::<DbError>()
                .map(DbError::is_fatal)
                .unwrap_or(false);
            eprintln!("Error: {:#}", e);
            if fatal {
                tracing::error!("Database is beyond repair, refusing to continue");
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<DbConfig> {
    if let Some(path) = &cli.config {
        return DbConfig::from_file(path).with_context(|| format!("can't load config {}", path));
    }

    let mut config = DbConfig::new(&cli.identity).with_data_dir(&cli.data_dir);
    if let Some(url) = &cli.redis_url {
        config = config.with_redis_url(url);
    }
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let db = Database::new(load_config(&cli)?);
    let kind = db.init(&EnvConfig::new(())).await?;
    tracing::debug!("Opened database through the {} backend", kind);

    match cli.command {
        Commands::Owners => {
            for owner in db.owners() {
                println!("{}", owner);
            }
        }
        Commands::Get {
            owner,
            key,
            default,
        } => match db.get_value(&owner, key.as_str()) {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => match default {
                Some(default) => println!("{}", default),
                None => anyhow::bail!("{}/{} is not set", owner, key),
            },
        },
        Commands::Set { owner, key, value } => {
            db.set(&owner, key.as_str(), parse_value(&value))?;
            persist(&db).await?;
        }
        Commands::Append { owner, key, value } => {
            let list = db.list_pointer(&owner, key.as_str())?;
            list.push(parse_value(&value))?;
            println!("{}/{} now holds {} items", owner, key, list.len());
            persist(&db).await?;
        }
        Commands::Dump { owner } => match owner {
            Some(owner) => {
                let namespace = db
                    .namespace(&owner)
                    .with_context(|| format!("no namespace for {}", owner))?;
                println!("{}", serde_json::to_string_pretty(&namespace)?);
            }
            None => println!("{}", to_pretty_json(&db.snapshot())?),
        },
    }

    Ok(())
}

/// Write right away; a deferred flush would die with the process
async fn persist(db: &Database) -> anyhow::Result<()> {
    if !db.force_save().await? {
        anyhow::bail!("database write failed, see the log for details");
    }
    Ok(())
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
