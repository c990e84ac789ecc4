//! Identity resolution command-line entry point.
//!
//! # Responsibility
//! - Resolve configuration from flags and environment.
//! - Run one identify or lookup call against a SQLite contact store and print
//!   the JSON summary.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use identity_core::db::open_db;
use identity_core::{
    core_version, default_log_level, init_logging, IdentifyRequest, IdentityService, LogTarget,
    SqliteContactRepository,
};
use log::debug;
use rusqlite::Connection;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "identity", version, about = "Resolve customer identities from contact identifiers")]
struct Cli {
    /// SQLite contact store; created and migrated when missing.
    #[arg(long = "db", env = "IDENTITY_DB_PATH", global = true)]
    db_path: Option<PathBuf>,

    /// trace|debug|info|warn|error
    #[arg(long, env = "IDENTITY_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Absolute directory for rolling log files. Logs go to stderr when unset.
    #[arg(long, env = "IDENTITY_LOG_DIR", global = true)]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve (and record) the identity behind an email and/or phone number.
    Identify {
        #[arg(long)]
        email: Option<String>,
        #[arg(long = "phone")]
        phone_number: Option<String>,
    },
    /// Print the identity summary of the family containing a contact.
    Family { contact_id: i64 },
    /// Print the core version.
    Version,
}

fn main() -> Result<()> {
    let Cli {
        db_path,
        log_level,
        log_dir,
        command,
    } = Cli::parse();

    let target = match log_dir.as_deref() {
        Some(dir) => LogTarget::directory(dir).map_err(anyhow::Error::msg)?,
        None => LogTarget::Stderr,
    };
    let level = log_level.as_deref().unwrap_or(default_log_level());
    init_logging(level, target).map_err(anyhow::Error::msg)?;

    match command {
        Command::Version => println!("identity_core version={}", core_version()),
        Command::Identify {
            email,
            phone_number,
        } => {
            let conn = open_store(db_path)?;
            let service = IdentityService::new(SqliteContactRepository::try_new(&conn)?);
            let response = service.identify(&IdentifyRequest {
                email,
                phone_number,
            })?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Family { contact_id } => {
            let conn = open_store(db_path)?;
            let service = IdentityService::new(SqliteContactRepository::try_new(&conn)?);
            match service.family_of(contact_id)? {
                Some(response) => println!("{}", serde_json::to_string_pretty(&response)?),
                None => bail!("contact {contact_id} not found"),
            }
        }
    }

    Ok(())
}

fn open_store(db_path: Option<PathBuf>) -> Result<Connection> {
    let Some(db_path) = db_path else {
        bail!("no contact store given; pass --db or set IDENTITY_DB_PATH");
    };
    debug!("event=cli_open_store module=cli status=start");
    open_db(&db_path)
        .with_context(|| format!("failed to open contact store `{}`", db_path.display()))
}
