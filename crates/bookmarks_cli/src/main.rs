//! Command-line front end for the bookmark store.
//!
//! # Responsibility
//! - Resolve configuration from flags and environment.
//! - Run one service operation and print its result as one JSON line.
//!
//! # Invariants
//! - Failures print a JSON error line to stderr and exit with status 1.

use bookmarks_core::{
    core_version, default_log_level, init_logging, logging_status, open_db, ping,
    BookmarkService, NewBookmark,
};
use clap::{Parser, Subcommand};
use log::{error, info, Level};
use serde_json::{json, Value};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "bookmarks", version, about = "Manage bookmarks stored in SQLite")]
struct Cli {
    /// SQLite database file.
    #[arg(long, env = "BOOKMARKS_DB", default_value = "bookmarks.db")]
    db: PathBuf,

    /// Absolute directory for rotating log files; logging is off when unset.
    #[arg(long, env = "BOOKMARKS_LOG_DIR")]
    log_dir: Option<String>,

    /// trace|debug|info|warn|error
    #[arg(long, env = "BOOKMARKS_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Add one bookmark.
    Add {
        url: String,
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// List bookmarks, newest first.
    List {
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Delete one bookmark by id.
    Delete { id: Uuid },
    /// List all known tags.
    Tags,
    /// Print crate health and version.
    Ping,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        if let Err(err) = init_logging(level, log_dir) {
            eprintln!("{}", json!({ "ok": false, "error": err.to_string() }));
            return ExitCode::FAILURE;
        }
    }

    match run(cli) {
        Ok(value) => {
            println!("{value}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("event=cli_command module=cli status=error error={err}");
            eprintln!("{}", json!({ "ok": false, "error": err.to_string() }));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<Value, Box<dyn Error>> {
    if let Command::Ping = cli.command {
        return Ok(json!({ "ping": ping(), "version": core_version() }));
    }

    let conn = open_db(&cli.db)?;
    info!(
        "event=cli_command module=cli status=start db={}",
        cli.db.display()
    );
    let service = BookmarkService::sqlite(Rc::new(conn))
        .with_log_level(operation_log_level(logging_status().map(|(level, _)| level)));

    let value = match cli.command {
        Command::Add {
            url,
            title,
            description,
            tags,
        } => {
            let mut input = NewBookmark::new(url, title).with_tags(tags);
            if let Some(description) = description {
                input = input.with_description(description);
            }
            serde_json::to_value(service.create_bookmark(input)?)?
        }
        Command::List { tag, limit, offset } => {
            let page = service.list_bookmarks(tag, limit, offset)?;
            json!({ "items": page.items, "applied_limit": page.applied_limit })
        }
        Command::Delete { id } => {
            service.delete_bookmark(id)?;
            json!({ "deleted": id })
        }
        Command::Tags => json!({ "tags": service.list_tags()? }),
        Command::Ping => json!({ "ping": ping(), "version": core_version() }),
    };
    Ok(value)
}

/// Pipeline start/completion lines go out at the active file level so a
/// non-debug `--log-level` still records them.
fn operation_log_level(active: Option<&str>) -> Level {
    active
        .and_then(|level| level.parse().ok())
        .unwrap_or(Level::Debug)
}
