//! `roofdesk` - operator CLI for the mailbox mirror.
//!
//! Drives the desk service against a directory export of a mailbox, which
//! stands in for the remote protocol client.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod replay;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use roofdesk_core::{DeskResources, ListQuery, MailDesk, SyncTarget};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use replay::ReplayMailbox;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Mailbox principal.
    #[arg(long, env = "ROOFDESK_USER")]
    user: String,

    /// Mailbox export directory (one subdirectory per folder).
    #[arg(long, env = "ROOFDESK_EXPORT")]
    export: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Sync one folder, or every well-known folder.
    Sync {
        #[arg(long)]
        folder: Option<String>,
        /// Ignore the incremental window.
        #[arg(long)]
        full: bool,
    },
    /// List one page of a folder.
    List {
        #[arg(long, default_value = "INBOX")]
        folder: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long)]
        page_size: Option<usize>,
        /// Sync first unless the cached list is fresh.
        #[arg(long)]
        sync: bool,
        #[arg(long)]
        full: bool,
    },
    /// Show one message by local id or protocol id.
    Show { id: String },
    /// Mark one message read.
    MarkRead { id: String },
    /// Re-resolve placeholder senders.
    Repair {
        #[arg(long, default_value_t = 50)]
        batch: usize,
    },
    /// Count stored messages in a folder.
    Count {
        #[arg(long, default_value = "INBOX")]
        folder: String,
    },
}

#[derive(Debug, Serialize)]
struct FolderCount<'a> {
    folder: &'a str,
    total: i64,
}

#[derive(Debug, Serialize)]
struct MarkReadResult<'a> {
    id: &'a str,
    changed: bool,
}

#[derive(Debug, Serialize)]
struct RepairResult {
    fixed: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roofdesk=info,roofdesk_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = settings::load()?;
    let resources = DeskResources::open(config)
        .await
        .context("Failed to open desk resources")?;

    info!(user = %cli.user, export = %cli.export.display(), "Starting roofdesk");
    let desk = resources.desk(&cli.user, Arc::new(ReplayMailbox::new(&cli.export)));
    run(&desk, &cli.command).await
}

async fn run(desk: &MailDesk, command: &Command) -> Result<()> {
    match command {
        Command::Sync { folder, full } => {
            let target = folder.clone().map_or(SyncTarget::All, SyncTarget::Folder);
            print_json(&desk.trigger_sync(target, false, *full).await?)
        }
        Command::List {
            folder,
            page,
            page_size,
            sync,
            full,
        } => {
            let query = ListQuery {
                page: *page,
                page_size: *page_size,
                sync_first: *sync,
                force_full: *full,
                ..ListQuery::folder(folder.as_str())
            };
            print_json(&desk.list_messages(&query).await?)
        }
        Command::Show { id } => print_json(&desk.get_message(id).await?),
        Command::MarkRead { id } => {
            let changed = desk.mark_read(id).await?;
            print_json(&MarkReadResult { id, changed })
        }
        Command::Repair { batch } => {
            let fixed = desk.repair_senders(*batch).await?;
            print_json(&RepairResult { fixed })
        }
        Command::Count { folder } => {
            let total = desk.message_count(folder).await?;
            print_json(&FolderCount { folder, total })
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to render output")?;
    println!("{text}");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("roofdesk").chain(line.split_whitespace()))
    }

    #[test]
    fn test_parse_list() {
        let cli = parse("--user a@example.com --export /tmp/x list --folder sent --page 2 --sync")
            .unwrap();
        assert_eq!(cli.user, "a@example.com");
        assert_eq!(
            cli.command,
            Command::List {
                folder: "sent".into(),
                page: 2,
                page_size: None,
                sync: true,
                full: false,
            }
        );
    }

    #[test]
    fn test_parse_show_requires_id() {
        assert!(parse("--user a@example.com --export /tmp/x show").is_err());
        let cli = parse("--user a@example.com --export /tmp/x show 42").unwrap();
        assert_eq!(cli.command, Command::Show { id: "42".into() });
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(parse("--user a --export b explode").is_err());
        assert!(parse("--user a --export b sync --loud").is_err());
        assert!(parse("--user a --export b count --folder").is_err());
    }
}
