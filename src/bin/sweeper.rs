#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for bulk mailbox cleanup via Proton Bridge

use clap::{Args as ClapArgs, Parser, Subcommand};
use inbox_sweeper::{
    BulkLabelMutator, ImapConfig, ImapMailStore, LabelChange, MessageId, MutationOptions,
    MutationResult, QueryBuilder, SELF_ACCOUNT, SweepSettings,
};
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sweeper")]
#[command(about = "Search, bulk mark-as-read, trash and archive for Proton Mail via Proton Bridge")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Account to operate on (defaults to the login)
    #[arg(long, global = true, default_value = SELF_ACCOUNT)]
    account: String,
}

#[derive(Subcommand)]
enum Command {
    /// List identifiers of messages matching a query
    Search {
        /// Search query (e.g. "from:shop.com is:unread")
        query: String,

        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Mark every message matching a query as read
    MarkRead(Sweep),

    /// Move every message matching a query to Trash
    Trash(Sweep),

    /// Move every message matching a query out of the inbox to Archive
    Archive(Sweep),

    /// Build a search query from individual criteria and print it
    Query(QueryArgs),
}

/// Selection and pacing shared by the bulk commands.
#[derive(ClapArgs)]
struct Sweep {
    /// Search query selecting the messages (e.g. "from:shop.com older_than:1y")
    query: String,

    /// Maximum number of messages to change
    #[arg(long)]
    limit: Option<usize>,

    /// Report what would change without changing anything
    #[arg(long)]
    dry_run: bool,

    #[command(flatten)]
    tuning: Tuning,
}

/// Overrides for `SWEEP_*` settings.
#[derive(ClapArgs)]
struct Tuning {
    /// Messages per batch (at most 100)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Pause between batches, in milliseconds
    #[arg(long)]
    rate_limit_ms: Option<u64>,

    /// Retries for transient server errors
    #[arg(long)]
    max_retries: Option<u32>,
}

#[derive(ClapArgs)]
struct QueryArgs {
    /// Sender address or domain
    #[arg(long)]
    from: Option<String>,

    /// Recipient address
    #[arg(long)]
    to: Option<String>,

    /// Only unread messages
    #[arg(long)]
    unread: bool,

    /// Text the subject contains
    #[arg(long)]
    subject: Option<String>,

    /// Minimum age, e.g. 30d, 6m, 1y
    #[arg(long)]
    older_than: Option<String>,

    /// Maximum age, e.g. 7d
    #[arg(long)]
    newer_than: Option<String>,

    /// Label name
    #[arg(long)]
    label: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match &args.command {
        Command::Search { query, limit } => {
            cmd_search(&args, query, *limit).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::MarkRead(sweep) => cmd_sweep(&args, sweep, &LabelChange::mark_read()).await,
        Command::Trash(sweep) => cmd_sweep(&args, sweep, &LabelChange::trash()).await,
        Command::Archive(sweep) => cmd_sweep(&args, sweep, &LabelChange::archive()).await,
        Command::Query(criteria) => {
            cmd_query(&args, criteria)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn store_from_env() -> anyhow::Result<ImapMailStore> {
    Ok(ImapMailStore::new(ImapConfig::from_env()?))
}

async fn cmd_search(args: &Args, query: &str, limit: Option<usize>) -> anyhow::Result<()> {
    let store = store_from_env()?;
    let ids = inbox_sweeper::search(&store, &args.account, Some(query), limit).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ids)?);
    } else {
        print_ids(&ids);
    }

    Ok(())
}

async fn cmd_sweep(args: &Args, sweep: &Sweep, change: &LabelChange) -> anyhow::Result<ExitCode> {
    let tuning = &sweep.tuning;
    let mut settings = SweepSettings::from_env()?;
    if let Some(batch_size) = tuning.batch_size {
        settings.batch_size = batch_size;
    }
    if let Some(ms) = tuning.rate_limit_ms {
        settings.rate_limit_delay = Duration::from_millis(ms);
    }
    if let Some(max_retries) = tuning.max_retries {
        settings.max_retries = max_retries;
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current batch");
            on_ctrl_c.cancel();
        }
    });

    let options = MutationOptions::from_settings(&settings)
        .dry_run(sweep.dry_run)
        .cancel_on(cancel)
        .on_progress(|processed, total| info!("Processed {}/{} messages", processed, total));

    let mutator = BulkLabelMutator::new(store_from_env()?, args.account.clone());
    let result = mutator
        .apply_matching(&sweep.query, change, sweep.limit, options)
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_query(args: &Args, criteria: &QueryArgs) -> anyhow::Result<()> {
    let mut builder = QueryBuilder::new();
    if let Some(from) = &criteria.from {
        builder = builder.from(from);
    }
    if let Some(to) = &criteria.to {
        builder = builder.to(to);
    }
    if criteria.unread {
        builder = builder.unread();
    }
    if let Some(subject) = &criteria.subject {
        builder = builder.subject(subject);
    }
    if let Some(age) = &criteria.older_than {
        builder = builder.older_than(age);
    }
    if let Some(age) = &criteria.newer_than {
        builder = builder.newer_than(age);
    }
    if let Some(label) = &criteria.label {
        builder = builder.label(label);
    }

    let query = builder.build();
    inbox_sweeper::parse_query(&query)?;

    if args.json {
        println!("{}", serde_json::to_string(&query)?);
    } else {
        println!("{query}");
    }
    Ok(())
}

fn print_ids(ids: &[MessageId]) {
    if ids.is_empty() {
        println!("No messages found.");
        return;
    }

    for id in ids {
        println!("{id}");
    }
    println!("\n{} message(s)", ids.len());
}

fn print_result(result: &MutationResult) {
    println!("{}", result.message);

    let failed: Vec<_> = result.failed_batches().collect();
    if failed.is_empty() {
        return;
    }

    println!(
        "\n{:<6} {:<8} {:<6} {:<9} {:<18} {}",
        "Batch", "Start", "Size", "Attempts", "Kind", "Error"
    );
    println!("{}", "-".repeat(80));
    for batch in failed {
        if let Some(failure) = &batch.failure {
            println!(
                "{:<6} {:<8} {:<6} {:<9} {:<18} {}",
                batch.index + 1,
                batch.start,
                batch.size,
                batch.attempts,
                failure.kind.as_str(),
                truncate(&failure.message, 40),
            );
        }
    }

    if let Some(wait) = result.retry_after {
        println!("\nQuota exceeded: retry after {}s", wait.as_secs());
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
