use anyhow::{Context, Result};
use clap::Parser;
use libcrosscast::store::{PostStore, PublicationLogStore};
use libcrosscast::types::LogOutcome;
use libcrosscast::{Config, CrosscastError, Database, Post, PublicationLog};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "cast-history")]
#[command(version, about = "Show a content item and its publication logs")]
#[command(long_about = r#"Show a content item and every publish attempt recorded for it.

EXAMPLES:
    # Human-readable summary
    cast-history 6f1c0a8e-3b7d-4f55-9a43-2d4c1f0e9b21

    # Only show the item if it belongs to this user
    cast-history 6f1c0a8e-3b7d-4f55-9a43-2d4c1f0e9b21 --user 0b5e2c9a-8d3f-4e61-b7a2-5c9d1e3f7a40

    # JSON for scripting
    cast-history 6f1c0a8e-3b7d-4f55-9a43-2d4c1f0e9b21 --format json
    cast-history <POST_ID> --format json | jq -r '.logs[] | select(.outcome == "failed") | .platform'

EXIT CODES:
    0 - Success
    1 - Error (database not found, query failed, etc.)
    4 - No content item with that id (or it belongs to another user)
"#)]
struct Args {
    /// Id printed by cast-post
    post_id: String,

    /// Only show the item if it belongs to this user
    #[arg(long, env = "CROSSCAST_USER")]
    user: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "text", value_name = "FORMAT")]
    #[arg(value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// A content item together with its publication logs
#[derive(Debug, Serialize)]
struct HistoryEntry {
    post: Post,
    logs: Vec<PublicationLog>,
}

async fn load_entry(db: &Database, user_id: Option<&str>, post_id: &str) -> Result<HistoryEntry> {
    let post = match user_id {
        Some(user_id) => db.get_post_for_user(user_id, post_id).await,
        None => db.get_post(post_id).await,
    };
    let post = post
        .context("Failed to query content item")?
        .ok_or_else(|| CrosscastError::NotFound(format!("content item {}", post_id)))?;

    let logs = db
        .logs_for_post(post_id)
        .await
        .context("Failed to query publication logs")?;

    Ok(HistoryEntry { post, logs })
}

fn print_text(entry: &HistoryEntry) {
    let timestamp = chrono::DateTime::from_timestamp(entry.post.created_at, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| entry.post.created_at.to_string());

    println!(
        "{} | {} | {}",
        timestamp, entry.post.id, entry.post.status
    );
    println!("{}", entry.post.content);
    for media in &entry.post.media {
        println!("  media: {}", media);
    }

    for log in &entry.logs {
        let symbol = match log.outcome {
            LogOutcome::Success => "✓",
            LogOutcome::Failed => "✗",
        };
        match (&log.platform_post_id, &log.error) {
            (Some(id), _) => println!("  {} {}: {}", symbol, log.platform, id),
            (None, Some(error)) => println!("  {} {}: {}", symbol, log.platform, error),
            (None, None) => println!("  {} {}", symbol, log.platform),
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    let db_path = libcrosscast::config::expand_path(&config.database.path);
    if !db_path.exists() {
        anyhow::bail!(
            "Database not found at {}. Have you published anything yet? Try: cast-post --user <ID> 'Hello'",
            db_path.display()
        );
    }

    let db = Database::open(&db_path)
        .await
        .context("Failed to open database")?;

    let entry = load_entry(&db, args.user.as_deref(), &args.post_id).await?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&entry)?),
        _ => print_text(&entry),
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    libcrosscast::logging::init_default(args.verbose);
    tracing::debug!("cast-history started with args: {:?}", args);

    if let Err(e) = run(args).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<CrosscastError>()
            .map(CrosscastError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}
