//! cast-post - Publish one content item to every platform a user has linked

use clap::Parser;
use libcrosscast::error::ValidationError;
use libcrosscast::store::UserStore;
use libcrosscast::{
    Config, CrosscastError, Database, PublishOrchestrator, PublishOutcome, PublishReport, Result,
};
use std::io::{IsTerminal, Read};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "cast-post")]
#[command(version, about = "Publish content to every linked platform at once", long_about = None)]
struct Cli {
    /// Content to publish (reads from stdin if not provided)
    content: Option<String>,

    /// User whose linked platforms receive the content
    #[arg(short, long, env = "CROSSCAST_USER")]
    user: String,

    /// Media reference to attach (repeatable)
    #[arg(short, long = "media", value_name = "URL")]
    media: Vec<String>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    libcrosscast::logging::init_default(cli.verbose);

    let format = cli.format.clone();
    let report = match run(cli).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    if let Err(e) = print_report(&report, &format) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Partial results are still a success for scripts; only a total
    // failure is reported through the exit code
    if report.all_failed() {
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<PublishReport> {
    let content = match cli.content {
        Some(content) => content,
        None => read_stdin()?,
    };
    let media = (!cli.media.is_empty()).then_some(cli.media);

    let config = Config::load()?;
    let db = Arc::new(Database::new(&config.database.path).await?);
    let orchestrator = PublishOrchestrator::from_config(&config, Arc::clone(&db))?;

    orchestrator.validate(&content, media.as_deref().unwrap_or_default())?;

    let user = db
        .get_user(&cli.user)
        .await?
        .ok_or_else(|| CrosscastError::NotFound(format!("user {}", cli.user)))?;

    tracing::debug!(user_id = %user.id, "Publishing from cast-post");
    orchestrator.publish(&user, &content, media).await
}

/// Read the content from stdin, dropping the trailing newline
fn read_stdin() -> Result<String> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Err(ValidationError::EmptyContent.into());
    }

    let mut content = String::new();
    stdin
        .read_to_string(&mut content)
        .map_err(|e| ValidationError::UnreadableInput(e.to_string()))?;

    Ok(content.trim_end_matches(['\n', '\r']).to_string())
}

fn print_report(report: &PublishReport, format: &str) -> serde_json::Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for (platform, outcome) in &report.results {
        match outcome {
            PublishOutcome::Success { platform_post_id } => {
                println!("{}:{}", platform, platform_post_id)
            }
            PublishOutcome::Failed { error } => eprintln!("Error: {}: {}", platform, error),
        }
    }
    println!("{} {}", report.post_id, report.status);

    Ok(())
}
