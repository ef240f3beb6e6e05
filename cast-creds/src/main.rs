//! cast-creds - Manage the credential bundles stored for each user
//!
//! Every secret is encrypted with the vault key before it reaches the
//! database; plaintext keys and tokens are never logged.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use libcrosscast::platforms::microblog::MicroblogAdapter;
use libcrosscast::platforms::relay::{generate_keys, normalize_private_key, public_key_for};
use libcrosscast::store::UserStore;
use libcrosscast::types::MicroblogBundle;
use libcrosscast::{
    Config, CredentialVault, CrosscastError, Database, Platform, PlatformCredentials, User,
};
use secrecy::{ExposeSecret, SecretString};
use std::io::Read;

#[derive(Parser)]
#[command(name = "cast-creds")]
#[command(version, about = "Manage Crosscast platform credentials securely", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new user and print its id
    CreateUser,

    /// Store a relay private key (hex or nsec) for a user
    SetRelayKey {
        #[arg(long)]
        user: String,

        /// Private key (reads from stdin if not provided)
        key: Option<String>,
    },

    /// Store a microblog access token pair for a user
    SetMicroblog {
        #[arg(long)]
        user: String,

        #[arg(long)]
        token: String,

        #[arg(long)]
        secret: String,

        /// Check the tokens against the platform before storing them
        #[arg(long)]
        verify: bool,
    },

    /// Remove a user's credentials for one platform
    Disconnect {
        #[arg(long)]
        user: String,

        /// Platform name (microblog, relay)
        #[arg(long)]
        platform: Platform,
    },

    /// Show which platforms a user has linked (without secret values)
    Show {
        #[arg(long)]
        user: String,
    },

    /// Generate a fresh relay key pair
    GenerateRelayKey {
        /// Store the new key for this user instead of printing it
        #[arg(long)]
        user: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    libcrosscast::logging::init_default(cli.verbose);

    if let Err(e) = run_command(cli.command).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<CrosscastError>()
            .map(CrosscastError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::CreateUser => create_user().await,
        Commands::SetRelayKey { user, key } => set_relay_key(&user, key).await,
        Commands::SetMicroblog {
            user,
            token,
            secret,
            verify,
        } => {
            let token = SecretString::new(token.into());
            let secret = SecretString::new(secret.into());
            set_microblog(&user, token, secret, verify).await
        }
        Commands::Disconnect { user, platform } => disconnect(&user, platform).await,
        Commands::Show { user } => show(&user).await,
        Commands::GenerateRelayKey { user } => generate_relay_key(user.as_deref()).await,
    }
}

async fn open_database(config: &Config) -> Result<Database> {
    Database::new(&config.database.path)
        .await
        .context("Failed to open database")
}

fn load_config() -> Result<Config> {
    Config::load().context("Failed to load configuration")
}

async fn find_user(db: &Database, user_id: &str) -> Result<User> {
    let user = db
        .get_user(user_id)
        .await?
        .ok_or_else(|| CrosscastError::NotFound(format!("user {}", user_id)))?;
    Ok(user)
}

async fn create_user() -> Result<()> {
    let config = load_config()?;
    let db = open_database(&config).await?;

    let user = User::new();
    db.create_user(&user).await?;

    tracing::info!(user_id = %user.id, "Created user");
    println!("{}", user.id);
    Ok(())
}

async fn set_relay_key(user_id: &str, key: Option<String>) -> Result<()> {
    let config = load_config()?;
    let vault = CredentialVault::from_config(&config)?;
    let db = open_database(&config).await?;
    find_user(&db, user_id).await?;

    let raw = match key {
        Some(key) => SecretString::new(key.into()),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read key from stdin")?;
            SecretString::new(buffer.trim().into())
        }
    };

    let private_key = normalize_private_key(raw.expose_secret())?;
    let npub = public_key_for(private_key.expose_secret())?;

    db.set_relay_key(user_id, &vault.encrypt_str(&private_key)?)
        .await?;

    println!("✓ Stored relay key for user {}", user_id);
    println!("  Public key: {}", npub);
    Ok(())
}

async fn set_microblog(
    user_id: &str,
    token: SecretString,
    secret: SecretString,
    verify: bool,
) -> Result<()> {
    let config = load_config()?;
    let vault = CredentialVault::from_config(&config)?;
    let db = open_database(&config).await?;
    find_user(&db, user_id).await?;

    let bundle = MicroblogBundle {
        token: vault.encrypt_str(&token)?,
        secret: vault.encrypt_str(&secret)?,
    };

    if verify {
        let adapter = MicroblogAdapter::new(config.microblog.as_ref());
        let account = adapter
            .verify_credentials(&PlatformCredentials::Microblog { token, secret })
            .await?;
        println!("✓ Verified as @{}", account.screen_name);
    }

    db.set_microblog_credentials(user_id, &bundle).await?;

    println!("✓ Stored microblog credentials for user {}", user_id);
    Ok(())
}

async fn disconnect(user_id: &str, platform: Platform) -> Result<()> {
    let config = load_config()?;
    let db = open_database(&config).await?;

    db.clear_platform(user_id, platform).await?;

    println!("✓ Removed {} credentials for user {}", platform, user_id);
    Ok(())
}

async fn show(user_id: &str) -> Result<()> {
    let config = load_config()?;
    let db = open_database(&config).await?;
    let user = find_user(&db, user_id).await?;

    println!("User {}", user.id);

    match user.microblog {
        Some(_) => println!("  ✓ microblog: linked"),
        None => println!("  ✗ microblog: not linked"),
    }

    match &user.relay_key {
        Some(encrypted) => {
            let npub = CredentialVault::from_config(&config)
                .and_then(|vault| vault.decrypt_str(encrypted))
                .and_then(|key| public_key_for(key.expose_secret()));
            match npub {
                Ok(npub) => println!("  ✓ relay: {}", npub),
                Err(e) => println!("  ✓ relay: linked (public key unavailable: {})", e),
            }
        }
        None => println!("  ✗ relay: not linked"),
    }

    Ok(())
}

async fn generate_relay_key(user_id: Option<&str>) -> Result<()> {
    let (private_key, npub) = generate_keys()?;

    let Some(user_id) = user_id else {
        println!("Private key: {}", private_key.expose_secret());
        println!("Public key:  {}", npub);
        eprintln!("Keep the private key secret; store it with 'cast-creds set-relay-key'.");
        return Ok(());
    };

    let config = load_config()?;
    let vault = CredentialVault::from_config(&config)?;
    let db = open_database(&config).await?;
    find_user(&db, user_id).await?;

    db.set_relay_key(user_id, &vault.encrypt_str(&private_key)?)
        .await?;

    println!("✓ Generated and stored relay key for user {}", user_id);
    println!("  Public key: {}", npub);
    Ok(())
}
