//! Crosscast - publish one content item to several social platforms at once
//!
//! The library owns the publish path: credential encryption, the platform
//! adapters, the append-only publication log and the orchestrator that fans
//! a content item out, joins every attempt and derives its final status.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod log_writer;
pub mod logging;
pub mod platforms;
pub mod publisher;
pub mod store;
pub mod types;
pub mod vault;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{CrosscastError, Result};
pub use platforms::{PlatformAdapter, PlatformCredentials};
pub use publisher::{PublishOrchestrator, PublishReport};
pub use store::{MemoryStore, PostStore, PublicationLogStore, UserStore};
pub use types::{Platform, Post, PostStatus, PublicationLog, PublishOutcome, User};
pub use vault::CredentialVault;
