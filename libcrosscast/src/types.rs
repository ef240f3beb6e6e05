//! Core types for Crosscast

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::PlatformError;

/// Platforms a content item can be distributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Token+secret authenticated microblogging service
    Microblog,
    /// Signed notes broadcast to a set of relays
    Relay,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Microblog, Platform::Relay];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Microblog => "microblog",
            Platform::Relay => "relay",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "microblog" => Ok(Platform::Microblog),
            "relay" => Ok(Platform::Relay),
            _ => Err(format!(
                "Unknown platform: '{}'. Valid options: microblog, relay",
                s
            )),
        }
    }
}

/// Lifecycle of a content item
///
/// A post starts `Pending` and transitions exactly once, after every
/// attempt has been joined, to one of the three terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Pending,
    Published,
    Partial,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Pending => "pending",
            PostStatus::Published => "published",
            PostStatus::Partial => "partial",
            PostStatus::Failed => "failed",
        }
    }

    /// Derive the aggregate status from a set of attempt outcomes
    ///
    /// The result does not depend on the order of `outcomes`. Returns `None`
    /// when there are no outcomes at all.
    pub fn aggregate<I>(outcomes: I) -> Option<PostStatus>
    where
        I: IntoIterator<Item = LogOutcome>,
    {
        let mut any_success = false;
        let mut any_failure = false;

        for outcome in outcomes {
            match outcome {
                LogOutcome::Success => any_success = true,
                LogOutcome::Failed => any_failure = true,
            }
        }

        match (any_success, any_failure) {
            (false, false) => None,
            (true, false) => Some(PostStatus::Published),
            (false, true) => Some(PostStatus::Failed),
            (true, true) => Some(PostStatus::Partial),
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PostStatus::Pending),
            "published" => Ok(PostStatus::Published),
            "partial" => Ok(PostStatus::Partial),
            "failed" => Ok(PostStatus::Failed),
            other => Err(format!("Unknown post status: '{}'", other)),
        }
    }
}

/// A content item submitted for distribution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub media: Vec<String>,
    pub status: PostStatus,
    pub created_at: i64,
}

impl Post {
    pub fn new(user_id: String, content: String, media: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            content,
            media,
            status: PostStatus::Pending,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutcome {
    Success,
    Failed,
}

impl LogOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogOutcome::Success => "success",
            LogOutcome::Failed => "failed",
        }
    }
}

impl FromStr for LogOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(LogOutcome::Success),
            "failed" => Ok(LogOutcome::Failed),
            other => Err(format!("Unknown log outcome: '{}'", other)),
        }
    }
}

/// Append-only record of one publish attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicationLog {
    pub id: String,
    pub post_id: String,
    pub platform: Platform,
    pub outcome: LogOutcome,
    pub error: Option<String>,
    pub platform_post_id: Option<String>,
    pub published_at: i64,
}

impl PublicationLog {
    pub fn from_outcome(post_id: &str, platform: Platform, outcome: &PublishOutcome) -> Self {
        let (error, platform_post_id) = match outcome {
            PublishOutcome::Success { platform_post_id } => (None, Some(platform_post_id.clone())),
            PublishOutcome::Failed { error } => (Some(error.clone()), None),
        };

        Self {
            id: Uuid::new_v4().to_string(),
            post_id: post_id.to_string(),
            platform,
            outcome: outcome.log_outcome(),
            error,
            platform_post_id,
            published_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Result of one platform attempt as reported to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PublishOutcome {
    Success { platform_post_id: String },
    Failed { error: String },
}

impl PublishOutcome {
    pub fn failed(error: impl fmt::Display) -> Self {
        PublishOutcome::Failed {
            error: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PublishOutcome::Success { .. })
    }

    pub fn log_outcome(&self) -> LogOutcome {
        match self {
            PublishOutcome::Success { .. } => LogOutcome::Success,
            PublishOutcome::Failed { .. } => LogOutcome::Failed,
        }
    }
}

impl From<crate::error::Result<String>> for PublishOutcome {
    fn from(result: crate::error::Result<String>) -> Self {
        match result {
            Ok(platform_post_id) => PublishOutcome::Success { platform_post_id },
            Err(e) => PublishOutcome::failed(e),
        }
    }
}

impl From<PlatformError> for PublishOutcome {
    fn from(error: PlatformError) -> Self {
        PublishOutcome::failed(error)
    }
}

/// Encrypted token pair for the microblog platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MicroblogBundle {
    pub token: String,
    pub secret: String,
}

/// A user and their encrypted per-platform credential bundles
///
/// The presence of a bundle is what marks a platform as configured for the
/// user; there is no separate enable flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub created_at: i64,
    pub microblog: Option<MicroblogBundle>,
    pub relay_key: Option<String>,
}

impl User {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().timestamp(),
            microblog: None,
            relay_key: None,
        }
    }

    pub fn has_credentials(&self, platform: Platform) -> bool {
        match platform {
            Platform::Microblog => self.microblog.is_some(),
            Platform::Relay => self.relay_key.is_some(),
        }
    }

    pub fn configured_platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.has_credentials(*p))
            .collect()
    }
}

impl Default for User {
    fn default() -> Self {
        Self::new()
    }
}
