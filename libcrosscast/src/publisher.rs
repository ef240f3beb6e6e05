//! Publish orchestration
//!
//! [`PublishOrchestrator::publish`] validates a request, records a pending
//! content item, fans out one task per eligible platform, waits for all of
//! them, writes one publication log per attempt and finally derives the
//! item's aggregate status from those outcomes.
//!
//! Platform-level problems (bad credentials, network failures, timeouts,
//! even a panicking adapter) end up as a failed outcome for that platform
//! only. Errors from the stores themselves are fatal: they are returned to
//! the caller after the content item has been marked `failed` when possible.

use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Instrument};

use crate::config::{Config, LimitsConfig};
use crate::error::{CrosscastError, PlatformError, Result, ValidationError};
use crate::log_writer::LogWriter;
use crate::platforms::{build_adapters, PlatformAdapter, PlatformCredentials};
use crate::store::{PostStore, PublicationLogStore};
use crate::types::{Platform, Post, PostStatus, PublicationLog, PublishOutcome, User};
use crate::vault::CredentialVault;

/// Default upper bound for a single platform attempt
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one `publish` call
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PublishReport {
    pub post_id: String,
    pub status: PostStatus,
    pub results: BTreeMap<Platform, PublishOutcome>,
}

impl PublishReport {
    pub fn all_failed(&self) -> bool {
        self.status == PostStatus::Failed
    }
}

pub struct PublishOrchestrator {
    vault: Arc<CredentialVault>,
    adapters: Vec<Arc<dyn PlatformAdapter>>,
    posts: Arc<dyn PostStore>,
    logs: Arc<dyn PublicationLogStore>,
    limits: LimitsConfig,
    timeout: Duration,
}

impl PublishOrchestrator {
    /// Create an orchestrator over a set of adapters
    ///
    /// At most one adapter per platform is kept; when several are given for
    /// the same platform the first one wins.
    pub fn new(
        vault: Arc<CredentialVault>,
        adapters: Vec<Arc<dyn PlatformAdapter>>,
        posts: Arc<dyn PostStore>,
        logs: Arc<dyn PublicationLogStore>,
    ) -> Self {
        let mut unique: Vec<Arc<dyn PlatformAdapter>> = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            if unique.iter().any(|a| a.platform() == adapter.platform()) {
                warn!(platform = %adapter.platform(), "Ignoring duplicate adapter");
                continue;
            }
            unique.push(adapter);
        }

        Self {
            vault,
            adapters: unique,
            posts,
            logs,
            limits: LimitsConfig::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Wire the production adapters, vault and limits from configuration
    pub fn from_config<S>(config: &Config, store: Arc<S>) -> Result<Self>
    where
        S: PostStore + PublicationLogStore + 'static,
    {
        let vault = Arc::new(CredentialVault::from_config(config)?);
        let posts: Arc<dyn PostStore> = store.clone();
        let logs: Arc<dyn PublicationLogStore> = store;

        Ok(Self::new(vault, build_adapters(config), posts, logs)
            .with_limits(config.limits)
            .with_timeout(config.publish.timeout()))
    }

    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reject malformed requests before any side effect
    pub fn validate(&self, content: &str, media: &[String]) -> Result<()> {
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }

        let length = content.chars().count();
        if length > self.limits.max_content_length {
            return Err(ValidationError::ContentTooLong {
                length,
                max: self.limits.max_content_length,
            }
            .into());
        }

        if media.len() > self.limits.max_media {
            return Err(ValidationError::TooManyMedia {
                count: media.len(),
                max: self.limits.max_media,
            }
            .into());
        }

        Ok(())
    }

    /// Adapters for which the user holds a bundle and that are set up
    fn eligible_adapters(&self, user: &User) -> Vec<Arc<dyn PlatformAdapter>> {
        let mut eligible = Vec::new();
        for platform in user.configured_platforms() {
            match self.adapters.iter().find(|a| a.platform() == platform) {
                Some(adapter) if adapter.is_configured() => eligible.push(Arc::clone(adapter)),
                Some(_) => debug!(platform = %platform, "Skipping unconfigured platform"),
                None => debug!(platform = %platform, "No adapter for platform"),
            }
        }
        eligible
    }

    pub async fn publish(
        &self,
        user: &User,
        content: &str,
        media: Option<Vec<String>>,
    ) -> Result<PublishReport> {
        let media = media.unwrap_or_default();
        self.validate(content, &media)?;

        let targets = self.eligible_adapters(user);
        if targets.is_empty() {
            return Err(ValidationError::NoPlatforms.into());
        }

        let post = Post::new(user.id.clone(), content.to_string(), media);
        self.posts.create_post(&post).await?;

        info!(
            post_id = %post.id,
            platforms = targets.len(),
            "Publishing content item"
        );

        let writer = LogWriter::spawn(Arc::clone(&self.logs));
        let content: Arc<str> = Arc::from(post.content.as_str());
        let media: Arc<[String]> = Arc::from(post.media.clone());

        let attempts = targets.into_iter().map(|adapter| {
            let platform = adapter.platform();
            let span = tracing::info_span!("attempt", post_id = %post.id, platform = %platform);
            let sender = writer.sender();
            let post_id = post.id.clone();
            let credentials = PlatformCredentials::decrypt(&self.vault, user, platform);
            let content = Arc::clone(&content);
            let media = Arc::clone(&media);
            let timeout = self.timeout;

            async move {
                let outcome = match credentials {
                    Ok(Some(credentials)) => {
                        run_attempt(adapter, credentials, content, media, timeout).await
                    }
                    Ok(None) => PublishOutcome::failed(format!("no credentials for {}", platform)),
                    Err(e) => PublishOutcome::failed(e),
                };

                match &outcome {
                    PublishOutcome::Success { platform_post_id } => {
                        info!(platform_post_id = %platform_post_id, "Published")
                    }
                    PublishOutcome::Failed { error } => warn!(error = %error, "Publish failed"),
                }

                let queued = sender.send(PublicationLog::from_outcome(&post_id, platform, &outcome));
                (platform, outcome, queued)
            }
            .instrument(span)
        });

        let joined = join_all(attempts).await;

        let mut results = BTreeMap::new();
        let mut queue_error = None;
        for (platform, outcome, queued) in joined {
            if let Err(e) = queued {
                queue_error.get_or_insert(e);
            }
            results.insert(platform, outcome);
        }

        let persistence_error = match (queue_error, writer.finish().await) {
            (Some(e), _) | (None, Err(e)) => Some(e),
            (None, Ok(written)) => {
                debug!(post_id = %post.id, written, "Publication logs written");
                None
            }
        };
        if let Some(e) = persistence_error {
            self.mark_failed(&post.id).await;
            return Err(e);
        }

        let status = PostStatus::aggregate(results.values().map(PublishOutcome::log_outcome))
            .unwrap_or(PostStatus::Failed);

        if let Err(e) = self.posts.update_status(&post.id, status).await {
            self.mark_failed(&post.id).await;
            return Err(e);
        }

        info!(post_id = %post.id, status = %status, "Content item finalized");

        Ok(PublishReport {
            post_id: post.id,
            status,
            results,
        })
    }

    async fn mark_failed(&self, post_id: &str) {
        if let Err(e) = self.posts.update_status(post_id, PostStatus::Failed).await {
            warn!(post_id = %post_id, error = %e, "Could not mark content item failed");
        }
    }

    /// Publication logs recorded for a content item
    pub async fn logs(&self, post_id: &str) -> Result<Vec<PublicationLog>> {
        self.logs.logs_for_post(post_id).await
    }

    pub async fn post(&self, post_id: &str) -> Result<Post> {
        self.posts
            .get_post(post_id)
            .await?
            .ok_or_else(|| CrosscastError::NotFound(format!("post {}", post_id)))
    }

    /// A content item and its logs, visible only to the user who owns it
    pub async fn history_for_user(
        &self,
        user_id: &str,
        post_id: &str,
    ) -> Result<(Post, Vec<PublicationLog>)> {
        let post = self
            .posts
            .get_post_for_user(user_id, post_id)
            .await?
            .ok_or_else(|| CrosscastError::NotFound(format!("post {}", post_id)))?;
        let logs = self.logs.logs_for_post(&post.id).await?;
        Ok((post, logs))
    }
}

/// Run one adapter call on its own task, bounded by `limit`
///
/// A panic inside the adapter is contained by the task boundary and
/// reported as a failed outcome.
async fn run_attempt(
    adapter: Arc<dyn PlatformAdapter>,
    credentials: PlatformCredentials,
    content: Arc<str>,
    media: Arc<[String]>,
    limit: Duration,
) -> PublishOutcome {
    let platform = adapter.platform();

    let task = tokio::spawn(
        async move {
            match tokio::time::timeout(limit, adapter.publish(&credentials, &content, &media))
                .await
            {
                Ok(result) => PublishOutcome::from(result),
                Err(_) => PublishOutcome::failed(CrosscastError::from(PlatformError::Timeout(
                    format!("{} did not respond within {}ms", platform, limit.as_millis()),
                ))),
            }
        }
        .in_current_span(),
    );

    match task.await {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => PublishOutcome::failed(format!("{} adapter panicked", platform)),
        Err(e) => PublishOutcome::failed(format!("{} attempt was cancelled: {}", platform, e)),
    }
}
