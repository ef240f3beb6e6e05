//! Storage collaborators used by the orchestrator
//!
//! [`crate::db::Database`] is the SQLite implementation; [`MemoryStore`]
//! keeps everything in process memory and can be told to fail, which is how
//! persistence failures are exercised in tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::{CrosscastError, DbError, Result};
use crate::types::{MicroblogBundle, Platform, Post, PostStatus, PublicationLog, User};

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Persist a new content item; it must be readable once this returns
    async fn create_post(&self, post: &Post) -> Result<()>;

    async fn update_status(&self, post_id: &str, status: PostStatus) -> Result<()>;

    async fn get_post(&self, post_id: &str) -> Result<Option<Post>>;

    /// Like `get_post`, but items owned by anyone else read as absent
    async fn get_post_for_user(&self, user_id: &str, post_id: &str) -> Result<Option<Post>> {
        Ok(self
            .get_post(post_id)
            .await?
            .filter(|post| post.user_id == user_id))
    }
}

/// Append-only audit trail of publish attempts
#[async_trait]
pub trait PublicationLogStore: Send + Sync {
    async fn append_log(&self, log: &PublicationLog) -> Result<()>;

    async fn logs_for_post(&self, post_id: &str) -> Result<Vec<PublicationLog>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: &User) -> Result<()>;

    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    async fn set_microblog_credentials(&self, user_id: &str, bundle: &MicroblogBundle)
        -> Result<()>;

    async fn set_relay_key(&self, user_id: &str, encrypted_key: &str) -> Result<()>;

    /// Remove the user's bundle for `platform`
    async fn clear_platform(&self, user_id: &str, platform: Platform) -> Result<()>;
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, User>,
    posts: HashMap<String, Post>,
    logs: Vec<PublicationLog>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_post_creates: AtomicBool,
    fail_status_updates: AtomicBool,
    fail_log_appends: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_post_creates(&self, fail: bool) {
        self.fail_post_creates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_status_updates(&self, fail: bool) {
        self.fail_status_updates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_log_appends(&self, fail: bool) {
        self.fail_log_appends.store(fail, Ordering::SeqCst);
    }

    /// Number of content items stored
    pub fn post_count(&self) -> usize {
        self.state().map(|s| s.posts.len()).unwrap_or(0)
    }

    /// Snapshot of every stored content item
    pub fn posts(&self) -> Vec<Post> {
        self.state()
            .map(|s| s.posts.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of log rows across all content items
    pub fn log_count(&self) -> usize {
        self.state().map(|s| s.logs.len()).unwrap_or(0)
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| DbError::Unavailable("memory store lock poisoned".to_string()).into())
    }

    fn check(flag: &AtomicBool, operation: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable(format!("{} rejected by store", operation)).into());
        }
        Ok(())
    }

    fn with_user<F>(&self, user_id: &str, update: F) -> Result<()>
    where
        F: FnOnce(&mut User),
    {
        let mut state = self.state()?;
        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| CrosscastError::NotFound(format!("user {}", user_id)))?;
        update(user);
        Ok(())
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn create_post(&self, post: &Post) -> Result<()> {
        Self::check(&self.fail_post_creates, "post create")?;
        self.state()?.posts.insert(post.id.clone(), post.clone());
        Ok(())
    }

    async fn update_status(&self, post_id: &str, status: PostStatus) -> Result<()> {
        Self::check(&self.fail_status_updates, "status update")?;
        let mut state = self.state()?;
        let post = state
            .posts
            .get_mut(post_id)
            .ok_or_else(|| CrosscastError::NotFound(format!("post {}", post_id)))?;
        post.status = status;
        Ok(())
    }

    async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        Ok(self.state()?.posts.get(post_id).cloned())
    }
}

#[async_trait]
impl PublicationLogStore for MemoryStore {
    async fn append_log(&self, log: &PublicationLog) -> Result<()> {
        Self::check(&self.fail_log_appends, "log append")?;
        self.state()?.logs.push(log.clone());
        Ok(())
    }

    async fn logs_for_post(&self, post_id: &str) -> Result<Vec<PublicationLog>> {
        Ok(self
            .state()?
            .logs
            .iter()
            .filter(|log| log.post_id == post_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: &User) -> Result<()> {
        self.state()?.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.state()?.users.get(user_id).cloned())
    }

    async fn set_microblog_credentials(
        &self,
        user_id: &str,
        bundle: &MicroblogBundle,
    ) -> Result<()> {
        self.with_user(user_id, |user| user.microblog = Some(bundle.clone()))
    }

    async fn set_relay_key(&self, user_id: &str, encrypted_key: &str) -> Result<()> {
        self.with_user(user_id, |user| user.relay_key = Some(encrypted_key.to_string()))
    }

    async fn clear_platform(&self, user_id: &str, platform: Platform) -> Result<()> {
        self.with_user(user_id, |user| match platform {
            Platform::Microblog => user.microblog = None,
            Platform::Relay => user.relay_key = None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PublishOutcome;

    #[tokio::test]
    async fn test_post_lifecycle() {
        let store = MemoryStore::new();
        let post = Post::new("user-1".to_string(), "hello".to_string(), vec![]);

        store.create_post(&post).await.unwrap();
        assert_eq!(store.get_post(&post.id).await.unwrap(), Some(post.clone()));

        store
            .update_status(&post.id, PostStatus::Partial)
            .await
            .unwrap();
        let stored = store.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Partial);
    }

    #[tokio::test]
    async fn test_foreign_post_reads_as_absent() {
        let store = MemoryStore::new();
        let post = Post::new("owner".to_string(), "mine".to_string(), vec![]);
        store.create_post(&post).await.unwrap();

        assert!(store
            .get_post_for_user("owner", &post.id)
            .await
            .unwrap()
            .is_some());
        assert!(store
            .get_post_for_user("someone-else", &post.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_unknown_post() {
        let store = MemoryStore::new();
        let result = store.update_status("missing", PostStatus::Failed).await;
        assert!(matches!(result, Err(CrosscastError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_logs_filtered_by_post() {
        let store = MemoryStore::new();
        let outcome = PublishOutcome::failed("nope");

        store
            .append_log(&PublicationLog::from_outcome("a", Platform::Relay, &outcome))
            .await
            .unwrap();
        store
            .append_log(&PublicationLog::from_outcome("b", Platform::Relay, &outcome))
            .await
            .unwrap();

        assert_eq!(store.logs_for_post("a").await.unwrap().len(), 1);
        assert_eq!(store.log_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryStore::new();
        let post = Post::new("user-1".to_string(), "hello".to_string(), vec![]);

        store.fail_post_creates(true);
        assert!(matches!(
            store.create_post(&post).await,
            Err(CrosscastError::Database(DbError::Unavailable(_)))
        ));
        assert_eq!(store.post_count(), 0);

        store.fail_post_creates(false);
        store.create_post(&post).await.unwrap();

        store.fail_log_appends(true);
        let log =
            PublicationLog::from_outcome(&post.id, Platform::Relay, &PublishOutcome::failed("x"));
        assert!(store.append_log(&log).await.is_err());
        assert_eq!(store.log_count(), 0);
    }

    #[tokio::test]
    async fn test_user_credentials() {
        let store = MemoryStore::new();
        let user = User::new();
        store.create_user(&user).await.unwrap();

        store.set_relay_key(&user.id, "cipher").await.unwrap();
        store
            .set_microblog_credentials(
                &user.id,
                &MicroblogBundle {
                    token: "t".to_string(),
                    secret: "s".to_string(),
                },
            )
            .await
            .unwrap();

        let stored = store.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(
            stored.configured_platforms(),
            vec![Platform::Microblog, Platform::Relay]
        );

        store
            .clear_platform(&user.id, Platform::Microblog)
            .await
            .unwrap();
        let stored = store.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(stored.configured_platforms(), vec![Platform::Relay]);

        let result = store.set_relay_key("nobody", "cipher").await;
        assert!(matches!(result, Err(CrosscastError::NotFound(_))));
    }
}
