//! SQLite persistence for Crosscast

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;

use crate::config::expand_path;
use crate::error::{CrosscastError, DbError, Result};
use crate::store::{PostStore, PublicationLogStore, UserStore};
use crate::types::{
    LogOutcome, MicroblogBundle, Platform, Post, PostStatus, PublicationLog, User,
};

const MEMORY_PATH: &str = ":memory:";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and run migrations
    ///
    /// `:memory:` opens a private in-memory database on a single connection.
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = if db_path == MEMORY_PATH {
            SqlitePoolOptions::new()
                .max_connections(1)
                // The database lives only as long as its one connection
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
                .map_err(DbError::SqlxError)?
        } else {
            let expanded = expand_path(db_path);
            if let Some(parent) = expanded.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
                }
            }

            // Forward slashes work for SQLite URLs on every platform
            let db_url = format!(
                "sqlite://{}?mode=rwc",
                expanded.to_string_lossy().replace('\\', "/")
            );
            SqlitePool::connect(&db_url)
                .await
                .map_err(DbError::SqlxError)?
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        tracing::debug!(path = %db_path, "Database ready");
        Ok(Self { pool })
    }

    pub async fn open(path: &Path) -> Result<Self> {
        Self::new(&path.to_string_lossy()).await
    }
}

fn corrupt(field: &str, detail: impl std::fmt::Display) -> CrosscastError {
    DbError::Corrupt(format!("{}: {}", field, detail)).into()
}

fn post_from_row(row: &SqliteRow) -> Result<Post> {
    let media_json: String = row.try_get("media").map_err(DbError::SqlxError)?;
    let media: Vec<String> =
        serde_json::from_str(&media_json).map_err(|e| corrupt("posts.media", e))?;
    let status: String = row.try_get("status").map_err(DbError::SqlxError)?;

    Ok(Post {
        id: row.try_get("id").map_err(DbError::SqlxError)?,
        user_id: row.try_get("user_id").map_err(DbError::SqlxError)?,
        content: row.try_get("content").map_err(DbError::SqlxError)?,
        media,
        status: status
            .parse::<PostStatus>()
            .map_err(|e| corrupt("posts.status", e))?,
        created_at: row.try_get("created_at").map_err(DbError::SqlxError)?,
    })
}

fn log_from_row(row: &SqliteRow) -> Result<PublicationLog> {
    let platform: String = row.try_get("platform").map_err(DbError::SqlxError)?;
    let outcome: String = row.try_get("outcome").map_err(DbError::SqlxError)?;

    Ok(PublicationLog {
        id: row.try_get("id").map_err(DbError::SqlxError)?,
        post_id: row.try_get("post_id").map_err(DbError::SqlxError)?,
        platform: platform
            .parse::<Platform>()
            .map_err(|e| corrupt("publication_logs.platform", e))?,
        outcome: outcome
            .parse::<LogOutcome>()
            .map_err(|e| corrupt("publication_logs.outcome", e))?,
        error: row.try_get("error").map_err(DbError::SqlxError)?,
        platform_post_id: row.try_get("platform_post_id").map_err(DbError::SqlxError)?,
        published_at: row.try_get("published_at").map_err(DbError::SqlxError)?,
    })
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    let token: Option<String> = row.try_get("microblog_token").map_err(DbError::SqlxError)?;
    let secret: Option<String> = row.try_get("microblog_secret").map_err(DbError::SqlxError)?;

    let microblog = match (token, secret) {
        (Some(token), Some(secret)) => Some(MicroblogBundle { token, secret }),
        (None, None) => None,
        _ => return Err(corrupt("users.microblog", "token and secret must be set together")),
    };

    Ok(User {
        id: row.try_get("id").map_err(DbError::SqlxError)?,
        created_at: row.try_get("created_at").map_err(DbError::SqlxError)?,
        microblog,
        relay_key: row.try_get("relay_key").map_err(DbError::SqlxError)?,
    })
}

fn ensure_updated(rows_affected: u64, what: &str, id: &str) -> Result<()> {
    if rows_affected == 0 {
        return Err(CrosscastError::NotFound(format!("{} {}", what, id)));
    }
    Ok(())
}

#[async_trait]
impl PostStore for Database {
    async fn create_post(&self, post: &Post) -> Result<()> {
        let media = serde_json::to_string(&post.media).map_err(|e| corrupt("posts.media", e))?;

        sqlx::query(
            r#"
            INSERT INTO posts (id, user_id, content, media, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.user_id)
        .bind(&post.content)
        .bind(media)
        .bind(post.status.as_str())
        .bind(post.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn update_status(&self, post_id: &str, status: PostStatus) -> Result<()> {
        let result = sqlx::query("UPDATE posts SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        ensure_updated(result.rows_affected(), "post", post_id)
    }

    async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, content, media, status, created_at
            FROM posts WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(post_from_row).transpose()
    }
}

#[async_trait]
impl PublicationLogStore for Database {
    async fn append_log(&self, log: &PublicationLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO publication_logs
                (id, post_id, platform, outcome, error, platform_post_id, published_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.id)
        .bind(&log.post_id)
        .bind(log.platform.as_str())
        .bind(log.outcome.as_str())
        .bind(&log.error)
        .bind(&log.platform_post_id)
        .bind(log.published_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn logs_for_post(&self, post_id: &str) -> Result<Vec<PublicationLog>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, platform, outcome, error, platform_post_id, published_at
            FROM publication_logs
            WHERE post_id = ?
            ORDER BY published_at, platform
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(log_from_row).collect()
    }
}

#[async_trait]
impl UserStore for Database {
    async fn create_user(&self, user: &User) -> Result<()> {
        let (token, secret) = match &user.microblog {
            Some(bundle) => (Some(bundle.token.as_str()), Some(bundle.secret.as_str())),
            None => (None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO users (id, created_at, microblog_token, microblog_secret, relay_key)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(user.created_at)
        .bind(token)
        .bind(secret)
        .bind(&user.relay_key)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, created_at, microblog_token, microblog_secret, relay_key
            FROM users WHERE id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn set_microblog_credentials(
        &self,
        user_id: &str,
        bundle: &MicroblogBundle,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users SET microblog_token = ?, microblog_secret = ? WHERE id = ?",
        )
        .bind(&bundle.token)
        .bind(&bundle.secret)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        ensure_updated(result.rows_affected(), "user", user_id)
    }

    async fn set_relay_key(&self, user_id: &str, encrypted_key: &str) -> Result<()> {
        let result = sqlx::query("UPDATE users SET relay_key = ? WHERE id = ?")
            .bind(encrypted_key)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        ensure_updated(result.rows_affected(), "user", user_id)
    }

    async fn clear_platform(&self, user_id: &str, platform: Platform) -> Result<()> {
        let statement = match platform {
            Platform::Microblog => {
                "UPDATE users SET microblog_token = NULL, microblog_secret = NULL WHERE id = ?"
            }
            Platform::Relay => "UPDATE users SET relay_key = NULL WHERE id = ?",
        };

        let result = sqlx::query(statement)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        ensure_updated(result.rows_affected(), "user", user_id)
    }
}
