//! Linking a microblog account through a two-step authorization handshake
//!
//! The handshake spans two separate requests: the first obtains a request
//! token and sends the user to the platform, the second comes back with a
//! verifier. The pending token pair is parked in a [`HandshakeStore`] in
//! between. [`MemoryHandshakeStore`] serves a single process; deployments
//! that run several processes need a shared store with TTL support behind
//! the same trait.

use async_trait::async_trait;
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{CredentialError, DbError, Result};
use crate::store::UserStore;
use crate::types::MicroblogBundle;
use crate::vault::CredentialVault;

/// How long a pending handshake stays redeemable
pub const DEFAULT_HANDSHAKE_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug)]
pub struct AuthorizationRequest {
    pub redirect_url: String,
    pub request_token: String,
    pub request_secret: SecretString,
}

#[derive(Debug)]
pub struct AccessTokens {
    pub token: SecretString,
    pub secret: SecretString,
}

/// The platform side of the handshake
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authorization_request(&self) -> Result<AuthorizationRequest>;

    async fn exchange(
        &self,
        request_token: &str,
        request_secret: &SecretString,
        verifier: &str,
    ) -> Result<AccessTokens>;
}

/// Ephemeral storage for pending handshakes, keyed by request token
#[async_trait]
pub trait HandshakeStore: Send + Sync {
    async fn put(&self, request_token: &str, request_secret: SecretString, ttl: Duration)
        -> Result<()>;

    /// Remove and return the secret if the entry exists and has not expired
    async fn take(&self, request_token: &str) -> Result<Option<SecretString>>;
}

struct PendingHandshake {
    secret: SecretString,
    expires_at: Instant,
}

#[derive(Default)]
pub struct MemoryHandshakeStore {
    pending: Mutex<HashMap<String, PendingHandshake>>,
}

impl MemoryHandshakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        match self.pending.lock() {
            Ok(mut pending) => {
                let before = pending.len();
                pending.retain(|_, entry| entry.expires_at > now);
                before - pending.len()
            }
            Err(_) => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HandshakeStore for MemoryHandshakeStore {
    async fn put(
        &self,
        request_token: &str,
        request_secret: SecretString,
        ttl: Duration,
    ) -> Result<()> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| DbError::Unavailable("handshake store lock poisoned".to_string()))?;

        // Evict abandoned handshakes
        let now = Instant::now();
        pending.retain(|_, entry| entry.expires_at > now);

        pending.insert(
            request_token.to_string(),
            PendingHandshake {
                secret: request_secret,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn take(&self, request_token: &str) -> Result<Option<SecretString>> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| DbError::Unavailable("handshake store lock poisoned".to_string()))?;

        Ok(pending
            .remove(request_token)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.secret))
    }
}

/// Drives the handshake and stores the resulting tokens, encrypted, on the user
pub struct AccountLinker {
    provider: Arc<dyn AuthProvider>,
    handshakes: Arc<dyn HandshakeStore>,
    users: Arc<dyn UserStore>,
    vault: Arc<CredentialVault>,
    ttl: Duration,
}

impl AccountLinker {
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        handshakes: Arc<dyn HandshakeStore>,
        users: Arc<dyn UserStore>,
        vault: Arc<CredentialVault>,
    ) -> Self {
        Self {
            provider,
            handshakes,
            users,
            vault,
            ttl: DEFAULT_HANDSHAKE_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Start a handshake and return the URL to send the user to
    pub async fn begin(&self) -> Result<String> {
        let request = self.provider.authorization_request().await?;
        self.handshakes
            .put(&request.request_token, request.request_secret, self.ttl)
            .await?;

        tracing::debug!("Authorization handshake started");
        Ok(request.redirect_url)
    }

    /// Finish a handshake for `user_id`
    ///
    /// The pending entry is consumed whether or not the exchange succeeds.
    pub async fn complete(&self, user_id: &str, request_token: &str, verifier: &str) -> Result<()> {
        let request_secret = self
            .handshakes
            .take(request_token)
            .await?
            .ok_or(CredentialError::HandshakeExpired)?;

        let tokens = self
            .provider
            .exchange(request_token, &request_secret, verifier)
            .await?;

        let bundle = MicroblogBundle {
            token: self.vault.encrypt_str(&tokens.token)?,
            secret: self.vault.encrypt_str(&tokens.secret)?,
        };
        self.users.set_microblog_credentials(user_id, &bundle).await?;

        tracing::info!(user_id = %user_id, "Microblog account linked");
        Ok(())
    }
}
