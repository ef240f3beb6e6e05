//! Relay network adapter
//!
//! Signs a text note with the user's key and broadcasts it to every
//! configured relay. Broadcasting is best-effort: once the note is signed
//! and each relay has been attempted, the publish counts as a success no
//! matter how many relays accepted it.

use async_trait::async_trait;
use futures::future::join_all;
use nostr_sdk::{Client, Event, EventBuilder, Keys, Tag, TagStandard, ToBech32};
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::config::RelayConfig;
use crate::error::{CredentialError, PlatformError, Result};
use crate::platforms::{mismatch, PlatformAdapter, PlatformCredentials};
use crate::types::Platform;

/// Delivery of a signed event to a single relay
#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn send(&self, relay: &str, event: &Event) -> std::result::Result<(), String>;
}

/// Transport backed by a shared `nostr_sdk::Client`
///
/// Relays are added and connected on first use.
pub struct NostrTransport {
    client: Client,
    relays: Vec<String>,
    connected: OnceCell<()>,
}

impl NostrTransport {
    pub fn new(relays: Vec<String>) -> Self {
        Self {
            // Events are signed before they reach the client, so its own keys go unused
            client: Client::new(Keys::generate()),
            relays,
            connected: OnceCell::new(),
        }
    }

    async fn ensure_connected(&self) {
        self.connected
            .get_or_init(|| async {
                for relay in &self.relays {
                    if let Err(e) = self.client.add_relay(relay).await {
                        tracing::warn!(relay = %relay, error = %e, "Failed to add relay");
                    }
                }
                self.client.connect().await;
            })
            .await;
    }
}

#[async_trait]
impl RelayTransport for NostrTransport {
    async fn send(&self, relay: &str, event: &Event) -> std::result::Result<(), String> {
        self.ensure_connected().await;
        self.client
            .send_event_to([relay], event.clone())
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Default wait for a single relay to accept a note
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RelayAdapter {
    relays: Vec<String>,
    transport: Arc<dyn RelayTransport>,
    send_timeout: Duration,
}

impl RelayAdapter {
    pub fn new(config: &RelayConfig) -> Self {
        let relays = dedup_relays(&config.relays);
        let transport = Arc::new(NostrTransport::new(relays.clone()));
        Self {
            relays,
            transport,
            send_timeout: config.send_timeout(),
        }
    }

    /// Use a custom transport, e.g. one that records deliveries
    pub fn with_transport(relays: Vec<String>, transport: Arc<dyn RelayTransport>) -> Self {
        Self {
            relays: dedup_relays(&relays),
            transport,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Bound the wait on each relay; a relay that does not answer in time
    /// counts as a rejected delivery
    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    pub fn relays(&self) -> &[String] {
        &self.relays
    }

    fn sign_note(&self, keys: &Keys, content: &str, media: &[String]) -> Result<Event> {
        let tags: Vec<Tag> = media
            .iter()
            .map(|url| Tag::from_standardized(TagStandard::Reference(url.clone())))
            .collect();

        EventBuilder::text_note(content, tags)
            .to_event(keys)
            .map_err(|e| PlatformError::Posting(format!("Failed to sign note: {}", e)).into())
    }
}

fn dedup_relays(relays: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    relays
        .iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty() && seen.insert(r.clone()))
        .collect()
}

/// Parse a hex or `nsec1` private key
pub fn parse_keys(input: &str) -> Result<Keys> {
    let key = input.trim();

    let looks_hex = key.len() == 64 && key.chars().all(|c| c.is_ascii_hexdigit());
    let looks_bech32 = key.starts_with("nsec1");
    if !looks_hex && !looks_bech32 {
        return Err(CredentialError::InvalidKeyFormat(
            "Key must be 64-character hex or bech32 nsec format".to_string(),
        )
        .into());
    }

    Keys::parse(key).map_err(|e| CredentialError::InvalidKeyFormat(e.to_string()).into())
}

/// Normalize either accepted private-key encoding to lowercase hex
pub fn normalize_private_key(input: &str) -> Result<SecretString> {
    let keys = parse_keys(input)?;
    Ok(SecretString::new(keys.secret_key().to_secret_hex().into()))
}

/// Public key (npub) for a private key in either encoding
pub fn public_key_for(private_key: &str) -> Result<String> {
    let keys = parse_keys(private_key)?;
    keys.public_key()
        .to_bech32()
        .map_err(|e| CredentialError::InvalidKeyFormat(e.to_string()).into())
}

/// Freshly generated key pair as (hex secret, npub)
pub fn generate_keys() -> Result<(SecretString, String)> {
    let keys = Keys::generate();
    let npub = keys
        .public_key()
        .to_bech32()
        .map_err(|e| CredentialError::InvalidKeyFormat(e.to_string()))?;
    Ok((
        SecretString::new(keys.secret_key().to_secret_hex().into()),
        npub,
    ))
}

#[async_trait]
impl PlatformAdapter for RelayAdapter {
    fn platform(&self) -> Platform {
        Platform::Relay
    }

    fn is_configured(&self) -> bool {
        !self.relays.is_empty()
    }

    async fn publish(
        &self,
        credentials: &PlatformCredentials,
        content: &str,
        media: &[String],
    ) -> Result<String> {
        if !self.is_configured() {
            return Err(PlatformError::NotConfigured("no relays configured".to_string()).into());
        }

        let private_key = match credentials {
            PlatformCredentials::Relay { private_key } => private_key,
            _ => return Err(mismatch(Platform::Relay)),
        };

        let keys = parse_keys(private_key.expose_secret())?;
        let event = self.sign_note(&keys, content, media)?;
        let event_id = event.id.to_hex();

        let send_timeout = self.send_timeout;
        let attempts = self.relays.iter().map(|relay| {
            let transport = Arc::clone(&self.transport);
            let event = &event;
            async move {
                let result = match tokio::time::timeout(send_timeout, transport.send(relay, event))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(format!(
                        "no answer within {}ms",
                        send_timeout.as_millis()
                    )),
                };
                (relay, result)
            }
        });

        let mut accepted = 0usize;
        for (relay, result) in join_all(attempts).await {
            match result {
                Ok(()) => accepted += 1,
                Err(e) => tracing::warn!(relay = %relay, error = %e, "Relay rejected note"),
            }
        }

        tracing::debug!(
            event_id = %event_id,
            accepted,
            attempted = self.relays.len(),
            "Note broadcast"
        );

        Ok(event_id)
    }
}
