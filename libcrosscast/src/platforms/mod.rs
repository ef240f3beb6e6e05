//! Platform adapters
//!
//! Every adapter publishes one content item to one platform, given the
//! user's decrypted credentials. Content and media limits are enforced by
//! the orchestrator before an adapter is ever called, so adapters do not
//! re-validate.
//!
//! ```no_run
//! use libcrosscast::config::Config;
//! use libcrosscast::platforms::build_adapters;
//!
//! # fn example(config: &Config) {
//! for adapter in build_adapters(config) {
//!     if adapter.is_configured() {
//!         println!("{} is ready", adapter.platform());
//!     }
//! }
//! # }
//! ```

use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{CredentialError, Result};
use crate::types::{Platform, User};
use crate::vault::CredentialVault;

pub mod microblog;
pub mod oauth;
pub mod relay;

// Available outside tests so integration tests and embedders can drive the orchestrator
pub mod mock;

/// Capability shared by every platform integration
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Application-level setup is complete
    ///
    /// An unconfigured adapter is skipped by the orchestrator without an
    /// attempt or a log entry. Calling `publish` on it anyway fails fast with
    /// `PlatformError::NotConfigured` and performs no I/O.
    fn is_configured(&self) -> bool;

    /// Publish `content` and return the platform-assigned identifier
    async fn publish(
        &self,
        credentials: &PlatformCredentials,
        content: &str,
        media: &[String],
    ) -> Result<String>;
}

/// A user's decrypted credential bundle for one platform
pub enum PlatformCredentials {
    Microblog {
        token: SecretString,
        secret: SecretString,
    },
    Relay {
        private_key: SecretString,
    },
}

impl std::fmt::Debug for PlatformCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformCredentials")
            .field("platform", &self.platform())
            .finish_non_exhaustive()
    }
}

impl PlatformCredentials {
    pub fn platform(&self) -> Platform {
        match self {
            PlatformCredentials::Microblog { .. } => Platform::Microblog,
            PlatformCredentials::Relay { .. } => Platform::Relay,
        }
    }

    /// Decrypt the user's stored bundle for `platform`
    ///
    /// Returns `Ok(None)` when the user has no bundle for that platform.
    pub fn decrypt(
        vault: &CredentialVault,
        user: &User,
        platform: Platform,
    ) -> Result<Option<Self>> {
        let credentials = match platform {
            Platform::Microblog => match &user.microblog {
                Some(bundle) => Some(PlatformCredentials::Microblog {
                    token: vault.decrypt_str(&bundle.token)?,
                    secret: vault.decrypt_str(&bundle.secret)?,
                }),
                None => None,
            },
            Platform::Relay => match &user.relay_key {
                Some(encrypted) => Some(PlatformCredentials::Relay {
                    private_key: vault.decrypt_str(encrypted)?,
                }),
                None => None,
            },
        };

        Ok(credentials)
    }
}

pub(crate) fn mismatch(platform: Platform) -> crate::error::CrosscastError {
    CredentialError::Mismatch { platform }.into()
}

/// Construct one adapter per platform from the application configuration
///
/// Adapters are always returned; whether they can be used is reported by
/// [`PlatformAdapter::is_configured`].
pub fn build_adapters(config: &Config) -> Vec<Arc<dyn PlatformAdapter>> {
    vec![
        Arc::new(microblog::MicroblogAdapter::new(config.microblog.as_ref())),
        Arc::new(
            relay::RelayAdapter::new(&config.relay).with_send_timeout(config.relay_send_timeout()),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrosscastError;
    use crate::types::MicroblogBundle;
    use secrecy::ExposeSecret;

    fn vault() -> CredentialVault {
        CredentialVault::new(&SecretString::new("platforms-test-vault-key".into())).unwrap()
    }

    #[test]
    fn test_decrypt_missing_bundle() {
        let user = User::new();
        let vault = vault();

        for platform in Platform::ALL {
            assert!(PlatformCredentials::decrypt(&vault, &user, platform)
                .unwrap()
                .is_none());
        }
    }

    #[test]
    fn test_decrypt_microblog_bundle() {
        let vault = vault();
        let mut user = User::new();
        user.microblog = Some(MicroblogBundle {
            token: vault.encrypt(b"access-token").unwrap(),
            secret: vault.encrypt(b"access-secret").unwrap(),
        });

        let credentials = PlatformCredentials::decrypt(&vault, &user, Platform::Microblog)
            .unwrap()
            .unwrap();

        match credentials {
            PlatformCredentials::Microblog { token, secret } => {
                assert_eq!(token.expose_secret(), "access-token");
                assert_eq!(secret.expose_secret(), "access-secret");
            }
            other => panic!("unexpected credentials {:?}", other),
        }
    }

    #[test]
    fn test_decrypt_corrupt_bundle() {
        let vault = vault();
        let mut user = User::new();
        user.relay_key = Some("not-a-ciphertext".to_string());

        let result = PlatformCredentials::decrypt(&vault, &user, Platform::Relay);
        assert!(matches!(
            result,
            Err(CrosscastError::Credential(CredentialError::Decryption(_)))
        ));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let credentials = PlatformCredentials::Relay {
            private_key: SecretString::new("super-secret".into()),
        };
        let output = format!("{:?}", credentials);
        assert!(!output.contains("super-secret"));
        assert!(output.contains("Relay"));
    }

    #[test]
    fn test_build_adapters_from_default_config() {
        let config = Config::default_config();
        let adapters = build_adapters(&config);

        let platforms: Vec<Platform> = adapters.iter().map(|a| a.platform()).collect();
        assert_eq!(platforms, vec![Platform::Microblog, Platform::Relay]);

        // No [microblog] section means no application credentials
        assert!(!adapters[0].is_configured());
        assert!(adapters[1].is_configured());
    }
}
