//! Symmetric encryption of at-rest platform secrets
//!
//! Ciphertexts are stored as `hex(nonce):hex(ciphertext || tag)`. Every call
//! to [`CredentialVault::encrypt`] draws a fresh 96-bit nonce, so encrypting
//! the same plaintext twice yields two different strings.

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::config::Config;
use crate::error::{ConfigError, CredentialError, Result};

/// Shortest vault secret accepted at startup, in bytes
pub const MIN_KEY_LENGTH: usize = 16;

const NONCE_LENGTH: usize = 12;
const SEPARATOR: char = ':';

pub struct CredentialVault {
    key: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl CredentialVault {
    /// Derive the process-wide vault key from a secret
    pub fn new(secret: &SecretString) -> Result<Self> {
        let raw = secret.expose_secret().as_bytes();
        if raw.len() < MIN_KEY_LENGTH {
            return Err(ConfigError::WeakEncryptionKey {
                length: raw.len(),
                min: MIN_KEY_LENGTH,
            }
            .into());
        }

        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&Sha256::digest(raw));

        Ok(Self { key })
    }

    /// Build the vault from the configured key source
    pub fn from_config(config: &Config) -> Result<Self> {
        let secret = config.resolve_encryption_key()?;
        Self::new(&secret)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_slice()))
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher()
            .encrypt(nonce, plaintext)
            .map_err(|e| CredentialError::Encryption(e.to_string()))?;

        Ok(format!(
            "{}{}{}",
            hex::encode(nonce_bytes),
            SEPARATOR,
            hex::encode(ciphertext)
        ))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>> {
        let parts: Vec<&str> = encoded.split(SEPARATOR).collect();
        if parts.len() != 2 {
            return Err(CredentialError::Decryption(format!(
                "expected 2 components, found {}",
                parts.len()
            ))
            .into());
        }

        let nonce_bytes = hex::decode(parts[0])
            .map_err(|e| CredentialError::Decryption(format!("invalid nonce encoding: {}", e)))?;
        if nonce_bytes.len() != NONCE_LENGTH {
            return Err(CredentialError::Decryption(format!(
                "nonce must be {} bytes, found {}",
                NONCE_LENGTH,
                nonce_bytes.len()
            ))
            .into());
        }

        let ciphertext = hex::decode(parts[1]).map_err(|e| {
            CredentialError::Decryption(format!("invalid ciphertext encoding: {}", e))
        })?;

        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .map_err(|_| CredentialError::Decryption("authentication failed".to_string()))?;

        Ok(plaintext)
    }

    pub fn encrypt_str(&self, secret: &SecretString) -> Result<String> {
        self.encrypt(secret.expose_secret().as_bytes())
    }

    pub fn decrypt_str(&self, encoded: &str) -> Result<SecretString> {
        let bytes = Zeroizing::new(self.decrypt(encoded)?);
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| CredentialError::Decryption("plaintext is not UTF-8".to_string()))?;
        Ok(SecretString::new(text.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrosscastError;

    fn vault() -> CredentialVault {
        CredentialVault::new(&SecretString::new("correct horse battery staple".into())).unwrap()
    }

    fn assert_decryption_error(result: Result<Vec<u8>>) {
        assert!(
            matches!(
                result,
                Err(CrosscastError::Credential(CredentialError::Decryption(_)))
            ),
            "expected decryption error, got {:?}",
            result
        );
    }

    #[test]
    fn test_round_trip() {
        let vault = vault();
        for plaintext in [
            "",
            "token",
            "a:b:c",
            ":",
            "nsec1vl029mgpspedva04g90vltkh6fvh240zqtv9k0t9af8935ke9laqsnlfe5",
            "ünïcödé ☃",
        ] {
            let encoded = vault.encrypt(plaintext.as_bytes()).unwrap();
            assert_eq!(vault.decrypt(&encoded).unwrap(), plaintext.as_bytes());
        }
    }

    #[test]
    fn test_round_trip_binary() {
        let vault = vault();
        let plaintext: Vec<u8> = (0..=255u8).collect();
        let encoded = vault.encrypt(&plaintext).unwrap();
        assert_eq!(vault.decrypt(&encoded).unwrap(), plaintext);
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let vault = vault();
        let first = vault.encrypt(b"same input").unwrap();
        let second = vault.encrypt(b"same input").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_encoding_has_two_components() {
        let encoded = vault().encrypt(b"x").unwrap();
        let parts: Vec<&str> = encoded.split(':').collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), NONCE_LENGTH * 2);
    }

    #[test]
    fn test_wrong_component_count() {
        let vault = vault();
        let encoded = vault.encrypt(b"secret").unwrap();

        assert_decryption_error(vault.decrypt(""));
        assert_decryption_error(vault.decrypt(&encoded.replace(':', "")));
        assert_decryption_error(vault.decrypt(&format!("{}:00", encoded)));
        assert_decryption_error(vault.decrypt(&format!(":{}", encoded)));
    }

    #[test]
    fn test_bad_hex() {
        let vault = vault();
        let encoded = vault.encrypt(b"secret").unwrap();
        let (nonce, body) = encoded.split_once(':').unwrap();

        assert_decryption_error(vault.decrypt(&format!("zz{}:{}", &nonce[2..], body)));
        assert_decryption_error(vault.decrypt(&format!("{}:{}g", nonce, body)));
    }

    #[test]
    fn test_short_nonce() {
        let vault = vault();
        let encoded = vault.encrypt(b"secret").unwrap();
        let (nonce, body) = encoded.split_once(':').unwrap();

        assert_decryption_error(vault.decrypt(&format!("{}:{}", &nonce[2..], body)));
    }

    #[test]
    fn test_tampered_ciphertext() {
        let vault = vault();
        let encoded = vault.encrypt(b"secret").unwrap();
        let (nonce, body) = encoded.split_once(':').unwrap();

        let mut bytes = hex::decode(body).unwrap();
        bytes[0] ^= 0x01;
        let tampered = format!("{}:{}", nonce, hex::encode(bytes));

        assert_decryption_error(vault.decrypt(&tampered));
    }

    #[test]
    fn test_wrong_key() {
        let encoded = vault().encrypt(b"secret").unwrap();
        let other =
            CredentialVault::new(&SecretString::new("a different vault secret".into())).unwrap();

        assert_decryption_error(other.decrypt(&encoded));
    }

    #[test]
    fn test_weak_key_rejected() {
        let result = CredentialVault::new(&SecretString::new("short".into()));
        assert!(matches!(
            result,
            Err(CrosscastError::Config(ConfigError::WeakEncryptionKey {
                length: 5,
                min: MIN_KEY_LENGTH
            }))
        ));
    }

    #[test]
    fn test_str_helpers() {
        let vault = vault();
        let encoded = vault
            .encrypt_str(&SecretString::new("access-token".into()))
            .unwrap();
        assert_eq!(
            vault.decrypt_str(&encoded).unwrap().expose_secret(),
            "access-token"
        );

        let not_utf8 = vault.encrypt(&[0xff, 0xfe]).unwrap();
        assert!(matches!(
            vault.decrypt_str(&not_utf8),
            Err(CrosscastError::Credential(CredentialError::Decryption(_)))
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let output = format!("{:?}", vault());
        assert!(output.contains("REDACTED"));
    }
}
