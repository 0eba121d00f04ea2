//! Credential vault: per-user secrets encrypted under a process-wide
//! master key.
//!
//! Key derivation is PBKDF2-HMAC-SHA256 (fixed salt, 100k iterations)
//! into an AES-256-GCM cipher. Stored ciphertexts are self-delimiting
//! and version-tagged: base64("v1" || nonce || ciphertext).

use std::collections::HashMap;
use std::sync::RwLock;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{DomainError, DomainResult};

const KDF_SALT: &[u8] = b"trading-platform-salt";
const KDF_ITERATIONS: u32 = 100_000;
const VERSION_TAG: &[u8] = b"v1";
const NONCE_LEN: usize = 12;

pub struct CredentialVault {
    cipher: RwLock<Aes256Gcm>,
}

impl CredentialVault {
    pub fn new(master_key: &str) -> DomainResult<Self> {
        if master_key.len() < 32 {
            return Err(DomainError::Fatal(
                "MASTER_ENCRYPTION_KEY must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            cipher: RwLock::new(Self::derive_cipher(master_key)),
        })
    }

    fn derive_cipher(master_key: &str) -> Aes256Gcm {
        let mut key = [0u8; 32];
        pbkdf2_hmac::<Sha256>(master_key.as_bytes(), KDF_SALT, KDF_ITERATIONS, &mut key);
        Aes256Gcm::new(&key.into())
    }

    pub fn encrypt(&self, plaintext: &str) -> DomainResult<String> {
        let cipher = self
            .cipher
            .read()
            .map_err(|_| DomainError::Crypto("cipher lock poisoned".into()))?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| DomainError::Crypto(format!("encryption failed: {}", e)))?;

        let mut payload = Vec::with_capacity(VERSION_TAG.len() + NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(VERSION_TAG);
        payload.extend_from_slice(nonce.as_slice());
        payload.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(payload))
    }

    pub fn decrypt(&self, encrypted: &str) -> DomainResult<String> {
        let payload = BASE64
            .decode(encrypted)
            .map_err(|e| DomainError::Crypto(format!("malformed ciphertext: {}", e)))?;

        if payload.len() < VERSION_TAG.len() + NONCE_LEN || &payload[..VERSION_TAG.len()] != VERSION_TAG {
            return Err(DomainError::Crypto("unknown ciphertext version".into()));
        }

        let nonce_end = VERSION_TAG.len() + NONCE_LEN;
        let nonce = Nonce::from_slice(&payload[VERSION_TAG.len()..nonce_end]);

        let cipher = self
            .cipher
            .read()
            .map_err(|_| DomainError::Crypto("cipher lock poisoned".into()))?;

        let plaintext = cipher
            .decrypt(nonce, &payload[nonce_end..])
            .map_err(|e| DomainError::Crypto(format!("decryption failed: {}", e)))?;

        String::from_utf8(plaintext)
            .map_err(|e| DomainError::Crypto(format!("decrypted value is not UTF-8: {}", e)))
    }

    /// Encrypt and upsert a credential under (user, broker, type).
    pub async fn store(
        &self,
        db: &Database,
        user_id: Uuid,
        broker_account_id: Option<Uuid>,
        credential_type: &str,
        value: &str,
    ) -> DomainResult<Uuid> {
        let encrypted = self.encrypt(value)?;
        let id = db
            .upsert_credential(user_id, broker_account_id, credential_type, &encrypted)
            .await?;
        tracing::info!(
            "Stored credential {} for user {}",
            credential_type,
            user_id
        );
        Ok(id)
    }

    /// Decrypt every credential attached to a broker account. Rows that
    /// fail to decrypt are skipped with an error log.
    pub async fn broker_credentials(
        &self,
        db: &Database,
        user_id: Uuid,
        broker_account_id: Uuid,
    ) -> DomainResult<HashMap<String, String>> {
        let rows = db
            .credentials_for_broker(user_id, broker_account_id)
            .await?;

        let mut result = HashMap::new();
        for cred in rows {
            match self.decrypt(&cred.encrypted_value) {
                Ok(value) => {
                    result.insert(cred.credential_type, value);
                }
                Err(e) => {
                    tracing::error!("Failed to decrypt credential {}: {}", cred.id, e);
                }
            }
        }
        Ok(result)
    }

    /// Re-encrypt every stored credential under a new master key and
    /// swap the process cipher. Any decryption failure aborts the walk
    /// before the swap, leaving the old key in effect.
    pub async fn rotate_master_key(
        &self,
        db: &Database,
        old_key: &str,
        new_key: &str,
    ) -> DomainResult<usize> {
        if new_key.len() < 32 {
            return Err(DomainError::Crypto(
                "new master key must be at least 32 characters".into(),
            ));
        }

        tracing::info!("Starting master key rotation...");

        let old_vault = CredentialVault {
            cipher: RwLock::new(Self::derive_cipher(old_key)),
        };
        let new_vault = CredentialVault {
            cipher: RwLock::new(Self::derive_cipher(new_key)),
        };

        let all = db.list_all_credentials().await?;
        let mut reencrypted = Vec::with_capacity(all.len());
        for cred in &all {
            let plaintext = old_vault.decrypt(&cred.encrypted_value)?;
            reencrypted.push((cred.id, new_vault.encrypt(&plaintext)?));
        }

        for (id, value) in &reencrypted {
            db.update_credential_value(*id, value).await?;
        }

        {
            let mut cipher = self
                .cipher
                .write()
                .map_err(|_| DomainError::Crypto("cipher lock poisoned".into()))?;
            *cipher = Self::derive_cipher(new_key);
        }

        tracing::info!("Master key rotation completed: {} credentials", reencrypted.len());
        Ok(reencrypted.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_round_trip() {
        let vault = CredentialVault::new(TEST_KEY).unwrap();
        let encrypted = vault.encrypt("broker-password-123").unwrap();
        assert_ne!(encrypted, "broker-password-123");
        assert_eq!(vault.decrypt(&encrypted).unwrap(), "broker-password-123");
    }

    #[test]
    fn test_nonce_uniqueness() {
        let vault = CredentialVault::new(TEST_KEY).unwrap();
        let a = vault.encrypt("same-value").unwrap();
        let b = vault.encrypt("same-value").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_master_key_rejected() {
        assert!(CredentialVault::new("too-short").is_err());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let vault = CredentialVault::new(TEST_KEY).unwrap();
        let bogus = BASE64.encode(b"v9aaaaaaaaaaaaaaaaaaaaaaaa");
        assert!(matches!(
            vault.decrypt(&bogus),
            Err(DomainError::Crypto(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let vault = CredentialVault::new(TEST_KEY).unwrap();
        let encrypted = vault.encrypt("secret").unwrap();
        let mut payload = BASE64.decode(&encrypted).unwrap();
        let last = payload.len() - 1;
        payload[last] ^= 0x01;
        assert!(vault.decrypt(&BASE64.encode(payload)).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let vault = CredentialVault::new(TEST_KEY).unwrap();
        let other = CredentialVault::new("ffffffffffffffffffffffffffffffff").unwrap();
        let encrypted = vault.encrypt("secret").unwrap();
        assert!(other.decrypt(&encrypted).is_err());
    }
}
