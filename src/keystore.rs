//! Password-protected store of private keys addressed by content
//!
//! A key's identifier is the lowercase hex HASH160 of its 32 secret bytes, so
//! the same key always lands under the same identifier. Entries are kept
//! sealed in memory with AES-256-GCM (`nonce || ciphertext`, the identifier
//! as associated data) under a key derived from the password with
//! PBKDF2-HMAC-SHA256 and a per-store random salt.
//!
//! Reads take `&self`, so a populated store can be shared between any number
//! of concurrent signing calls.

use std::collections::HashMap;
use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use sha2::Sha256;
use tracing::debug;

use crate::constants::*;
use crate::error::{BuilderError, Result};
use crate::hash::hash160;
use crate::keys::{NetworkType, PrivateKey};

#[derive(Clone)]
struct SealedKey {
    network: NetworkType,
    /// nonce || ciphertext || tag
    sealed: Vec<u8>,
}

pub struct KeyStore {
    salt: [u8; KEYSTORE_SALT_LENGTH],
    sealing_key: [u8; AES_KEY_LENGTH],
    entries: HashMap<String, SealedKey>,
}

fn derive_sealing_key(password: &str, salt: &[u8]) -> [u8; AES_KEY_LENGTH] {
    let mut key = [0u8; AES_KEY_LENGTH];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, KEYSTORE_KDF_ROUNDS, &mut key);
    key
}

fn seal(key: &[u8; AES_KEY_LENGTH], id: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| BuilderError::KeyStore("invalid sealing key length".to_string()))?;

    let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let payload = Payload {
        msg: plaintext,
        aad: id.as_bytes(),
    };
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), payload)
        .map_err(|_| BuilderError::KeyStore("sealing failed".to_string()))?;

    let mut out = Vec::with_capacity(AES_NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn unseal(key: &[u8; AES_KEY_LENGTH], id: &str, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < AES_NONCE_LENGTH {
        return Err(BuilderError::KeyStore(format!("entry {} is truncated", id)));
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| BuilderError::KeyStore("invalid sealing key length".to_string()))?;
    let (nonce, ciphertext) = sealed.split_at(AES_NONCE_LENGTH);
    let payload = Payload {
        msg: ciphertext,
        aad: id.as_bytes(),
    };
    cipher
        .decrypt(Nonce::from_slice(nonce), payload)
        .map_err(|_| BuilderError::KeyStore(format!("cannot unseal entry {}", id)))
}

impl KeyStore {
    pub fn new(password: &str) -> Self {
        let mut salt = [0u8; KEYSTORE_SALT_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        let sealing_key = derive_sealing_key(password, &salt);
        KeyStore {
            salt,
            sealing_key,
            entries: HashMap::new(),
        }
    }

    /// Identifier under which `key` is stored
    pub fn key_id(key: &PrivateKey) -> String {
        hex::encode(hash160(&key.to_bytes()))
    }

    /// Store `key` and return its identifier; adding a key twice overwrites
    pub fn add(&mut self, key: &PrivateKey) -> Result<String> {
        let id = KeyStore::key_id(key);
        let sealed = seal(&self.sealing_key, &id, &key.to_bytes())?;
        self.entries.insert(
            id.clone(),
            SealedKey {
                network: key.network(),
                sealed,
            },
        );
        debug!(key_id = %id, "added key to key store");
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Result<PrivateKey> {
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| BuilderError::KeyNotFound(format!("no key with identifier {}", id)))?;
        let bytes = unseal(&self.sealing_key, id, &entry.sealed)?;
        PrivateKey::from_bytes(&bytes, entry.network)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Re-seal every entry under a key derived from `new_password` and a fresh salt
    pub fn change_password(&mut self, new_password: &str) -> Result<()> {
        let mut salt = [0u8; KEYSTORE_SALT_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        let sealing_key = derive_sealing_key(new_password, &salt);

        // a failure below leaves the store untouched
        let mut entries = HashMap::with_capacity(self.entries.len());
        for (id, entry) in &self.entries {
            let plain = unseal(&self.sealing_key, id, &entry.sealed)?;
            let sealed = seal(&sealing_key, id, &plain)?;
            entries.insert(
                id.clone(),
                SealedKey {
                    network: entry.network,
                    sealed,
                },
            );
        }

        self.salt = salt;
        self.sealing_key = sealing_key;
        self.entries = entries;
        debug!(entries = self.entries.len(), "key store password changed");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identifiers of all stored keys, sorted
    pub fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Salt of the current sealing key
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore")
            .field("identifiers", &self.identifiers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u8) -> PrivateKey {
        PrivateKey::from_bytes(&[n; 32], NetworkType::Testnet).unwrap()
    }

    #[test]
    fn test_add_get() {
        let mut store = KeyStore::new("pw");
        let id = store.add(&key(1)).unwrap();
        assert_eq!(id.len(), 40);
        assert_eq!(id, KeyStore::key_id(&key(1)));
        assert_eq!(store.get(&id).unwrap(), key(1));
        assert!(store.contains(&id));
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut store = KeyStore::new("pw");
        let a = store.add(&key(1)).unwrap();
        let b = store.add(&key(1)).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_missing_key() {
        let store = KeyStore::new("pw");
        assert!(matches!(store.get("00"), Err(BuilderError::KeyNotFound(_))));
    }

    #[test]
    fn test_change_password_keeps_keys() {
        let mut store = KeyStore::new("old");
        let id1 = store.add(&key(1)).unwrap();
        let id2 = store.add(&key(2)).unwrap();
        let old_salt = store.salt().to_vec();

        store.change_password("new").unwrap();
        assert_ne!(store.salt(), old_salt.as_slice());
        assert_eq!(store.get(&id1).unwrap(), key(1));
        assert_eq!(store.get(&id2).unwrap(), key(2));
        assert_eq!(store.identifiers(), {
            let mut ids = vec![id1, id2];
            ids.sort();
            ids
        });
    }

    #[test]
    fn test_store_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<KeyStore>();
    }
}
