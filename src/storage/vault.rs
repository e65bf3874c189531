// Vault - symmetric encryption at rest
//
// Opaque encrypt/decrypt of byte blobs with a single process-wide key,
// ChaCha20-Poly1305 with a random nonce prefixed to the ciphertext. The
// key file is created on first use. Writes go through a temp file and an
// atomic rename so a concurrent reader can never observe a partial blob.

use std::fs;
use std::path::{Path, PathBuf};

use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use log::info;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::StorageError;

/// Key length for ChaCha20-Poly1305 (32 bytes)
const KEY_LEN: usize = 32;

/// Nonce length prefixed to every blob (12 bytes)
const NONCE_LEN: usize = 12;

pub struct Vault {
    cipher: ChaCha20Poly1305,
}

impl Vault {
    /// Open the vault, loading the key from `data_dir/key_file` or
    /// generating and persisting a fresh one.
    pub fn open(data_dir: &Path, key_file: &str) -> Result<Self, StorageError> {
        fs::create_dir_all(data_dir).map_err(|err| StorageError::Io {
            path: data_dir.display().to_string(),
            source: err,
        })?;

        let key_path = data_dir.join(key_file);
        let key = if key_path.exists() {
            let bytes = fs::read(&key_path).map_err(|err| StorageError::KeyUnavailable {
                reason: format!("reading {}: {}", key_path.display(), err),
            })?;
            if bytes.len() != KEY_LEN {
                return Err(StorageError::KeyUnavailable {
                    reason: format!(
                        "{} holds {} bytes, expected {}",
                        key_path.display(),
                        bytes.len(),
                        KEY_LEN
                    ),
                });
            }
            bytes
        } else {
            let mut key = vec![0u8; KEY_LEN];
            OsRng.fill_bytes(&mut key);
            fs::write(&key_path, &key).map_err(|err| StorageError::KeyUnavailable {
                reason: format!("creating {}: {}", key_path.display(), err),
            })?;
            info!("[Vault] Generated new key at {}", key_path.display());
            key
        };

        Ok(Self::from_key_bytes(&key))
    }

    fn from_key_bytes(key: &[u8]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// Encrypt a blob; output is `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, StorageError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|err| StorageError::Crypto {
                reason: format!("encrypt failed: {}", err),
            })?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypt a `nonce || ciphertext` blob. Fails on truncation or
    /// tampering (the auth tag covers the whole payload).
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, StorageError> {
        if blob.len() < NONCE_LEN {
            return Err(StorageError::Crypto {
                reason: format!("blob too short: {} bytes", blob.len()),
            });
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| StorageError::Crypto {
                reason: "decrypt failed (wrong key or tampered file)".to_string(),
            })
    }

    /// Encrypt and write `plaintext` to `path` atomically: the blob lands
    /// in a temp file first and is renamed into place.
    pub fn write_encrypted(&self, path: &Path, plaintext: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| StorageError::Io {
                path: parent.display().to_string(),
                source: err,
            })?;
        }

        let blob = self.encrypt(plaintext)?;
        let tmp = tmp_path(path);
        fs::write(&tmp, &blob).map_err(|err| StorageError::Io {
            path: tmp.display().to_string(),
            source: err,
        })?;
        fs::rename(&tmp, path).map_err(|err| StorageError::Io {
            path: path.display().to_string(),
            source: err,
        })
    }

    /// Read and decrypt a file written by [Vault::write_encrypted].
    pub fn read_encrypted(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        let blob = fs::read(path).map_err(|err| StorageError::Io {
            path: path.display().to_string(),
            source: err,
        })?;
        self.decrypt(&blob)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
