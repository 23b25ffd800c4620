//! Authenticated encryption of backend credentials at rest.
//!
//! Ciphertexts are encoded as three base64 segments joined by `:`:
//!
//! ```text
//! <nonce>:<tag>:<ciphertext>
//! ```
//!
//! The cipher is ChaCha20-Poly1305 with a 256-bit key derived once from the
//! configured secret with Argon2id. A fresh random nonce is drawn for every
//! call to [`CredentialVault::encrypt`].

use std::fmt;

use argon2::Argon2;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::aead::{AeadCore, AeadInPlace, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce, Tag};

use notify_models::EncryptedSecret;

use crate::error::{Result, VaultError};

/// Fixed application salt for key derivation. The secret itself provides
/// the entropy; the salt only separates this use from others.
const KDF_SALT: &[u8] = b"rocket-notify/credential-vault/v1";

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const SEPARATOR: char = ':';

/// Encrypts and decrypts backend tokens and passwords.
#[derive(Clone)]
pub struct CredentialVault {
    cipher: ChaCha20Poly1305,
}

impl CredentialVault {
    /// Derives the key from `secret`.
    ///
    /// Fails with [`VaultError::MissingSecret`] if the secret is empty.
    pub fn new(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(VaultError::MissingSecret);
        }

        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(secret.as_bytes(), KDF_SALT, &mut key)
            .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;

        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        })
    }

    /// Encrypts a non-empty plaintext.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedSecret> {
        if plaintext.is_empty() {
            return Err(VaultError::Encryption("plaintext is empty".to_string()));
        }

        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(&nonce, b"", &mut buffer)
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        Ok(EncryptedSecret::from_ciphertext(format!(
            "{}{sep}{}{sep}{}",
            STANDARD.encode(nonce),
            STANDARD.encode(tag),
            STANDARD.encode(&buffer),
            sep = SEPARATOR,
        )))
    }

    /// Decrypts vault output back to the plaintext.
    pub fn decrypt(&self, secret: &EncryptedSecret) -> Result<String> {
        let mut parts = secret.as_str().split(SEPARATOR);
        let (nonce, tag, ciphertext) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(n), Some(t), Some(c), None) if !n.is_empty() && !t.is_empty() && !c.is_empty() => {
                (n, t, c)
            }
            _ => return Err(VaultError::Decryption("invalid encrypted format".to_string())),
        };

        let nonce = decode_segment("nonce", nonce, Some(NONCE_LEN))?;
        let tag = decode_segment("tag", tag, Some(TAG_LEN))?;
        let mut buffer = decode_segment("ciphertext", ciphertext, None)?;

        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&nonce),
                b"",
                &mut buffer,
                Tag::from_slice(&tag),
            )
            .map_err(|_| VaultError::Decryption("authentication failed".to_string()))?;

        String::from_utf8(buffer).map_err(|_| VaultError::Decryption("plaintext is not utf-8".to_string()))
    }
}

fn decode_segment(name: &str, segment: &str, expected_len: Option<usize>) -> Result<Vec<u8>> {
    let bytes = STANDARD
        .decode(segment)
        .map_err(|e| VaultError::Decryption(format!("{} is not base64: {}", name, e)))?;
    match expected_len {
        Some(len) if bytes.len() != len => Err(VaultError::Decryption(format!(
            "{} must be {} bytes, got {}",
            name,
            len,
            bytes.len()
        ))),
        _ => Ok(bytes),
    }
}

impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialVault { .. }")
    }
}
