//! Error types for configuration and the credential vault.

use thiserror::Error;

/// Startup configuration errors. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is absent or empty.
    #[error("missing required env: {0}")]
    MissingVar(&'static str),

    /// A variable is present but unusable.
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Credential vault errors.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The vault secret was empty.
    #[error("vault secret is not configured")]
    MissingSecret,

    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Encryption failed or the plaintext was empty.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Malformed ciphertext, authentication tag mismatch or wrong key.
    #[error("decryption failed: {0}")]
    Decryption(String),
}

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
