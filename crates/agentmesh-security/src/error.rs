//! Security error types

use thiserror::Error;

pub type SecurityResult<T> = Result<T, SecurityError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    /// Key material missing, not base64, or the wrong length
    #[error("Invalid key in {source_name}: {reason}")]
    InvalidKey {
        source_name: String,
        reason: String,
    },

    #[error("Encryption failed")]
    EncryptionFailed,

    /// Tampered data, wrong key, or wrong receiver
    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Signature verification failed")]
    InvalidSignature,
}
