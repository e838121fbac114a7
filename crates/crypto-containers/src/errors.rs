//! Crypto error types, converted into the shared [`CoreError`] taxonomy at
//! the storage/bridge boundary.

use core_types::{CoreError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("malformed container header: {0}")]
    InvalidHeader(String),

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u8),

    #[error("offset {offset} is past the container's plaintext length {plaintext_len}")]
    OffsetOutOfRange { offset: u64, plaintext_len: u64 },

    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),
}

impl From<CryptoError> for CoreError {
    fn from(e: CryptoError) -> Self {
        let kind = match &e {
            CryptoError::DecryptionFailed(_) | CryptoError::InvalidHeader(_) | CryptoError::UnsupportedVersion(_) => {
                ErrorKind::InvalidInput
            }
            CryptoError::OffsetOutOfRange { .. } => ErrorKind::InvalidInput,
            CryptoError::InvalidKeyLength { .. } | CryptoError::KeyDerivationFailed(_) => ErrorKind::AuthFailure,
            CryptoError::EncryptionFailed(_) => ErrorKind::Fatal,
        };
        CoreError::new(kind, e.to_string())
    }
}
