//! # Crypto Containers
//!
//! Chunked AEAD file containers and passphrase-sealed blobs (§4.6).
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `container` | Chunked XChaCha20-Poly1305 container with HKDF-derived per-chunk keys, random access |
//! | `passphrase` | Session ticket / account config sealing, keyed from a passphrase via PBKDF2 or scrypt |
//!
//! ## Security properties
//!
//! - **XChaCha20-Poly1305**: 192-bit nonce, safe to derive per-chunk rather than counter
//! - Per-chunk keys and nonces are both derived via HKDF-SHA256 from a per-file salt, so
//!   nothing but the salt needs to be stored alongside the ciphertext
//! - PBKDF2 (600k rounds) and scrypt (N=2^15) are both offered for passphrase sealing

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod container;
pub mod errors;
pub mod passphrase;

pub use container::{seal, ContainerKey, ContainerKind};
pub use errors::CryptoError;
pub use passphrase::Kdf;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
