//! Passphrase-sealed blobs (§4.6): session tickets and account config are
//! sealed with the same chunked container format, but the container key is
//! derived from a user passphrase instead of being handed in directly.
//!
//! Two KDFs are supported since callers trade off differently between
//! defending against custom ASIC attackers (scrypt's memory hardness) and
//! matching an existing deployment's KDF choice (PBKDF2).

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use scrypt::Params as ScryptParams;
use sha2::Sha256;

use crate::container::{self, ContainerKey, ContainerKind};
use crate::errors::CryptoError;

const SALT_LEN: usize = 16;
const PBKDF2_ROUNDS: u32 = 600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kdf {
    Pbkdf2,
    Scrypt,
}

impl Kdf {
    fn tag(self) -> u8 {
        match self {
            Kdf::Pbkdf2 => 0,
            Kdf::Scrypt => 1,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, CryptoError> {
        match tag {
            0 => Ok(Kdf::Pbkdf2),
            1 => Ok(Kdf::Scrypt),
            other => Err(CryptoError::InvalidHeader(format!("unknown kdf tag {other}"))),
        }
    }
}

fn derive_key(kdf: Kdf, passphrase: &str, salt: &[u8; SALT_LEN]) -> Result<ContainerKey, CryptoError> {
    let mut key = [0u8; 32];
    match kdf {
        Kdf::Pbkdf2 => {
            pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
        }
        Kdf::Scrypt => {
            let params = ScryptParams::new(15, 8, 1, 32)
                .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
            scrypt::scrypt(passphrase.as_bytes(), salt, &params, &mut key)
                .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
        }
    }
    Ok(ContainerKey::from_bytes(key))
}

/// Seals `plaintext` (a session ticket or config blob) under `passphrase`.
/// The output is self-describing: KDF tag and salt are prefixed ahead of
/// the container bytes so `open` doesn't need them passed back in.
pub fn seal(kdf: Kdf, passphrase: &str, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let key = derive_key(kdf, passphrase, &salt)?;

    let sealed = container::seal(&key, ContainerKind::Streaming, plaintext, plaintext.len().max(1) as u32, 1)?;

    let mut out = Vec::with_capacity(1 + SALT_LEN + sealed.len());
    out.push(kdf.tag());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Recovers the plaintext sealed by [`seal`] given the same passphrase.
pub fn open(passphrase: &str, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if blob.len() < 1 + SALT_LEN {
        return Err(CryptoError::InvalidHeader("passphrase blob too short".into()));
    }
    let kdf = Kdf::from_tag(blob[0])?;
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&blob[1..1 + SALT_LEN]);
    let key = derive_key(kdf, passphrase, &salt)?;
    container::open(&key, &blob[1 + SALT_LEN..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pbkdf2_roundtrips() {
        let sealed = seal(Kdf::Pbkdf2, "correct horse battery staple", b"session-ticket-bytes").unwrap();
        let opened = open("correct horse battery staple", &sealed).unwrap();
        assert_eq!(opened, b"session-ticket-bytes");
    }

    #[test]
    fn scrypt_roundtrips() {
        let sealed = seal(Kdf::Scrypt, "another passphrase", b"account config blob").unwrap();
        let opened = open("another passphrase", &sealed).unwrap();
        assert_eq!(opened, b"account config blob");
    }

    #[test]
    fn wrong_passphrase_fails() {
        let sealed = seal(Kdf::Pbkdf2, "right", b"data").unwrap();
        assert!(open("wrong", &sealed).is_err());
    }
}
