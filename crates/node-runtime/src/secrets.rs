//! Loads the optional passphrase-sealed secrets blob named in
//! [`crate::config::NodeConfig::secrets_path`] (§4.6): account config,
//! bootstrap credentials, anything more sensitive than the rest of the
//! config tree. Sealed and opened with `crypto_containers::passphrase`,
//! the same container format the storage layer uses for encrypted files,
//! just keyed from a passphrase instead of a raw key.

use std::path::Path;

use serde_json::Value;

use core_types::{CoreError, CoreResult};
use crypto_containers::passphrase;

/// Reads and unseals the secrets blob at `path` under `passphrase`,
/// returning its JSON contents. Wrong passphrase or a tampered file both
/// fail AEAD authentication the same way; neither is distinguishable from
/// the other, which is the point.
pub fn load(path: &Path, passphrase_str: &str) -> CoreResult<Value> {
    let blob = std::fs::read(path).map_err(|e| CoreError::invalid_input(format!("reading secrets blob: {e}")))?;
    let plaintext = passphrase::open(passphrase_str, &blob).map_err(|e| CoreError::auth_failure(e.to_string()))?;
    serde_json::from_slice(&plaintext).map_err(|e| CoreError::invalid_input(format!("secrets blob is not valid json: {e}")))
}

/// Seals `secrets` under `passphrase` using scrypt, for writing out a new
/// secrets blob (e.g. from an admin setup command).
pub fn seal(secrets: &Value, passphrase_str: &str) -> CoreResult<Vec<u8>> {
    let plaintext = serde_json::to_vec(secrets).map_err(|e| CoreError::invalid_input(e.to_string()))?;
    passphrase::seal(passphrase::Kdf::Scrypt, passphrase_str, &plaintext).map_err(|e| CoreError::fatal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn seal_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.bin");
        let secrets = json!({"admin_token": "s3cr3t"});
        let sealed = seal(&secrets, "hunter2").unwrap();
        std::fs::write(&path, &sealed).unwrap();

        let loaded = load(&path, "hunter2").unwrap();
        assert_eq!(loaded, secrets);
    }

    #[test]
    fn wrong_passphrase_is_an_auth_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.bin");
        let sealed = seal(&json!({"k": "v"}), "right").unwrap();
        std::fs::write(&path, &sealed).unwrap();

        let err = load(&path, "wrong").unwrap_err();
        assert_eq!(err.kind, core_types::ErrorKind::AuthFailure);
    }
}
