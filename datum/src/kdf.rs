//! Key derivation using PBKDF2-HMAC-SHA256.
//!
//! This module turns a master password plus a persisted salt into an
//! [`EncryptionKey`], or produces a random key for the "no password"
//! onboarding path. Derivation is deliberately slow; use
//! [`spawn_derive_key`] to keep it off interactive code paths.

use crate::error::Error;
use crate::key::{DerivationSalt, EncryptionKey, KEY_SIZE};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Lowest iteration count accepted by [`KdfParams::validate`].
pub const MIN_ITERATIONS: u32 = 1_000;

/// Tunable parameters for password-based key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfParams {
    /// PBKDF2 iteration count.
    pub iterations: u32,
}

impl KdfParams {
    /// Creates parameters with an explicit iteration count.
    #[must_use]
    pub const fn with_iterations(iterations: u32) -> Self {
        Self { iterations }
    }

    /// Checks that the parameters impose a meaningful cost per attempt.
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyDerivation` if the iteration count is below [`MIN_ITERATIONS`].
    pub fn validate(&self) -> Result<(), Error> {
        if self.iterations < MIN_ITERATIONS {
            return Err(Error::KeyDerivation(format!(
                "iteration count {} is below the minimum of {MIN_ITERATIONS}",
                self.iterations
            )));
        }
        Ok(())
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self { iterations: DEFAULT_ITERATIONS }
    }
}

/// Derives an [`EncryptionKey`] from a password.
///
/// When `salt` is `None` a fresh random salt is generated. The salt that was
/// used is always returned; it must be persisted next to the key or the key
/// cannot be re-derived.
///
/// # Errors
///
/// Returns `Error::KeyDerivation` if the password is empty or the parameters
/// are rejected by [`KdfParams::validate`].
///
/// # Example
///
/// ```
/// use datum::kdf::{derive_key, KdfParams};
///
/// let params = KdfParams::with_iterations(1_000);
/// let (key, salt) = derive_key("correct-horse-battery-staple", None, &params).unwrap();
/// let (again, _) = derive_key("correct-horse-battery-staple", Some(&salt), &params).unwrap();
/// assert_eq!(key.to_material().expose(), again.to_material().expose());
/// ```
pub fn derive_key(
    password: &str,
    salt: Option<&DerivationSalt>,
    params: &KdfParams,
) -> Result<(EncryptionKey, DerivationSalt), Error> {
    if password.is_empty() {
        return Err(Error::KeyDerivation("password must not be empty".to_string()));
    }
    params.validate()?;

    let salt = salt.cloned().unwrap_or_else(DerivationSalt::generate);

    let started = Instant::now();
    let mut output = Zeroizing::new(vec![0u8; KEY_SIZE]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), params.iterations, &mut output);
    debug!(
        iterations = params.iterations,
        elapsed_ms = started.elapsed().as_millis(),
        "derived key from password"
    );

    let key = EncryptionKey::from_bytes(std::mem::take(&mut *output))?;
    Ok((key, salt))
}

/// Generates a uniformly random key for the "no password" path.
///
/// # Example
///
/// ```
/// use datum::kdf::generate_random_key;
///
/// let key = generate_random_key();
/// assert!(key.to_material().validate().is_ok());
/// ```
#[must_use]
pub fn generate_random_key() -> EncryptionKey {
    use aes_gcm::aead::{rand_core::RngCore, OsRng};

    let mut bytes = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut bytes);
    let key = EncryptionKey::from_array(&bytes);
    bytes.zeroize();
    key
}

/// Handle to a key derivation running on a background thread.
#[derive(Debug)]
pub struct PendingKey {
    handle: JoinHandle<Result<(EncryptionKey, DerivationSalt), Error>>,
}

impl PendingKey {
    /// Returns `true` once the derivation has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Blocks until the derivation completes.
    ///
    /// # Errors
    ///
    /// Returns the derivation error, or `Error::KeyDerivation` if the worker panicked.
    pub fn wait(self) -> Result<(EncryptionKey, DerivationSalt), Error> {
        self.handle
            .join()
            .map_err(|_| Error::KeyDerivation("derivation worker panicked".to_string()))?
    }
}

/// Runs [`derive_key`] on a dedicated worker thread.
///
/// Derivation cannot be cancelled once started. Dropping the handle detaches
/// the worker; starting a new derivation with the same inputs yields the same key.
///
/// # Errors
///
/// Returns `Error::Io` if the worker thread cannot be spawned.
pub fn spawn_derive_key(
    password: impl Into<String>,
    salt: Option<DerivationSalt>,
    params: KdfParams,
) -> Result<PendingKey, Error> {
    let password = Zeroizing::new(password.into());
    let handle = thread::Builder::new()
        .name("datum-kdf".to_string())
        .spawn(move || derive_key(&password, salt.as_ref(), &params))?;
    Ok(PendingKey { handle })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> KdfParams {
        KdfParams::with_iterations(MIN_ITERATIONS)
    }

    fn salt(byte: u8) -> DerivationSalt {
        DerivationSalt::new(vec![byte; 16]).unwrap()
    }

    #[test]
    fn test_derive_key_deterministic() {
        let salt = salt(3);
        let (key1, _) = derive_key("correct-horse-battery-staple", Some(&salt), &fast()).unwrap();
        let (key2, _) = derive_key("correct-horse-battery-staple", Some(&salt), &fast()).unwrap();

        assert_eq!(key1.expose(), key2.expose());
    }

    #[test]
    fn test_derive_key_single_bit_salt_change() {
        let salt1 = salt(3);
        let mut flipped = salt1.as_bytes().to_vec();
        flipped[0] ^= 0x01;
        let salt2 = DerivationSalt::new(flipped).unwrap();

        let (key1, _) = derive_key("correct-horse-battery-staple", Some(&salt1), &fast()).unwrap();
        let (key2, _) = derive_key("correct-horse-battery-staple", Some(&salt2), &fast()).unwrap();

        assert_ne!(key1.expose(), key2.expose());
    }

    #[test]
    fn test_derive_key_generates_salt_when_omitted() {
        let (key1, salt1) = derive_key("hunter2hunter2", None, &fast()).unwrap();
        let (key2, salt2) = derive_key("hunter2hunter2", None, &fast()).unwrap();

        assert_ne!(salt1, salt2);
        assert_ne!(key1.expose(), key2.expose());
        assert_eq!(salt1.as_bytes().len(), 16);
    }

    #[test]
    fn test_derive_key_different_passwords() {
        let salt = salt(5);
        let (key1, _) = derive_key("password-one", Some(&salt), &fast()).unwrap();
        let (key2, _) = derive_key("password-two", Some(&salt), &fast()).unwrap();

        assert_ne!(key1.expose(), key2.expose());
    }

    #[test]
    fn test_derive_key_empty_password_fails() {
        let result = derive_key("", None, &fast());
        assert!(matches!(result, Err(Error::KeyDerivation(_))));
    }

    #[test]
    fn test_derive_key_low_iterations_rejected() {
        let result = derive_key("password", None, &KdfParams::with_iterations(10));
        assert!(matches!(result, Err(Error::KeyDerivation(_))));
    }

    #[test]
    fn test_default_params() {
        assert_eq!(KdfParams::default().iterations, 100_000);
        assert!(KdfParams::default().validate().is_ok());
    }

    #[test]
    fn test_params_deserialize_with_defaults() {
        let params: KdfParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params, KdfParams::default());

        let params: KdfParams = serde_json::from_str(r#"{"iterations": 250000}"#).unwrap();
        assert_eq!(params.iterations, 250_000);
    }

    #[test]
    fn test_generate_random_key() {
        let key1 = generate_random_key();
        let key2 = generate_random_key();

        assert_ne!(key1.expose(), key2.expose());
        assert_eq!(key1.expose().len(), KEY_SIZE);
    }

    #[test]
    fn test_spawn_derive_key_matches_inline() {
        let salt = salt(9);
        let pending = spawn_derive_key("background", Some(salt.clone()), fast()).unwrap();
        let (inline, _) = derive_key("background", Some(&salt), &fast()).unwrap();
        let (background, returned_salt) = pending.wait().unwrap();

        assert_eq!(inline.expose(), background.expose());
        assert_eq!(returned_salt, salt);
    }

    // Published PBKDF2-HMAC-SHA256 vectors (password = "password", salt = "salt", dkLen = 32)
    #[test]
    fn test_pbkdf2_sha256_known_answers() {
        const ONE_ITERATION: &str =
            "120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b";
        const TWO_ITERATIONS: &str =
            "ae4d0c95af6b46d32d0adff928f06dd02a303f8ef3c251dfd6e2d85a95474c43";

        let mut out = [0u8; 32];
        pbkdf2_hmac::<Sha256>(b"password", b"salt", 1, &mut out);
        assert_eq!(out.to_vec(), hex::decode(ONE_ITERATION).unwrap());

        pbkdf2_hmac::<Sha256>(b"password", b"salt", 2, &mut out);
        assert_eq!(out.to_vec(), hex::decode(TWO_ITERATIONS).unwrap());
    }
}
