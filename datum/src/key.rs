//! Key, key material and salt types.

use crate::error::Error;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use secrecy::{ExposeSecret, SecretString, SecretVec};
use std::fmt;
use zeroize::Zeroize;

/// Key size in bytes required by every supported cipher (256 bits).
pub const KEY_SIZE: usize = 32;

/// Minimum salt size in bytes for password-based derivation.
pub const MIN_SALT_SIZE: usize = 16;

/// Symmetric key for field encryption.
///
/// The bytes live in a [`SecretVec`] and are zeroized on drop. The type is
/// deliberately not `Clone`; share it within a process through `Arc`.
pub struct EncryptionKey {
    bytes: SecretVec<u8>,
}

impl EncryptionKey {
    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidKeyLength` if `bytes` is not exactly [`KEY_SIZE`] long.
    /// The rejected buffer is zeroized.
    pub fn from_bytes(mut bytes: Vec<u8>) -> Result<Self, Error> {
        if bytes.len() != KEY_SIZE {
            let actual = bytes.len();
            bytes.zeroize();
            return Err(Error::InvalidKeyLength { expected: KEY_SIZE, actual });
        }
        Ok(Self { bytes: SecretVec::new(bytes) })
    }

    pub(crate) fn from_array(bytes: &[u8; KEY_SIZE]) -> Self {
        Self { bytes: SecretVec::new(bytes.to_vec()) }
    }

    /// Imports a key from its exported text form.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidEncoding` if the material is not base64, or
    /// `Error::InvalidKeyLength` if it decodes to the wrong number of bytes.
    pub fn from_material(material: &KeyMaterial) -> Result<Self, Error> {
        let bytes = STANDARD
            .decode(material.expose().trim())
            .map_err(|e| Error::InvalidEncoding(format!("key material: {e}")))?;
        Self::from_bytes(bytes)
    }

    /// Exports the key as base64 text for the key store.
    #[must_use]
    pub fn to_material(&self) -> KeyMaterial {
        KeyMaterial::new(STANDARD.encode(self.expose()))
    }

    pub(crate) fn expose(&self) -> &[u8] {
        self.bytes.expose_secret()
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

/// Exportable text form of an [`EncryptionKey`] (standard base64).
pub struct KeyMaterial(SecretString);

impl KeyMaterial {
    /// Wraps key material text. Validation is deferred to
    /// [`EncryptionKey::from_material`] or [`KeyMaterial::validate`].
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(SecretString::new(text.into()))
    }

    /// Checks that the material decodes to a key of the right size.
    ///
    /// # Errors
    ///
    /// Same as [`EncryptionKey::from_material`].
    pub fn validate(&self) -> Result<(), Error> {
        EncryptionKey::from_material(self).map(drop)
    }

    /// Returns the base64 text.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial([REDACTED])")
    }
}

/// Random salt bound one-to-one to a password-derived key.
#[derive(Clone, PartialEq, Eq)]
pub struct DerivationSalt(Vec<u8>);

impl DerivationSalt {
    /// Creates a salt from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyDerivation` if the salt is shorter than [`MIN_SALT_SIZE`].
    pub fn new(bytes: Vec<u8>) -> Result<Self, Error> {
        if bytes.len() < MIN_SALT_SIZE {
            return Err(Error::KeyDerivation(format!(
                "salt must be at least {MIN_SALT_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    /// Generates a fresh random salt of [`MIN_SALT_SIZE`] bytes.
    #[must_use]
    pub fn generate() -> Self {
        use aes_gcm::aead::{rand_core::RngCore, OsRng};

        let mut bytes = vec![0u8; MIN_SALT_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parses a salt from its base64 text form.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidEncoding` for bad base64 and
    /// `Error::KeyDerivation` for a short salt.
    pub fn from_base64(text: &str) -> Result<Self, Error> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| Error::InvalidEncoding(format!("salt: {e}")))?;
        Self::new(bytes)
    }

    /// Returns the base64 text form.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    /// Returns the raw salt bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for DerivationSalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivationSalt({})", self.to_base64())
    }
}
