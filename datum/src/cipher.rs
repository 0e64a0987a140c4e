//! Authenticated field encryption.
//!
//! [`FieldCipher`] encrypts arbitrary byte payloads under an [`EncryptionKey`]
//! with an AEAD cipher. Every call draws a fresh 96-bit nonce from the OS
//! random source; callers cannot supply their own.

use crate::error::Error;
use crate::field::EncryptedField;
use crate::kdf::{derive_key, KdfParams};
use crate::key::{DerivationSalt, EncryptionKey};
use aes_gcm::Aes256Gcm;
use chacha20poly1305::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng, Payload},
    ChaCha20Poly1305, Nonce,
};
use serde::{Deserialize, Serialize};

/// Nonce size for both supported ciphers (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Cipher mode for encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CipherMode {
    /// AES-256-GCM (default). Compatible with records written by the web client.
    #[default]
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    /// ChaCha20-Poly1305.
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
}

/// Output of a single encryption: ciphertext (with tag) and its nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// Ciphertext including the authentication tag.
    pub ciphertext: Vec<u8>,
    /// Nonce used for this encryption.
    pub nonce: [u8; NONCE_SIZE],
}

/// Stateless AEAD encryptor/decryptor for field payloads.
///
/// The cipher holds no key and no mutable state, so it is `Copy` and can be
/// used from any number of threads at once.
///
/// # Example
///
/// ```
/// use datum::cipher::{CipherMode, FieldCipher};
/// use datum::kdf::generate_random_key;
///
/// let cipher = FieldCipher::new(CipherMode::default());
/// let key = generate_random_key();
///
/// let sealed = cipher.encrypt(b"42.50", &key).unwrap();
/// let plaintext = cipher.decrypt(&sealed.ciphertext, &sealed.nonce, &key).unwrap();
/// assert_eq!(plaintext, b"42.50");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldCipher {
    mode: CipherMode,
}

impl FieldCipher {
    /// Creates a cipher for the given mode.
    #[must_use]
    pub const fn new(mode: CipherMode) -> Self {
        Self { mode }
    }

    /// Returns the cipher mode.
    #[must_use]
    pub const fn mode(&self) -> CipherMode {
        self.mode
    }

    /// Encrypts `plaintext` under `key` with a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns `Error::EncryptionFailed` if the underlying cipher rejects the input.
    pub fn encrypt(&self, plaintext: &[u8], key: &EncryptionKey) -> Result<Sealed, Error> {
        self.encrypt_with_aad(plaintext, &[], key)
    }

    /// Encrypts `plaintext` under `key`, authenticating `aad` alongside it.
    ///
    /// # Errors
    ///
    /// Returns `Error::EncryptionFailed` if the underlying cipher rejects the input.
    pub fn encrypt_with_aad(
        &self,
        plaintext: &[u8],
        aad: &[u8],
        key: &EncryptionKey,
    ) -> Result<Sealed, Error> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let payload = Payload { msg: plaintext, aad };

        let ciphertext = match self.mode {
            CipherMode::Aes256Gcm => Aes256Gcm::new_from_slice(key.expose())
                .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {e}")))?
                .encrypt(nonce, payload)
                .map_err(|e| {
                    Error::EncryptionFailed(format!("AES-256-GCM encryption failed: {e}"))
                })?,
            CipherMode::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key.expose())
                .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {e}")))?
                .encrypt(nonce, payload)
                .map_err(|e| {
                    Error::EncryptionFailed(format!("ChaCha20-Poly1305 encryption failed: {e}"))
                })?,
        };

        Ok(Sealed { ciphertext, nonce: nonce_bytes })
    }

    /// Decrypts and verifies `ciphertext`.
    ///
    /// # Errors
    ///
    /// Returns `Error::AuthenticationFailed` if the ciphertext, nonce or key do
    /// not verify, including a nonce of the wrong length. This failure is final
    /// for the field; retrying cannot change the outcome.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        nonce: &[u8],
        key: &EncryptionKey,
    ) -> Result<Vec<u8>, Error> {
        self.decrypt_with_aad(ciphertext, nonce, &[], key)
    }

    /// Decrypts and verifies `ciphertext` that was sealed with `aad`.
    ///
    /// # Errors
    ///
    /// Same as [`FieldCipher::decrypt`].
    pub fn decrypt_with_aad(
        &self,
        ciphertext: &[u8],
        nonce: &[u8],
        aad: &[u8],
        key: &EncryptionKey,
    ) -> Result<Vec<u8>, Error> {
        if nonce.len() != NONCE_SIZE {
            return Err(Error::AuthenticationFailed);
        }
        let nonce = Nonce::from_slice(nonce);
        let payload = Payload { msg: ciphertext, aad };

        let plaintext = match self.mode {
            CipherMode::Aes256Gcm => Aes256Gcm::new_from_slice(key.expose())
                .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {e}")))?
                .decrypt(nonce, payload),
            CipherMode::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key.expose())
                .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {e}")))?
                .decrypt(nonce, payload),
        };

        plaintext.map_err(|_| Error::AuthenticationFailed)
    }

    /// Encrypts `plaintext` under a key derived from `password` with a fresh salt.
    ///
    /// The salt is recorded in the returned field. This is a standalone
    /// per-operation path; record fields are always sealed under the session key.
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyDerivation` for an empty password, or any error of
    /// [`FieldCipher::encrypt`].
    pub fn seal_with_password(
        &self,
        plaintext: &[u8],
        password: &str,
        params: &KdfParams,
    ) -> Result<EncryptedField, Error> {
        let (key, salt) = derive_key(password, None, params)?;
        let sealed = self.encrypt(plaintext, &key)?;
        Ok(EncryptedField::from_sealed(&sealed).with_salt(&salt))
    }

    /// Decrypts a field produced by [`FieldCipher::seal_with_password`].
    ///
    /// # Errors
    ///
    /// Returns `Error::Mapping` if the field carries no salt,
    /// `Error::KeyDerivation` for bad password/salt input, and
    /// `Error::AuthenticationFailed` for a wrong password or tampered data.
    pub fn open_with_password(
        &self,
        field: &EncryptedField,
        password: &str,
        params: &KdfParams,
    ) -> Result<Vec<u8>, Error> {
        let salt = field.salt.as_deref().ok_or_else(|| Error::mapping("salt"))?;
        let salt = DerivationSalt::from_base64(salt)?;
        let (key, _) = derive_key(password, Some(&salt), params)?;
        let (ciphertext, nonce) = field.decode()?;
        self.decrypt(&ciphertext, &nonce, &key)
    }
}
