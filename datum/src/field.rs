//! Storage form of a single encrypted attribute.
//!
//! All bytes crossing the storage boundary are standard base64 text so the
//! remote store only ever sees printable strings.

use crate::cipher::Sealed;
use crate::error::Error;
use crate::key::DerivationSalt;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Ciphertext, nonce and optional salt of one encrypted attribute.
///
/// `salt` is only present for per-operation password encryption
/// (see [`FieldCipher::seal_with_password`](crate::cipher::FieldCipher::seal_with_password));
/// fields encrypted under the session key never carry one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedField {
    /// Base64 ciphertext including the authentication tag.
    pub ciphertext: String,
    /// Base64 nonce.
    pub nonce: String,
    /// Base64 derivation salt, when the field was sealed with a password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
}

impl EncryptedField {
    /// Encodes the output of an encryption for storage.
    #[must_use]
    pub fn from_sealed(sealed: &Sealed) -> Self {
        Self {
            ciphertext: STANDARD.encode(&sealed.ciphertext),
            nonce: STANDARD.encode(sealed.nonce),
            salt: None,
        }
    }

    /// Attaches the salt used to derive the field's key.
    #[must_use]
    pub fn with_salt(mut self, salt: &DerivationSalt) -> Self {
        self.salt = Some(salt.to_base64());
        self
    }

    /// Rebuilds a field from a pair of nullable storage columns.
    ///
    /// Returns `Ok(None)` when both columns are empty, and
    /// `Err(Error::Mapping)` naming `ciphertext_column` or `nonce_column`
    /// when only one half of the pair is present.
    ///
    /// # Errors
    ///
    /// See above.
    pub fn from_columns(
        ciphertext: Option<&str>,
        nonce: Option<&str>,
        ciphertext_column: &str,
        nonce_column: &str,
    ) -> Result<Option<Self>, Error> {
        let ciphertext = ciphertext.filter(|s| !s.is_empty());
        let nonce = nonce.filter(|s| !s.is_empty());
        match (ciphertext, nonce) {
            (None, None) => Ok(None),
            (Some(ciphertext), Some(nonce)) => Ok(Some(Self {
                ciphertext: ciphertext.to_string(),
                nonce: nonce.to_string(),
                salt: None,
            })),
            (None, Some(_)) => Err(Error::mapping(ciphertext_column)),
            (Some(_), None) => Err(Error::mapping(nonce_column)),
        }
    }

    /// Decodes the base64 ciphertext and nonce.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidEncoding` if either part is not valid base64.
    pub fn decode(&self) -> Result<(Vec<u8>, Vec<u8>), Error> {
        let ciphertext = STANDARD
            .decode(&self.ciphertext)
            .map_err(|e| Error::InvalidEncoding(format!("ciphertext: {e}")))?;
        let nonce = STANDARD
            .decode(&self.nonce)
            .map_err(|e| Error::InvalidEncoding(format!("nonce: {e}")))?;
        Ok((ciphertext, nonce))
    }
}
