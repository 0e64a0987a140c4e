//! Crypto configuration.

use crate::cipher::{CipherMode, FieldCipher};
use crate::error::Error;
use crate::kdf::KdfParams;
use crate::key_store::DEFAULT_NAMESPACE;
use crate::mapper::{MapperOptions, RecordMapper};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Tunables shared by the library and the CLI.
///
/// Every field has a default, so an empty JSON object is a valid config.
///
/// # Example
///
/// ```
/// use datum::config::CryptoConfig;
///
/// let config: CryptoConfig =
///     serde_json::from_str(r#"{ "kdf": { "iterations": 200000 } }"#).unwrap();
/// assert_eq!(config.kdf.iterations, 200_000);
/// assert_eq!(config.namespace, "datum");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Password derivation parameters
    pub kdf: KdfParams,
    /// Cipher used for new fields
    pub cipher_mode: CipherMode,
    /// Record mapping options
    pub mapper: MapperOptions,
    /// Key store namespace
    pub namespace: String,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            cipher_mode: CipherMode::default(),
            mapper: MapperOptions::default(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl CryptoConfig {
    /// Reads a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read, or
    /// `Error::KeyDerivation` if the KDF parameters are rejected.
    /// A file that is not valid JSON is reported as `Error::Io` with kind
    /// `InvalidData`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        config.validate()?;
        debug!(path = %path.display(), "loaded crypto config");
        Ok(config)
    }

    /// Reads `path` if it exists, otherwise returns the defaults.
    ///
    /// # Errors
    ///
    /// Same as [`CryptoConfig::load`] for an existing file.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Checks the configured values.
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyDerivation` if the KDF parameters are rejected.
    pub fn validate(&self) -> Result<(), Error> {
        self.kdf.validate()
    }

    /// Returns a cipher for the configured mode.
    #[must_use]
    pub const fn cipher(&self) -> FieldCipher {
        FieldCipher::new(self.cipher_mode)
    }

    /// Returns a record mapper for the configured mode and options.
    #[must_use]
    pub const fn mapper(&self) -> RecordMapper {
        RecordMapper::new(self.cipher(), self.mapper)
    }
}
