//! Error types for `Datum` operations.

use std::fmt;

/// Main error type for `Datum` operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Key derivation rejected its input (empty password, short salt, bad parameters)
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Authentication tag verification failed (wrong key, tampered ciphertext or nonce)
    #[error("authentication failed: ciphertext may be corrupted or encrypted under another key")]
    AuthenticationFailed,

    /// Decrypted bytes do not match the grammar of the expected field kind
    #[error("parse failed: {0}")]
    Parse(String),

    /// A required encrypted field is missing or malformed in a stored record
    #[error("mapping failed: encrypted field `{field}` is missing or malformed")]
    Mapping {
        /// Storage column of the offending field
        field: String,
    },

    /// Key material has the wrong size
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Size required by the cipher
        expected: usize,
        /// Size that was supplied
        actual: usize,
    },

    /// Text that should be base64 could not be decoded
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Encryption operation failed
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// No key has been provisioned or loaded
    #[error("no encryption key is loaded")]
    NoKey,

    /// A key is stored but cannot be used
    #[error("stored encryption key is unusable: {0}")]
    KeyUnusable(String),

    /// The query tried to filter or order on an encrypted column
    #[error("unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Input record failed validation before encryption
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Remote record store reported an error
    #[error("record store error: {0}")]
    Store(String),

    /// Key store operation failed
    #[error("key store error: {0}")]
    KeyStore(#[from] KeyStoreError),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an [`Error`], used by callers that render
/// per-record outcomes (for example a "could not decrypt" placeholder).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad password or salt input
    KeyDerivation,
    /// Ciphertext/key mismatch
    Authentication,
    /// Corrupted plaintext or schema mismatch
    Parse,
    /// Missing required encrypted field
    Mapping,
    /// Anything else
    Other,
}

impl Error {
    /// Returns the coarse kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::KeyDerivation(_) => ErrorKind::KeyDerivation,
            Self::AuthenticationFailed => ErrorKind::Authentication,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Mapping { .. } => ErrorKind::Mapping,
            _ => ErrorKind::Other,
        }
    }

    /// Returns the message shown to the end user for this error.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::KeyDerivation => "check your password",
            ErrorKind::Authentication => {
                "data could not be decrypted; wrong key or corrupted record"
            }
            ErrorKind::Parse => "record is corrupted or was written by an incompatible version",
            ErrorKind::Mapping => "record is missing encrypted data",
            ErrorKind::Other => "something went wrong",
        }
    }

    pub(crate) fn mapping(field: impl Into<String>) -> Self {
        Self::Mapping { field: field.into() }
    }
}

/// Errors specific to key store operations.
#[derive(Debug)]
pub enum KeyStoreError {
    /// Backing storage could not be read
    ReadFailed(String),

    /// Backing storage could not be written
    WriteFailed(String),

    /// Stored document is not in the expected format
    Corrupted(String),

    /// I/O operation failed
    Io(std::io::Error),
}

impl fmt::Display for KeyStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed(msg) => write!(f, "key store read failed: {msg}"),
            Self::WriteFailed(msg) => write!(f, "key store write failed: {msg}"),
            Self::Corrupted(msg) => write!(f, "key store corrupted: {msg}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for KeyStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for KeyStoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::KeyDerivation("empty".into()).kind(), ErrorKind::KeyDerivation);
        assert_eq!(Error::AuthenticationFailed.kind(), ErrorKind::Authentication);
        assert_eq!(Error::Parse("x".into()).kind(), ErrorKind::Parse);
        assert_eq!(Error::mapping("encrypted_amount").kind(), ErrorKind::Mapping);
        assert_eq!(Error::NoKey.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(Error::KeyDerivation("empty".into()).user_message(), "check your password");
        assert_eq!(
            Error::AuthenticationFailed.user_message(),
            "data could not be decrypted; wrong key or corrupted record"
        );
    }

    #[test]
    fn test_mapping_names_field() {
        let err = Error::mapping("iv_amount");
        assert!(err.to_string().contains("iv_amount"));
    }

    #[test]
    fn test_key_store_error_source() {
        use std::error::Error as _;

        let err = KeyStoreError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(err.source().is_some());
        assert!(KeyStoreError::Corrupted("bad json".into()).source().is_none());
    }
}
