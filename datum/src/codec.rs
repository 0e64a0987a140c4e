//! Canonical byte encoding of field values.
//!
//! These bytes are the exact plaintext handed to the cipher, so any two
//! implementations that agree on this encoding can read each other's records:
//! amounts are their decimal text, free text is raw UTF-8.

use crate::amount::Amount;
use crate::error::Error;

/// Kind of a sensitive field, used to pick the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Exact decimal amount.
    Amount,
    /// Free text.
    Text,
}

/// A decoded sensitive field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Exact decimal amount.
    Amount(Amount),
    /// Free text.
    Text(String),
}

impl FieldValue {
    /// Returns the kind of this value.
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::Amount(_) => FieldKind::Amount,
            Self::Text(_) => FieldKind::Text,
        }
    }

    /// Extracts an amount.
    ///
    /// # Errors
    ///
    /// Returns `Error::Parse` if the value is text.
    pub fn into_amount(self) -> Result<Amount, Error> {
        match self {
            Self::Amount(amount) => Ok(amount),
            Self::Text(_) => Err(Error::Parse("expected an amount, found text".to_string())),
        }
    }

    /// Extracts text.
    ///
    /// # Errors
    ///
    /// Returns `Error::Parse` if the value is an amount.
    pub fn into_text(self) -> Result<String, Error> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Amount(_) => Err(Error::Parse("expected text, found an amount".to_string())),
        }
    }
}

impl From<Amount> for FieldValue {
    fn from(amount: Amount) -> Self {
        Self::Amount(amount)
    }
}

impl From<String> for FieldValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for FieldValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Encodes a value into its canonical plaintext bytes.
#[must_use]
pub fn encode(value: &FieldValue) -> Vec<u8> {
    match value {
        FieldValue::Amount(amount) => amount.to_string().into_bytes(),
        FieldValue::Text(text) => text.as_bytes().to_vec(),
    }
}

/// Decodes plaintext bytes as a value of the given kind.
///
/// # Errors
///
/// Returns `Error::Parse` if the bytes are not UTF-8 or, for amounts, do not
/// match the decimal grammar.
pub fn decode(bytes: &[u8], kind: FieldKind) -> Result<FieldValue, Error> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| Error::Parse(format!("decrypted field is not UTF-8: {e}")))?;
    match kind {
        FieldKind::Amount => text.parse().map(FieldValue::Amount),
        FieldKind::Text => Ok(FieldValue::Text(text.to_string())),
    }
}
