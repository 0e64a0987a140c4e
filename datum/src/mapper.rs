//! Mapping between domain records and their storage shape.
//!
//! Sensitive attributes are canonicalized by the [codec](crate::codec),
//! encrypted by the [cipher](crate::cipher) and stored as base64
//! `(ciphertext, nonce)` column pairs. Plaintext attributes pass through.

use crate::cipher::FieldCipher;
use crate::codec::{self, FieldKind, FieldValue};
use crate::context::FieldContext;
use crate::error::Error;
use crate::field::EncryptedField;
use crate::key::EncryptionKey;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Options that change how fields are sealed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperOptions {
    /// Authenticate each field's [`FieldContext`] as associated data.
    ///
    /// Off by default so records stay readable by clients that encrypt
    /// without associated data. Records written with one setting cannot be
    /// read with the other.
    pub bind_field_context: bool,
}

/// Describes one encrypted attribute of a record and its storage columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptedColumn {
    /// Logical location, used as associated data when binding is enabled.
    pub context: FieldContext,
    /// Column holding the base64 ciphertext.
    pub ciphertext: &'static str,
    /// Column holding the base64 nonce.
    pub nonce: &'static str,
    /// Kind of the plaintext value.
    pub kind: FieldKind,
}

/// Encrypts and decrypts individual fields under one key.
///
/// Handed to [`EncryptedRecord`] implementations; holds only borrowed state.
#[derive(Debug, Clone, Copy)]
pub struct FieldSealer<'a> {
    cipher: FieldCipher,
    key: &'a EncryptionKey,
    options: MapperOptions,
}

impl<'a> FieldSealer<'a> {
    /// Creates a sealer for `key`.
    #[must_use]
    pub const fn new(cipher: FieldCipher, key: &'a EncryptionKey, options: MapperOptions) -> Self {
        Self { cipher, key, options }
    }

    /// Encodes and encrypts a value for `column`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRecord` if the value's kind does not match the
    /// column, or any encryption error.
    pub fn seal(
        &self,
        value: &FieldValue,
        column: &EncryptedColumn,
    ) -> Result<EncryptedField, Error> {
        if value.kind() != column.kind {
            return Err(Error::InvalidRecord(format!(
                "value of kind {:?} cannot be stored in {}",
                value.kind(),
                column.context
            )));
        }
        let plaintext = codec::encode(value);
        let sealed = self.cipher.encrypt_with_aad(&plaintext, &self.aad(column), self.key)?;
        Ok(EncryptedField::from_sealed(&sealed))
    }

    /// Decrypts and decodes the value stored in `column`.
    ///
    /// # Errors
    ///
    /// - `Error::Mapping` naming the column if the stored text is not base64
    /// - `Error::AuthenticationFailed` if the field does not verify under the key
    /// - `Error::Parse` if the plaintext does not match the column's kind
    pub fn open(
        &self,
        field: &EncryptedField,
        column: &EncryptedColumn,
    ) -> Result<FieldValue, Error> {
        let (ciphertext, nonce) = field.decode().map_err(|_| {
            if base64_ok(&field.ciphertext) {
                Error::mapping(column.nonce)
            } else {
                Error::mapping(column.ciphertext)
            }
        })?;
        let plaintext =
            self.cipher.decrypt_with_aad(&ciphertext, &nonce, &self.aad(column), self.key)?;
        codec::decode(&plaintext, column.kind)
    }

    /// Opens a required field, failing with `Error::Mapping` if it is absent.
    ///
    /// # Errors
    ///
    /// See [`FieldSealer::open`].
    pub fn open_required(
        &self,
        ciphertext: Option<&str>,
        nonce: Option<&str>,
        column: &EncryptedColumn,
    ) -> Result<FieldValue, Error> {
        let field =
            EncryptedField::from_columns(ciphertext, nonce, column.ciphertext, column.nonce)?
                .ok_or_else(|| Error::mapping(column.ciphertext))?;
        self.open(&field, column)
    }

    /// Opens an optional field; both columns empty means "no value".
    ///
    /// # Errors
    ///
    /// See [`FieldSealer::open`]. A half-present pair is `Error::Mapping`.
    pub fn open_optional(
        &self,
        ciphertext: Option<&str>,
        nonce: Option<&str>,
        column: &EncryptedColumn,
    ) -> Result<Option<FieldValue>, Error> {
        EncryptedField::from_columns(ciphertext, nonce, column.ciphertext, column.nonce)?
            .map(|field| self.open(&field, column))
            .transpose()
    }

    fn aad(&self, column: &EncryptedColumn) -> Vec<u8> {
        if self.options.bind_field_context {
            column.context.to_string().into_bytes()
        } else {
            Vec::new()
        }
    }
}

fn base64_ok(text: &str) -> bool {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    STANDARD.decode(text).is_ok()
}

/// A domain record with encrypted attributes.
pub trait EncryptedRecord: Sized + Send {
    /// Storage shape of the record.
    type Stored: Sync;

    /// Encrypts sensitive attributes and copies plaintext ones.
    ///
    /// # Errors
    ///
    /// Returns any field encryption error.
    fn seal(&self, sealer: &FieldSealer<'_>) -> Result<Self::Stored, Error>;

    /// Decrypts a stored record. Never returns a partially populated record.
    ///
    /// # Errors
    ///
    /// Returns the first field error encountered.
    fn open(stored: &Self::Stored, sealer: &FieldSealer<'_>) -> Result<Self, Error>;
}

/// A partial update of a record's attributes.
pub trait EncryptedPatch {
    /// Storage shape of the patch.
    type Stored;

    /// Encrypts the sensitive attributes present in the patch.
    ///
    /// # Errors
    ///
    /// Returns any field encryption error.
    fn seal(&self, sealer: &FieldSealer<'_>) -> Result<Self::Stored, Error>;
}

/// Converts records to and from their storage shape.
///
/// The mapper performs no I/O and keeps no key; callers pass the key to every
/// call.
///
/// # Example
///
/// ```
/// use datum::prelude::*;
/// use chrono::NaiveDate;
///
/// let mapper = RecordMapper::default();
/// let key = generate_random_key();
/// let draft = TransactionDraft::new(
///     "42.50".parse().unwrap(),
///     TransactionType::Expense,
///     NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
/// )
/// .with_notes("coffee with Jo");
/// let record = Transaction::from_draft("tx-1", &draft, chrono::Utc::now()).unwrap();
///
/// let stored = mapper.to_storage_shape(&record, &key).unwrap();
/// let restored: Transaction = mapper.from_storage_shape(&stored, &key).unwrap();
/// assert_eq!(restored.amount.to_string(), "42.50");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordMapper {
    cipher: FieldCipher,
    options: MapperOptions,
}

impl RecordMapper {
    /// Creates a mapper.
    #[must_use]
    pub const fn new(cipher: FieldCipher, options: MapperOptions) -> Self {
        Self { cipher, options }
    }

    /// Returns a field sealer bound to `key`.
    #[must_use]
    pub const fn sealer<'a>(&self, key: &'a EncryptionKey) -> FieldSealer<'a> {
        FieldSealer::new(self.cipher, key, self.options)
    }

    /// Encrypts a record into its storage shape.
    ///
    /// # Errors
    ///
    /// Returns any field encryption error.
    pub fn to_storage_shape<R: EncryptedRecord>(
        &self,
        record: &R,
        key: &EncryptionKey,
    ) -> Result<R::Stored, Error> {
        record.seal(&self.sealer(key))
    }

    /// Decrypts a stored record.
    ///
    /// # Errors
    ///
    /// Returns `Error::Mapping`, `Error::AuthenticationFailed` or
    /// `Error::Parse`; no partial record is ever returned.
    pub fn from_storage_shape<R: EncryptedRecord>(
        &self,
        stored: &R::Stored,
        key: &EncryptionKey,
    ) -> Result<R, Error> {
        R::open(stored, &self.sealer(key))
    }

    /// Decrypts a batch of stored records in parallel.
    ///
    /// The output has one outcome per input, in input order. A failing record
    /// does not affect the others.
    pub fn from_storage_shape_many<R: EncryptedRecord>(
        &self,
        stored: &[R::Stored],
        key: &EncryptionKey,
    ) -> Vec<Result<R, Error>> {
        debug!(records = stored.len(), "decrypting batch");
        let sealer = self.sealer(key);
        let outcomes: Vec<Result<R, Error>> =
            stored.par_iter().map(|record| R::open(record, &sealer)).collect();

        let failed = outcomes.iter().filter(|outcome| outcome.is_err()).count();
        if failed > 0 {
            for (index, outcome) in outcomes.iter().enumerate() {
                if let Err(err) = outcome {
                    warn!(index, kind = ?err.kind(), "record could not be decrypted: {err}");
                }
            }
            warn!(failed, total = outcomes.len(), "batch decrypted with failures");
        }
        outcomes
    }

    /// Encrypts a partial update.
    ///
    /// # Errors
    ///
    /// Returns any field encryption error.
    pub fn patch_to_storage_shape<P: EncryptedPatch>(
        &self,
        patch: &P,
        key: &EncryptionKey,
    ) -> Result<P::Stored, Error> {
        patch.seal(&self.sealer(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::cipher::CipherMode;
    use crate::kdf::generate_random_key;

    const AMOUNT: EncryptedColumn = EncryptedColumn {
        context: FieldContext::new("transactions", "amount"),
        ciphertext: "encrypted_amount",
        nonce: "iv_amount",
        kind: FieldKind::Amount,
    };

    const NOTES: EncryptedColumn = EncryptedColumn {
        context: FieldContext::new("transactions", "notes"),
        ciphertext: "encrypted_notes",
        nonce: "iv_notes",
        kind: FieldKind::Text,
    };

    fn amount(text: &str) -> FieldValue {
        FieldValue::Amount(text.parse::<Amount>().unwrap())
    }

    #[test]
    fn test_seal_open_round_trip() {
        let key = generate_random_key();
        let sealer = FieldSealer::new(FieldCipher::default(), &key, MapperOptions::default());

        let field = sealer.seal(&amount("42.50"), &AMOUNT).unwrap();
        assert_eq!(sealer.open(&field, &AMOUNT).unwrap(), amount("42.50"));
    }

    #[test]
    fn test_seal_rejects_kind_mismatch() {
        let key = generate_random_key();
        let sealer = FieldSealer::new(FieldCipher::default(), &key, MapperOptions::default());

        let result = sealer.seal(&FieldValue::from("text"), &AMOUNT);
        assert!(matches!(result, Err(Error::InvalidRecord(_))));
    }

    #[test]
    fn test_open_text_as_amount_is_parse_failure() {
        let key = generate_random_key();
        let sealer = FieldSealer::new(FieldCipher::default(), &key, MapperOptions::default());

        let field = sealer.seal(&FieldValue::from("coffee with Jo"), &NOTES).unwrap();
        let result = sealer.open(&field, &AMOUNT);
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[test]
    fn test_open_bad_base64_names_column() {
        let key = generate_random_key();
        let sealer = FieldSealer::new(FieldCipher::default(), &key, MapperOptions::default());
        let mut field = sealer.seal(&amount("1"), &AMOUNT).unwrap();

        field.nonce = "***".to_string();
        assert!(matches!(
            sealer.open(&field, &AMOUNT),
            Err(Error::Mapping { field }) if field == "iv_amount"
        ));

        let mut field = sealer.seal(&amount("1"), &AMOUNT).unwrap();
        field.ciphertext = "***".to_string();
        assert!(matches!(
            sealer.open(&field, &AMOUNT),
            Err(Error::Mapping { field }) if field == "encrypted_amount"
        ));
    }

    #[test]
    fn test_open_required_missing() {
        let key = generate_random_key();
        let sealer = FieldSealer::new(FieldCipher::default(), &key, MapperOptions::default());

        let result = sealer.open_required(None, None, &AMOUNT);
        assert!(matches!(result, Err(Error::Mapping { field }) if field == "encrypted_amount"));
    }

    #[test]
    fn test_open_optional_absent() {
        let key = generate_random_key();
        let sealer = FieldSealer::new(FieldCipher::default(), &key, MapperOptions::default());

        assert!(sealer.open_optional(None, None, &NOTES).unwrap().is_none());
    }

    #[test]
    fn test_bound_context_rejects_swapped_columns() {
        let key = generate_random_key();
        let options = MapperOptions { bind_field_context: true };
        let sealer = FieldSealer::new(FieldCipher::default(), &key, options);

        let field = sealer.seal(&FieldValue::from("12"), &NOTES).unwrap();
        assert!(matches!(sealer.open(&field, &AMOUNT), Err(Error::AuthenticationFailed)));
        assert_eq!(sealer.open(&field, &NOTES).unwrap(), FieldValue::from("12"));
    }

    #[test]
    fn test_unbound_fields_readable_without_aad() {
        let key = generate_random_key();
        let cipher = FieldCipher::new(CipherMode::Aes256Gcm);
        let sealer = FieldSealer::new(cipher, &key, MapperOptions::default());

        let field = sealer.seal(&amount("42.50"), &AMOUNT).unwrap();
        let (ciphertext, nonce) = field.decode().unwrap();
        assert_eq!(cipher.decrypt(&ciphertext, &nonce, &key).unwrap(), b"42.50");
    }

    #[test]
    fn test_options_deserialize_default() {
        let options: MapperOptions = serde_json::from_str("{}").unwrap();
        assert!(!options.bind_field_context);
    }
}
