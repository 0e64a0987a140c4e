//! # `Datum`
//!
//! Client-side field-level encryption for a personal finance tracker.
//! Amounts, notes and goal names are encrypted on the device before they
//! reach the remote store; the store only ever holds ciphertext for them.
//!
//! ## Features
//!
//! - AEAD field encryption (AES-256-GCM, ChaCha20-Poly1305)
//! - PBKDF2-HMAC-SHA256 password derivation or random keys
//! - Exact decimal amounts, never binary floating point
//! - Record mapping with per-record batch outcomes
//! - Key custody behind a pluggable key store
//!
//! ## Example
//!
//! ```
//! use datum::prelude::*;
//! use chrono::NaiveDate;
//!
//! let session = KeySession::open(MemoryKeyStore::new("demo"))?;
//! onboard_with_random_key(&session)?;
//!
//! let repository = TransactionRepository::new(MemoryRecordStore::new(), RecordMapper::default());
//! let draft = TransactionDraft::new(
//!     "42.50".parse()?,
//!     TransactionType::Expense,
//!     NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
//! )
//! .with_notes("coffee with Jo");
//!
//! let key = session.key()?;
//! let created = repository.create(&draft, &key)?;
//! let fetched = repository.get(&created.id, &key)?;
//! assert_eq!(fetched.map(|t| t.notes), Some(Some("coffee with Jo".to_string())));
//! # Ok::<(), datum::Error>(())
//! ```

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod amount;
pub mod cipher;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod field;
pub mod kdf;
pub mod key;
pub mod key_store;
pub mod mapper;
pub mod onboarding;
pub mod record;
pub mod repository;
pub mod session;
pub mod store;

pub use error::{Error, ErrorKind, KeyStoreError};

pub mod prelude {
    //! Convenience re-exports for common use.
    pub use crate::amount::Amount;
    pub use crate::cipher::{CipherMode, FieldCipher};
    pub use crate::config::CryptoConfig;
    pub use crate::error::{Error, ErrorKind, KeyStoreError};
    pub use crate::field::EncryptedField;
    pub use crate::kdf::{derive_key, generate_random_key, spawn_derive_key, KdfParams};
    pub use crate::key::{DerivationSalt, EncryptionKey, KeyMaterial};
    pub use crate::key_store::{KeyStore, MemoryKeyStore};
    pub use crate::mapper::{EncryptedRecord, MapperOptions, RecordMapper};
    pub use crate::onboarding::{
        onboard_with_imported_key, onboard_with_password, onboard_with_random_key,
    };
    pub use crate::record::{
        Goal, Mood, StoredGoal, StoredTransaction, Transaction, TransactionDraft, TransactionPatch,
        TransactionType,
    };
    pub use crate::repository::{TransactionQuery, TransactionRepository};
    pub use crate::session::{KeySession, KeyState};
    pub use crate::store::{MemoryRecordStore, RecordStore, Selection};
}
