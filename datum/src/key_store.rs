//! Key custody abstraction.
//!
//! A key store persists the exported key material and, for password-derived
//! keys, the derivation salt. Nothing else about the key leaves the process.

use crate::error::KeyStoreError;
use crate::key::{DerivationSalt, KeyMaterial};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;

/// Slot holding the base64 key material.
pub const KEY_SLOT: &str = "encryption_key";

/// Slot holding the base64 derivation salt.
pub const SALT_SLOT: &str = "key_salt";

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "datum";

/// Persists the encryption key and its salt.
///
/// Implementations must be thread-safe (`Send + Sync`); a session may be
/// shared between threads.
///
/// # Example
///
/// ```
/// use datum::key_store::{KeyStore, MemoryKeyStore};
/// use datum::kdf::generate_random_key;
///
/// let store = MemoryKeyStore::new("demo");
/// let key = generate_random_key();
///
/// store.save(&key.to_material(), None).expect("save failed");
/// assert!(store.exists().expect("exists failed"));
/// assert!(store.load_salt().expect("load_salt failed").is_none());
/// ```
pub trait KeyStore: Send + Sync {
    /// Persists key material and optional salt.
    ///
    /// Saving without a salt removes any previously stored salt.
    ///
    /// # Errors
    ///
    /// Returns `KeyStoreError::WriteFailed` if the slots cannot be written.
    fn save(
        &self,
        material: &KeyMaterial,
        salt: Option<&DerivationSalt>,
    ) -> Result<(), KeyStoreError>;

    /// Loads the stored key material, if any.
    ///
    /// # Errors
    ///
    /// Returns `KeyStoreError::ReadFailed` or `KeyStoreError::Corrupted`.
    fn load(&self) -> Result<Option<KeyMaterial>, KeyStoreError>;

    /// Loads the stored derivation salt, if any.
    ///
    /// # Errors
    ///
    /// Returns `KeyStoreError::Corrupted` if the stored salt is not valid.
    fn load_salt(&self) -> Result<Option<DerivationSalt>, KeyStoreError>;

    /// Removes both slots.
    ///
    /// # Errors
    ///
    /// Returns `KeyStoreError::WriteFailed` if the slots cannot be removed.
    fn clear(&self) -> Result<(), KeyStoreError>;

    /// Returns `true` if key material is stored.
    ///
    /// # Errors
    ///
    /// Same as [`KeyStore::load`].
    fn exists(&self) -> Result<bool, KeyStoreError> {
        Ok(self.load()?.is_some())
    }
}

impl<T: KeyStore + ?Sized> KeyStore for std::sync::Arc<T> {
    fn save(
        &self,
        material: &KeyMaterial,
        salt: Option<&DerivationSalt>,
    ) -> Result<(), KeyStoreError> {
        (**self).save(material, salt)
    }

    fn load(&self) -> Result<Option<KeyMaterial>, KeyStoreError> {
        (**self).load()
    }

    fn load_salt(&self) -> Result<Option<DerivationSalt>, KeyStoreError> {
        (**self).load_salt()
    }

    fn clear(&self) -> Result<(), KeyStoreError> {
        (**self).clear()
    }

    fn exists(&self) -> Result<bool, KeyStoreError> {
        (**self).exists()
    }
}

/// In-memory key store.
///
/// Slots are kept as text keyed by `"<namespace>:<slot>"`, the same layout a
/// browser-style key-value store would use.
pub struct MemoryKeyStore {
    namespace: String,
    slots: RwLock<HashMap<String, String>>,
}

impl MemoryKeyStore {
    /// Creates an empty store for `namespace`.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), slots: RwLock::new(HashMap::new()) }
    }

    /// Returns the namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Writes raw slot text, bypassing validation.
    pub fn put_raw(&self, slot: &str, value: impl Into<String>) {
        self.slots.write().insert(self.slot_key(slot), value.into());
    }

    fn slot_key(&self, slot: &str) -> String {
        format!("{}:{slot}", self.namespace)
    }
}

impl fmt::Debug for MemoryKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryKeyStore").field("namespace", &self.namespace).finish_non_exhaustive()
    }
}

impl KeyStore for MemoryKeyStore {
    fn save(
        &self,
        material: &KeyMaterial,
        salt: Option<&DerivationSalt>,
    ) -> Result<(), KeyStoreError> {
        let mut slots = self.slots.write();
        slots.insert(self.slot_key(KEY_SLOT), material.expose().to_string());
        match salt {
            Some(salt) => slots.insert(self.slot_key(SALT_SLOT), salt.to_base64()),
            None => slots.remove(&self.slot_key(SALT_SLOT)),
        };
        Ok(())
    }

    fn load(&self) -> Result<Option<KeyMaterial>, KeyStoreError> {
        let slots = self.slots.read();
        Ok(slots.get(&self.slot_key(KEY_SLOT)).map(|text| KeyMaterial::new(text.as_str())))
    }

    fn load_salt(&self) -> Result<Option<DerivationSalt>, KeyStoreError> {
        self.slots
            .read()
            .get(&self.slot_key(SALT_SLOT))
            .map(|text| {
                DerivationSalt::from_base64(text)
                    .map_err(|e| KeyStoreError::Corrupted(format!("{SALT_SLOT}: {e}")))
            })
            .transpose()
    }

    fn clear(&self) -> Result<(), KeyStoreError> {
        let mut slots = self.slots.write();
        slots.remove(&self.slot_key(KEY_SLOT));
        slots.remove(&self.slot_key(SALT_SLOT));
        Ok(())
    }
}
