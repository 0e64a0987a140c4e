//! Key session state machine.
//!
//! A session owns the key store handle and the in-memory key. It replaces
//! any "try to decrypt and guess" logic with three explicit states.

use crate::error::Error;
use crate::kdf::{derive_key, KdfParams};
use crate::key::{DerivationSalt, EncryptionKey};
use crate::key_store::KeyStore;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Observable state of a [`KeySession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// No key has been provisioned; onboarding is required.
    NoKey,
    /// A usable key is in memory.
    KeyLoaded,
    /// A key is stored but is unusable or does not match the data.
    DecryptionError,
}

struct Inner {
    key: Option<Arc<EncryptionKey>>,
    state: KeyState,
    reason: Option<String>,
}

/// Holds the active encryption key for one user.
///
/// # Example
///
/// ```
/// use datum::key_store::MemoryKeyStore;
/// use datum::session::{KeySession, KeyState};
/// use datum::kdf::generate_random_key;
///
/// let session = KeySession::open(MemoryKeyStore::new("demo")).unwrap();
/// assert_eq!(session.state(), KeyState::NoKey);
///
/// session.install(generate_random_key(), None).unwrap();
/// assert_eq!(session.state(), KeyState::KeyLoaded);
/// ```
pub struct KeySession<S: KeyStore> {
    store: S,
    inner: RwLock<Inner>,
}

impl<S: KeyStore> KeySession<S> {
    /// Opens a session, loading any key already in `store`.
    ///
    /// Stored material that cannot be imported leaves the session in
    /// [`KeyState::DecryptionError`] rather than failing.
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyStore` if the store cannot be read.
    pub fn open(store: S) -> Result<Self, Error> {
        let inner = match store.load()? {
            None => Inner { key: None, state: KeyState::NoKey, reason: None },
            Some(material) => match EncryptionKey::from_material(&material) {
                Ok(key) => {
                    debug!("loaded stored encryption key");
                    Inner { key: Some(Arc::new(key)), state: KeyState::KeyLoaded, reason: None }
                }
                Err(err) => {
                    warn!(error = %err, "stored encryption key is unusable");
                    Inner {
                        key: None,
                        state: KeyState::DecryptionError,
                        reason: Some(err.to_string()),
                    }
                }
            },
        };
        Ok(Self { store, inner: RwLock::new(inner) })
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> KeyState {
        self.inner.read().state
    }

    /// Returns the key store backing this session.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns the loaded key.
    ///
    /// A session that entered [`KeyState::DecryptionError`] after a failed
    /// batch keeps its key so the caller can retry; only a stored key that
    /// could not be imported is unusable.
    ///
    /// # Errors
    ///
    /// - `Error::NoKey` if no key was provisioned
    /// - `Error::KeyUnusable` if the stored key could not be imported
    pub fn key(&self) -> Result<Arc<EncryptionKey>, Error> {
        let inner = self.inner.read();
        match (&inner.key, inner.state) {
            (Some(key), _) => Ok(Arc::clone(key)),
            (None, KeyState::DecryptionError) => {
                let reason = inner.reason.as_deref().unwrap_or("stored key could not be imported");
                Err(Error::KeyUnusable(reason.to_string()))
            }
            (None, _) => Err(Error::NoKey),
        }
    }

    /// Persists `key` (and its salt, for password-derived keys) and makes it
    /// the active key.
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyStore` if the key cannot be persisted; the session
    /// state is unchanged in that case.
    pub fn install(
        &self,
        key: EncryptionKey,
        salt: Option<&DerivationSalt>,
    ) -> Result<Arc<EncryptionKey>, Error> {
        let mut inner = self.inner.write();
        self.store.save(&key.to_material(), salt)?;

        let key = Arc::new(key);
        inner.key = Some(Arc::clone(&key));
        inner.state = KeyState::KeyLoaded;
        inner.reason = None;
        info!(password_derived = salt.is_some(), "encryption key installed");
        Ok(key)
    }

    /// Clears the key store and drops the in-memory key.
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyStore` if the store cannot be cleared; the in-memory
    /// key is dropped regardless.
    pub fn forget(&self) -> Result<(), Error> {
        let mut inner = self.inner.write();
        inner.key = None;
        inner.state = KeyState::NoKey;
        inner.reason = None;
        self.store.clear()?;
        info!("encryption key forgotten");
        Ok(())
    }

    /// Updates the state from the outcome of a batch read.
    ///
    /// A non-empty batch in which every record failed authentication moves the
    /// session to [`KeyState::DecryptionError`]; any successful record moves it
    /// back to [`KeyState::KeyLoaded`]. Other outcomes leave the state alone.
    pub fn record_batch<T>(&self, outcomes: &[Result<T, Error>]) -> KeyState {
        let mut inner = self.inner.write();
        if inner.key.is_none() || outcomes.is_empty() {
            return inner.state;
        }

        if outcomes.iter().any(Result::is_ok) {
            inner.state = KeyState::KeyLoaded;
            inner.reason = None;
        } else if outcomes.iter().all(|o| matches!(o, Err(Error::AuthenticationFailed))) {
            warn!(
                records = outcomes.len(),
                "no record in batch authenticated under the loaded key"
            );
            inner.state = KeyState::DecryptionError;
            inner.reason = Some("no record could be decrypted with the loaded key".to_string());
        }
        inner.state
    }

    /// Re-derives the key from a password and the persisted salt.
    ///
    /// If a usable key is already stored, the derived key must match it.
    ///
    /// # Errors
    ///
    /// - `Error::KeyDerivation` if no salt is stored, the password is empty,
    ///   or the password does not reproduce the stored key
    /// - `Error::KeyStore` if the store cannot be read or written
    pub fn unlock_with_password(
        &self,
        password: &str,
        params: &KdfParams,
    ) -> Result<Arc<EncryptionKey>, Error> {
        let salt = self.store.load_salt()?.ok_or_else(|| {
            Error::KeyDerivation(
                "no salt is stored; this key was not derived from a password".to_string(),
            )
        })?;
        let (key, salt) = derive_key(password, Some(&salt), params)?;

        let stored =
            self.store.load()?.and_then(|material| EncryptionKey::from_material(&material).ok());
        if let Some(stored) = stored {
            if stored.expose() != key.expose() {
                return Err(Error::KeyDerivation(
                    "password does not match the stored key".to_string(),
                ));
            }
        }
        self.install(key, Some(&salt))
    }
}

impl<S: KeyStore> std::fmt::Debug for KeySession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySession").field("state", &self.state()).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::generate_random_key;
    use crate::key_store::{MemoryKeyStore, KEY_SLOT};

    fn fast() -> KdfParams {
        KdfParams::with_iterations(crate::kdf::MIN_ITERATIONS)
    }

    #[test]
    fn test_open_empty_store() {
        let session = KeySession::open(MemoryKeyStore::new("t")).unwrap();
        assert_eq!(session.state(), KeyState::NoKey);
        assert!(matches!(session.key(), Err(Error::NoKey)));
    }

    #[test]
    fn test_open_loads_stored_key() {
        let store = MemoryKeyStore::new("t");
        let key = generate_random_key();
        store.save(&key.to_material(), None).unwrap();

        let session = KeySession::open(store).unwrap();
        assert_eq!(session.state(), KeyState::KeyLoaded);
        assert_eq!(session.key().unwrap().expose(), key.expose());
    }

    #[test]
    fn test_open_with_invalid_material() {
        let store = MemoryKeyStore::new("t");
        store.put_raw(KEY_SLOT, "c2hvcnQ=");

        let session = KeySession::open(store).unwrap();
        assert_eq!(session.state(), KeyState::DecryptionError);
        assert!(matches!(session.key(), Err(Error::KeyUnusable(_))));
    }

    #[test]
    fn test_install_and_forget() {
        let session = KeySession::open(MemoryKeyStore::new("t")).unwrap();
        session.install(generate_random_key(), None).unwrap();
        assert!(session.store().exists().unwrap());

        session.forget().unwrap();
        assert_eq!(session.state(), KeyState::NoKey);
        assert!(!session.store().exists().unwrap());
        assert!(matches!(session.key(), Err(Error::NoKey)));
    }

    #[test]
    fn test_install_recovers_from_unusable_key() {
        let store = MemoryKeyStore::new("t");
        store.put_raw(KEY_SLOT, "***");
        let session = KeySession::open(store).unwrap();

        session.install(generate_random_key(), None).unwrap();
        assert_eq!(session.state(), KeyState::KeyLoaded);
    }

    #[test]
    fn test_record_batch_transitions() {
        let session = KeySession::open(MemoryKeyStore::new("t")).unwrap();
        session.install(generate_random_key(), None).unwrap();

        let all_failed: Vec<Result<(), Error>> =
            vec![Err(Error::AuthenticationFailed), Err(Error::AuthenticationFailed)];
        assert_eq!(session.record_batch(&all_failed), KeyState::DecryptionError);
        assert!(session.key().is_ok());

        let mixed: Vec<Result<(), Error>> = vec![Err(Error::AuthenticationFailed), Ok(())];
        assert_eq!(session.record_batch(&mixed), KeyState::KeyLoaded);
    }

    #[test]
    fn test_record_batch_ignores_non_authentication_failures() {
        let session = KeySession::open(MemoryKeyStore::new("t")).unwrap();
        session.install(generate_random_key(), None).unwrap();

        let parse_failed: Vec<Result<(), Error>> = vec![Err(Error::Parse("x".into()))];
        assert_eq!(session.record_batch(&parse_failed), KeyState::KeyLoaded);

        let empty: Vec<Result<(), Error>> = Vec::new();
        assert_eq!(session.record_batch(&empty), KeyState::KeyLoaded);
    }

    #[test]
    fn test_record_batch_without_key() {
        let session = KeySession::open(MemoryKeyStore::new("t")).unwrap();
        let failed: Vec<Result<(), Error>> = vec![Err(Error::AuthenticationFailed)];
        assert_eq!(session.record_batch(&failed), KeyState::NoKey);
    }

    #[test]
    fn test_unlock_with_password() {
        let store = MemoryKeyStore::new("t");
        let (key, salt) = derive_key("hunter2hunter2", None, &fast()).unwrap();
        store.save(&key.to_material(), Some(&salt)).unwrap();
        let session = KeySession::open(store).unwrap();

        let unlocked = session.unlock_with_password("hunter2hunter2", &fast()).unwrap();
        assert_eq!(unlocked.expose(), key.expose());

        let wrong = session.unlock_with_password("hunter3hunter3", &fast());
        assert!(matches!(wrong, Err(Error::KeyDerivation(_))));
    }

    #[test]
    fn test_unlock_without_salt() {
        let session = KeySession::open(MemoryKeyStore::new("t")).unwrap();
        session.install(generate_random_key(), None).unwrap();

        let result = session.unlock_with_password("anything-at-all", &fast());
        assert!(matches!(result, Err(Error::KeyDerivation(_))));
    }

    #[test]
    fn test_unlock_replaces_unusable_material() {
        let store = MemoryKeyStore::new("t");
        let (key, salt) = derive_key("hunter2hunter2", None, &fast()).unwrap();
        store.save(&key.to_material(), Some(&salt)).unwrap();
        store.put_raw(KEY_SLOT, "garbage");
        let session = KeySession::open(store).unwrap();
        assert_eq!(session.state(), KeyState::DecryptionError);

        session.unlock_with_password("hunter2hunter2", &fast()).unwrap();
        assert_eq!(session.state(), KeyState::KeyLoaded);
        assert_eq!(session.key().unwrap().expose(), key.expose());
    }

    #[test]
    fn test_session_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<KeySession<MemoryKeyStore>>();
    }
}
