//! First-run key provisioning.

use crate::error::Error;
use crate::kdf::{derive_key, generate_random_key, KdfParams};
use crate::key::{EncryptionKey, KeyMaterial};
use crate::key_store::KeyStore;
use crate::session::KeySession;
use std::sync::Arc;

/// Shortest master password accepted at onboarding, in characters.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Derives a key from a new master password and installs it with its salt.
///
/// # Errors
///
/// - `Error::KeyDerivation` if the password is shorter than
///   [`MIN_PASSWORD_LENGTH`] or does not equal `confirmation`
/// - `Error::KeyStore` if the key cannot be persisted
///
/// # Example
///
/// ```
/// use datum::kdf::KdfParams;
/// use datum::key_store::MemoryKeyStore;
/// use datum::onboarding::onboard_with_password;
/// use datum::session::{KeySession, KeyState};
///
/// let session = KeySession::open(MemoryKeyStore::new("demo")).unwrap();
/// let params = KdfParams::with_iterations(1_000);
///
/// onboard_with_password(&session, "hunter2hunter2", "hunter2hunter2", &params).unwrap();
/// assert_eq!(session.state(), KeyState::KeyLoaded);
/// ```
pub fn onboard_with_password<S: KeyStore>(
    session: &KeySession<S>,
    password: &str,
    confirmation: &str,
    params: &KdfParams,
) -> Result<Arc<EncryptionKey>, Error> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(Error::KeyDerivation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if password != confirmation {
        return Err(Error::KeyDerivation("passwords do not match".to_string()));
    }

    let (key, salt) = derive_key(password, None, params)?;
    session.install(key, Some(&salt))
}

/// Generates a random key and installs it without a salt.
///
/// Returns the exported material so it can be shown to the user once; a
/// random key cannot be recovered if it is lost.
///
/// # Errors
///
/// Returns `Error::KeyStore` if the key cannot be persisted.
pub fn onboard_with_random_key<S: KeyStore>(session: &KeySession<S>) -> Result<KeyMaterial, Error> {
    let key = generate_random_key();
    let material = key.to_material();
    session.install(key, None)?;
    Ok(material)
}

/// Installs a previously exported key, e.g. on a new device.
///
/// The material is checked before anything is written, so a malformed key
/// never reaches the store.
///
/// # Errors
///
/// - `Error::InvalidEncoding` or `Error::InvalidKeyLength` if the material
///   is not a valid exported key
/// - `Error::KeyStore` if the key cannot be persisted
pub fn onboard_with_imported_key<S: KeyStore>(
    session: &KeySession<S>,
    material: &KeyMaterial,
) -> Result<Arc<EncryptionKey>, Error> {
    let key = EncryptionKey::from_material(material)?;
    session.install(key, None)
}
