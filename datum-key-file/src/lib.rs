//! File-based key store for `Datum`.
//!
//! This store keeps the key slots of one namespace in a single JSON document
//! on the local disk. It is the desktop counterpart of a browser key-value
//! store: anyone who can read the file can read the key.

#![warn(clippy::pedantic, clippy::nursery)]

use datum::error::KeyStoreError;
use datum::key::{DerivationSalt, KeyMaterial};
use datum::key_store::{KeyStore, DEFAULT_NAMESPACE};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zeroize::{Zeroize, Zeroizing};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "DATUM_DATA_DIR";

#[derive(Default, Serialize, Deserialize)]
struct KeyDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encryption_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key_salt: Option<String>,
}

impl Drop for KeyDocument {
    fn drop(&mut self) {
        self.encryption_key.zeroize();
    }
}

/// File-based key store.
///
/// Keys are stored with the following layout:
/// ```text
/// <data dir>/
/// ├── datum.json   ({"encryption_key": "...", "key_salt": "..."}, 0600 permissions)
/// └── alice.json   (another namespace)
/// ```
///
/// Writes go to a temporary file that is renamed over the document, so a
/// crash never leaves a half-written key behind.
#[derive(Debug)]
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    /// Creates a store for `namespace` inside `dir`, creating `dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns `KeyStoreError::WriteFailed` if the namespace is not a plain
    /// name (letters, digits, `-`, `_`) or the directory cannot be created.
    pub fn new(dir: impl AsRef<Path>, namespace: &str) -> Result<Self, KeyStoreError> {
        if namespace.is_empty()
            || !namespace.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(KeyStoreError::WriteFailed(format!("invalid namespace: {namespace:?}")));
        }
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| {
            KeyStoreError::WriteFailed(format!("cannot create {}: {e}", dir.display()))
        })?;
        Ok(Self { path: dir.join(format!("{namespace}.json")) })
    }

    /// Creates a store for `namespace` in the default data directory.
    ///
    /// # Errors
    ///
    /// Same as [`FileKeyStore::new`] and [`default_data_dir`].
    pub fn open_default(namespace: &str) -> Result<Self, KeyStoreError> {
        Self::new(default_data_dir()?, namespace)
    }

    /// Returns the path of the key document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<KeyDocument, KeyStoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => Zeroizing::new(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(KeyDocument::default()),
            Err(e) => {
                return Err(KeyStoreError::ReadFailed(format!("{}: {e}", self.path.display())))
            }
        };
        serde_json::from_str(&text)
            .map_err(|e| KeyStoreError::Corrupted(format!("{}: {e}", self.path.display())))
    }

    fn write_document(&self, document: &KeyDocument) -> Result<(), KeyStoreError> {
        let text = Zeroizing::new(
            serde_json::to_string_pretty(document)
                .map_err(|e| KeyStoreError::WriteFailed(e.to_string()))?,
        );
        let tmp = self.path.with_extension(format!("json.{:016x}.tmp", rand::random::<u64>()));

        let result =
            write_private(&tmp, text.as_bytes()).and_then(|()| fs::rename(&tmp, &self.path));
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(KeyStoreError::WriteFailed(format!("{}: {e}", self.path.display())));
        }
        Ok(())
    }
}

fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Returns the directory holding key documents.
///
/// Uses `DATUM_DATA_DIR` when set, otherwise the platform data directory.
///
/// # Errors
///
/// Returns `KeyStoreError::ReadFailed` if no home directory can be found.
pub fn default_data_dir() -> Result<PathBuf, KeyStoreError> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    directories::ProjectDirs::from("", "", DEFAULT_NAMESPACE)
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| KeyStoreError::ReadFailed("no home directory found".to_string()))
}

impl KeyStore for FileKeyStore {
    fn save(
        &self,
        material: &KeyMaterial,
        salt: Option<&DerivationSalt>,
    ) -> Result<(), KeyStoreError> {
        let document = KeyDocument {
            encryption_key: Some(material.expose().to_string()),
            key_salt: salt.map(DerivationSalt::to_base64),
        };
        self.write_document(&document)?;
        info!(path = %self.path.display(), with_salt = salt.is_some(), "key saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<KeyMaterial>, KeyStoreError> {
        let mut document = self.read_document()?;
        Ok(document.encryption_key.take().map(KeyMaterial::new))
    }

    fn load_salt(&self) -> Result<Option<DerivationSalt>, KeyStoreError> {
        let document = self.read_document()?;
        document
            .key_salt
            .as_deref()
            .map(|text| {
                DerivationSalt::from_base64(text)
                    .map_err(|e| KeyStoreError::Corrupted(format!("key_salt: {e}")))
            })
            .transpose()
    }

    fn clear(&self) -> Result<(), KeyStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "key document removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KeyStoreError::WriteFailed(format!("{}: {e}", self.path.display()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datum::kdf::generate_random_key;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> FileKeyStore {
        FileKeyStore::new(dir.path(), "datum").expect("Failed to create store")
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir);
        let key = generate_random_key();
        let salt = DerivationSalt::generate();

        store.save(&key.to_material(), Some(&salt)).expect("Save failed");

        let loaded = store.load().expect("Load failed").expect("No key stored");
        assert_eq!(loaded.expose(), key.to_material().expose());
        assert_eq!(store.load_salt().expect("Load salt failed"), Some(salt));
    }

    #[test]
    fn test_persists_across_instances() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let key = generate_random_key();
        store(&dir).save(&key.to_material(), None).expect("Save failed");

        let reopened = store(&dir);
        assert!(reopened.exists().expect("Exists failed"));
        assert_eq!(
            reopened.load().expect("Load failed").expect("No key stored").expose(),
            key.to_material().expose()
        );
    }

    #[test]
    fn test_missing_document() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir);

        assert!(store.load().expect("Load failed").is_none());
        assert!(store.load_salt().expect("Load salt failed").is_none());
        assert!(!store.exists().expect("Exists failed"));
    }

    #[test]
    fn test_save_without_salt_drops_salt() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir);
        let material = generate_random_key().to_material();

        store.save(&material, Some(&DerivationSalt::generate())).expect("Save failed");
        store.save(&material, None).expect("Save failed");

        assert!(store.load_salt().expect("Load salt failed").is_none());
        let text = fs::read_to_string(store.path()).expect("Read failed");
        assert!(!text.contains("key_salt"));
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir);
        store.save(&generate_random_key().to_material(), None).expect("Save failed");

        store.clear().expect("Clear failed");
        assert!(!store.path().exists());
        store.clear().expect("Second clear failed");
    }

    #[test]
    fn test_no_temp_files_left() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir);
        store.save(&generate_random_key().to_material(), None).expect("Save failed");
        store.save(&generate_random_key().to_material(), None).expect("Save failed");

        let entries: Vec<_> = fs::read_dir(dir.path()).expect("Read dir failed").collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_corrupted_document() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir);
        fs::write(store.path(), "{ not json").expect("Write failed");

        assert!(matches!(store.load(), Err(KeyStoreError::Corrupted(_))));
    }

    #[test]
    fn test_corrupted_salt() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir);
        fs::write(store.path(), r#"{"encryption_key": "x", "key_salt": "c2hvcnQ="}"#)
            .expect("Write failed");

        assert!(matches!(store.load_salt(), Err(KeyStoreError::Corrupted(_))));
    }

    #[test]
    fn test_namespaces_use_separate_files() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let alice = FileKeyStore::new(dir.path(), "alice").expect("Failed to create store");
        let bob = FileKeyStore::new(dir.path(), "bob").expect("Failed to create store");

        alice.save(&generate_random_key().to_material(), None).expect("Save failed");

        assert!(alice.exists().expect("Exists failed"));
        assert!(!bob.exists().expect("Exists failed"));
    }

    #[test]
    fn test_invalid_namespace() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        for namespace in ["", "../escape", "a/b", "with space"] {
            assert!(FileKeyStore::new(dir.path(), namespace).is_err(), "accepted {namespace:?}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_document_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store(&dir);
        store.save(&generate_random_key().to_material(), None).expect("Save failed");

        let mode = fs::metadata(store.path()).expect("Metadata failed").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_default_data_dir_env_override() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        std::env::set_var(DATA_DIR_ENV, dir.path());
        let resolved = default_data_dir().expect("Resolve failed");
        std::env::remove_var(DATA_DIR_ENV);

        assert_eq!(resolved, dir.path());
    }
}
