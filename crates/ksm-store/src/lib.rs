pub mod crypto;

use chrono::Utc;
use ksm_types::profile::{self, ProfileConfig};
use ksm_types::{KdfParams, Profile, ProfileDatabase, StoredProfileRecord};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("profile '{0}' already exists")]
    AlreadyExists(String),
    #[error("profile '{0}' not found")]
    NotFound(String),
    #[error("invalid profile: {0}")]
    Invalid(#[from] profile::ProfileValidationError),
    #[error("crypto error: {0}")]
    Crypto(String),
    #[error("I/O error: {0}")]
    Io(String),
}

/// Encrypted-at-rest mapping of named profiles to vault configs.
/// Thread-safe handle, cheaply `Clone`-able.
#[derive(Clone)]
pub struct ProfileStore {
    path: PathBuf,
    passphrase: Option<String>,
    kdf_params: KdfParams,
    inner: Arc<RwLock<ProfileDatabase>>,
}

impl ProfileStore {
    /// Open (or initialize) a profile store at `path`. `passphrase: None`
    /// selects an insecure no-passphrase mode, only intended for
    /// ephemeral dev use.
    pub async fn open(path: PathBuf, passphrase: Option<String>) -> Result<Self, StoreError> {
        let db = if path.exists() {
            load_database(&path, passphrase.as_deref(), &KdfParams::default())?
        } else {
            ProfileDatabase::default()
        };

        Ok(Self {
            path,
            passphrase,
            kdf_params: KdfParams::default(),
            inner: Arc::new(RwLock::new(db)),
        })
    }

    pub fn is_encrypted(&self) -> bool {
        self.passphrase.is_some()
    }

    pub async fn list(&self) -> Vec<String> {
        self.inner.read().await.profiles.keys().cloned().collect()
    }

    pub async fn create(&self, name: &str, config: ProfileConfig) -> Result<(), StoreError> {
        profile::validate_profile_name(name)?;
        profile::validate_profile_config(&config)?;

        let mut db = self.inner.write().await;
        if db.profiles.contains_key(name) {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }

        let now = Utc::now();
        let profile = Profile {
            name: name.to_string(),
            config: config.clone(),
            created_at: now,
            updated_at: now,
        };
        let record = self.encode_profile(&profile)?;
        db.profiles.insert(name.to_string(), record);
        db.updated_at = now;
        self.persist(&db)?;
        Ok(())
    }

    /// Returns a deep copy of the decrypted profile.
    pub async fn get(&self, name: &str) -> Result<Profile, StoreError> {
        let db = self.inner.read().await;
        let record = db
            .profiles
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        self.decode_profile(record)
    }

    pub async fn update(&self, name: &str, config: ProfileConfig) -> Result<(), StoreError> {
        profile::validate_profile_config(&config)?;

        let mut db = self.inner.write().await;
        if !db.profiles.contains_key(name) {
            return Err(StoreError::NotFound(name.to_string()));
        }

        let existing = self.decode_profile(&db.profiles[name])?;
        let now = Utc::now();
        let profile = Profile {
            name: name.to_string(),
            config,
            created_at: existing.created_at,
            updated_at: now,
        };
        let record = self.encode_profile(&profile)?;
        db.profiles.insert(name.to_string(), record);
        db.updated_at = now;
        self.persist(&db)?;
        Ok(())
    }

    pub async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let mut db = self.inner.write().await;
        let removed = db.profiles.remove(name).is_some();
        if removed {
            db.updated_at = Utc::now();
            self.persist(&db)?;
        }
        Ok(removed)
    }

    fn encode_profile(&self, profile: &Profile) -> Result<StoredProfileRecord, StoreError> {
        let plaintext = serde_json::to_vec(profile)
            .map_err(|e| StoreError::Crypto(format!("failed to serialize profile: {e}")))?;
        let checksum = profile::config_checksum(&profile.config);

        let encrypted_data = match &self.passphrase {
            Some(pass) => {
                let blob = crypto::seal(pass, &plaintext, &self.kdf_params)?;
                crypto::pack(&blob)
            }
            None => String::from_utf8(plaintext)
                .map_err(|e| StoreError::Crypto(format!("non-utf8 profile: {e}")))?,
        };

        Ok(StoredProfileRecord {
            name: profile.name.clone(),
            encrypted_data,
            created_at: profile.created_at,
            updated_at: profile.updated_at,
            config_checksum: checksum,
        })
    }

    fn decode_profile(&self, record: &StoredProfileRecord) -> Result<Profile, StoreError> {
        let plaintext = match &self.passphrase {
            Some(pass) => {
                let blob = crypto::unpack(&record.encrypted_data)?;
                crypto::open(pass, &blob, &self.kdf_params)?
            }
            None => record.encrypted_data.clone().into_bytes(),
        };

        serde_json::from_slice(&plaintext)
            .map_err(|e| StoreError::Crypto(format!("failed to deserialize profile: {e}")))
    }

    fn persist(&self, db: &ProfileDatabase) -> Result<(), StoreError> {
        save_database(&self.path, db)
    }
}

/// Load the profile database, skipping (not failing on) any entry whose
/// decryption or checksum fails.
fn load_database(
    path: &Path,
    passphrase: Option<&str>,
    params: &KdfParams,
) -> Result<ProfileDatabase, StoreError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| StoreError::Io(format!("failed to read profile store: {e}")))?;
    let mut db: ProfileDatabase = serde_json::from_str(&contents)
        .map_err(|e| StoreError::Io(format!("failed to parse profile store: {e}")))?;

    let mut good = std::collections::BTreeMap::new();
    for (name, record) in db.profiles.into_iter() {
        match decode_for_load(&record, passphrase, params) {
            Ok(profile) => {
                let recomputed = profile::config_checksum(&profile.config);
                if recomputed != record.config_checksum {
                    tracing::warn!(profile = %name, "checksum mismatch, skipping profile on load");
                    continue;
                }
                good.insert(name, record);
            }
            Err(e) => {
                tracing::warn!(profile = %name, error = %e, "failed to decode profile, skipping");
            }
        }
    }
    db.profiles = good;
    Ok(db)
}

fn decode_for_load(
    record: &StoredProfileRecord,
    passphrase: Option<&str>,
    params: &KdfParams,
) -> Result<Profile, StoreError> {
    let plaintext = match passphrase {
        Some(pass) => {
            let blob = crypto::unpack(&record.encrypted_data)?;
            crypto::open(pass, &blob, params)?
        }
        None => record.encrypted_data.clone().into_bytes(),
    };
    serde_json::from_slice(&plaintext)
        .map_err(|e| StoreError::Crypto(format!("failed to deserialize profile: {e}")))
}

/// Atomic write: serialize to `<path>.tmp` (mode 0600), then rename over
/// `path`. The containing directory is mode 0700.
fn save_database(path: &Path, db: &ProfileDatabase) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| StoreError::Io(format!("failed to create profile store dir: {e}")))?;
        set_mode(parent, 0o700);
    }

    let tmp_path = path.with_extension("json.tmp");
    let contents = serde_json::to_string_pretty(db)
        .map_err(|e| StoreError::Io(format!("failed to serialize profile store: {e}")))?;

    std::fs::write(&tmp_path, contents)
        .map_err(|e| StoreError::Io(format!("failed to write temp profile store: {e}")))?;
    set_mode(&tmp_path, 0o600);

    std::fs::rename(&tmp_path, path)
        .map_err(|e| StoreError::Io(format!("failed to rename temp profile store: {e}")))?;

    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode));
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}

/// Default root: `${HOME}/.keeper/ksm-mcp/`, overridable by
/// `KSM_MCP_HOME`.
pub fn default_root_dir() -> PathBuf {
    if let Ok(override_dir) = std::env::var("KSM_MCP_HOME") {
        return PathBuf::from(override_dir);
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));
    home.join(".keeper").join("ksm-mcp")
}

pub fn default_profiles_path() -> PathBuf {
    default_root_dir().join("profiles.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(client_id: &str) -> ProfileConfig {
        let mut c = ProfileConfig::new();
        c.insert("clientId".into(), client_id.into());
        c.insert("hostname".into(), "keepersecurity.com".into());
        c
    }

    #[tokio::test]
    async fn create_get_update_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path().join("profiles.json"), Some("pw".into()))
            .await
            .unwrap();

        store.create("prod", cfg("0123456789")).await.unwrap();
        assert_eq!(store.list().await, vec!["prod".to_string()]);

        let p = store.get("prod").await.unwrap();
        assert_eq!(p.config.get("clientId").unwrap(), "0123456789");

        store.update("prod", cfg("9876543210")).await.unwrap();
        let p2 = store.get("prod").await.unwrap();
        assert_eq!(p2.config.get("clientId").unwrap(), "9876543210");
        assert_eq!(p2.created_at, p.created_at);

        assert!(store.delete("prod").await.unwrap());
        assert!(store.get("prod").await.is_err());
    }

    #[tokio::test]
    async fn duplicate_create_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path().join("profiles.json"), Some("pw".into()))
            .await
            .unwrap();
        store.create("prod", cfg("0123456789")).await.unwrap();
        assert!(matches!(
            store.create("prod", cfg("0123456789")).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn invalid_name_and_short_client_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path().join("profiles.json"), Some("pw".into()))
            .await
            .unwrap();
        assert!(store.create("bad name", cfg("0123456789")).await.is_err());
        assert!(store.create("prod", cfg("short")).await.is_err());
    }

    #[tokio::test]
    async fn load_save_round_trip_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        {
            let store = ProfileStore::open(path.clone(), Some("pw".into())).await.unwrap();
            store.create("a", cfg("0123456789")).await.unwrap();
            store.create("b", cfg("9999999999")).await.unwrap();
        }
        let reopened = ProfileStore::open(path, Some("pw".into())).await.unwrap();
        let mut names = reopened.list().await;
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn wrong_passphrase_skips_entries_without_failing_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        {
            let store = ProfileStore::open(path.clone(), Some("right".into())).await.unwrap();
            store.create("a", cfg("0123456789")).await.unwrap();
        }
        let reopened = ProfileStore::open(path, Some("wrong".into())).await.unwrap();
        assert!(reopened.list().await.is_empty());
    }

    #[tokio::test]
    async fn no_passphrase_mode_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path().join("profiles.json"), None)
            .await
            .unwrap();
        store.create("dev", cfg("0123456789")).await.unwrap();
        let p = store.get("dev").await.unwrap();
        assert_eq!(p.config.get("clientId").unwrap(), "0123456789");
    }
}
