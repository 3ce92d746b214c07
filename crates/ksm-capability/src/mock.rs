//! An in-memory [`VaultCapability`] for tests and local development. Not
//! a stand-in for Keeper's actual SDK — just enough behavior (masking,
//! folder membership, TOTP, file blobs) to exercise the tool engine.

use crate::{
    CreateFolderParams, CreateSecretParams, DownloadedFile, FolderSummary, GeneratePasswordParams,
    SecretRecord, SecretSummary, UpdateSecretParams, UploadFileParams, VaultCapability, VaultError,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;
use uuid::Uuid;

const MASKED_PLACEHOLDER: &str = "••••••••";

struct FileBlob {
    file_name: String,
    data: Vec<u8>,
}

struct Inner {
    secrets: BTreeMap<String, SecretRecord>,
    folders: BTreeMap<String, FolderSummary>,
    files: BTreeMap<String, Vec<FileBlob>>,
    /// Folders the mock treats as "empty or uninitialized", the
    /// condition `create_secret` must recognize for folder-placement
    /// recovery.
    uninitialized_folders: BTreeSet<String>,
}

/// Reference vault capability backed by an in-memory map. Construct with
/// [`MockVaultCapability::new`], seed it with [`MockVaultCapability::seed_secret`]
/// / [`seed_folder`](MockVaultCapability::seed_folder), and mark folders
/// uninitialized with [`MockVaultCapability::mark_folder_uninitialized`]
/// to exercise the folder-placement-recovery path.
pub struct MockVaultCapability {
    inner: RwLock<Inner>,
}

impl Default for MockVaultCapability {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVaultCapability {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                secrets: BTreeMap::new(),
                folders: BTreeMap::new(),
                files: BTreeMap::new(),
                uninitialized_folders: BTreeSet::new(),
            }),
        }
    }

    pub async fn seed_secret(&self, record: SecretRecord) {
        self.inner.write().await.secrets.insert(record.uid.clone(), record);
    }

    pub async fn seed_folder(&self, folder: FolderSummary) {
        self.inner.write().await.folders.insert(folder.uid.clone(), folder);
    }

    pub async fn mark_folder_uninitialized(&self, folder_uid: &str) {
        self.inner
            .write()
            .await
            .uninitialized_folders
            .insert(folder_uid.to_string());
    }

    fn mask(record: &SecretRecord) -> SecretRecord {
        let mut masked = record.clone();
        for (key, value) in masked.fields.iter_mut() {
            if ksm_types::audit::is_sensitive_key(key) {
                *value = serde_json::json!(MASKED_PLACEHOLDER);
            }
        }
        masked
    }
}

#[async_trait]
impl VaultCapability for MockVaultCapability {
    async fn list_secrets(&self, folder_uid: Option<&str>) -> Result<Vec<SecretSummary>, VaultError> {
        let inner = self.inner.read().await;
        Ok(inner
            .secrets
            .values()
            .filter(|s| match folder_uid {
                Some(f) => s.folder_uid.as_deref() == Some(f),
                None => true,
            })
            .map(|s| SecretSummary {
                uid: s.uid.clone(),
                title: s.title.clone(),
                record_type: s.record_type.clone(),
                folder_uid: s.folder_uid.clone(),
            })
            .collect())
    }

    async fn get_secret(
        &self,
        uid: &str,
        fields: Option<&[String]>,
        unmask: bool,
    ) -> Result<SecretRecord, VaultError> {
        let inner = self.inner.read().await;
        let record = inner
            .secrets
            .get(uid)
            .ok_or_else(|| VaultError::NotFound(uid.to_string()))?;
        let mut result = if unmask { record.clone() } else { Self::mask(record) };
        if let Some(wanted) = fields {
            let wanted: BTreeSet<&String> = wanted.iter().collect();
            result.fields.retain(|k, _| wanted.contains(k));
        }
        Ok(result)
    }

    async fn get_field(&self, notation: &str, unmask: bool) -> Result<String, VaultError> {
        let mut parts = notation.splitn(2, '/');
        let uid = parts.next().unwrap_or_default();
        let field = parts.next().unwrap_or_default().trim_start_matches("field/");
        let record = self.get_secret(uid, None, unmask).await?;
        record
            .fields
            .get(field)
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .ok_or_else(|| VaultError::Invalid(format!("unknown field in notation: {notation}")))
    }

    async fn search_secrets(&self, query: &str) -> Result<Vec<SecretSummary>, VaultError> {
        let inner = self.inner.read().await;
        let q = query.to_lowercase();
        Ok(inner
            .secrets
            .values()
            .filter(|s| s.title.to_lowercase().contains(&q))
            .map(|s| SecretSummary {
                uid: s.uid.clone(),
                title: s.title.clone(),
                record_type: s.record_type.clone(),
                folder_uid: s.folder_uid.clone(),
            })
            .collect())
    }

    async fn create_secret(&self, params: CreateSecretParams) -> Result<String, VaultError> {
        let mut inner = self.inner.write().await;
        if let Some(folder_uid) = &params.folder_uid {
            if !inner.folders.contains_key(folder_uid) {
                return Err(VaultError::FolderNotFound(folder_uid.clone()));
            }
            if inner.uninitialized_folders.contains(folder_uid) {
                return Err(VaultError::FolderUninitialized {
                    folder_uid: Some(folder_uid.clone()),
                });
            }
        }
        let uid = Uuid::new_v4().to_string();
        inner.secrets.insert(
            uid.clone(),
            SecretRecord {
                uid: uid.clone(),
                title: params.title,
                record_type: params.record_type,
                folder_uid: params.folder_uid,
                fields: params.fields,
            },
        );
        Ok(uid)
    }

    async fn update_secret(&self, params: UpdateSecretParams) -> Result<(), VaultError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .secrets
            .get_mut(&params.uid)
            .ok_or_else(|| VaultError::NotFound(params.uid.clone()))?;
        for (key, value) in params.fields {
            record.fields.insert(key, value);
        }
        Ok(())
    }

    async fn delete_secret(&self, uid: &str, _permanent: bool) -> Result<(), VaultError> {
        let mut inner = self.inner.write().await;
        inner
            .secrets
            .remove(uid)
            .ok_or_else(|| VaultError::NotFound(uid.to_string()))?;
        Ok(())
    }

    async fn generate_password(&self, params: GeneratePasswordParams) -> Result<String, VaultError> {
        let length = params.length.unwrap_or(20).max(4) as usize;
        let use_upper = params.uppercase.unwrap_or(true);
        let use_lower = params.lowercase.unwrap_or(true);
        let use_digits = params.digits.unwrap_or(true);
        let use_special = params.special.unwrap_or(true);

        let mut alphabet = String::new();
        if use_upper {
            alphabet.push_str("ABCDEFGHIJKLMNOPQRSTUVWXYZ");
        }
        if use_lower {
            alphabet.push_str("abcdefghijklmnopqrstuvwxyz");
        }
        if use_digits {
            alphabet.push_str("0123456789");
        }
        if use_special {
            alphabet.push_str("!@#$%^&*-_=+");
        }
        if alphabet.is_empty() {
            return Err(VaultError::Invalid(
                "generate_password: at least one character class must be enabled".to_string(),
            ));
        }

        use rand::Rng;
        let mut rng = rand::thread_rng();
        let alphabet: Vec<char> = alphabet.chars().collect();
        Ok((0..length)
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
            .collect())
    }

    async fn get_totp_code(&self, uid: &str) -> Result<String, VaultError> {
        let inner = self.inner.read().await;
        inner
            .secrets
            .get(uid)
            .ok_or_else(|| VaultError::NotFound(uid.to_string()))?;
        // deterministic stand-in; a real capability derives this from the
        // record's TOTP seed field.
        Ok("123456".to_string())
    }

    async fn upload_file(&self, params: UploadFileParams) -> Result<String, VaultError> {
        let mut inner = self.inner.write().await;
        if !inner.secrets.contains_key(&params.uid) {
            return Err(VaultError::NotFound(params.uid.clone()));
        }
        let file_uid = Uuid::new_v4().to_string();
        inner.files.entry(params.uid).or_default().push(FileBlob {
            file_name: params.file_name,
            data: params.data,
        });
        Ok(file_uid)
    }

    async fn download_file(&self, uid: &str, file_uid: &str) -> Result<DownloadedFile, VaultError> {
        let inner = self.inner.read().await;
        let files = inner
            .files
            .get(uid)
            .ok_or_else(|| VaultError::NotFound(format!("{uid} has no files")))?;
        // the mock doesn't track per-blob uids beyond insertion order, so
        // match positionally for a deterministic test fixture.
        let idx: usize = file_uid.parse().unwrap_or(0);
        files
            .get(idx)
            .map(|f| DownloadedFile {
                file_name: f.file_name.clone(),
                data: f.data.clone(),
            })
            .ok_or_else(|| VaultError::NotFound(file_uid.to_string()))
    }

    async fn list_folders(&self) -> Result<Vec<FolderSummary>, VaultError> {
        let inner = self.inner.read().await;
        Ok(inner.folders.values().cloned().collect())
    }

    async fn create_folder(&self, params: CreateFolderParams) -> Result<String, VaultError> {
        let mut inner = self.inner.write().await;
        if let Some(parent) = &params.parent_uid {
            if !inner.folders.contains_key(parent) {
                return Err(VaultError::FolderNotFound(parent.clone()));
            }
        }
        let uid = Uuid::new_v4().to_string();
        inner.folders.insert(
            uid.clone(),
            FolderSummary {
                uid: uid.clone(),
                name: params.name,
                parent_uid: params.parent_uid,
            },
        );
        Ok(uid)
    }

    async fn delete_folder(&self, uid: &str, _permanent: bool) -> Result<(), VaultError> {
        let mut inner = self.inner.write().await;
        inner
            .folders
            .remove(uid)
            .ok_or_else(|| VaultError::FolderNotFound(uid.to_string()))?;
        Ok(())
    }

    async fn test_connection(&self) -> Result<(), VaultError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn masked_get_secret_hides_sensitive_fields() {
        let vault = MockVaultCapability::new();
        vault
            .seed_secret(SecretRecord {
                uid: "ABC".to_string(),
                title: "prod db".to_string(),
                record_type: "databaseCredentials".to_string(),
                folder_uid: None,
                fields: [("password".to_string(), serde_json::json!("hunter2"))]
                    .into_iter()
                    .collect(),
            })
            .await;

        let masked = vault.get_secret("ABC", None, false).await.unwrap();
        assert_eq!(masked.fields["password"], serde_json::json!(MASKED_PLACEHOLDER));

        let unmasked = vault.get_secret("ABC", None, true).await.unwrap();
        assert_eq!(unmasked.fields["password"], serde_json::json!("hunter2"));
    }

    #[tokio::test]
    async fn create_secret_in_uninitialized_folder_signals_recovery() {
        let vault = MockVaultCapability::new();
        vault
            .seed_folder(FolderSummary {
                uid: "F1".to_string(),
                name: "empty-folder".to_string(),
                parent_uid: None,
            })
            .await;
        vault.mark_folder_uninitialized("F1").await;

        let err = vault
            .create_secret(CreateSecretParams {
                title: "new login".to_string(),
                record_type: "login".to_string(),
                fields: BTreeMap::new(),
                folder_uid: Some("F1".to_string()),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, VaultError::FolderUninitialized { .. }));
    }

    #[tokio::test]
    async fn delete_missing_secret_errors() {
        let vault = MockVaultCapability::new();
        let err = vault.delete_secret("missing", false).await.unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
    }

    #[tokio::test]
    async fn generate_password_respects_length() {
        let vault = MockVaultCapability::new();
        let pw = vault
            .generate_password(GeneratePasswordParams {
                length: Some(32),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(pw.len(), 32);
    }
}
