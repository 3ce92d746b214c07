//! The abstract interface through which the tool engine reaches a remote
//! secrets service, plus the confirmation decision surface and an
//! in-memory reference implementation for tests and local development.

pub mod confirm;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretSummary {
    pub uid: String,
    pub title: String,
    pub record_type: String,
    pub folder_uid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRecord {
    pub uid: String,
    pub title: String,
    pub record_type: String,
    pub folder_uid: Option<String>,
    pub fields: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CreateSecretParams {
    pub title: String,
    pub record_type: String,
    pub fields: BTreeMap<String, serde_json::Value>,
    pub folder_uid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateSecretParams {
    pub uid: String,
    pub fields: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GeneratePasswordParams {
    pub length: Option<u32>,
    pub uppercase: Option<bool>,
    pub lowercase: Option<bool>,
    pub digits: Option<bool>,
    pub special: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderSummary {
    pub uid: String,
    pub name: String,
    pub parent_uid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CreateFolderParams {
    pub name: String,
    pub parent_uid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadFileParams {
    pub uid: String,
    pub file_name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadedFile {
    pub file_name: String,
    pub data: Vec<u8>,
}

/// Failures a capability implementation may surface. The tool engine
/// wraps all of these as `-32002` tool-execution errors except
/// [`VaultError::FolderUninitialized`], which the `create_secret`
/// confirmed variant pattern-matches for folder-placement recovery.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VaultError {
    #[error("secret not found: {0}")]
    NotFound(String),
    #[error("folder not found: {0}")]
    FolderNotFound(String),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("folder is empty or uninitialized")]
    FolderUninitialized { folder_uid: Option<String> },
    #[error("vault unavailable: {0}")]
    Unavailable(String),
    #[error("vault error: {0}")]
    Other(String),
    #[error("vault operation timed out")]
    Timeout,
}

/// Abstract capability the tool engine reaches for every vault operation.
/// The engine must not depend on anything beyond this surface.
#[async_trait]
pub trait VaultCapability: Send + Sync {
    async fn list_secrets(&self, folder_uid: Option<&str>) -> Result<Vec<SecretSummary>, VaultError>;
    async fn get_secret(
        &self,
        uid: &str,
        fields: Option<&[String]>,
        unmask: bool,
    ) -> Result<SecretRecord, VaultError>;
    async fn get_field(&self, notation: &str, unmask: bool) -> Result<String, VaultError>;
    async fn search_secrets(&self, query: &str) -> Result<Vec<SecretSummary>, VaultError>;
    async fn create_secret(&self, params: CreateSecretParams) -> Result<String, VaultError>;
    async fn update_secret(&self, params: UpdateSecretParams) -> Result<(), VaultError>;
    async fn delete_secret(&self, uid: &str, permanent: bool) -> Result<(), VaultError>;
    async fn generate_password(&self, params: GeneratePasswordParams) -> Result<String, VaultError>;
    async fn get_totp_code(&self, uid: &str) -> Result<String, VaultError>;
    async fn upload_file(&self, params: UploadFileParams) -> Result<String, VaultError>;
    async fn download_file(&self, uid: &str, file_uid: &str) -> Result<DownloadedFile, VaultError>;
    async fn list_folders(&self) -> Result<Vec<FolderSummary>, VaultError>;
    async fn create_folder(&self, params: CreateFolderParams) -> Result<String, VaultError>;
    async fn delete_folder(&self, uid: &str, permanent: bool) -> Result<(), VaultError>;
    async fn test_connection(&self) -> Result<(), VaultError>;
}
