//! Argument shapes for every tool. Each doubles as the tool's JSON
//! schema (via `schemars`) for `tools/list`.

use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub struct ListSecretsArgs {
    pub folder_uid: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchSecretsArgs {
    pub query: String,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub struct ListFoldersArgs {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetTotpCodeArgs {
    pub uid: String,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub struct HealthCheckArgs {}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub struct GetServerVersionArgs {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetRecordTypeSchemaArgs {
    pub record_type: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetFieldArgs {
    pub notation: String,
    #[serde(default)]
    pub unmask: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetSecretArgs {
    pub uid: String,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub unmask: bool,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub struct GetAllSecretsUnmaskedArgs {
    pub folder_uid: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateSecretArgs {
    pub title: String,
    pub record_type: String,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub folder_uid: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateSecretArgs {
    pub uid: String,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteSecretArgs {
    pub uid: String,
    #[serde(default)]
    pub permanent: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UploadFileArgs {
    pub uid: String,
    pub file_name: String,
    /// Base64-encoded file contents.
    pub data_base64: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DownloadFileArgs {
    pub uid: String,
    pub file_uid: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateFolderArgs {
    pub name: String,
    #[serde(default)]
    pub parent_uid: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteFolderArgs {
    pub uid: String,
    #[serde(default)]
    pub permanent: bool,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub struct GeneratePasswordArgs {
    pub length: Option<u32>,
    pub uppercase: Option<bool>,
    pub lowercase: Option<bool>,
    pub digits: Option<bool>,
    pub special: Option<bool>,
    #[serde(default)]
    pub save_to_secret: bool,
    pub title: Option<String>,
    pub folder_uid: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteConfirmedActionArgs {
    pub original_tool_name: String,
    pub original_tool_args_json: String,
    pub user_decision: bool,
    #[serde(default)]
    pub confirmation_context: Option<String>,
}
