//! The fixed ~20-tool catalog, grouped by risk.

use super::args::*;
use schemars::{schema_for, JsonSchema};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Risk {
    ReadOnly,
    Sensitive,
    Meta,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

fn spec<T: JsonSchema>(name: &'static str, description: &'static str) -> ToolSpec {
    ToolSpec {
        name,
        description,
        input_schema: serde_json::to_value(schema_for!(T)).unwrap_or(Value::Null),
    }
}

/// Returns every tool in the catalog alongside its risk tier, in the
/// fixed order the dispatch table uses.
pub fn catalog() -> Vec<(Risk, ToolSpec)> {
    vec![
        (
            Risk::ReadOnly,
            spec::<ListSecretsArgs>("list_secrets", "List secret summaries, optionally scoped to a folder."),
        ),
        (
            Risk::ReadOnly,
            spec::<SearchSecretsArgs>("search_secrets", "Search secrets by title."),
        ),
        (
            Risk::ReadOnly,
            spec::<ListFoldersArgs>("list_folders", "List folders in the active vault."),
        ),
        (
            Risk::ReadOnly,
            spec::<GetTotpCodeArgs>("get_totp_code", "Get the current TOTP code for a secret."),
        ),
        (
            Risk::ReadOnly,
            spec::<HealthCheckArgs>("health_check", "Check connectivity to the active vault."),
        ),
        (
            Risk::ReadOnly,
            spec::<GetServerVersionArgs>("get_server_version", "Report the gateway's version."),
        ),
        (
            Risk::ReadOnly,
            spec::<GetRecordTypeSchemaArgs>(
                "get_record_type_schema",
                "Look up the required/optional fields for a record type.",
            ),
        ),
        (
            Risk::ReadOnly,
            spec::<GetFieldArgs>("get_field", "Read a single field by notation; masked unless unmask is set."),
        ),
        (
            Risk::ReadOnly,
            spec::<GetSecretArgs>("get_secret", "Read a secret; masked unless unmask is set."),
        ),
        (
            Risk::Sensitive,
            spec::<GetAllSecretsUnmaskedArgs>(
                "get_all_secrets_unmasked",
                "Read every secret in a folder with all sensitive fields revealed.",
            ),
        ),
        (
            Risk::Sensitive,
            spec::<CreateSecretArgs>("create_secret", "Create a new secret."),
        ),
        (
            Risk::Sensitive,
            spec::<UpdateSecretArgs>("update_secret", "Update fields on an existing secret."),
        ),
        (
            Risk::Sensitive,
            spec::<DeleteSecretArgs>("delete_secret", "Delete a secret."),
        ),
        (
            Risk::Sensitive,
            spec::<UploadFileArgs>("upload_file", "Attach a file to a secret."),
        ),
        (
            Risk::Sensitive,
            spec::<DownloadFileArgs>("download_file", "Download a file attached to a secret."),
        ),
        (
            Risk::Sensitive,
            spec::<CreateFolderArgs>("create_folder", "Create a folder."),
        ),
        (
            Risk::Sensitive,
            spec::<DeleteFolderArgs>("delete_folder", "Delete a folder."),
        ),
        (
            Risk::Meta,
            spec::<GeneratePasswordArgs>(
                "generate_password",
                "Generate a random password, optionally saving it directly into a secret.",
            ),
        ),
        (
            Risk::Meta,
            spec::<ExecuteConfirmedActionArgs>(
                "execute_confirmed_action",
                "Replay a sensitive tool after the caller has collected human attestation.",
            ),
        ),
    ]
}

pub fn risk_of(tool_name: &str) -> Option<Risk> {
    catalog().into_iter().find(|(_, t)| t.name == tool_name).map(|(r, _)| r)
}
