//! The tool engine: resolves the active profile's vault capability, runs
//! handlers, and enforces the two-phase confirmation state machine.

use crate::field_safety::sanitize_fields;
use crate::session::{CapabilityFactory, SessionState};
use crate::tools::args::*;
use crate::tools::{catalog, risk_of, Risk};
use ksm_audit::AuditJournal;
use ksm_capability::confirm::{self, BatchConfirmer, ConfirmResult, Confirmer, McpPromptConfirmer};
use ksm_capability::{
    CreateFolderParams, CreateSecretParams, GeneratePasswordParams, UpdateSecretParams,
    UploadFileParams, VaultCapability, VaultError,
};
use ksm_types::rpc::ConfirmationRequiredResult;
use ksm_types::{AuditEvent, AuditEventType, Severity};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("no active profile selected")]
    NoActiveProfile(String),
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Flags that change how the confirmation gate behaves.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineMode {
    pub batch_mode: bool,
    pub auto_approve: bool,
}

impl EngineMode {
    fn bypasses_confirmation(self) -> bool {
        self.batch_mode || self.auto_approve
    }
}

/// Default ceiling on how long a confirmation decision is waited for
/// before the engine falls back to `default_deny`.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default ceiling on a single in-flight vault call.
pub const DEFAULT_VAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ToolEngine {
    pub session: Arc<SessionState>,
    pub audit: AuditJournal,
    pub capability_factory: Arc<dyn CapabilityFactory>,
    pub mode: EngineMode,
    /// Strategy used to resolve the confirmation gate for `Risk::Sensitive`
    /// tools. Batch/auto-approve modes get a [`BatchConfirmer`] that never
    /// blocks; interactive mode gets [`McpPromptConfirmer`], whose single
    /// `error`-carrying reply tells the caller to replay through
    /// `execute_confirmed_action`.
    pub confirmer: Arc<dyn Confirmer>,
    pub confirmation_timeout: Duration,
    /// What a cancelled or denial-without-explanation confirmer decision
    /// resolves to.
    pub default_deny: bool,
    /// Ceiling on a single in-flight vault call. A hung capability call
    /// surfaces as [`VaultError::Timeout`] rather than blocking the
    /// dispatcher loop forever.
    pub vault_timeout: Duration,
}

impl ToolEngine {
    pub fn new(
        session: Arc<SessionState>,
        audit: AuditJournal,
        capability_factory: Arc<dyn CapabilityFactory>,
        mode: EngineMode,
    ) -> Self {
        let confirmer: Arc<dyn Confirmer> = if mode.bypasses_confirmation() {
            Arc::new(BatchConfirmer::auto_approve())
        } else {
            Arc::new(McpPromptConfirmer)
        };
        Self {
            session,
            audit,
            capability_factory,
            mode,
            confirmer,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            default_deny: true,
            vault_timeout: DEFAULT_VAULT_TIMEOUT,
        }
    }

    /// Runs a vault call bounded by `vault_timeout`, turning a cancellation
    /// into [`VaultError::Timeout`] instead of blocking the caller forever.
    async fn with_vault_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, VaultError>>,
    ) -> Result<T, VaultError> {
        match tokio::time::timeout(self.vault_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(VaultError::Timeout),
        }
    }
}

fn new_event(
    event_type: AuditEventType,
    severity: Severity,
    action: impl Into<String>,
    resource: Option<String>,
    result: impl Into<String>,
    details: Option<BTreeMap<String, Value>>,
) -> AuditEvent {
    AuditEvent {
        id: ksm_types::audit::new_event_id(
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0) as u128,
            std::process::id(),
        ),
        timestamp: chrono::Utc::now(),
        event_type,
        severity,
        source: "tool_engine".to_string(),
        user: None,
        profile: None,
        resource,
        action: action.into(),
        result: result.into(),
        details,
        error: None,
        correlation_id: None,
    }
}

impl ToolEngine {
    async fn active_capability(&self) -> Result<Arc<dyn VaultCapability>, EngineError> {
        let name = self
            .session
            .current_profile_name()
            .await
            .ok_or_else(|| EngineError::NoActiveProfile("no profile selected".to_string()))?;
        self.session
            .capability_for(&name, self.capability_factory.as_ref())
            .await
            .map_err(EngineError::Internal)
    }

    /// Entry point for `tools/call`. Returns the JSON result payload; the
    /// caller (dispatcher) wraps `Err` as a `-32002` tool-execution error.
    pub async fn call(&self, name: &str, args: Value) -> Result<Value, EngineError> {
        if name == "execute_confirmed_action" {
            return self.execute_confirmed_action(args).await;
        }
        if name == "generate_password" {
            return self.generate_password(args).await;
        }

        let risk = risk_of(name).ok_or_else(|| EngineError::UnknownTool(name.to_string()))?;

        match risk {
            Risk::ReadOnly => self.execute_read_only(name, args).await,
            Risk::Sensitive => self.gate_and_execute(name, args).await,
            Risk::Meta => Err(EngineError::Internal(format!("meta tool '{name}' not routed"))),
        }
    }

    /// Asks `self.confirmer` whether a sensitive tool call may proceed,
    /// bounded by `confirmation_timeout`. A cancelled confirmer is treated
    /// the same as one that times out: [`confirm::timed_out`] with
    /// `default_deny` decides the outcome. An interactive confirmer that
    /// declines with an explanatory error (the only way `McpPromptConfirmer`
    /// ever replies) falls through to the two-phase sentinel instead of an
    /// outright denial, since a human may still attest via
    /// `execute_confirmed_action`.
    async fn gate_and_execute(&self, name: &str, args: Value) -> Result<Value, EngineError> {
        let (action_description, _) = describe(name);
        let message = format!("Confirm: {action_description}");
        let decision = match tokio::time::timeout(self.confirmation_timeout, self.confirmer.confirm(&message)).await
        {
            Ok(decision) => decision,
            Err(_) => confirm::timed_out(self.default_deny),
        };

        if decision.approved {
            return self.execute_sensitive(name, args).await;
        }

        if decision.error.is_none() {
            self.audit
                .log(new_event(
                    AuditEventType::AccessDenied,
                    Severity::Warning,
                    name,
                    None,
                    if decision.timed_out { "confirmation_timed_out" } else { "denied_by_policy" },
                    None,
                ))
                .await;
            return Ok(json!({
                "status": "operation_denied",
                "message": format!("Operation denied: {action_description}."),
            }));
        }

        let sentinel = self.sentinel(name, &args)?;
        self.audit
            .log(new_event(AuditEventType::Access, Severity::Info, name, None, "confirmation_required", None))
            .await;
        Ok(serde_json::to_value(sentinel).map_err(|e| EngineError::Internal(e.to_string()))?)
    }

    fn sentinel(&self, name: &str, args: &Value) -> Result<ConfirmationRequiredResult, EngineError> {
        let args_json = serde_json::to_string(args).map_err(|e| EngineError::Internal(e.to_string()))?;
        let (action_description, warning_message) = describe(name);
        Ok(ConfirmationRequiredResult::new(
            format!("Confirmation required to {action_description}."),
            name,
            args_json,
            action_description,
            warning_message,
        ))
    }

    async fn execute_read_only(&self, name: &str, args: Value) -> Result<Value, EngineError> {
        let capability = self.active_capability().await?;
        match name {
            "list_secrets" => {
                let args: ListSecretsArgs = parse(args)?;
                let result = self
                    .with_vault_timeout(capability.list_secrets(args.folder_uid.as_deref()))
                    .await?;
                Ok(json!(result))
            }
            "search_secrets" => {
                let args: SearchSecretsArgs = parse(args)?;
                let result = self.with_vault_timeout(capability.search_secrets(&args.query)).await?;
                Ok(json!(result))
            }
            "list_folders" => {
                let result = self.with_vault_timeout(capability.list_folders()).await?;
                Ok(json!(result))
            }
            "get_totp_code" => {
                let args: GetTotpCodeArgs = parse(args)?;
                let code = self.with_vault_timeout(capability.get_totp_code(&args.uid)).await?;
                Ok(json!({ "code": code }))
            }
            "health_check" => {
                self.with_vault_timeout(capability.test_connection()).await?;
                Ok(json!({ "status": "ok" }))
            }
            "get_server_version" => Ok(json!({ "version": env!("CARGO_PKG_VERSION") })),
            "get_record_type_schema" => {
                let args: GetRecordTypeSchemaArgs = parse(args)?;
                ksm_types::record_types::lookup(&args.record_type)
                    .map(|s| json!(s))
                    .ok_or_else(|| EngineError::InvalidArguments(format!("unknown record type: {}", args.record_type)))
            }
            "get_field" => {
                let args: GetFieldArgs = parse(args)?;
                let value = self
                    .with_vault_timeout(capability.get_field(&args.notation, args.unmask))
                    .await?;
                Ok(json!({ "value": value }))
            }
            "get_secret" => {
                let args: GetSecretArgs = parse(args)?;
                let fields = args.fields.as_deref();
                let record = self
                    .with_vault_timeout(capability.get_secret(&args.uid, fields, args.unmask))
                    .await?;
                Ok(json!(record))
            }
            _ => Err(EngineError::UnknownTool(name.to_string())),
        }
    }

    /// The confirmed variant of each sensitive tool: actually performs
    /// the vault operation.
    async fn execute_sensitive(&self, name: &str, args: Value) -> Result<Value, EngineError> {
        let capability = self.active_capability().await?;
        match name {
            "get_all_secrets_unmasked" => {
                let args: GetAllSecretsUnmaskedArgs = parse(args)?;
                let summaries = self
                    .with_vault_timeout(capability.list_secrets(args.folder_uid.as_deref()))
                    .await?;
                let mut records = Vec::with_capacity(summaries.len());
                for s in summaries {
                    records.push(self.with_vault_timeout(capability.get_secret(&s.uid, None, true)).await?);
                }
                self.log_secret_event(AuditEventType::SecretAccess, "get_all_secrets_unmasked", None)
                    .await;
                Ok(json!(records))
            }
            "create_secret" => self.execute_create_secret(capability, args).await,
            "update_secret" => {
                let args: UpdateSecretArgs = parse(args)?;
                let (fields, warnings) = sanitize_fields(args.fields);
                self.with_vault_timeout(capability.update_secret(UpdateSecretParams { uid: args.uid.clone(), fields }))
                    .await?;
                self.log_secret_event(AuditEventType::SecretUpdate, "update_secret", Some(args.uid.clone()))
                    .await;
                Ok(json!({ "uid": args.uid, "message": "Secret updated successfully (confirmed).", "warnings": warnings }))
            }
            "delete_secret" => {
                let args: DeleteSecretArgs = parse(args)?;
                self.with_vault_timeout(capability.delete_secret(&args.uid, args.permanent)).await?;
                self.log_secret_event(AuditEventType::SecretDelete, "delete_secret", Some(args.uid.clone()))
                    .await;
                Ok(json!({ "uid": args.uid, "message": "Secret deleted successfully (confirmed)." }))
            }
            "upload_file" => {
                let args: UploadFileArgs = parse(args)?;
                let data = base64_decode(&args.data_base64)?;
                let file_uid = self
                    .with_vault_timeout(capability.upload_file(UploadFileParams {
                        uid: args.uid.clone(),
                        file_name: args.file_name,
                        data,
                    }))
                    .await?;
                self.log_secret_event(AuditEventType::Modification, "upload_file", Some(args.uid))
                    .await;
                Ok(json!({ "file_uid": file_uid, "message": "File uploaded successfully (confirmed)." }))
            }
            "download_file" => {
                let args: DownloadFileArgs = parse(args)?;
                let file = self
                    .with_vault_timeout(capability.download_file(&args.uid, &args.file_uid))
                    .await?;
                self.log_secret_event(AuditEventType::SecretAccess, "download_file", Some(args.uid))
                    .await;
                Ok(json!({ "file_name": file.file_name, "data_base64": base64_encode(&file.data) }))
            }
            "create_folder" => {
                let args: CreateFolderArgs = parse(args)?;
                let uid = self
                    .with_vault_timeout(
                        capability.create_folder(CreateFolderParams { name: args.name, parent_uid: args.parent_uid }),
                    )
                    .await?;
                self.log_secret_event(AuditEventType::Modification, "create_folder", Some(uid.clone()))
                    .await;
                Ok(json!({ "uid": uid, "message": "Folder created successfully (confirmed)." }))
            }
            "delete_folder" => {
                let args: DeleteFolderArgs = parse(args)?;
                self.with_vault_timeout(capability.delete_folder(&args.uid, args.permanent)).await?;
                self.log_secret_event(AuditEventType::Modification, "delete_folder", Some(args.uid.clone()))
                    .await;
                Ok(json!({ "uid": args.uid, "message": "Folder deleted successfully (confirmed)." }))
            }
            _ => Err(EngineError::UnknownTool(name.to_string())),
        }
    }

    /// `create_secret`'s confirmed variant, with folder-placement
    /// recovery when the vault rejects an empty/uninitialized folder.
    async fn execute_create_secret(
        &self,
        capability: Arc<dyn VaultCapability>,
        args: Value,
    ) -> Result<Value, EngineError> {
        let args: CreateSecretArgs = parse(args)?;
        let (fields, warnings) = sanitize_fields(args.fields);
        let params = CreateSecretParams {
            title: args.title.clone(),
            record_type: args.record_type.clone(),
            fields,
            folder_uid: args.folder_uid.clone(),
        };

        match self.with_vault_timeout(capability.create_secret(params)).await {
            Ok(uid) => {
                self.log_secret_event(AuditEventType::SecretCreate, "create_secret", Some(uid.clone()))
                    .await;
                Ok(json!({ "uid": uid, "message": "Secret created successfully (confirmed).", "warnings": warnings }))
            }
            Err(VaultError::FolderUninitialized { folder_uid }) => {
                self.recover_from_uninitialized_folder(capability, folder_uid).await
            }
            Err(e) => Err(EngineError::Vault(e)),
        }
    }

    async fn recover_from_uninitialized_folder(
        &self,
        capability: Arc<dyn VaultCapability>,
        folder_uid: Option<String>,
    ) -> Result<Value, EngineError> {
        let all_folders = self.with_vault_timeout(capability.list_folders()).await?;

        match folder_uid {
            None => {
                let top_level: Vec<_> = all_folders.iter().filter(|f| f.parent_uid.is_none()).collect();
                let candidates = if top_level.is_empty() { all_folders.iter().collect() } else { top_level };
                let message = if candidates.is_empty() {
                    "No folders exist yet; create one before retrying.".to_string()
                } else if candidates.len() == 1 {
                    format!("Folder '{}' is the only candidate parent.", candidates[0].name)
                } else {
                    format!("{} candidate folders found; choose one as the parent.", candidates.len())
                };
                Ok(json!({
                    "status": "folder_required_clarification",
                    "message": message,
                    "candidates": candidates,
                }))
            }
            Some(uid) => {
                let folder = all_folders.iter().find(|f| f.uid == uid);
                match folder.and_then(|f| f.parent_uid.clone()) {
                    Some(parent_uid) => {
                        let siblings = self
                            .with_vault_timeout(capability.list_secrets(Some(&parent_uid)))
                            .await?;
                        if !siblings.is_empty() {
                            Ok(json!({
                                "status": "parent_folder_recommended",
                                "message": format!("Folder '{uid}' is empty; its parent already has records."),
                                "recommended_folder_uid": parent_uid,
                            }))
                        } else {
                            Ok(json!({
                                "status": "error",
                                "message": format!("Folder '{uid}' and its parent are both empty or uninitialized."),
                            }))
                        }
                    }
                    None => Ok(json!({
                        "status": "error",
                        "message": format!("Folder '{uid}' is empty or uninitialized and has no parent to recommend."),
                    })),
                }
            }
        }
    }

    /// `generate_password` is a meta tool, not gated by confirmation —
    /// see DESIGN.md for the reasoning.
    async fn generate_password(&self, args: Value) -> Result<Value, EngineError> {
        let args: GeneratePasswordArgs = parse(args)?;
        let capability = self.active_capability().await?;
        let params = GeneratePasswordParams {
            length: args.length,
            uppercase: args.uppercase,
            lowercase: args.lowercase,
            digits: args.digits,
            special: args.special,
        };
        let password = self.with_vault_timeout(capability.generate_password(params)).await?;

        if !args.save_to_secret {
            return Ok(json!({
                "password": password,
                "warning": "returned in plaintext; handle with care",
            }));
        }

        let folder_uid = args
            .folder_uid
            .ok_or_else(|| EngineError::InvalidArguments("folder_uid is required when save_to_secret is set".to_string()))?;
        let title = args.title.unwrap_or_else(|| "Generated Password".to_string());

        let create_result = self
            .with_vault_timeout(capability.create_secret(CreateSecretParams {
                title: title.clone(),
                record_type: "login".to_string(),
                fields: [("password".to_string(), json!(password))].into_iter().collect(),
                folder_uid: Some(folder_uid),
            }))
            .await;

        match create_result {
            Ok(uid) => {
                self.log_secret_event(AuditEventType::SecretCreate, "generate_password", Some(uid.clone()))
                    .await;
                Ok(json!({ "status": "saved", "uid": uid, "message": "Generated password saved to a new secret." }))
            }
            Err(_) => {
                let matches = self.with_vault_timeout(capability.search_secrets(&title)).await?;
                let existing = matches
                    .first()
                    .ok_or_else(|| EngineError::Internal("create failed and no matching secret exists to update".to_string()))?;
                self.with_vault_timeout(capability.update_secret(UpdateSecretParams {
                    uid: existing.uid.clone(),
                    fields: [("password".to_string(), json!(password))].into_iter().collect(),
                }))
                .await?;
                self.log_secret_event(AuditEventType::SecretUpdate, "generate_password", Some(existing.uid.clone()))
                    .await;
                Ok(json!({ "status": "saved", "uid": existing.uid, "message": "Generated password saved to an existing secret." }))
            }
        }
    }

    async fn execute_confirmed_action(&self, args: Value) -> Result<Value, EngineError> {
        let args: ExecuteConfirmedActionArgs = parse(args)?;

        if !args.user_decision {
            self.audit
                .log(new_event(
                    AuditEventType::AccessDenied,
                    Severity::Warning,
                    args.original_tool_name.clone(),
                    None,
                    "denied",
                    None,
                ))
                .await;
            return Ok(json!({ "status": "operation_denied", "message": "User denied the operation." }));
        }

        let original_args: Value = serde_json::from_str(&args.original_tool_args_json)
            .map_err(|e| EngineError::InvalidArguments(format!("original_tool_args_json: {e}")))?;

        if risk_of(&args.original_tool_name) != Some(Risk::Sensitive) {
            return Err(EngineError::InvalidArguments(format!(
                "'{}' is not a sensitive tool",
                args.original_tool_name
            )));
        }

        self.execute_sensitive(&args.original_tool_name, original_args).await
    }

    async fn log_secret_event(&self, event_type: AuditEventType, action: &str, resource: Option<String>) {
        self.audit
            .log(new_event(event_type, Severity::Info, action, resource, "success", None))
            .await;
    }

    pub fn tool_list(&self) -> Value {
        let tools: Vec<Value> = catalog()
            .into_iter()
            .map(|(_, t)| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "inputSchema": t.input_schema,
                })
            })
            .collect();
        json!({ "tools": tools })
    }
}

fn parse<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, EngineError> {
    serde_json::from_value(args).map_err(|e| EngineError::InvalidArguments(e.to_string()))
}

fn base64_decode(s: &str) -> Result<Vec<u8>, EngineError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|e| EngineError::InvalidArguments(format!("invalid base64: {e}")))
}

fn base64_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

fn describe(tool_name: &str) -> (&'static str, &'static str) {
    match tool_name {
        "get_all_secrets_unmasked" => (
            "reveal every secret field in this folder",
            "This exposes unmasked credentials; only approve if you initiated this request.",
        ),
        "get_secret" => (
            "reveal this secret's unmasked fields",
            "This exposes unmasked credentials; only approve if you initiated this request.",
        ),
        "create_secret" => ("create a new secret", "This writes a new credential to the vault."),
        "update_secret" => ("update an existing secret", "This overwrites fields on an existing credential."),
        "delete_secret" => ("delete a secret", "This permanently removes a credential from the vault."),
        "upload_file" => ("upload a file to a secret", "This attaches a file to a vault record."),
        "download_file" => ("download a file from a secret", "This exposes a file's contents."),
        "create_folder" => ("create a folder", "This creates a new folder in the vault."),
        "delete_folder" => ("delete a folder", "This permanently removes a folder from the vault."),
        _ => ("perform this action", "This is a sensitive vault operation."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksm_capability::mock::MockVaultCapability;
    use ksm_types::rpc::error_codes;

    struct MockFactory;

    #[async_trait::async_trait]
    impl CapabilityFactory for MockFactory {
        async fn build(&self, _name: &str) -> Result<Arc<dyn VaultCapability>, String> {
            Ok(Arc::new(MockVaultCapability::new()))
        }
    }

    /// Stands in for a vault capability whose backing service has hung.
    /// Every method outlasts any reasonable `vault_timeout`; only the ones
    /// exercised by the timeout test are implemented beyond `unimplemented!`.
    struct HangingCapability;

    #[async_trait::async_trait]
    impl VaultCapability for HangingCapability {
        async fn list_secrets(&self, _folder_uid: Option<&str>) -> Result<Vec<ksm_capability::SecretSummary>, VaultError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
        async fn get_secret(
            &self,
            _uid: &str,
            _fields: Option<&[String]>,
            _unmask: bool,
        ) -> Result<ksm_capability::SecretRecord, VaultError> {
            unimplemented!()
        }
        async fn get_field(&self, _notation: &str, _unmask: bool) -> Result<String, VaultError> {
            unimplemented!()
        }
        async fn search_secrets(&self, _query: &str) -> Result<Vec<ksm_capability::SecretSummary>, VaultError> {
            unimplemented!()
        }
        async fn create_secret(&self, _params: CreateSecretParams) -> Result<String, VaultError> {
            unimplemented!()
        }
        async fn update_secret(&self, _params: UpdateSecretParams) -> Result<(), VaultError> {
            unimplemented!()
        }
        async fn delete_secret(&self, _uid: &str, _permanent: bool) -> Result<(), VaultError> {
            unimplemented!()
        }
        async fn generate_password(&self, _params: GeneratePasswordParams) -> Result<String, VaultError> {
            unimplemented!()
        }
        async fn get_totp_code(&self, _uid: &str) -> Result<String, VaultError> {
            unimplemented!()
        }
        async fn upload_file(&self, _params: UploadFileParams) -> Result<String, VaultError> {
            unimplemented!()
        }
        async fn download_file(&self, _uid: &str, _file_uid: &str) -> Result<ksm_capability::DownloadedFile, VaultError> {
            unimplemented!()
        }
        async fn list_folders(&self) -> Result<Vec<ksm_capability::FolderSummary>, VaultError> {
            unimplemented!()
        }
        async fn create_folder(&self, _params: CreateFolderParams) -> Result<String, VaultError> {
            unimplemented!()
        }
        async fn delete_folder(&self, _uid: &str, _permanent: bool) -> Result<(), VaultError> {
            unimplemented!()
        }
        async fn test_connection(&self) -> Result<(), VaultError> {
            unimplemented!()
        }
    }

    struct HangingFactory;

    #[async_trait::async_trait]
    impl CapabilityFactory for HangingFactory {
        async fn build(&self, _name: &str) -> Result<Arc<dyn VaultCapability>, String> {
            Ok(Arc::new(HangingCapability))
        }
    }

    async fn engine_with_profile(mode: EngineMode) -> (ToolEngine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let (audit, _handle) = AuditJournal::start(ksm_audit::AuditJournalConfig::new(dir.path().join("audit.log")));
        let session = Arc::new(SessionState::new());
        session.set_current_profile(Some("prod".to_string())).await;
        let engine = ToolEngine::new(session, audit, Arc::new(MockFactory), mode);
        (engine, dir)
    }

    #[tokio::test]
    async fn sensitive_tool_returns_sentinel_without_vault_io() {
        let (engine, _dir) = engine_with_profile(EngineMode::default()).await;
        let result = engine
            .call("delete_secret", json!({ "uid": "ABC" }))
            .await
            .unwrap();
        assert_eq!(result["status"], "confirmation_required");
        assert_eq!(
            result["confirmation_details"]["prompt_arguments"]["original_tool_name"],
            "delete_secret"
        );
        let parsed_back: Value =
            serde_json::from_str(result["confirmation_details"]["prompt_arguments"]["original_tool_args_json"].as_str().unwrap())
                .unwrap();
        assert_eq!(parsed_back["uid"], "ABC");
    }

    #[tokio::test]
    async fn batch_mode_bypasses_confirmation() {
        let (engine, _dir) = engine_with_profile(EngineMode { batch_mode: true, auto_approve: false }).await;
        let capability = engine.active_capability().await.unwrap();
        let uid = capability
            .create_secret(CreateSecretParams {
                title: "x".to_string(),
                record_type: "login".to_string(),
                fields: BTreeMap::new(),
                folder_uid: None,
            })
            .await
            .unwrap();

        let result = engine.call("delete_secret", json!({ "uid": uid })).await.unwrap();
        assert_eq!(result["message"], "Secret deleted successfully (confirmed).");
    }

    struct SlowConfirmer;

    #[async_trait::async_trait]
    impl Confirmer for SlowConfirmer {
        async fn confirm(&self, _message: &str) -> ConfirmResult {
            tokio::time::sleep(Duration::from_secs(60)).await;
            ConfirmResult { approved: true, timed_out: false, error: None }
        }
    }

    #[tokio::test]
    async fn hung_vault_call_surfaces_as_timeout_instead_of_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let (audit, _handle) = AuditJournal::start(ksm_audit::AuditJournalConfig::new(dir.path().join("audit.log")));
        let session = Arc::new(SessionState::new());
        session.set_current_profile(Some("prod".to_string())).await;
        let mut engine = ToolEngine::new(session, audit, Arc::new(HangingFactory), EngineMode::default());
        engine.vault_timeout = Duration::from_millis(10);

        let err = engine.call("list_secrets", json!({})).await.unwrap_err();
        assert!(matches!(err, EngineError::Vault(VaultError::Timeout)));
    }

    #[tokio::test]
    async fn cancelled_confirmer_denies_when_default_deny_is_true() {
        let (mut engine, _dir) = engine_with_profile(EngineMode::default()).await;
        engine.confirmer = Arc::new(SlowConfirmer);
        engine.confirmation_timeout = Duration::from_millis(10);
        engine.default_deny = true;

        let result = engine.call("delete_secret", json!({ "uid": "ABC" })).await.unwrap();
        assert_eq!(result["status"], "operation_denied");
    }

    #[tokio::test]
    async fn cancelled_confirmer_approves_when_default_deny_is_false() {
        let (mut engine, _dir) = engine_with_profile(EngineMode::default()).await;
        let capability = engine.active_capability().await.unwrap();
        let uid = capability
            .create_secret(CreateSecretParams {
                title: "x".to_string(),
                record_type: "login".to_string(),
                fields: BTreeMap::new(),
                folder_uid: None,
            })
            .await
            .unwrap();
        engine.confirmer = Arc::new(SlowConfirmer);
        engine.confirmation_timeout = Duration::from_millis(10);
        engine.default_deny = false;

        let result = engine.call("delete_secret", json!({ "uid": uid })).await.unwrap();
        assert_eq!(result["message"], "Secret deleted successfully (confirmed).");
    }

    #[tokio::test]
    async fn confirmer_denying_without_error_is_refused_outright() {
        let (mut engine, _dir) = engine_with_profile(EngineMode::default()).await;
        engine.confirmer = Arc::new(BatchConfirmer { default_deny: true });

        let result = engine.call("delete_secret", json!({ "uid": "ABC" })).await.unwrap();
        assert_eq!(result["status"], "operation_denied");
    }

    #[tokio::test]
    async fn execute_confirmed_action_denied_path() {
        let (engine, _dir) = engine_with_profile(EngineMode::default()).await;
        let result = engine
            .call(
                "execute_confirmed_action",
                json!({
                    "original_tool_name": "delete_secret",
                    "original_tool_args_json": "{\"uid\":\"ABC\"}",
                    "user_decision": false,
                }),
            )
            .await
            .unwrap();
        assert_eq!(result["status"], "operation_denied");
    }

    #[tokio::test]
    async fn execute_confirmed_action_approval_path_deletes() {
        let (engine, _dir) = engine_with_profile(EngineMode::default()).await;
        let capability = engine.active_capability().await.unwrap();
        let uid = capability
            .create_secret(CreateSecretParams {
                title: "x".to_string(),
                record_type: "login".to_string(),
                fields: BTreeMap::new(),
                folder_uid: None,
            })
            .await
            .unwrap();

        let result = engine
            .call(
                "execute_confirmed_action",
                json!({
                    "original_tool_name": "delete_secret",
                    "original_tool_args_json": format!("{{\"uid\":\"{uid}\"}}"),
                    "user_decision": true,
                }),
            )
            .await
            .unwrap();
        assert_eq!(result["uid"], uid);
        assert!(capability.get_secret(&uid, None, true).await.is_err());
    }

    #[tokio::test]
    async fn generate_password_without_save_returns_plaintext() {
        let (engine, _dir) = engine_with_profile(EngineMode::default()).await;
        let result = engine
            .call("generate_password", json!({ "length": 16 }))
            .await
            .unwrap();
        assert_eq!(result["password"].as_str().unwrap().len(), 16);
    }

    #[tokio::test]
    async fn parent_folder_recommended_when_child_is_empty_but_parent_has_records() {
        let shared = Arc::new(MockVaultCapability::new());

        struct SharedFactory(Arc<MockVaultCapability>);
        #[async_trait::async_trait]
        impl CapabilityFactory for SharedFactory {
            async fn build(&self, _name: &str) -> Result<Arc<dyn VaultCapability>, String> {
                Ok(self.0.clone())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let (audit, _handle) = AuditJournal::start(ksm_audit::AuditJournalConfig::new(dir.path().join("audit.log")));
        let session = Arc::new(SessionState::new());
        session.set_current_profile(Some("prod".to_string())).await;
        let engine = ToolEngine::new(
            session,
            audit,
            Arc::new(SharedFactory(shared.clone())),
            EngineMode { batch_mode: true, auto_approve: false },
        );

        let parent_uid = shared
            .create_folder(CreateFolderParams { name: "parent".to_string(), parent_uid: None })
            .await
            .unwrap();
        shared
            .create_secret(CreateSecretParams {
                title: "existing".to_string(),
                record_type: "login".to_string(),
                fields: BTreeMap::new(),
                folder_uid: Some(parent_uid.clone()),
            })
            .await
            .unwrap();
        let child_uid = shared
            .create_folder(CreateFolderParams { name: "child".to_string(), parent_uid: Some(parent_uid.clone()) })
            .await
            .unwrap();
        shared.mark_folder_uninitialized(&child_uid).await;

        let result = engine
            .call(
                "create_secret",
                json!({ "title": "t", "record_type": "login", "fields": {}, "folder_uid": child_uid }),
            )
            .await
            .unwrap();
        assert_eq!(result["status"], "parent_folder_recommended");
        assert_eq!(result["recommended_folder_uid"], parent_uid);
    }

    #[test]
    fn unknown_tool_error_code_is_internal_marker() {
        // sanity check that the error taxonomy constant used by the
        // dispatcher still matches its assigned code.
        assert_eq!(error_codes::TOOL_EXECUTION_ERROR, -32002);
    }
}
