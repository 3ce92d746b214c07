use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    Auth,
    AuthFailed,
    Access,
    AccessDenied,
    Modification,
    ProfileCreate,
    ProfileUpdate,
    ProfileDelete,
    SecretAccess,
    SecretCreate,
    SecretUpdate,
    SecretDelete,
    Startup,
    Shutdown,
    Error,
    ConfigChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// `{id, timestamp, type, severity, source, user?, profile?, resource?,
/// action, result, details?, error?, correlation_id?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: AuditEventType,
    pub severity: Severity,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    pub action: String,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "correlation_id")]
    pub correlation_id: Option<String>,
}

/// Build `id = hiResTime|processId`, unique within a process.
pub fn new_event_id(hi_res_nanos: u128, process_id: u32) -> String {
    format!("{hi_res_nanos}|{process_id}")
}

/// Lower-cased substrings that mark a `details` key as sensitive. Any key
/// whose lower-cased form contains one of these is scrubbed before the
/// audit journal writes the event.
pub const SENSITIVE_KEY_MARKERS: &[&str] = &[
    "password",
    "secret",
    "key",
    "token",
    "auth",
    "credential",
    "private",
    "passphrase",
    "pin",
    "code",
    "signature",
];

pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEY_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensitive_key_detection() {
        assert!(is_sensitive_key("Password"));
        assert!(is_sensitive_key("apiKey"));
        assert!(is_sensitive_key("AUTH_TOKEN"));
        assert!(is_sensitive_key("signature_v2"));
        assert!(!is_sensitive_key("username"));
        assert!(!is_sensitive_key("folder_uid"));
    }

    #[test]
    fn event_id_unique_per_call() {
        let a = new_event_id(1, 100);
        let b = new_event_id(2, 100);
        assert_ne!(a, b);
    }
}
