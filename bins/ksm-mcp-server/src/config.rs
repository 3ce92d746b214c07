//! `config.yaml` loading plus environment-variable overrides. Parsing
//! the on-disk file is in scope; the first-run wizard that produces it
//! is not.

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_minute: Option<u32>,
    pub requests_per_hour: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct McpConfig {
    pub timeout: Option<u64>,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    pub batch_mode: Option<bool>,
    pub auto_approve: Option<bool>,
    pub mask_by_default: Option<bool>,
    pub session_timeout: Option<u64>,
    pub confirmation_timeout: Option<u64>,
    pub protection_password_hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProfilesConfig {
    pub default: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub mcp: McpConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
    pub profiles: ProfilesConfig,
}

impl AppConfig {
    pub fn rate_per_minute(&self) -> u32 {
        self.mcp.rate_limit.requests_per_minute.unwrap_or(60)
    }

    pub fn timeout_secs(&self) -> u64 {
        self.mcp.timeout.unwrap_or(30)
    }

    pub fn confirmation_timeout_secs(&self) -> u64 {
        self.security.confirmation_timeout.unwrap_or(30)
    }

    pub fn rate_per_hour(&self) -> Option<u32> {
        self.mcp.rate_limit.requests_per_hour
    }

    pub fn batch_mode(&self) -> bool {
        self.security.batch_mode.unwrap_or(false) || env_flag("KSM_MCP_BATCH_MODE")
    }

    pub fn auto_approve(&self) -> bool {
        self.security.auto_approve.unwrap_or(false)
    }

    pub fn is_encrypted(&self) -> bool {
        self.security.protection_password_hash.is_some()
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// Load `config.yaml` under `root`. A missing file is not an error — it
/// resolves to all-default configuration, the same best-effort posture
/// the audit log directory takes when absent.
pub fn load(root: &Path) -> anyhow::Result<AppConfig> {
    let path = root.join("config.yaml");
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    serde_yaml::from_str(&contents).map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))
}

/// Root directory, honoring `KSM_MCP_HOME`.
pub fn resolve_root() -> PathBuf {
    ksm_store::default_root_dir()
}

/// Decode the `KSM_MCP_CONFIG_BASE64` env var into a raw credential
/// bundle, bypassing the profile store entirely ("in-memory profile
/// mode").
pub fn in_memory_profile_from_env() -> anyhow::Result<Option<ksm_types::ProfileConfig>> {
    let Ok(encoded) = std::env::var("KSM_MCP_CONFIG_BASE64") else {
        return Ok(None);
    };
    use base64::Engine;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| anyhow::anyhow!("KSM_MCP_CONFIG_BASE64 is not valid base64: {e}"))?;
    let config: ksm_types::ProfileConfig = serde_json::from_slice(&decoded)
        .map_err(|e| anyhow::anyhow!("KSM_MCP_CONFIG_BASE64 did not decode to a credential bundle: {e}"))?;
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(dir.path()).unwrap();
        assert_eq!(config.rate_per_minute(), 60);
        assert!(!config.batch_mode());
    }

    #[test]
    fn parses_yaml_knobs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "mcp:\n  rate_limit:\n    requests_per_minute: 12\nsecurity:\n  batch_mode: true\n",
        )
        .unwrap();
        let config = load(dir.path()).unwrap();
        assert_eq!(config.rate_per_minute(), 12);
        assert!(config.batch_mode());
    }
}
