//! Process-lived, never-persisted session state.

use chrono::{DateTime, Utc};
use ksm_capability::VaultCapability;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A factory that turns a profile name into a live vault capability.
/// Implemented in `ksm-mcp-server` (or tests) so `ksm-engine` never
/// depends on how a capability is actually constructed from a profile's
/// credential bundle.
#[async_trait::async_trait]
pub trait CapabilityFactory: Send + Sync {
    async fn build(&self, profile_name: &str) -> Result<Arc<dyn VaultCapability>, String>;
}

/// `current_profile`, the lazily-instantiated `profiles` cache, and
/// session bookkeeping. The cache is guarded by a read/write lock:
/// lookup takes a read hold, instantiation and release take a write
/// hold.
pub struct SessionState {
    current_profile: RwLock<Option<String>>,
    profiles: RwLock<HashMap<String, Arc<dyn VaultCapability>>>,
    pub start_time: DateTime<Utc>,
    pub session_id: String,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            current_profile: RwLock::new(None),
            profiles: RwLock::new(HashMap::new()),
            start_time: Utc::now(),
            session_id: format!("mcp-{}", Utc::now().timestamp()),
        }
    }

    pub async fn current_profile_name(&self) -> Option<String> {
        self.current_profile.read().await.clone()
    }

    pub async fn set_current_profile(&self, name: Option<String>) {
        *self.current_profile.write().await = name;
    }

    /// Returns the cached capability for `name`, instantiating and
    /// caching it via `factory` on first use.
    pub async fn capability_for(
        &self,
        name: &str,
        factory: &dyn CapabilityFactory,
    ) -> Result<Arc<dyn VaultCapability>, String> {
        if let Some(existing) = self.profiles.read().await.get(name) {
            return Ok(existing.clone());
        }
        let mut write_guard = self.profiles.write().await;
        if let Some(existing) = write_guard.get(name) {
            return Ok(existing.clone());
        }
        let capability = factory.build(name).await?;
        write_guard.insert(name.to_string(), capability.clone());
        Ok(capability)
    }

    pub async fn release(&self, name: &str) {
        self.profiles.write().await.remove(name);
    }

    pub async fn active_profile_names(&self) -> Vec<String> {
        self.profiles.read().await.keys().cloned().collect()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
