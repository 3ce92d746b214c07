//! Bridges a profile name to a live [`VaultCapability`]. The concrete
//! vault SDK is a pluggable capability left out of scope here — in
//! production this is where Keeper's real SDK would be constructed from
//! the profile's credential bundle. This factory validates the profile
//! exists in the store and hands back the in-memory reference
//! implementation so the gateway is runnable end to end without a live
//! vault.

use ksm_capability::mock::MockVaultCapability;
use ksm_capability::VaultCapability;
use ksm_engine::CapabilityFactory;
use ksm_store::ProfileStore;
use std::sync::Arc;

pub struct StoreBackedCapabilityFactory {
    pub store: Arc<ProfileStore>,
}

#[async_trait::async_trait]
impl CapabilityFactory for StoreBackedCapabilityFactory {
    async fn build(&self, profile_name: &str) -> Result<Arc<dyn VaultCapability>, String> {
        self.store.get(profile_name).await.map_err(|e| e.to_string())?;
        tracing::info!(profile = %profile_name, "instantiated vault capability");
        Ok(Arc::new(MockVaultCapability::new()))
    }
}
