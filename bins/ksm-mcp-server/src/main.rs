mod capability_factory;
mod cli;
mod config;

use capability_factory::StoreBackedCapabilityFactory;
use clap::Parser;
use cli::{Cli, Command, ProfilesAction};
use ksm_audit::{AuditJournal, AuditJournalConfig};
use ksm_capability::mock::MockVaultCapability;
use ksm_capability::VaultCapability;
use ksm_engine::dispatch::{self, DispatcherContext, Lifetime};
use ksm_engine::{CapabilityFactory, EngineMode, RateLimiter, SessionState, ToolEngine};
use ksm_store::ProfileStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Always returns a fresh reference capability regardless of profile
/// name — backs "in-memory profile mode", where a base64-packed
/// credential bundle bypasses the profile store entirely.
struct InMemoryCapabilityFactory;

#[async_trait::async_trait]
impl CapabilityFactory for InMemoryCapabilityFactory {
    async fn build(&self, _profile_name: &str) -> Result<Arc<dyn VaultCapability>, String> {
        Ok(Arc::new(MockVaultCapability::new()))
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn passphrase_from_env() -> Option<String> {
    std::env::var("KSM_MCP_PASSPHRASE").ok()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // clap's derived parser handles --version/--help itself, before any
    // of the code below runs — logging is never initialized for those.
    let cli = Cli::parse();

    match cli.command {
        Command::Init { profile, token, config } => run_init(profile, token, config).await,
        Command::Profiles { action } => run_profiles(action).await,
        Command::Serve { profile, batch, auto_approve, config_base64, no_logs } => {
            if !no_logs {
                init_logging();
            }
            run_serve(profile, batch, auto_approve, config_base64).await
        }
        Command::Test { profile } => run_test(profile).await,
    }
}

fn profiles_path() -> std::path::PathBuf {
    ksm_store::default_profiles_path()
}

async fn open_store() -> anyhow::Result<ProfileStore> {
    Ok(ProfileStore::open(profiles_path(), passphrase_from_env()).await?)
}

async fn run_init(profile: String, token: Option<String>, config: Option<String>) -> anyhow::Result<()> {
    let bundle = match (token, config) {
        (Some(token), None) => {
            let mut cfg = ksm_types::ProfileConfig::new();
            cfg.insert("clientId".to_string(), token);
            cfg
        }
        (None, Some(raw)) => decode_config_arg(&raw)?,
        (Some(_), Some(_)) => anyhow::bail!("--token and --config are mutually exclusive"),
        (None, None) => anyhow::bail!("one of --token or --config is required"),
    };

    let store = open_store().await?;
    store.create(&profile, bundle).await?;
    println!("profile '{profile}' created");
    Ok(())
}

fn decode_config_arg(raw: &str) -> anyhow::Result<ksm_types::ProfileConfig> {
    let path = std::path::Path::new(raw);
    if path.exists() {
        let contents = std::fs::read_to_string(path)?;
        return Ok(serde_json::from_str(&contents)?);
    }
    use base64::Engine;
    let decoded = base64::engine::general_purpose::STANDARD.decode(raw.trim())?;
    Ok(serde_json::from_slice(&decoded)?)
}

async fn run_profiles(action: ProfilesAction) -> anyhow::Result<()> {
    let store = open_store().await?;
    match action {
        ProfilesAction::List => {
            for name in store.list().await {
                println!("{name}");
            }
        }
        ProfilesAction::Show { name } => {
            let profile = store.get(&name).await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        ProfilesAction::Delete { name } => {
            let removed = store.delete(&name).await?;
            if removed {
                println!("profile '{name}' deleted");
            } else {
                anyhow::bail!("profile '{name}' not found");
            }
        }
        ProfilesAction::SetDefault { name } => {
            store.get(&name).await?; // validates existence
            println!("'{name}' set as default (persist via config.yaml: profiles.default)");
        }
    }
    Ok(())
}

async fn run_serve(
    profile: Option<String>,
    batch: bool,
    auto_approve: bool,
    config_base64: Option<String>,
    ) -> anyhow::Result<()> {
    let root = config::resolve_root();
    let app_config = config::load(&root)?;

    let mode = EngineMode {
        batch_mode: batch || app_config.batch_mode(),
        auto_approve: auto_approve || app_config.auto_approve(),
    };

    let session = Arc::new(SessionState::new());
    let audit_path = root.join("logs").join("audit.log");
    let (audit, _audit_handle) = AuditJournal::start(AuditJournalConfig::new(audit_path));

    let in_memory_bundle = config_base64
        .map(|b| decode_config_arg(&b))
        .transpose()?
        .or(config::in_memory_profile_from_env()?);

    let (store, capability_factory): (Arc<ProfileStore>, Arc<dyn CapabilityFactory>) = if let Some(_bundle) = in_memory_bundle
    {
        tracing::info!("running with an in-memory credential bundle; the profile store is bypassed");
        session.set_current_profile(Some("in-memory".to_string())).await;
        (Arc::new(open_store().await?), Arc::new(InMemoryCapabilityFactory))
    } else {
        let store = Arc::new(open_store().await?);
        let initial_profile = profile.or_else(|| app_config.profiles.default.clone());
        if let Some(name) = initial_profile {
            if store.get(&name).await.is_ok() {
                session.set_current_profile(Some(name)).await;
            } else {
                tracing::warn!(profile = %name, "configured initial profile not found, starting with none selected");
            }
        }
        let factory: Arc<dyn CapabilityFactory> = Arc::new(StoreBackedCapabilityFactory { store: store.clone() });
        (store, factory)
    };

    let mut engine = ToolEngine::new(session.clone(), audit.clone(), capability_factory, mode);
    engine.vault_timeout = std::time::Duration::from_secs(app_config.timeout_secs());
    engine.confirmation_timeout = std::time::Duration::from_secs(app_config.confirmation_timeout_secs());
    let engine = Arc::new(engine);

    let ctx = DispatcherContext {
        engine,
        session,
        store,
        rate_limiter: RateLimiter::with_hourly_cap(app_config.rate_per_minute(), app_config.rate_per_hour()),
        audit: audit.clone(),
        server_name: "ksm-mcp".to_string(),
        server_version: VERSION.to_string(),
    };

    let lifetime = Lifetime::new();
    let lifetime_for_signal = lifetime.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            lifetime_for_signal.cancel();
        }
    });

    tracing::info!("ksm-mcp-server v{VERSION} running on stdio");
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    dispatch::run(stdin, stdout, ctx, lifetime).await?;

    audit.close(std::time::Duration::from_secs(0)).await;
    Ok(())
}

async fn run_test(profile: Option<String>) -> anyhow::Result<()> {
    let store = Arc::new(open_store().await?);
    let name = profile
        .or_else(|| store.list().await.into_iter().next())
        .ok_or_else(|| anyhow::anyhow!("no profiles configured; run 'init' first"))?;

    let factory = StoreBackedCapabilityFactory { store };
    let capability = factory.build(&name).await.map_err(|e| anyhow::anyhow!(e))?;
    capability.test_connection().await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
    println!("profile '{name}': connection ok");
    Ok(())
}
