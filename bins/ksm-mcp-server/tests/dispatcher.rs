//! End-to-end dispatcher coverage wired through the binary's own
//! production types (`StoreBackedCapabilityFactory`, a real
//! `ProfileStore` on disk) rather than the bare mocks used by
//! `ksm-engine`'s unit tests.

use ksm_audit::{AuditJournal, AuditJournalConfig};
use ksm_engine::dispatch::{self, DispatcherContext, Lifetime};
use ksm_engine::{EngineMode, RateLimiter, SessionState, ToolEngine};
use ksm_store::ProfileStore;
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;

#[path = "../src/capability_factory.rs"]
mod capability_factory;

use capability_factory::StoreBackedCapabilityFactory;

async fn run_lines(ctx: DispatcherContext, input: &str) -> Vec<Value> {
    let reader = Cursor::new(input.as_bytes().to_vec());
    let mut output = Vec::new();
    let lifetime = Lifetime::new();
    dispatch::run(reader, &mut output, ctx, lifetime).await.unwrap();
    String::from_utf8(output)
        .unwrap()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

async fn build_ctx(dir: &std::path::Path, profile: &str) -> DispatcherContext {
    let store = Arc::new(
        ProfileStore::open(dir.join("profiles.json"), Some("test-pass".to_string()))
            .await
            .unwrap(),
    );
    store
        .create(profile, [("clientId".to_string(), "0123456789".to_string())].into_iter().collect())
        .await
        .unwrap();

    let session = Arc::new(SessionState::new());
    session.set_current_profile(Some(profile.to_string())).await;

    let (audit, _handle) = AuditJournal::start(AuditJournalConfig::new(dir.join("logs").join("audit.log")));

    let engine = Arc::new(ToolEngine::new(
        session.clone(),
        audit.clone(),
        Arc::new(StoreBackedCapabilityFactory { store: store.clone() }),
        EngineMode::default(),
    ));

    DispatcherContext {
        engine,
        session,
        store,
        rate_limiter: RateLimiter::new(60),
        audit,
        server_name: "ksm-mcp".to_string(),
        server_version: "0.1.0".to_string(),
    }
}

#[tokio::test]
async fn initialize_then_tools_list_through_production_factory() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = build_ctx(dir.path(), "prod").await;

    let input = "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{}}\n\
                 {\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/list\"}\n";
    let replies = run_lines(ctx, input).await;
    assert_eq!(replies.len(), 2);
    assert!(replies[0]["result"]["serverInfo"]["name"] == "ksm-mcp");
    assert!(replies[1]["result"]["tools"].as_array().unwrap().len() >= 15);
}

#[tokio::test]
async fn sensitive_tool_through_profile_store_backed_capability_requires_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = build_ctx(dir.path(), "prod").await;

    let input = "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/call\",\"params\":{\"name\":\"create_secret\",\"arguments\":{\"title\":\"x\",\"record_type\":\"login\",\"fields\":{}}}}\n";
    let replies = run_lines(ctx, input).await;
    assert_eq!(replies[0]["result"]["status"], "confirmation_required");
}

#[tokio::test]
async fn sessions_list_reports_store_profiles() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = build_ctx(dir.path(), "prod").await;

    let input = "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"sessions/list\"}\n";
    let replies = run_lines(ctx, input).await;
    assert_eq!(replies[0]["result"]["profiles"], serde_json::json!(["prod"]));
}
