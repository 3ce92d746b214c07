//! The protocol dispatcher: framing, method routing, error codes, rate
//! limiting, and lifecycle. Generic over the reader/writer so it is
//! testable without real stdio.

use crate::engine::ToolEngine;
use crate::ratelimit::RateLimiter;
use crate::session::SessionState;
use ksm_audit::AuditJournal;
use ksm_store::ProfileStore;
use ksm_types::rpc::{error_codes, Request, RequestId, Response, RpcError};
use ksm_types::{AuditEvent, AuditEventType, Severity};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Notify;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// A cooperative cancellation signal the dispatcher checks between
/// messages. Cancelling mid-message lets the in-flight
/// reply finish before the loop exits.
#[derive(Default)]
pub struct Lifetime {
    cancelled: AtomicBool,
    notify: Notify,
}

impl Lifetime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    async fn wait_for_cancel(&self) {
        if self.cancelled.load(Ordering::SeqCst) {
            return;
        }
        self.notify.notified().await;
    }
}

pub struct DispatcherContext {
    pub engine: Arc<ToolEngine>,
    pub session: Arc<SessionState>,
    pub store: Arc<ProfileStore>,
    pub rate_limiter: RateLimiter,
    pub audit: AuditJournal,
    pub server_name: String,
    pub server_version: String,
}

fn audit_event(event_type: AuditEventType, severity: Severity, action: &str, result: &str) -> AuditEvent {
    AuditEvent {
        id: ksm_types::audit::new_event_id(
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0) as u128,
            std::process::id(),
        ),
        timestamp: chrono::Utc::now(),
        event_type,
        severity,
        source: "dispatcher".to_string(),
        user: None,
        profile: None,
        resource: None,
        action: action.to_string(),
        result: result.to_string(),
        details: None,
        error: None,
        correlation_id: None,
    }
}

/// Run the main read-parse-route-reply loop until end-of-input or
/// `lifetime` is cancelled. Each reply is flushed before the next read.
pub async fn run<R, W>(reader: R, mut writer: W, ctx: DispatcherContext, lifetime: Arc<Lifetime>) -> std::io::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let started = std::time::Instant::now();
    ctx.audit.log(audit_event(AuditEventType::Startup, Severity::Info, "startup", "success")).await;

    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = lifetime.wait_for_cancel() => break,
        };

        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        if let Some(reply) = handle_line(&ctx, &line).await {
            let mut out = serde_json::to_vec(&reply).unwrap_or_default();
            out.push(b'\n');
            writer.write_all(&out).await?;
            writer.flush().await?;
        }
    }

    ctx.audit
        .log(audit_event(AuditEventType::Shutdown, Severity::Info, "shutdown", &format!("duration_ms={}", started.elapsed().as_millis())))
        .await;
    Ok(())
}

async fn handle_line(ctx: &DispatcherContext, line: &str) -> Option<Response> {
    let request: Request = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            return Some(Response::failure(
                None,
                RpcError::new(error_codes::PARSE_ERROR, format!("parse error: {e}")),
            ));
        }
    };

    let is_notification = request.is_notification();

    if !ctx.rate_limiter.try_acquire() {
        return if is_notification {
            None
        } else {
            Some(Response::failure(
                request.id,
                RpcError::new(error_codes::RATE_LIMITED, "rate limit exceeded"),
            ))
        };
    }

    match route(ctx, &request).await {
        RouteOutcome::Reply(value) => {
            if is_notification {
                None
            } else {
                Some(Response::success(request.id, value))
            }
        }
        RouteOutcome::Error(code, message) => {
            if is_notification {
                None
            } else {
                Some(Response::failure(request.id, RpcError::new(code, message)))
            }
        }
        RouteOutcome::Silent => None,
    }
}

enum RouteOutcome {
    Reply(Value),
    Error(i64, String),
    Silent,
}

async fn route(ctx: &DispatcherContext, request: &Request) -> RouteOutcome {
    match request.method.as_str() {
        "initialize" => RouteOutcome::Reply(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "list": true, "call": true },
                "sessions": { "list": true, "create": true, "end": true },
            },
            "serverInfo": { "name": ctx.server_name, "version": ctx.server_version },
        })),
        "initialized" | "notifications/initialized" => {
            tracing::info!("client handshake complete");
            RouteOutcome::Silent
        }
        "tools/list" => RouteOutcome::Reply(ctx.engine.tool_list()),
        "tools/call" => handle_tool_call(ctx, request.params.clone()).await,
        "sessions/list" => handle_sessions_list(ctx).await,
        "sessions/create" => handle_sessions_create(ctx, request.params.clone()).await,
        "sessions/end" => handle_sessions_end(ctx, request.params.clone()).await,
        "resources/list" => RouteOutcome::Reply(json!({ "resources": [] })),
        "prompts/list" => RouteOutcome::Reply(json!({ "prompts": [confirm_prompt_descriptor()] })),
        "prompts/get" => handle_prompts_get(request.params.clone()),
        _ => {
            if request.is_notification() {
                RouteOutcome::Silent
            } else {
                RouteOutcome::Error(error_codes::METHOD_NOT_FOUND, format!("method not found: {}", request.method))
            }
        }
    }
}

async fn handle_tool_call(ctx: &DispatcherContext, params: Option<Value>) -> RouteOutcome {
    let Some(params) = params else {
        return RouteOutcome::Error(error_codes::TOOL_EXECUTION_ERROR, "missing params".to_string());
    };
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return RouteOutcome::Error(error_codes::TOOL_EXECUTION_ERROR, "missing tool name".to_string());
    };
    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

    match ctx.engine.call(name, arguments).await {
        Ok(value) => RouteOutcome::Reply(value),
        Err(e) => RouteOutcome::Error(error_codes::TOOL_EXECUTION_ERROR, e.to_string()),
    }
}

async fn handle_sessions_list(ctx: &DispatcherContext) -> RouteOutcome {
    let names = ctx.store.list().await;
    RouteOutcome::Reply(json!({ "profiles": names, "active": ctx.session.active_profile_names().await }))
}

async fn handle_sessions_create(ctx: &DispatcherContext, params: Option<Value>) -> RouteOutcome {
    let Some(name) = params.as_ref().and_then(|p| p.get("profile")).and_then(Value::as_str) else {
        return RouteOutcome::Error(error_codes::INTERNAL_ERROR, "missing profile name".to_string());
    };
    match ctx.store.get(name).await {
        Ok(_) => {
            ctx.session.set_current_profile(Some(name.to_string())).await;
            RouteOutcome::Reply(json!({ "profile": name }))
        }
        Err(e) => RouteOutcome::Error(error_codes::INTERNAL_ERROR, e.to_string()),
    }
}

async fn handle_sessions_end(ctx: &DispatcherContext, params: Option<Value>) -> RouteOutcome {
    let name = params.as_ref().and_then(|p| p.get("profile")).and_then(Value::as_str).map(str::to_string);
    let name = match name.or(ctx.session.current_profile_name().await) {
        Some(n) => n,
        None => return RouteOutcome::Reply(json!({ "status": "no_active_session" })),
    };
    ctx.session.release(&name).await;
    if ctx.session.current_profile_name().await.as_deref() == Some(name.as_str()) {
        ctx.session.set_current_profile(None).await;
    }
    RouteOutcome::Reply(json!({ "status": "ended", "profile": name }))
}

fn confirm_prompt_descriptor() -> Value {
    json!({
        "name": "ksm_confirm_action",
        "description": "Present a sensitive vault action to a human for attestation.",
    })
}

fn handle_prompts_get(params: Option<Value>) -> RouteOutcome {
    let name = params.as_ref().and_then(|p| p.get("name")).and_then(Value::as_str);
    match name {
        Some("ksm_confirm_action") => RouteOutcome::Reply(json!({
            "name": "ksm_confirm_action",
            "description": "Present a sensitive vault action to a human for attestation.",
            "arguments": ["action_description", "warning_message", "original_tool_name", "original_tool_args_json"],
        })),
        _ => RouteOutcome::Error(error_codes::PROMPT_GET_ERROR, "unknown prompt".to_string()),
    }
}

#[allow(dead_code)]
fn numeric_id(id: &Option<RequestId>) -> Option<i64> {
    match id {
        Some(RequestId::Number(n)) => Some(*n),
        _ => None,
    }
}
