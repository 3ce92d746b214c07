//! Append-only structured audit journal with a non-blocking writer and
//! rotation.

use chrono::{DateTime, Utc};
use ksm_types::audit::is_sensitive_key;
use ksm_types::{AuditEvent, AuditEventType, Severity};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("I/O error: {0}")]
    Io(String),
}

const CHANNEL_CAPACITY: usize = 100;
const ENQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

enum WorkerMsg {
    Event(AuditEvent),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the audit journal. Cheap to clone; all clones share the same
/// background writer and maintenance task.
#[derive(Clone)]
pub struct AuditJournal {
    tx: mpsc::Sender<WorkerMsg>,
}

pub struct AuditJournalConfig {
    pub path: PathBuf,
    pub max_size_bytes: u64,
    pub max_age: chrono::Duration,
    pub maintenance_interval: Duration,
}

impl AuditJournalConfig {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            max_size_bytes: 10 * 1024 * 1024,
            max_age: chrono::Duration::days(90),
            maintenance_interval: Duration::from_secs(3600),
        }
    }
}

impl AuditJournal {
    /// Start the background writer and maintenance tasks. Returns a
    /// handle immediately; the writer opens the file lazily on first
    /// event.
    pub fn start(config: AuditJournalConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let worker_path = config.path.clone();
        let max_size = config.max_size_bytes;
        let maintenance_path = config.path.clone();
        let max_age = config.max_age;
        let maintenance_interval = config.maintenance_interval;

        let handle = tokio::spawn(async move {
            tokio::spawn(maintenance_loop(
                maintenance_path,
                max_age,
                maintenance_interval,
            ));
            writer_loop(worker_path, max_size, rx).await;
        });

        (Self { tx }, handle)
    }

    /// Enqueue an event. Blocks up to one second if the channel is full,
    /// then drops the event and logs a warning to stderr rather than
    /// deadlocking the caller.
    pub async fn log(&self, event: AuditEvent) {
        match tokio::time::timeout(ENQUEUE_TIMEOUT, self.tx.send(WorkerMsg::Event(event))).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                tracing::warn!("audit journal worker is gone, dropping event");
            }
            Err(_) => {
                tracing::warn!("audit queue full for 1s, dropping event");
            }
        }
    }

    /// Drain the channel, write a SHUTDOWN event, and wait for the
    /// worker to finish.
    pub async fn close(&self, duration: std::time::Duration) {
        let shutdown_event = AuditEvent {
            id: format!("{}|{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0), std::process::id()),
            timestamp: Utc::now(),
            event_type: AuditEventType::Shutdown,
            severity: Severity::Info,
            source: "audit_journal".to_string(),
            user: None,
            profile: None,
            resource: None,
            action: "shutdown".to_string(),
            result: "success".to_string(),
            details: Some(
                [("duration_ms".to_string(), serde_json::json!(duration.as_millis()))]
                    .into_iter()
                    .collect(),
            ),
            error: None,
            correlation_id: None,
        };
        self.log(shutdown_event).await;

        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WorkerMsg::Shutdown(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn writer_loop(path: PathBuf, max_size: u64, mut rx: mpsc::Receiver<WorkerMsg>) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent).await;
        set_mode(parent, 0o700);
    }

    while let Some(msg) = rx.recv().await {
        match msg {
            WorkerMsg::Event(mut event) => {
                scrub_event(&mut event);
                if let Err(e) = append_and_rotate(&path, &event, max_size).await {
                    tracing::error!(error = %e, "failed to write audit event");
                }
            }
            WorkerMsg::Shutdown(done) => {
                let _ = done.send(());
                break;
            }
        }
    }
}

fn scrub_event(event: &mut AuditEvent) {
    if let Some(details) = &mut event.details {
        details.retain(|k, _| !is_sensitive_key(k));
    }
}

async fn append_and_rotate(path: &Path, event: &AuditEvent, max_size: u64) -> Result<(), AuditError> {
    let line = serde_json::to_string(event).map_err(|e| AuditError::Io(e.to_string()))?;

    {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| AuditError::Io(e.to_string()))?;
        set_mode(path, 0o600);
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| AuditError::Io(e.to_string()))?;
        file.write_all(b"\n").await.map_err(|e| AuditError::Io(e.to_string()))?;
        file.flush().await.map_err(|e| AuditError::Io(e.to_string()))?;
    }

    if let Ok(meta) = fs::metadata(path).await {
        if meta.len() > max_size {
            rotate(path).await?;
        }
    }
    Ok(())
}

async fn rotate(path: &Path) -> Result<(), AuditError> {
    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    let rotated = path.with_file_name(format!(
        "{}.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("audit.log"),
        stamp
    ));
    fs::rename(path, &rotated)
        .await
        .map_err(|e| AuditError::Io(e.to_string()))?;
    Ok(())
}

async fn maintenance_loop(path: PathBuf, max_age: chrono::Duration, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        prune_rotated_files(&path, max_age).await;
    }
}

async fn prune_rotated_files(path: &Path, max_age: chrono::Duration) {
    let Some(parent) = path.parent() else { return };
    let Some(base_name) = path.file_name().and_then(|n| n.to_str()) else { return };
    let cutoff = Utc::now() - max_age;

    let Ok(mut entries) = fs::read_dir(parent).await else { return };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else { continue };
        let prefix = format!("{base_name}.");
        if !name.starts_with(&prefix) {
            continue;
        }
        let Some(suffix) = name.strip_prefix(&prefix) else { continue };
        let Ok(rotated_at) = chrono::NaiveDateTime::parse_from_str(suffix, "%Y%m%d-%H%M%S") else {
            continue;
        };
        let rotated_at = rotated_at.and_utc();
        if rotated_at < cutoff {
            let _ = fs::remove_file(entry.path()).await;
        }
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mut perms = meta.permissions();
        perms.set_mode(mode);
        let _ = std::fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}

/// Filters accepted by [`query`]. All fields are optional/additive — an
/// empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub types: Option<BTreeSet<AuditEventType>>,
    pub severities: Option<BTreeSet<Severity>>,
    pub users: Option<BTreeSet<String>>,
    pub resources: Option<BTreeSet<String>>,
    pub correlation_id: Option<String>,
    pub limit: Option<usize>,
}

/// Linear scan over the active log file and any rotated siblings,
/// applying `filter`. Intended for diagnostic use; no index is built.
pub async fn query(path: &Path, filter: &QueryFilter) -> Result<Vec<AuditEvent>, AuditError> {
    let mut files = vec![path.to_path_buf()];
    if let Some(parent) = path.parent() {
        let base_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if let Ok(mut entries) = fs::read_dir(parent).await {
            let mut rotated = Vec::new();
            while let Ok(Some(entry)) = entries.next_entry().await {
                if let Some(name) = entry.file_name().to_str() {
                    if name.starts_with(&format!("{base_name}.")) {
                        rotated.push(entry.path());
                    }
                }
            }
            rotated.sort();
            files.extend(rotated);
        }
    }

    let mut out = Vec::new();
    for file in files {
        let Ok(contents) = fs::read_to_string(&file).await else { continue };
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let Ok(event) = serde_json::from_str::<AuditEvent>(line) else { continue };
            if matches(&event, filter) {
                out.push(event);
            }
        }
    }

    out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    if let Some(limit) = filter.limit {
        out.truncate(limit);
    }
    Ok(out)
}

fn matches(event: &AuditEvent, filter: &QueryFilter) -> bool {
    if let Some(since) = filter.since {
        if event.timestamp < since {
            return false;
        }
    }
    if let Some(until) = filter.until {
        if event.timestamp > until {
            return false;
        }
    }
    if let Some(types) = &filter.types {
        if !types.contains(&event.event_type) {
            return false;
        }
    }
    if let Some(severities) = &filter.severities {
        if !severities.contains(&event.severity) {
            return false;
        }
    }
    if let Some(users) = &filter.users {
        match &event.user {
            Some(u) if users.contains(u) => {}
            _ => return false,
        }
    }
    if let Some(resources) = &filter.resources {
        match &event.resource {
            Some(r) if resources.contains(r) => {}
            _ => return false,
        }
    }
    if let Some(cid) = &filter.correlation_id {
        if event.correlation_id.as_deref() != Some(cid.as_str()) {
            return false;
        }
    }
    true
}
