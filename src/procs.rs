//! Registry of detached server processes started inside sessions.
//!
//! A record is created on `start_server`, consulted for listing and log
//! tailing, and drained (with a kill) when the owning session is destroyed.
//! Cleanup is explicit rather than left to process-reaping behavior.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::workspace::INTERNAL_DIR;

/// A long-running server process detached from the request that started it.
#[derive(Debug, Clone)]
pub struct DetachedProcess {
    pub process_id: u32,
    pub session_id: String,
    pub command: String,
    pub port: u16,
    pub log_path: PathBuf,
    pub started_at: Instant,
}

impl DetachedProcess {
    pub fn view(&self) -> ProcessView {
        ProcessView {
            process_id: self.process_id,
            command: self.command.clone(),
            port: self.port,
            url: format!("http://127.0.0.1:{}", self.port),
            log_path: self.log_path.to_string_lossy().into_owned(),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessView {
    pub process_id: u32,
    pub command: String,
    pub port: u16,
    pub url: String,
    pub log_path: String,
    pub uptime_secs: u64,
}

/// Where a session's server log for `port` lives. The path is inside the
/// workspace so container-mode sessions (workspace bind-mounted) produce logs
/// the host can tail the same way.
pub fn server_log_path(workspace: &Path, port: u16) -> PathBuf {
    workspace
        .join(INTERNAL_DIR)
        .join("logs")
        .join(format!("server-{port}.log"))
}

/// Detached-process records keyed by session id.
#[derive(Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<RwLock<HashMap<String, Vec<DetachedProcess>>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, process: DetachedProcess) {
        self.inner
            .write()
            .await
            .entry(process.session_id.clone())
            .or_default()
            .push(process);
    }

    pub async fn list(&self, session_id: &str) -> Vec<DetachedProcess> {
        self.inner
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn find(&self, session_id: &str, process_id: u32) -> Option<DetachedProcess> {
        self.inner
            .read()
            .await
            .get(session_id)?
            .iter()
            .find(|p| p.process_id == process_id)
            .cloned()
    }

    pub async fn count(&self, session_id: &str) -> usize {
        self.inner
            .read()
            .await
            .get(session_id)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    /// Remove and return every record for a session; called exactly once per
    /// destroy, before the processes are killed.
    pub async fn drain(&self, session_id: &str) -> Vec<DetachedProcess> {
        self.inner
            .write()
            .await
            .remove(session_id)
            .unwrap_or_default()
    }
}

/// Last `lines` lines of a process log.
pub async fn tail_log(path: &Path, lines: usize) -> std::io::Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path).await?;
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    Ok(all[start..].iter().map(|s| s.to_string()).collect())
}
