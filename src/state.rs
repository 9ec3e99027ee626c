//! Shared application state and session types.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::backend::ExecBackend;
use crate::config::{ExecMode, ResourceLimits};
use crate::manager::SessionManager;

/// Session lifecycle. `Running` is a transient marker around a single
/// in-flight command; `Stopped` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Initializing,
    Ready,
    Running,
    Stopped,
    Error,
}

/// One user's ephemeral workspace and its execution backend. Lives only in
/// the manager's table; everything else sees it through [`SessionHandle`] or
/// [`SessionView`] copies.
pub struct Session {
    pub id: String,
    pub owner: String,
    pub workspace: PathBuf,
    /// Name of the provisioned container instance, container mode only.
    pub container: Option<String>,
    pub state: SessionState,
    pub limits: ResourceLimits,
    pub env: HashMap<String, String>,
    pub created_at: Instant,
    pub expires_at: Instant,
    pub backend: Arc<dyn ExecBackend>,
    /// Serializes command execution within this session; independent
    /// sessions run concurrently.
    pub exec_lock: Arc<Mutex<()>>,
}

impl Session {
    /// Slide the expiry forward, capped at `created_at + max_session_age`.
    pub fn touch(&mut self, idle_timeout: std::time::Duration, max_age: std::time::Duration) {
        let cap = self.created_at + max_age;
        self.expires_at = (Instant::now() + idle_timeout).min(cap);
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id.clone(),
            workspace: self.workspace.clone(),
            container: self.container.clone(),
            limits: self.limits,
            env: self.env.clone(),
            created_at: self.created_at,
            backend: Arc::clone(&self.backend),
            exec_lock: Arc::clone(&self.exec_lock),
        }
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id.clone(),
            owner: self.owner.clone(),
            workspace: self.workspace.to_string_lossy().into_owned(),
            backend: self.backend.mode(),
            state: self.state,
            limits: self.limits,
            age_secs: self.created_at.elapsed().as_secs(),
            expires_in_secs: self
                .expires_at
                .saturating_duration_since(Instant::now())
                .as_secs(),
        }
    }
}

/// By-value copy of the session fields the backends and workspace store need;
/// handed out by the manager so nothing reaches into the table directly.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: String,
    pub workspace: PathBuf,
    pub container: Option<String>,
    pub limits: ResourceLimits,
    pub env: HashMap<String, String>,
    pub created_at: Instant,
    pub backend: Arc<dyn ExecBackend>,
    pub exec_lock: Arc<Mutex<()>>,
}

/// Wire-facing session descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: String,
    pub owner: String,
    pub workspace: String,
    pub backend: ExecMode,
    pub state: SessionState,
    pub limits: ResourceLimits,
    pub age_secs: u64,
    pub expires_in_secs: u64,
}

/// Resource/usage statistics for one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub file_count: u64,
    pub disk_usage_bytes: u64,
    pub disk_limit_bytes: u64,
    pub uptime_secs: u64,
    pub process_count: usize,
}

/// Thread-safe session storage: the engine's only global mutable state,
/// owned exclusively by the manager.
pub type Sessions = Arc<RwLock<HashMap<String, Session>>>;

/// Shared application state for the HTTP layer.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
}
