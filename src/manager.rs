//! Session lifecycle: creation, lookup with sliding expiry, capacity
//! enforcement, command dispatch, destruction, and the expiry sweep. Every
//! path that touches a session goes through the manager's table; nothing else
//! holds session state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::backend::{ExecBackend, IsolatedContainer, LocalProcess};
use crate::config::{Config, ExecMode, ResourceOptions};
use crate::error::{Error, Result};
use crate::exec::{self, ExecOpts, ExecutionResult};
use crate::gate;
use crate::procs::{self, DetachedProcess, ProcessRegistry, ProcessView};
use crate::state::{Session, SessionHandle, SessionState, SessionStats, SessionView, Sessions};
use crate::workspace;

/// Options accepted at session creation.
#[derive(Debug, Default, Clone)]
pub struct CreateOptions {
    pub mode: Option<ExecMode>,
    pub env: HashMap<String, String>,
    pub resources: ResourceOptions,
}

pub struct SessionManager {
    config: Config,
    sessions: Sessions,
    local: Arc<dyn ExecBackend>,
    container: Arc<dyn ExecBackend>,
    procs: ProcessRegistry,
}

impl SessionManager {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            local: Arc::new(LocalProcess::new(config.server_ready_timeout)),
            container: Arc::new(IsolatedContainer::new(config.container_image.clone())),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            procs: ProcessRegistry::new(),
            config,
        })
    }

    fn backend_for(&self, mode: ExecMode) -> Arc<dyn ExecBackend> {
        match mode {
            ExecMode::Local => Arc::clone(&self.local),
            ExecMode::Container => Arc::clone(&self.container),
        }
    }

    /// Per-invocation options with configured defaults filled in.
    pub fn exec_opts(&self, timeout_ms: Option<u64>, env: HashMap<String, String>) -> ExecOpts {
        ExecOpts {
            timeout: timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(self.config.command_timeout),
            env,
            max_output_bytes: self.config.max_output_bytes,
        }
    }

    pub async fn create_session(&self, owner: &str, opts: CreateOptions) -> Result<SessionView> {
        // Opportunistic sweep so expired sessions don't count against capacity.
        self.sweep_expired().await;

        let id = Uuid::new_v4().to_string();
        let workspace = self.config.base_dir.join(&id);
        let mode = opts.mode.unwrap_or(self.config.mode);
        let backend = self.backend_for(mode);
        let limits = self.config.limits.with_overrides(opts.resources);
        let now = Instant::now();

        let session = Session {
            id: id.clone(),
            owner: owner.to_string(),
            workspace: workspace.clone(),
            container: None,
            state: SessionState::Initializing,
            limits,
            env: opts.env,
            created_at: now,
            expires_at: now + self.config.idle_timeout.min(self.config.max_session_age),
            backend: Arc::clone(&backend),
            exec_lock: Arc::new(Mutex::new(())),
        };
        let handle = session.handle();

        {
            let mut sessions = self.sessions.write().await;
            if sessions.len() >= self.config.max_sessions {
                return Err(Error::CapacityExceeded(format!(
                    "{} live sessions",
                    self.config.max_sessions
                )));
            }
            tokio::fs::create_dir_all(&workspace)
                .await
                .map_err(|e| Error::filesystem(&workspace, e))?;
            sessions.insert(id.clone(), session);
        }

        // Provision outside the table lock; container startup may block.
        match backend.provision(&handle).await {
            Ok(container) => {
                let mut sessions = self.sessions.write().await;
                match sessions.get_mut(&id) {
                    Some(session) => {
                        session.container = container;
                        session.state = SessionState::Ready;
                        info!(session_id = %id, owner, mode = ?mode, "created session");
                        Ok(session.view())
                    }
                    None => {
                        // Destroyed while provisioning; release the container.
                        drop(sessions);
                        if container.is_some() {
                            let mut stale = handle.clone();
                            stale.container = container;
                            if let Err(e) = backend.teardown(&stale).await {
                                warn!(session_id = %id, error = %e, "teardown of stale container failed");
                            }
                        }
                        Err(Error::SessionNotFound(id))
                    }
                }
            }
            Err(e) => {
                if let Some(session) = self.sessions.write().await.get_mut(&id) {
                    session.state = SessionState::Error;
                }
                error!(session_id = %id, error = %e, "provisioning failed");
                Err(e)
            }
        }
    }

    /// Look up a session, treating one past its expiry as already gone: the
    /// expired session is destroyed as a side effect and reported absent.
    /// A successful lookup slides the expiry forward.
    pub async fn get_session(&self, id: &str) -> Result<SessionView> {
        let view = {
            let mut sessions = self.sessions.write().await;
            let Some(session) = sessions.get_mut(id) else {
                return Err(Error::SessionNotFound(id.to_string()));
            };
            // A destroy already claimed it; no trace is observable.
            if session.state == SessionState::Stopped {
                return Err(Error::SessionNotFound(id.to_string()));
            }
            if Instant::now() >= session.expires_at {
                None
            } else {
                session.touch(self.config.idle_timeout, self.config.max_session_age);
                Some(session.view())
            }
        };
        match view {
            Some(view) => Ok(view),
            None => {
                self.destroy_session(id).await;
                Err(Error::SessionNotFound(id.to_string()))
            }
        }
    }

    /// Liveness-checked handle for an operation; same expiry semantics as
    /// [`get_session`]. Backend operations require a `Ready`/`Running`
    /// session.
    async fn checkout(&self, id: &str) -> Result<SessionHandle> {
        let checked = {
            let mut sessions = self.sessions.write().await;
            let Some(session) = sessions.get_mut(id) else {
                return Err(Error::SessionNotFound(id.to_string()));
            };
            if Instant::now() >= session.expires_at {
                None
            } else {
                match session.state {
                    SessionState::Ready | SessionState::Running => {
                        session.touch(self.config.idle_timeout, self.config.max_session_age);
                        Some(session.handle())
                    }
                    SessionState::Initializing => {
                        return Err(Error::Provisioning(
                            "session is still initializing".to_string(),
                        ));
                    }
                    SessionState::Error => {
                        return Err(Error::Provisioning(
                            "session backend is in a failed state".to_string(),
                        ));
                    }
                    SessionState::Stopped => {
                        return Err(Error::SessionNotFound(id.to_string()));
                    }
                }
            }
        };
        match checked {
            Some(handle) => Ok(handle),
            None => {
                self.destroy_session(id).await;
                Err(Error::SessionNotFound(id.to_string()))
            }
        }
    }

    /// Bump a session's expiry, capped at `created_at + max_session_age` so
    /// repeated cheap calls cannot keep a session alive forever.
    pub async fn extend_session(&self, id: &str, duration: Duration) -> Result<SessionView> {
        let view = {
            let mut sessions = self.sessions.write().await;
            let Some(session) = sessions.get_mut(id) else {
                return Err(Error::SessionNotFound(id.to_string()));
            };
            if session.state == SessionState::Stopped {
                return Err(Error::SessionNotFound(id.to_string()));
            }
            if Instant::now() >= session.expires_at {
                None
            } else {
                let cap = session.created_at + self.config.max_session_age;
                session.expires_at = (session.expires_at + duration).min(cap);
                Some(session.view())
            }
        };
        match view {
            Some(view) => Ok(view),
            None => {
                self.destroy_session(id).await;
                Err(Error::SessionNotFound(id.to_string()))
            }
        }
    }

    /// Idempotent destroy: kills detached processes, tears down the backend,
    /// removes the workspace best-effort, and removes the bookkeeping entry
    /// last. Returns whether this call did the work.
    pub async fn destroy_session(&self, id: &str) -> bool {
        let handle = {
            let mut sessions = self.sessions.write().await;
            match sessions.get_mut(id) {
                None => return false,
                // Another destroy (foreground or sweeper) already claimed it.
                Some(session) if session.state == SessionState::Stopped => return false,
                Some(session) => {
                    session.state = SessionState::Stopped;
                    session.handle()
                }
            }
        };

        for process in self.procs.drain(id).await {
            handle
                .backend
                .kill_process(&handle, process.process_id)
                .await;
        }
        if let Err(e) = handle.backend.teardown(&handle).await {
            warn!(session_id = %id, error = %e, "backend teardown failed");
        }
        if let Err(e) = tokio::fs::remove_dir_all(&handle.workspace).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(session_id = %id, error = %e, "workspace removal failed");
            }
        }
        self.sessions.write().await.remove(id);
        info!(session_id = %id, "destroyed session");
        true
    }

    pub async fn list_sessions(&self, owner: Option<&str>) -> Vec<SessionView> {
        let now = Instant::now();
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| now < s.expires_at)
            .filter(|s| owner.map_or(true, |o| s.owner == o))
            .map(Session::view)
            .collect()
    }

    /// Run one command inside a session. Commands against the same session
    /// serialize behind its exec lock; different sessions run concurrently.
    pub async fn execute(&self, id: &str, command: &str, opts: ExecOpts) -> Result<ExecutionResult> {
        let handle = self.checkout(id).await?;
        if handle.backend.requires_gate() {
            gate::ensure_allowed(command)?;
        }
        let lock = Arc::clone(&handle.exec_lock);
        let _guard = lock.lock().await;

        // The session may have been reclaimed while we waited on the lock.
        self.mark(id, SessionState::Running).await?;
        let result = handle.backend.run(&handle, command, &opts).await;
        let _ = self.mark(id, SessionState::Ready).await;
        Ok(result)
    }

    async fn mark(&self, id: &str, state: SessionState) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(session) if session.state != SessionState::Stopped => {
                session.state = state;
                Ok(())
            }
            _ => Err(Error::SessionNotFound(id.to_string())),
        }
    }

    /// Convenience wrapper: canonical install invocation for a package
    /// manager, run through the ordinary execution path.
    pub async fn install_dependencies(&self, id: &str, manager: &str) -> Result<ExecutionResult> {
        let command = exec::install_invocation(manager)
            .ok_or_else(|| Error::CommandRejected(manager.to_string()))?;
        let opts = self.exec_opts(None, HashMap::new());
        self.execute(id, command, opts).await
    }

    pub async fn write_files(&self, id: &str, files: Vec<(String, Vec<u8>)>) -> Result<usize> {
        let handle = self.checkout(id).await?;
        let disk_limit = handle.limits.disk_mb * 1024 * 1024;
        let count = files.len();
        let workspace = handle.workspace.clone();
        tokio::task::spawn_blocking(move || {
            for (path, content) in &files {
                workspace::write_file(&workspace, path, content, disk_limit)?;
            }
            Ok::<_, Error>(())
        })
        .await
        .map_err(|e| Error::Spawn(format!("blocking task: {e}")))??;
        Ok(count)
    }

    pub async fn read_file(&self, id: &str, path: &str) -> Result<Vec<u8>> {
        let handle = self.checkout(id).await?;
        let path = path.to_string();
        tokio::task::spawn_blocking(move || workspace::read_file(&handle.workspace, &path))
            .await
            .map_err(|e| Error::Spawn(format!("blocking task: {e}")))?
    }

    pub async fn list_files(&self, id: &str) -> Result<Vec<String>> {
        let handle = self.checkout(id).await?;
        tokio::task::spawn_blocking(move || workspace::list_files(&handle.workspace).collect())
            .await
            .map_err(|e| Error::Spawn(format!("blocking task: {e}")))
    }

    pub async fn session_stats(&self, id: &str) -> Result<SessionStats> {
        let handle = self.checkout(id).await?;
        let process_count = self.procs.count(id).await;
        let workspace = handle.workspace.clone();
        let (file_count, disk_usage_bytes) = tokio::task::spawn_blocking(move || {
            (
                workspace::file_count(&workspace),
                workspace::disk_usage(&workspace),
            )
        })
        .await
        .map_err(|e| Error::Spawn(format!("blocking task: {e}")))?;
        Ok(SessionStats {
            file_count,
            disk_usage_bytes,
            disk_limit_bytes: handle.limits.disk_mb * 1024 * 1024,
            uptime_secs: handle.created_at.elapsed().as_secs(),
            process_count,
        })
    }

    /// Start a detached server in the session and record it for later log
    /// access and reclamation.
    pub async fn start_server(&self, id: &str, command: &str, port: u16) -> Result<ProcessView> {
        let handle = self.checkout(id).await?;
        if handle.backend.requires_gate() {
            gate::ensure_allowed(command)?;
        }
        let pid = handle.backend.start_server(&handle, command, port).await?;
        let record = DetachedProcess {
            process_id: pid,
            session_id: id.to_string(),
            command: command.to_string(),
            port,
            log_path: procs::server_log_path(&handle.workspace, port),
            started_at: Instant::now(),
        };
        let view = record.view();
        self.procs.register(record).await;
        info!(session_id = %id, pid, port, "started server");
        Ok(view)
    }

    pub async fn list_processes(&self, id: &str) -> Result<Vec<ProcessView>> {
        self.checkout(id).await?;
        Ok(self
            .procs
            .list(id)
            .await
            .iter()
            .map(DetachedProcess::view)
            .collect())
    }

    pub async fn process_logs(&self, id: &str, process_id: u32, lines: usize) -> Result<Vec<String>> {
        self.checkout(id).await?;
        let record = self
            .procs
            .find(id, process_id)
            .await
            .ok_or(Error::ProcessNotFound(process_id))?;
        procs::tail_log(&record.log_path, lines)
            .await
            .map_err(|e| Error::filesystem(&record.log_path, e))
    }

    /// Destroy every session past its expiry through the same idempotent
    /// path a foreground caller uses. Returns the number reclaimed.
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|(_, s)| now >= s.expires_at)
            .map(|(id, _)| id.clone())
            .collect();
        let mut reclaimed = 0;
        for id in expired {
            if self.destroy_session(&id).await {
                info!(session_id = %id, "reclaimed expired session");
                reclaimed += 1;
            }
        }
        reclaimed
    }
}

/// Background expiry sweeper, independent of request traffic.
pub fn spawn_sweeper(manager: Arc<SessionManager>) -> tokio::task::JoinHandle<()> {
    let interval = manager.config.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            manager.sweep_expired().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(base: &TempDir) -> Config {
        Config {
            base_dir: base.path().to_path_buf(),
            max_sessions: 4,
            idle_timeout: Duration::from_secs(60),
            max_session_age: Duration::from_secs(120),
            command_timeout: Duration::from_secs(10),
            server_ready_timeout: Duration::from_millis(100),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn write_then_execute_scenario() {
        let base = TempDir::new().unwrap();
        let manager = SessionManager::new(test_config(&base));

        let session = manager
            .create_session("u1", CreateOptions::default())
            .await
            .unwrap();
        assert_eq!(session.state, SessionState::Ready);

        manager
            .write_files(
                &session.id,
                vec![("run.sh".to_string(), b"echo hi".to_vec())],
            )
            .await
            .unwrap();

        let result = manager
            .execute(&session.id, "sh run.sh", manager.exec_opts(None, HashMap::new()))
            .await
            .unwrap();
        assert!(result.stdout.contains("hi"));
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn destroy_is_idempotent_and_removes_everything() {
        let base = TempDir::new().unwrap();
        let manager = SessionManager::new(test_config(&base));
        let session = manager
            .create_session("u1", CreateOptions::default())
            .await
            .unwrap();
        let workspace = std::path::PathBuf::from(&session.workspace);
        assert!(workspace.exists());

        assert!(manager.destroy_session(&session.id).await);
        assert!(!workspace.exists());
        assert!(matches!(
            manager.get_session(&session.id).await,
            Err(Error::SessionNotFound(_))
        ));
        // Second destroy is a no-op, not an error.
        assert!(!manager.destroy_session(&session.id).await);
    }

    #[tokio::test]
    async fn listing_files_after_destroy_reports_session_not_found() {
        let base = TempDir::new().unwrap();
        let manager = SessionManager::new(test_config(&base));
        let session = manager
            .create_session("u1", CreateOptions::default())
            .await
            .unwrap();
        manager.destroy_session(&session.id).await;
        assert!(matches!(
            manager.list_files(&session.id).await,
            Err(Error::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn expired_session_behaves_like_destroyed() {
        let base = TempDir::new().unwrap();
        let mut config = test_config(&base);
        config.idle_timeout = Duration::from_millis(50);
        let manager = SessionManager::new(config);

        let session = manager
            .create_session("u1", CreateOptions::default())
            .await
            .unwrap();
        let workspace = std::path::PathBuf::from(&session.workspace);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(matches!(
            manager.get_session(&session.id).await,
            Err(Error::SessionNotFound(_))
        ));
        assert!(!workspace.exists());
    }

    #[tokio::test]
    async fn capacity_is_enforced() {
        let base = TempDir::new().unwrap();
        let mut config = test_config(&base);
        config.max_sessions = 1;
        let manager = SessionManager::new(config);

        manager
            .create_session("u1", CreateOptions::default())
            .await
            .unwrap();
        let err = manager
            .create_session("u2", CreateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded(_)));
    }

    #[tokio::test]
    async fn expired_sessions_free_capacity_on_create() {
        let base = TempDir::new().unwrap();
        let mut config = test_config(&base);
        config.max_sessions = 1;
        config.idle_timeout = Duration::from_millis(50);
        let manager = SessionManager::new(config);

        manager
            .create_session("u1", CreateOptions::default())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        // The opportunistic sweep inside create reclaims the expired session.
        manager
            .create_session("u2", CreateOptions::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn gate_blocks_unlisted_commands() {
        let base = TempDir::new().unwrap();
        let manager = SessionManager::new(test_config(&base));
        let session = manager
            .create_session("u1", CreateOptions::default())
            .await
            .unwrap();

        let err = manager
            .execute(
                &session.id,
                "curl http://example.com",
                manager.exec_opts(None, HashMap::new()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CommandRejected(_)));
        // Rejection happened before any subprocess touched the workspace.
        assert!(manager.list_files(&session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn timed_out_command_returns_bounded_result() {
        let base = TempDir::new().unwrap();
        let manager = SessionManager::new(test_config(&base));
        let session = manager
            .create_session("u1", CreateOptions::default())
            .await
            .unwrap();

        let start = Instant::now();
        let result = manager
            .execute(
                &session.id,
                "sh -c 'sleep 30'",
                manager.exec_opts(Some(200), HashMap::new()),
            )
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_ne!(result.exit_code, 0);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let base = TempDir::new().unwrap();
        let manager = SessionManager::new(test_config(&base));
        let a = manager
            .create_session("u1", CreateOptions::default())
            .await
            .unwrap();
        let b = manager
            .create_session("u2", CreateOptions::default())
            .await
            .unwrap();

        manager
            .write_files(&a.id, vec![("config.json".to_string(), b"a".to_vec())])
            .await
            .unwrap();
        manager
            .write_files(&b.id, vec![("config.json".to_string(), b"b".to_vec())])
            .await
            .unwrap();

        assert_eq!(manager.read_file(&a.id, "config.json").await.unwrap(), b"a");
        assert_eq!(manager.read_file(&b.id, "config.json").await.unwrap(), b"b");
    }

    #[tokio::test]
    async fn extension_is_capped_by_session_age() {
        let base = TempDir::new().unwrap();
        let mut config = test_config(&base);
        config.max_session_age = Duration::from_secs(2);
        let manager = SessionManager::new(config);
        let session = manager
            .create_session("u1", CreateOptions::default())
            .await
            .unwrap();

        let view = manager
            .extend_session(&session.id, Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(view.expires_in_secs <= 2);
    }

    #[tokio::test]
    async fn listing_filters_by_owner() {
        let base = TempDir::new().unwrap();
        let manager = SessionManager::new(test_config(&base));
        manager
            .create_session("alice", CreateOptions::default())
            .await
            .unwrap();
        manager
            .create_session("alice", CreateOptions::default())
            .await
            .unwrap();
        manager
            .create_session("bob", CreateOptions::default())
            .await
            .unwrap();

        assert_eq!(manager.list_sessions(None).await.len(), 3);
        assert_eq!(manager.list_sessions(Some("alice")).await.len(), 2);
        assert_eq!(manager.list_sessions(Some("carol")).await.len(), 0);
    }

    #[tokio::test]
    async fn stats_report_usage() {
        let base = TempDir::new().unwrap();
        let manager = SessionManager::new(test_config(&base));
        let session = manager
            .create_session("u1", CreateOptions::default())
            .await
            .unwrap();
        manager
            .write_files(
                &session.id,
                vec![
                    ("a.txt".to_string(), vec![0u8; 64]),
                    ("sub/b.txt".to_string(), vec![0u8; 64]),
                ],
            )
            .await
            .unwrap();

        let stats = manager.session_stats(&session.id).await.unwrap();
        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.disk_usage_bytes, 128);
        assert_eq!(stats.process_count, 0);
    }

    #[tokio::test]
    async fn sweeper_reclaims_without_foreground_traffic() {
        let base = TempDir::new().unwrap();
        let mut config = test_config(&base);
        config.idle_timeout = Duration::from_millis(20);
        config.sweep_interval = Duration::from_millis(50);
        let manager = SessionManager::new(config);

        let session = manager
            .create_session("u1", CreateOptions::default())
            .await
            .unwrap();
        let workspace = std::path::PathBuf::from(&session.workspace);

        let sweeper = spawn_sweeper(Arc::clone(&manager));
        tokio::time::sleep(Duration::from_millis(300)).await;
        sweeper.abort();

        assert!(!workspace.exists());
        assert!(manager.list_sessions(None).await.is_empty());
    }

    #[tokio::test]
    async fn commands_against_one_session_serialize() {
        let base = TempDir::new().unwrap();
        let manager = SessionManager::new(test_config(&base));
        let session = manager
            .create_session("u1", CreateOptions::default())
            .await
            .unwrap();
        manager
            .write_files(
                &session.id,
                vec![(
                    "append.sh".to_string(),
                    b"echo begin >> log.txt; sleep 0.1; echo end >> log.txt".to_vec(),
                )],
            )
            .await
            .unwrap();

        let first = manager.execute(
            &session.id,
            "sh append.sh",
            manager.exec_opts(None, HashMap::new()),
        );
        let second = manager.execute(
            &session.id,
            "sh append.sh",
            manager.exec_opts(None, HashMap::new()),
        );
        let (first, second) = tokio::join!(first, second);
        assert_eq!(first.unwrap().exit_code, 0);
        assert_eq!(second.unwrap().exit_code, 0);

        // Each run's begin/end pair stays together; the exec lock prevents
        // the two commands from interleaving inside the workspace.
        let log = manager.read_file(&session.id, "log.txt").await.unwrap();
        let lines: Vec<&str> = std::str::from_utf8(&log).unwrap().lines().collect();
        assert_eq!(lines, vec!["begin", "end", "begin", "end"]);
    }

    #[tokio::test]
    async fn unknown_package_manager_is_rejected() {
        let base = TempDir::new().unwrap();
        let manager = SessionManager::new(test_config(&base));
        let session = manager
            .create_session("u1", CreateOptions::default())
            .await
            .unwrap();
        let err = manager
            .install_dependencies(&session.id, "apt")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CommandRejected(_)));
    }
}
