//! Execution backends: trusted local subprocesses or an isolated container
//! per session, behind one contract. The manager picks the variant at
//! session creation and stores it on the session.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ExecMode;
use crate::error::{Error, Result};
use crate::exec::{self, ExecOpts, ExecutionResult};
use crate::procs::server_log_path;
use crate::state::SessionHandle;
use crate::workspace::INTERNAL_DIR;

/// How long container provisioning may block before it fails.
const PROVISION_TIMEOUT: Duration = Duration::from_secs(60);
/// Budget for the docker side of a detached-server start.
const SERVER_START_TIMEOUT: Duration = Duration::from_secs(15);

#[async_trait]
pub trait ExecBackend: Send + Sync {
    fn mode(&self) -> ExecMode;

    /// Whether commands must pass the allow-list gate before running.
    fn requires_gate(&self) -> bool;

    /// One-time per-session setup; returns the container name in container
    /// mode.
    async fn provision(&self, handle: &SessionHandle) -> Result<Option<String>>;

    /// Run one command to completion under the caller's timeout. Failures
    /// are folded into the result; this never hangs past the timeout.
    async fn run(&self, handle: &SessionHandle, command: &str, opts: &ExecOpts) -> ExecutionResult;

    /// Start a detached server with its combined output appended to the
    /// session's log file for `port`; returns the process id.
    async fn start_server(&self, handle: &SessionHandle, command: &str, port: u16) -> Result<u32>;

    /// Force-terminate a detached process. Best-effort; a process that
    /// already exited is not an error.
    async fn kill_process(&self, handle: &SessionHandle, process_id: u32);

    /// Release backend resources held by the session.
    async fn teardown(&self, handle: &SessionHandle) -> Result<()>;
}

/// Session env merged under per-call overrides, sorted for determinism.
fn merged_env(handle: &SessionHandle, opts: &ExecOpts) -> Vec<(String, String)> {
    let mut merged = handle.env.clone();
    merged.extend(opts.env.clone());
    let mut pairs: Vec<(String, String)> = merged.into_iter().collect();
    pairs.sort();
    pairs
}

// ---------------------------------------------------------------------------
// Local process backend
// ---------------------------------------------------------------------------

/// Direct subprocess execution in the session workspace. Trusted mode: the
/// only control is the command gate, applied by the manager before `run`.
pub struct LocalProcess {
    ready_timeout: Duration,
}

impl LocalProcess {
    pub fn new(ready_timeout: Duration) -> Self {
        Self { ready_timeout }
    }

    /// Poll the spawned server until it answers or the probe deadline
    /// passes. Non-fatal either way; the caller still gets the pid.
    async fn wait_until_ready(&self, port: u16) {
        let url = format!("http://127.0.0.1:{port}/");
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
        {
            Ok(client) => client,
            Err(_) => return,
        };
        let deadline = tokio::time::Instant::now() + self.ready_timeout;
        while tokio::time::Instant::now() < deadline {
            if client.get(&url).send().await.is_ok() {
                info!(port, "server is answering");
                return;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        warn!(port, "server did not answer before the probe deadline");
    }
}

#[async_trait]
impl ExecBackend for LocalProcess {
    fn mode(&self) -> ExecMode {
        ExecMode::Local
    }

    fn requires_gate(&self) -> bool {
        true
    }

    async fn provision(&self, _handle: &SessionHandle) -> Result<Option<String>> {
        Ok(None)
    }

    async fn run(&self, handle: &SessionHandle, command: &str, opts: &ExecOpts) -> ExecutionResult {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&handle.workspace)
            .envs(merged_env(handle, opts));
        exec::capture(cmd, opts.timeout, opts.max_output_bytes).await
    }

    async fn start_server(&self, handle: &SessionHandle, command: &str, port: u16) -> Result<u32> {
        let log_path = server_log_path(&handle.workspace, port);
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::filesystem(parent, e))?;
        }
        let log = std::fs::File::create(&log_path).map_err(|e| Error::filesystem(&log_path, e))?;
        let log_err = log.try_clone().map_err(|e| Error::filesystem(&log_path, e))?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&handle.workspace)
            .envs(&handle.env)
            .env("PORT", port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            // Own process group so the whole server tree can be reclaimed.
            .process_group(0);

        let child = cmd.spawn().map_err(|e| Error::Spawn(e.to_string()))?;
        let pid = child
            .id()
            .ok_or_else(|| Error::Spawn("server exited before pid capture".to_string()))?;
        // Detach; the runtime reaps the child whenever it exits.
        drop(child);

        debug!(pid, port, "server spawned, probing readiness");
        self.wait_until_ready(port).await;
        Ok(pid)
    }

    async fn kill_process(&self, _handle: &SessionHandle, process_id: u32) {
        use nix::sys::signal::{kill, killpg, Signal};
        use nix::unistd::Pid;

        let pid = Pid::from_raw(process_id as i32);
        if killpg(pid, Signal::SIGKILL).is_err() {
            // Not a group leader (or already gone); try the process itself.
            let _ = kill(pid, Signal::SIGKILL);
        }
    }

    async fn teardown(&self, _handle: &SessionHandle) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Isolated container backend
// ---------------------------------------------------------------------------

/// One long-lived container per session: resource-capped, network-disabled,
/// workspace bind-mounted read-write. Commands exec into the existing
/// container, so startup cost is paid once per session.
pub struct IsolatedContainer {
    image: String,
}

impl IsolatedContainer {
    pub fn new(image: String) -> Self {
        Self { image }
    }

    fn container_name(session_id: &str) -> String {
        format!("enclave-{session_id}")
    }

    fn create_args(&self, handle: &SessionHandle) -> Vec<String> {
        let limits = &handle.limits;
        vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            Self::container_name(&handle.id),
            "--network".to_string(),
            "none".to_string(),
            "--memory".to_string(),
            format!("{}m", limits.memory_mb),
            "--cpus".to_string(),
            limits.cpus.to_string(),
            "--pids-limit".to_string(),
            "256".to_string(),
            "--tmpfs".to_string(),
            format!("/tmp:rw,size={}m", limits.disk_mb),
            "-v".to_string(),
            format!("{}:/workspace:rw", handle.workspace.display()),
            "-w".to_string(),
            "/workspace".to_string(),
            self.image.clone(),
            "sleep".to_string(),
            "infinity".to_string(),
        ]
    }

    fn exec_args(&self, container: &str, command: &str, env: &[(String, String)]) -> Vec<String> {
        let mut args = vec![
            "exec".to_string(),
            "-w".to_string(),
            "/workspace".to_string(),
        ];
        for (key, value) in env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(container.to_string());
        args.push("sh".to_string());
        args.push("-c".to_string());
        args.push(command.to_string());
        args
    }
}

#[async_trait]
impl ExecBackend for IsolatedContainer {
    fn mode(&self) -> ExecMode {
        ExecMode::Container
    }

    fn requires_gate(&self) -> bool {
        false
    }

    async fn provision(&self, handle: &SessionHandle) -> Result<Option<String>> {
        let name = Self::container_name(&handle.id);
        let output = tokio::time::timeout(
            PROVISION_TIMEOUT,
            Command::new("docker").args(self.create_args(handle)).output(),
        )
        .await
        .map_err(|_| Error::Provisioning("container start timed out".to_string()))?
        .map_err(|e| Error::Provisioning(format!("docker run: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Provisioning(format!(
                "docker run failed: {}",
                stderr.trim()
            )));
        }
        info!(container = %name, "container provisioned");
        Ok(Some(name))
    }

    async fn run(&self, handle: &SessionHandle, command: &str, opts: &ExecOpts) -> ExecutionResult {
        let Some(container) = handle.container.as_deref() else {
            // Unreachable through the manager; report a terminated result
            // with a diagnostic rather than panic.
            return ExecutionResult {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: -1,
                duration_ms: 0,
                error: Some("no container provisioned for session".to_string()),
                truncated: false,
            };
        };
        let env = merged_env(handle, opts);
        let mut cmd = Command::new("docker");
        cmd.args(self.exec_args(container, command, &env));
        exec::capture(cmd, opts.timeout, opts.max_output_bytes).await
    }

    async fn start_server(&self, handle: &SessionHandle, command: &str, port: u16) -> Result<u32> {
        let container = handle
            .container
            .as_deref()
            .ok_or_else(|| Error::Provisioning("session has no container".to_string()))?;

        // Log under the bind-mounted workspace so host-side tailing works.
        let log_rel = format!("{INTERNAL_DIR}/logs/server-{port}.log");
        let script =
            format!("mkdir -p {INTERNAL_DIR}/logs && nohup {command} > {log_rel} 2>&1 & echo $!");

        let mut args = vec![
            "exec".to_string(),
            "-w".to_string(),
            "/workspace".to_string(),
            "-e".to_string(),
            format!("PORT={port}"),
        ];
        for (key, value) in &handle.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(container.to_string());
        args.push("sh".to_string());
        args.push("-c".to_string());
        args.push(script);

        let output = tokio::time::timeout(
            SERVER_START_TIMEOUT,
            Command::new("docker").args(args).output(),
        )
        .await
        .map_err(|_| Error::Spawn("docker exec timed out starting server".to_string()))?
        .map_err(|e| Error::Spawn(format!("docker exec: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Spawn(format!("docker exec failed: {}", stderr.trim())));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .trim()
            .parse::<u32>()
            .map_err(|_| Error::Spawn(format!("unexpected pid output: {}", stdout.trim())))
    }

    async fn kill_process(&self, handle: &SessionHandle, process_id: u32) {
        // Teardown removes the container and every process in it; this only
        // matters while the session is still live.
        if let Some(container) = handle.container.as_deref() {
            let _ = Command::new("docker")
                .args(["exec", container, "kill", "-9", &process_id.to_string()])
                .output()
                .await;
        }
    }

    async fn teardown(&self, handle: &SessionHandle) -> Result<()> {
        let Some(container) = handle.container.as_deref() else {
            return Ok(());
        };
        let output = Command::new("docker")
            .args(["rm", "-f", container])
            .output()
            .await
            .map_err(|e| Error::Provisioning(format!("docker rm: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Provisioning(format!(
                "docker rm failed: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceLimits;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Instant;

    fn handle(id: &str, container: Option<&str>) -> SessionHandle {
        SessionHandle {
            id: id.to_string(),
            workspace: PathBuf::from("/tmp/enclave").join(id),
            container: container.map(|s| s.to_string()),
            limits: ResourceLimits {
                cpus: 0.5,
                memory_mb: 256,
                disk_mb: 64,
            },
            env: HashMap::new(),
            created_at: Instant::now(),
            backend: Arc::new(LocalProcess::new(Duration::from_secs(1))),
            exec_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    #[test]
    fn gate_applies_to_local_only() {
        assert!(LocalProcess::new(Duration::from_secs(1)).requires_gate());
        assert!(!IsolatedContainer::new("img".to_string()).requires_gate());
    }

    #[test]
    fn container_create_args() {
        let backend = IsolatedContainer::new("node:20".to_string());
        let args = backend.create_args(&handle("abc", None));

        assert_eq!(args[0], "run");
        assert!(args.contains(&"enclave-abc".to_string()));
        let net = args.iter().position(|a| a == "--network").unwrap();
        assert_eq!(args[net + 1], "none");
        let mem = args.iter().position(|a| a == "--memory").unwrap();
        assert_eq!(args[mem + 1], "256m");
        let cpus = args.iter().position(|a| a == "--cpus").unwrap();
        assert_eq!(args[cpus + 1], "0.5");
        assert!(args.contains(&"/tmp:rw,size=64m".to_string()));
        assert!(args.contains(&"/tmp/enclave/abc:/workspace:rw".to_string()));
        assert_eq!(args[args.len() - 3], "node:20");
        assert_eq!(&args[args.len() - 2..], ["sleep", "infinity"]);
    }

    #[test]
    fn container_exec_args() {
        let backend = IsolatedContainer::new("node:20".to_string());
        let env = vec![("NODE_ENV".to_string(), "test".to_string())];
        let args = backend.exec_args("enclave-abc", "npm test", &env);

        assert_eq!(args[0], "exec");
        assert!(args.contains(&"NODE_ENV=test".to_string()));
        assert_eq!(
            &args[args.len() - 4..],
            ["enclave-abc", "sh", "-c", "npm test"]
        );
    }

    #[test]
    fn merged_env_is_sorted_and_overridden() {
        let mut h = handle("abc", None);
        h.env.insert("A".to_string(), "session".to_string());
        h.env.insert("B".to_string(), "session".to_string());
        let mut opts = ExecOpts::default();
        opts.env.insert("B".to_string(), "call".to_string());

        let env = merged_env(&h, &opts);
        assert_eq!(
            env,
            vec![
                ("A".to_string(), "session".to_string()),
                ("B".to_string(), "call".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn local_run_uses_workspace_cwd() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut h = handle("cwd", None);
        h.workspace = dir.path().to_path_buf();

        let backend = LocalProcess::new(Duration::from_secs(1));
        let result = backend.run(&h, "pwd", &ExecOpts::default()).await;
        assert_eq!(result.exit_code, 0);
        let reported = PathBuf::from(result.stdout.trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn local_run_merges_env() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut h = handle("env", None);
        h.workspace = dir.path().to_path_buf();
        h.env.insert("GREETING".to_string(), "hello".to_string());

        let backend = LocalProcess::new(Duration::from_secs(1));
        let result = backend
            .run(&h, "echo \"$GREETING\"", &ExecOpts::default())
            .await;
        assert_eq!(result.stdout.trim(), "hello");
    }
}
