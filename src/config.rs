//! Engine configuration. Everything is supplied through flags or environment
//! variables and fixed at process start.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which execution backend newly created sessions get.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// Direct subprocess execution in the session workspace, guarded by the
    /// command allow-list.
    Local,
    /// Execution inside a long-lived, network-disabled container bound to the
    /// session workspace.
    Container,
}

/// Per-session resource ceilings, fixed at session creation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpus: f64,
    pub memory_mb: u64,
    pub disk_mb: u64,
}

/// Partial limit overrides accepted at session creation; anything unset falls
/// back to the configured defaults.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ResourceOptions {
    pub cpus: Option<f64>,
    pub memory_mb: Option<u64>,
    pub disk_mb: Option<u64>,
}

impl ResourceLimits {
    pub fn with_overrides(self, opts: ResourceOptions) -> Self {
        Self {
            cpus: opts.cpus.unwrap_or(self.cpus),
            memory_mb: opts.memory_mb.unwrap_or(self.memory_mb),
            disk_mb: opts.disk_mb.unwrap_or(self.disk_mb),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory under which every session workspace lives.
    pub base_dir: PathBuf,
    pub mode: ExecMode,
    pub max_sessions: usize,
    /// Sliding idle timeout; every successful foreground operation pushes a
    /// session's expiry this far out.
    pub idle_timeout: Duration,
    /// Hard cap on total session lifetime; no amount of activity or explicit
    /// extension moves the expiry past `created_at + max_session_age`.
    pub max_session_age: Duration,
    pub sweep_interval: Duration,
    pub limits: ResourceLimits,
    pub container_image: String,
    pub command_timeout: Duration,
    pub max_output_bytes: usize,
    /// How long `start_server` waits for a spawned server to answer before
    /// giving up on the readiness probe.
    pub server_ready_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: std::env::temp_dir().join("enclave"),
            mode: ExecMode::Local,
            max_sessions: 32,
            idle_timeout: Duration::from_secs(300),
            max_session_age: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            limits: ResourceLimits {
                cpus: 1.0,
                memory_mb: 2048,
                disk_mb: 512,
            },
            container_image: "node:20-bookworm-slim".to_string(),
            command_timeout: Duration::from_secs(300),
            max_output_bytes: 1024 * 1024,
            server_ready_timeout: Duration::from_secs(10),
        }
    }
}

/// Flag/environment surface for [`Config`], flattened into the `serve`
/// subcommand.
#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    /// Base directory for session workspaces
    #[arg(long, env = "ENCLAVE_BASE_DIR", default_value = "/tmp/enclave")]
    base_dir: PathBuf,

    /// Execution backend for new sessions
    #[arg(long, env = "ENCLAVE_EXEC_MODE", value_enum, default_value = "local")]
    exec_mode: ExecMode,

    /// Maximum number of concurrent live sessions
    #[arg(long, env = "ENCLAVE_MAX_SESSIONS", default_value = "32")]
    max_sessions: usize,

    /// Idle timeout in seconds before a session is reclaimed
    #[arg(long, env = "ENCLAVE_IDLE_TIMEOUT_SECS", default_value = "300")]
    idle_timeout_secs: u64,

    /// Hard cap on total session lifetime in seconds
    #[arg(long, env = "ENCLAVE_MAX_SESSION_AGE_SECS", default_value = "3600")]
    max_session_age_secs: u64,

    /// Interval between expiry sweeps in seconds
    #[arg(long, env = "ENCLAVE_SWEEP_INTERVAL_SECS", default_value = "60")]
    sweep_interval_secs: u64,

    /// Default CPU share per session
    #[arg(long, env = "ENCLAVE_CPU_LIMIT", default_value = "1.0")]
    cpu_limit: f64,

    /// Default memory ceiling per session in MB
    #[arg(long, env = "ENCLAVE_MEMORY_LIMIT_MB", default_value = "2048")]
    memory_limit_mb: u64,

    /// Default disk quota per session in MB
    #[arg(long, env = "ENCLAVE_DISK_LIMIT_MB", default_value = "512")]
    disk_limit_mb: u64,

    /// Image used for container-mode sessions
    #[arg(
        long,
        env = "ENCLAVE_CONTAINER_IMAGE",
        default_value = "node:20-bookworm-slim"
    )]
    container_image: String,

    /// Default per-command timeout in milliseconds
    #[arg(long, env = "ENCLAVE_COMMAND_TIMEOUT_MS", default_value = "300000")]
    command_timeout_ms: u64,

    /// Captured output ceiling per command in bytes
    #[arg(long, env = "ENCLAVE_MAX_OUTPUT_BYTES", default_value = "1048576")]
    max_output_bytes: usize,
}

impl ConfigArgs {
    pub fn into_config(self) -> Config {
        Config {
            base_dir: self.base_dir,
            mode: self.exec_mode,
            max_sessions: self.max_sessions,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            max_session_age: Duration::from_secs(self.max_session_age_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            limits: ResourceLimits {
                cpus: self.cpu_limit,
                memory_mb: self.memory_limit_mb,
                disk_mb: self.disk_limit_mb,
            },
            container_image: self.container_image,
            command_timeout: Duration::from_millis(self.command_timeout_ms),
            max_output_bytes: self.max_output_bytes,
            server_ready_timeout: Duration::from_secs(10),
        }
    }
}
