//! Command execution: bounded subprocess capture shared by both backends.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::process::Command;

pub const TRUNCATION_MARKER: &str = "\n... [output truncated]";

/// Outcome of one command invocation. Only produced once the command has
/// fully terminated or its timeout elapsed; a timeout comes back as a
/// non-zero exit with `error` populated, never as an unbounded wait.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub truncated: bool,
}

/// Per-invocation options.
#[derive(Debug, Clone)]
pub struct ExecOpts {
    pub timeout: Duration,
    pub env: HashMap<String, String>,
    pub max_output_bytes: usize,
}

impl Default for ExecOpts {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            env: HashMap::new(),
            max_output_bytes: 1024 * 1024,
        }
    }
}

/// Spawn `cmd` and wait for it under a hard wall-clock timeout, capturing
/// stdout/stderr up to the output ceiling. The child is killed when the
/// timeout fires. Spawn and wait failures are folded into the result rather
/// than escalated; the caller always gets a fully terminated outcome.
pub async fn capture(mut cmd: Command, timeout: Duration, max_output_bytes: usize) -> ExecutionResult {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return failed(format!("spawn: {e}"), start),
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let (stdout, out_truncated) =
                truncate_output(String::from_utf8_lossy(&output.stdout).into_owned(), max_output_bytes);
            let (stderr, err_truncated) =
                truncate_output(String::from_utf8_lossy(&output.stderr).into_owned(), max_output_bytes);
            ExecutionResult {
                stdout,
                stderr,
                exit_code: output.status.code().unwrap_or(-1),
                duration_ms: start.elapsed().as_millis() as u64,
                error: None,
                truncated: out_truncated || err_truncated,
            }
        }
        Ok(Err(e)) => failed(format!("wait: {e}"), start),
        // Dropping the in-flight wait kills the child via kill_on_drop.
        Err(_) => ExecutionResult {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: -1,
            duration_ms: start.elapsed().as_millis() as u64,
            error: Some(format!("command timed out after {}ms", timeout.as_millis())),
            truncated: true,
        },
    }
}

fn failed(error: String, start: Instant) -> ExecutionResult {
    ExecutionResult {
        stdout: String::new(),
        stderr: String::new(),
        exit_code: -1,
        duration_ms: start.elapsed().as_millis() as u64,
        error: Some(error),
        truncated: false,
    }
}

/// Cap a captured stream at `max` bytes, marking the cut.
pub fn truncate_output(mut text: String, max: usize) -> (String, bool) {
    if text.len() <= max {
        return (text, false);
    }
    // Truncate on a char boundary at or below the ceiling.
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str(TRUNCATION_MARKER);
    (text, true)
}

/// Map a package-manager name to its canonical install invocation. The
/// returned command line runs through the ordinary execution path (gate
/// included in local mode).
pub fn install_invocation(manager: &str) -> Option<&'static str> {
    match manager {
        "npm" => Some("npm install"),
        "yarn" => Some("yarn install"),
        "pnpm" => Some("pnpm install"),
        "bun" => Some("bun install"),
        "pip" | "pip3" => Some("pip install -r requirements.txt"),
        "cargo" => Some("cargo build"),
        "go" => Some("go mod download"),
        _ => None,
    }
}
