//! Enclave - ephemeral code-execution sandbox with HTTP API and stateful
//! sessions.
//!
//! Usage:
//!   enclave serve [--port 8080]          # Start HTTP server
//!   enclave --run -- <command> [args]    # One-shot command in a throwaway workspace

#[cfg(not(unix))]
compile_error!("enclave requires a Unix host (process groups and `sh`).");

mod backend;
mod config;
mod error;
mod exec;
mod gate;
mod http_server;
mod manager;
mod procs;
mod state;
mod workspace;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use backend::{ExecBackend, LocalProcess};
use config::ConfigArgs;

#[derive(Parser, Debug)]
#[command(name = "enclave")]
#[command(about = "Ephemeral code-execution sandbox with stateful sessions")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Run a single command in a throwaway workspace and exit
    #[arg(long)]
    run: bool,

    /// Timeout for the one-shot command in milliseconds
    #[arg(long, default_value = "300000")]
    timeout_ms: u64,

    /// Command and arguments to run
    #[arg(last = true)]
    cmd_args: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(long, env = "ENCLAVE_PORT", default_value = "8080")]
        port: u16,

        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[tokio::main]
async fn main() {
    use std::process::exit;

    tracing_subscriber::fmt::init();

    let args = Args::parse();

    match args.command {
        Some(Commands::Serve { port, config }) => {
            let config = config.into_config();
            if let Err(e) = tokio::fs::create_dir_all(&config.base_dir).await {
                eprintln!(
                    "Error: cannot create base directory {}: {}",
                    config.base_dir.display(),
                    e
                );
                exit(1);
            }
            let manager = manager::SessionManager::new(config);
            http_server::run_server(port, state::AppState { manager }).await;
        }
        None if args.run => {
            if args.cmd_args.is_empty() {
                eprintln!("Error: No command specified");
                exit(1);
            }
            let command = args.cmd_args.join(" ");
            match run_oneshot(&command, args.timeout_ms).await {
                Ok(result) => {
                    print!("{}", result.stdout);
                    eprint!("{}", result.stderr);
                    if let Some(error) = result.error {
                        eprintln!("Error: {}", error);
                    }
                    exit(result.exit_code);
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    exit(1);
                }
            }
        }
        None => {
            eprintln!("Error: Use 'serve' subcommand or --run flag");
            exit(1);
        }
    }
}

/// Run one command in a fresh throwaway workspace through the local backend,
/// cleaning the workspace up afterwards.
async fn run_oneshot(command: &str, timeout_ms: u64) -> anyhow::Result<exec::ExecutionResult> {
    let workspace = std::env::temp_dir().join(format!("enclave-oneshot-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&workspace)
        .with_context(|| format!("creating one-shot workspace {}", workspace.display()))?;

    let backend: Arc<dyn ExecBackend> = Arc::new(LocalProcess::new(Duration::from_secs(1)));
    let handle = state::SessionHandle {
        id: "oneshot".to_string(),
        workspace: workspace.clone(),
        container: None,
        limits: config::Config::default().limits,
        env: Default::default(),
        created_at: std::time::Instant::now(),
        backend: Arc::clone(&backend),
        exec_lock: Arc::new(tokio::sync::Mutex::new(())),
    };
    let opts = exec::ExecOpts {
        timeout: Duration::from_millis(timeout_ms),
        ..Default::default()
    };

    let result = backend.run(&handle, command, &opts).await;
    let _ = std::fs::remove_dir_all(&workspace);
    Ok(result)
}
