//! HTTP server implementation using Axum.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{ExecMode, ResourceOptions};
use crate::error::Error;
use crate::exec::ExecutionResult;
use crate::manager::{spawn_sweeper, CreateOptions};
use crate::procs::ProcessView;
use crate::state::{AppState, SessionStats, SessionView};

// Request/Response types
#[derive(Deserialize)]
struct CreateSessionRequest {
    owner: String,
    mode: Option<ExecMode>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    resources: ResourceOptions,
}

#[derive(Deserialize)]
struct ListSessionsQuery {
    owner: Option<String>,
}

#[derive(Deserialize)]
struct ExtendRequest {
    seconds: u64,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Encoding {
    #[default]
    Utf8,
    Base64,
}

#[derive(Deserialize)]
struct FileEntry {
    path: String,
    content: String,
    #[serde(default)]
    encoding: Encoding,
}

#[derive(Deserialize)]
struct WriteFilesRequest {
    files: Vec<FileEntry>,
}

#[derive(Serialize)]
struct WriteFilesResponse {
    written: usize,
}

#[derive(Serialize)]
struct ListFilesResponse {
    files: Vec<String>,
}

#[derive(Serialize)]
struct ReadFileResponse {
    path: String,
    /// File bytes, base64-encoded.
    content: String,
    size: usize,
}

#[derive(Deserialize)]
struct ExecRequest {
    command: String,
    timeout_ms: Option<u64>,
    #[serde(default)]
    env: HashMap<String, String>,
}

#[derive(Deserialize)]
struct InstallRequest {
    manager: String,
}

#[derive(Deserialize)]
struct StartServerRequest {
    command: String,
    port: u16,
}

#[derive(Deserialize)]
struct LogsQuery {
    #[serde(default = "default_log_lines")]
    lines: usize,
}

fn default_log_lines() -> usize {
    100
}

#[derive(Serialize)]
struct LogsResponse {
    lines: Vec<String>,
}

fn error_response(err: Error) -> (StatusCode, String) {
    let status = match &err {
        Error::SessionNotFound(_) | Error::ProcessNotFound(_) => StatusCode::NOT_FOUND,
        Error::CapacityExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
        Error::CommandRejected(_) => StatusCode::FORBIDDEN,
        Error::PathEscapesWorkspace(_) => StatusCode::BAD_REQUEST,
        Error::Provisioning(_) => StatusCode::BAD_GATEWAY,
        Error::Spawn(_) | Error::Filesystem { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

/// Run the HTTP server on the given port with the provided state.
pub async fn run_server(port: u16, state: AppState) {
    // Background expiry sweeper, independent of request traffic.
    spawn_sweeper(state.manager.clone());

    let app = Router::new()
        // Session management
        .route("/sessions", post(create_session))
        .route("/sessions", get(list_sessions))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id", delete(delete_session))
        .route("/sessions/:id/extend", post(extend_session))
        .route("/sessions/:id/stats", get(session_stats))
        // Workspace files
        .route("/sessions/:id/files", post(write_files))
        .route("/sessions/:id/files", get(list_files))
        .route("/sessions/:id/files/*path", get(read_file))
        // Execution
        .route("/sessions/:id/exec", post(exec_command))
        .route("/sessions/:id/install", post(install_dependencies))
        // Long-running servers
        .route("/sessions/:id/server", post(start_server))
        .route("/sessions/:id/processes", get(list_processes))
        .route("/sessions/:id/processes/:pid/logs", get(process_logs))
        // Health check
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

async fn health() -> &'static str {
    "OK"
}

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<SessionView>, (StatusCode, String)> {
    let opts = CreateOptions {
        mode: req.mode,
        env: req.env,
        resources: req.resources,
    };
    state
        .manager
        .create_session(&req.owner, opts)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<ListSessionsQuery>,
) -> Json<Vec<SessionView>> {
    Json(state.manager.list_sessions(query.owner.as_deref()).await)
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, (StatusCode, String)> {
    state
        .manager
        .get_session(&id)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn extend_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ExtendRequest>,
) -> Result<Json<SessionView>, (StatusCode, String)> {
    state
        .manager
        .extend_session(&id, Duration::from_secs(req.seconds))
        .await
        .map(Json)
        .map_err(error_response)
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    // Destroying an absent session is a no-op, not an error.
    state.manager.destroy_session(&id).await;
    StatusCode::NO_CONTENT
}

async fn session_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionStats>, (StatusCode, String)> {
    state
        .manager
        .session_stats(&id)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn write_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<WriteFilesRequest>,
) -> Result<Json<WriteFilesResponse>, (StatusCode, String)> {
    let mut files = Vec::with_capacity(req.files.len());
    for entry in req.files {
        let content = match entry.encoding {
            Encoding::Utf8 => entry.content.into_bytes(),
            Encoding::Base64 => BASE64.decode(&entry.content).map_err(|e| {
                (
                    StatusCode::BAD_REQUEST,
                    format!("invalid base64 for {}: {}", entry.path, e),
                )
            })?,
        };
        files.push((entry.path, content));
    }
    state
        .manager
        .write_files(&id, files)
        .await
        .map(|written| Json(WriteFilesResponse { written }))
        .map_err(error_response)
}

async fn list_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ListFilesResponse>, (StatusCode, String)> {
    state
        .manager
        .list_files(&id)
        .await
        .map(|files| Json(ListFilesResponse { files }))
        .map_err(error_response)
}

async fn read_file(
    State(state): State<AppState>,
    Path((id, path)): Path<(String, String)>,
) -> Result<Json<ReadFileResponse>, (StatusCode, String)> {
    let content = state
        .manager
        .read_file(&id, &path)
        .await
        .map_err(error_response)?;
    Ok(Json(ReadFileResponse {
        path,
        size: content.len(),
        content: BASE64.encode(content),
    }))
}

async fn exec_command(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ExecRequest>,
) -> Result<Json<ExecutionResult>, (StatusCode, String)> {
    let opts = state.manager.exec_opts(req.timeout_ms, req.env);
    state
        .manager
        .execute(&id, &req.command, opts)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn install_dependencies(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<InstallRequest>,
) -> Result<Json<ExecutionResult>, (StatusCode, String)> {
    state
        .manager
        .install_dependencies(&id, &req.manager)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn start_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<StartServerRequest>,
) -> Result<Json<ProcessView>, (StatusCode, String)> {
    state
        .manager
        .start_server(&id, &req.command, req.port)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn list_processes(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ProcessView>>, (StatusCode, String)> {
    state
        .manager
        .list_processes(&id)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn process_logs(
    State(state): State<AppState>,
    Path((id, pid)): Path<(String, u32)>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, (StatusCode, String)> {
    state
        .manager
        .process_logs(&id, pid, query.lines)
        .await
        .map(|lines| Json(LogsResponse { lines }))
        .map_err(error_response)
}
