//!
//! filesync HTTP server
//! --------------------
//! Axum adapter over [`SyncService`]. Handlers authenticate with HTTP Basic
//! credentials, call exactly one service operation and map [`AppError`] to a
//! status plus `{"status","code","error"}` body. Service calls hash
//! credentials and touch the filesystem, so they run on tokio's blocking pool.
//!
//! Routes (prefix `/API/v1`):
//! - `GET /` welcome text, no auth.
//! - `POST /user/create` `{user, psw}`, no auth.
//! - `POST /user/diffs` `{timestamp}`.
//! - `GET|POST|PUT /files/{*path}` download, upload, update.
//! - `POST /actions/{delete|copy|move}` `{path}` or `{file_src, file_dest}`.

use std::net::SocketAddr;
use std::path::Path as FsPath;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::config::{ServerConfig, ENV_DATA_FOLDER};
use crate::diff::{parse_since, DiffOutcome};
use crate::engine::FileAction;
use crate::error::{AppError, AppResult};
use crate::service::SyncService;

pub const API_PREFIX: &str = "/API/v1";

pub type AppState = Arc<SyncService>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if self.is_fatal() {
            error!(target: "filesync::server", "request failed: {}", self);
        } else {
            info!(target: "filesync::server", "request rejected: {}", self);
        }
        let mut resp = (status, Json(self.to_json())).into_response();
        if matches!(self, AppError::Unauthenticated { .. }) {
            resp.headers_mut().insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Basic realm=\"filesync\""));
        }
        resp
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload.map(|Json(v)| v).map_err(|e| AppError::malformed("invalid_body", e.body_text()))
}

/// Decode `Authorization: Basic base64(user:password)`.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = raw.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, psw) = text.split_once(':')?;
    Some((user.to_string(), psw.to_string()))
}

/// Run synchronous service work (Argon2, std::fs) on the blocking pool.
async fn blocking<T, F>(state: &AppState, work: F) -> AppResult<T>
where
    F: FnOnce(&SyncService) -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    let svc = state.clone();
    tokio::task::spawn_blocking(move || work(&svc))
        .await
        .map_err(|e| AppError::io("task_failed", e.to_string()))?
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> AppResult<String> {
    let Some((user, psw)) = basic_credentials(headers) else {
        return Err(AppError::unauthenticated("missing_credentials", "basic authentication required"));
    };
    let name = user.clone();
    if !blocking(state, move |svc| Ok(svc.verify(&name, &psw))).await? {
        warn!(target: "filesync::server", "authentication failed for '{}'", user);
        return Err(AppError::unauthenticated("bad_credentials", "invalid user or password"));
    }
    Ok(user)
}

async fn welcome() -> String {
    format!("Welcome to filesync. Local time is {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
}

#[derive(Debug, Deserialize)]
struct CreateUserPayload { user: String, psw: String }

async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserPayload>, JsonRejection>,
) -> AppResult<Response> {
    let CreateUserPayload { user, psw } = json_body(payload)?;
    let name = user.clone();
    blocking(&state, move |svc| svc.register(&name, &psw)).await?;
    Ok((StatusCode::CREATED, Json(json!({"status": 201, "user": user}))).into_response())
}

async fn user_diffs(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Response> {
    let user = authenticate(&state, &headers).await?;
    let body = json_body(payload)?;
    let since = parse_since(body.get("timestamp").unwrap_or(&Value::Null))?;
    match blocking(&state, move |svc| svc.diffs_since(&user, since)).await? {
        DiffOutcome::UpToDate => Ok(StatusCode::NO_CONTENT.into_response()),
        DiffOutcome::Changes(changes) => Ok((StatusCode::OK, Json(changes)).into_response()),
    }
}

async fn download_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<String>,
) -> AppResult<Response> {
    let user = authenticate(&state, &headers).await?;
    let bytes = blocking(&state, move |svc| svc.download(&user, &path)).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes).into_response())
}

async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<String>,
    body: Bytes,
) -> AppResult<Response> {
    let user = authenticate(&state, &headers).await?;
    let key = blocking(&state, move |svc| svc.upload(&user, &path, &body)).await?;
    Ok((StatusCode::CREATED, Json(json!({"status": 201, "path": key}))).into_response())
}

async fn update_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<String>,
    body: Bytes,
) -> AppResult<Response> {
    let user = authenticate(&state, &headers).await?;
    let key = blocking(&state, move |svc| svc.update(&user, &path, &body)).await?;
    Ok((StatusCode::OK, Json(json!({"status": 200, "path": key}))).into_response())
}

#[derive(Debug, Deserialize)]
struct ActionPayload {
    path: Option<String>,
    file_src: Option<String>,
    file_dest: Option<String>,
}

fn required(field: Option<String>, name: &str) -> AppResult<String> {
    field.ok_or_else(|| AppError::malformed("missing_field", format!("field '{}' is required", name)))
}

async fn file_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(action): Path<String>,
    payload: Result<Json<ActionPayload>, JsonRejection>,
) -> AppResult<Response> {
    let user = authenticate(&state, &headers).await?;
    let action = match action.as_str() {
        "delete" => {
            let p = json_body(payload)?;
            FileAction::Delete { path: required(p.path, "path")? }
        }
        "copy" | "move" => {
            let p = json_body(payload)?;
            let src = required(p.file_src, "file_src")?;
            let dst = required(p.file_dest, "file_dest")?;
            if action == "copy" { FileAction::Copy { src, dst } } else { FileAction::Move { src, dst } }
        }
        other => return Err(AppError::not_found("unknown_action", format!("no action named '{}'", other))),
    };
    let key = blocking(&state, move |svc| svc.apply(&user, action)).await?;
    Ok((StatusCode::OK, Json(json!({"status": 200, "path": key}))).into_response())
}

/// Build the router over an opened service.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/user/create", post(create_user))
        .route("/user/diffs", post(user_diffs))
        .route("/files/{*path}", get(download_file).post(upload_file).put(update_file))
        .route("/actions/{action}", post(file_action));
    Router::new()
        .route("/", get(welcome))
        .nest(API_PREFIX, api)
        .with_state(state)
}

/// Snapshot both documents every `every_secs` seconds until the process exits.
pub fn spawn_backup_ticker(state: AppState, every_secs: u64) {
    if every_secs == 0 {
        info!(target: "filesync::backup", "periodic backup disabled");
        return;
    }
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(every_secs)).await;
            if let Err(e) = state.backup(None) {
                warn!(target: "filesync::backup", "periodic backup failed: {}", e);
            }
        }
    });
}

fn log_startup_folders(data_root: &FsPath) {
    let cwd = std::env::current_dir().ok();
    let exe = std::env::current_exe().ok();
    let data_env = std::env::var(ENV_DATA_FOLDER).ok();
    info!(
        target: "startup",
        "filesync starting. Folder configuration: cwd={:?}, exe={:?}, data_root_param={:?}, {}_env={:?}",
        cwd, exe, data_root, ENV_DATA_FOLDER, data_env
    );
    info!(target: "startup", "Path existence: data_root_exists={}", data_root.exists());
}

/// Serve the API on an already-bound listener.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Open the data root, start the optional backup ticker and serve until shutdown.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    log_startup_folders(&config.data_root);
    let service = SyncService::open(&config.data_root)
        .with_context(|| format!("While opening data root: {}", config.data_root.display()))?;
    info!(
        target: "startup",
        "loaded {} users and {} change-log entries",
        service.users().user_count(), service.history().len()
    );
    let state: AppState = Arc::new(service);
    spawn_backup_ticker(state.clone(), config.backup_interval_secs);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!(target: "filesync::server", "Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, state).await
}
