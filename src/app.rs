use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{Multipart, Path, Query, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::column::MERGE_KEY_COLS;
use crate::config::{self, Config, StoreKind};
use crate::downloader;
use crate::error::{DbError, Result};
use crate::loader;
use crate::merge::{self, MergeReport};
use crate::mutator::{self, RowStatus};
use crate::store::{FileStore, MemoryStore, TableStore};
use crate::table::Table;
use crate::template::{self, Templates};

/// Cookie carrying the browser's table key
pub const SESSION_COOKIE: &str = "dexcel_session";

/// Key of the table owned by the calling browser
#[derive(Debug, Clone)]
pub struct SessionKey(pub String);

pub struct AppState {
    store: Arc<dyn TableStore>,
    templates: RwLock<Templates>,
    templates_path: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AppState {
    pub fn new(store: Arc<dyn TableStore>, templates: Templates, templates_path: PathBuf) -> Self {
        AppState {
            store,
            templates: RwLock::new(templates),
            templates_path,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key.to_string()).or_default().clone()
    }

    // Drops the map entry once no other request holds or waits on it
    fn release(&self, key: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks.get(key).is_some_and(|held| Arc::strong_count(held) == 1) {
            locks.remove(key);
        }
    }

    fn templates(&self) -> Templates {
        self.templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn load(&self, key: &str) -> Result<Table> {
        self.store.load(key)?.ok_or(DbError::NoTable)
    }

    /// Replace the stored table for `key`.
    async fn replace(&self, key: &str, table: &Table) -> Result<()> {
        let lock = self.lock_for(key);
        let saved = {
            let _guard = lock.lock().await;
            self.store.save(key, table)
        };
        self.release(key, lock);
        saved
    }

    /// Load, mutate and store the table for `key` as one unit.
    ///
    /// Requests for the same key are serialized. When `f` fails nothing is
    /// written back.
    async fn update<T>(&self, key: &str, f: impl FnOnce(&mut Table) -> Result<T>) -> Result<T> {
        let lock = self.lock_for(key);
        let out = {
            let _guard = lock.lock().await;
            self.load(key).and_then(|mut table| {
                let out = f(&mut table)?;
                self.store.save(key, &table)?;
                Ok(out)
            })
        };
        self.release(key, lock);
        out
    }
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    message: Option<String>,
}

impl StatusResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(StatusResponse {
            status: "ok".to_string(),
            message: Some(message.into()),
        })
    }
}

impl IntoResponse for DbError {
    fn into_response(self) -> Response {
        let status = match &self {
            DbError::MissingColumn { .. }
            | DbError::UnknownPlaceholder(_)
            | DbError::MalformedTemplate(_)
            | DbError::EmptyTemplate(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DbError::Malformed(_) | DbError::RowOutOfRange { .. } | DbError::HeaderRow => {
                StatusCode::BAD_REQUEST
            }
            DbError::NoTable => StatusCode::NOT_FOUND,
            DbError::IoError(_) | DbError::JsonError(_) | DbError::XlsxError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            warn!("request failed: {}", self);
        }
        let body = StatusResponse {
            status: "error".to_string(),
            message: Some(self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Deserialize)]
struct MarkRow {
    row_idx: usize,
    status: RowStatus,
}

#[derive(Deserialize)]
struct AddRow {
    #[serde(default)]
    values: Vec<Value>,
}

#[derive(Deserialize)]
struct FilterQuery {
    column: String,
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct TableResponse {
    headers: Vec<String>,
    data: Vec<Vec<String>>,
    status: Option<Vec<RowStatus>>,
}

#[derive(Serialize)]
struct FilteredRow {
    row_idx: usize,
    values: Vec<String>,
}

#[derive(Serialize)]
struct UploadResponse {
    status: String,
    filename: String,
    headers: Vec<String>,
    rows: usize,
}

#[derive(Serialize)]
struct ImportResponse {
    status: String,
    imported: usize,
}

/// Build the application router around `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/api/upload", post(upload_table))
        .route("/api/import", post(import_file))
        .route("/api/table", get(get_table))
        .route("/api/filter", get(filter_table))
        .route("/api/mark_row", post(mark_row))
        .route("/api/copy_text/:row_idx", get(copy_text))
        .route("/api/add_row", post(add_row))
        .route("/api/delete_row/:row_idx", post(delete_row))
        .route("/api/merge", post(merge_files))
        .route("/api/templates", get(get_templates).post(save_templates))
        .route("/download", get(download_table))
        .route("/download/csv", get(download_csv))
        .layer(middleware::from_fn(ensure_session))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the table store selected by `config`.
pub fn open_store(config: &Config) -> Result<Arc<dyn TableStore>> {
    let store: Arc<dyn TableStore> = match config.store {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::File => Arc::new(FileStore::open(&config.data_dir)?),
    };
    Ok(store)
}

pub async fn run(config: Config) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let store = open_store(&config)?;
    let templates_path = config.templates_path();
    let templates = config::load_templates(&templates_path)?;

    // Setup app state
    let app_state = Arc::new(AppState::new(store, templates, templates_path));
    let app = router(app_state);

    // Start server
    let listener = TcpListener::bind(&config.addr).await?;
    info!("Listening on http://{} ({:?} store)", config.addr, config.store);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Session middleware
///
/// Reads the table key from the session cookie, issuing a fresh one when the
/// browser has none, and hands it to handlers as a [`SessionKey`] extension.
async fn ensure_session(jar: CookieJar, mut request: Request, next: Next) -> Response {
    let existing = jar
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty());

    let (key, fresh) = match existing {
        Some(key) => (key, false),
        None => (Uuid::new_v4().to_string(), true),
    };
    request.extensions_mut().insert(SessionKey(key.clone()));

    let response = next.run(request).await;
    if fresh {
        let cookie = Cookie::build((SESSION_COOKIE, key)).path("/").http_only(true);
        (jar.add(cookie), response).into_response()
    } else {
        response
    }
}

async fn serve_index() -> Html<&'static str> {
    Html(include_str!("./static/index.html"))
}

// Collect every file sent under `field_name` as (file name, bytes).
async fn read_files(multipart: &mut Multipart, field_name: &str) -> Result<Vec<(String, Vec<u8>)>> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DbError::Malformed(e.to_string()))?
    {
        if field.name() != Some(field_name) {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload.xlsx").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| DbError::Malformed(e.to_string()))?;
        files.push((filename, bytes.to_vec()));
    }
    Ok(files)
}

async fn read_single_file(multipart: &mut Multipart, field_name: &str) -> Result<(String, Vec<u8>)> {
    read_files(multipart, field_name)
        .await?
        .into_iter()
        .find(|(_, bytes)| !bytes.is_empty())
        .ok_or_else(|| DbError::Malformed(format!("no file received in '{}'", field_name)))
}

async fn upload_table(
    State(state): State<Arc<AppState>>,
    Extension(SessionKey(key)): Extension<SessionKey>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let (filename, bytes) = read_single_file(&mut multipart, "excel_file").await?;
    let table = loader::load_table(&filename, &bytes)?;
    state.replace(&key, &table).await?;
    info!("loaded '{}' with {} row(s)", filename, table.row_count());

    Ok(Json(UploadResponse {
        status: "DB caricato".to_string(),
        filename,
        headers: table.headers().to_vec(),
        rows: table.row_count(),
    }))
}

async fn import_file(
    State(state): State<Arc<AppState>>,
    Extension(SessionKey(key)): Extension<SessionKey>,
    mut multipart: Multipart,
) -> Result<Json<ImportResponse>> {
    let (filename, bytes) = read_single_file(&mut multipart, "file").await?;
    let source = loader::load_table(&filename, &bytes)?;
    let imported = state
        .update(&key, |table| merge::merge(table, &[source], &MERGE_KEY_COLS))
        .await?;
    info!("imported {} row(s) from '{}'", imported, filename);

    Ok(Json(ImportResponse {
        status: "ok".to_string(),
        imported,
    }))
}

async fn merge_files(
    State(state): State<Arc<AppState>>,
    Extension(SessionKey(key)): Extension<SessionKey>,
    mut multipart: Multipart,
) -> Result<Json<MergeReport>> {
    let files = read_files(&mut multipart, "files").await?;
    if files.is_empty() {
        return Err(DbError::Malformed("no files to merge".to_string()));
    }

    let decoded: Vec<(String, Result<Table>)> = files
        .into_iter()
        .map(|(name, bytes)| {
            let table = loader::load_table(&name, &bytes);
            (name, table)
        })
        .collect();

    let report = state
        .update(&key, |table| merge::merge_files(table, decoded, &MERGE_KEY_COLS))
        .await?;
    Ok(Json(report))
}

async fn get_table(
    State(state): State<Arc<AppState>>,
    Extension(SessionKey(key)): Extension<SessionKey>,
) -> Result<Json<TableResponse>> {
    let table = state.load(&key)?;
    Ok(Json(TableResponse {
        headers: table.headers().to_vec(),
        data: table.rows().to_vec(),
        status: mutator::statuses(&table),
    }))
}

async fn filter_table(
    State(state): State<Arc<AppState>>,
    Extension(SessionKey(key)): Extension<SessionKey>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Vec<FilteredRow>>> {
    let table = state.load(&key)?;
    let rows = mutator::filter_rows(&table, &query.column, &query.text)?
        .into_iter()
        .map(|(row_idx, values)| FilteredRow {
            row_idx,
            values: values.to_vec(),
        })
        .collect();
    Ok(Json(rows))
}

async fn mark_row(
    State(state): State<Arc<AppState>>,
    Extension(SessionKey(key)): Extension<SessionKey>,
    Json(payload): Json<MarkRow>,
) -> Result<Json<StatusResponse>> {
    let sheet_row = mutator::sheet_row(payload.row_idx);
    state
        .update(&key, |table| mutator::set_status(table, sheet_row, payload.status))
        .await?;
    Ok(StatusResponse::ok(format!("row {} updated", payload.row_idx)))
}

#[derive(Serialize)]
struct CopyText {
    text: String,
}

async fn copy_text(
    State(state): State<Arc<AppState>>,
    Extension(SessionKey(key)): Extension<SessionKey>,
    Path(row_idx): Path<usize>,
) -> Result<Json<CopyText>> {
    let table = state.load(&key)?;
    let text = template::render(&table, mutator::sheet_row(row_idx), &state.templates())?;
    Ok(Json(CopyText { text }))
}

// JSON scalars as cell text: strings verbatim, null as empty.
fn cell_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

async fn add_row(
    State(state): State<Arc<AppState>>,
    Extension(SessionKey(key)): Extension<SessionKey>,
    Json(payload): Json<AddRow>,
) -> Result<Json<StatusResponse>> {
    let values: Vec<String> = payload.values.into_iter().map(cell_text).collect();
    let rows = state
        .update(&key, |table| {
            mutator::append_row(table, values);
            Ok(table.row_count())
        })
        .await?;
    Ok(StatusResponse::ok(format!("row added, {} row(s) in DB", rows)))
}

async fn delete_row(
    State(state): State<Arc<AppState>>,
    Extension(SessionKey(key)): Extension<SessionKey>,
    Path(row_idx): Path<usize>,
) -> Result<Json<StatusResponse>> {
    state
        .update(&key, |table| mutator::delete_row(table, mutator::sheet_row(row_idx)))
        .await?;
    Ok(StatusResponse::ok(format!("row {} deleted", row_idx)))
}

async fn get_templates(State(state): State<Arc<AppState>>) -> Json<Templates> {
    Json(state.templates())
}

async fn save_templates(
    State(state): State<Arc<AppState>>,
    Json(templates): Json<Templates>,
) -> Result<Json<StatusResponse>> {
    config::save_templates(&state.templates_path, &templates)?;
    *state
        .templates
        .write()
        .unwrap_or_else(PoisonError::into_inner) = templates;
    info!("templates saved to {}", state.templates_path.display());
    Ok(StatusResponse::ok("templates saved"))
}

fn attachment(content_type: &str, extension: &str, body: Body) -> Response {
    let filename = format!(
        "DB_{}.{}",
        chrono::Local::now().format("%Y%m%d_%H%M%S"),
        extension
    );
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}

async fn download_table(
    State(state): State<Arc<AppState>>,
    Extension(SessionKey(key)): Extension<SessionKey>,
) -> Result<Response> {
    let table = state.load(&key)?;
    let buffer = downloader::to_xlsx(&table)?;
    Ok(attachment(
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xlsx",
        Body::from(buffer),
    ))
}

async fn download_csv(
    State(state): State<Arc<AppState>>,
    Extension(SessionKey(key)): Extension<SessionKey>,
) -> Result<Response> {
    let table = state.load(&key)?;
    Ok(attachment(
        "text/csv; charset=utf-8",
        "csv",
        Body::from(downloader::to_csv(&table)),
    ))
}
