//! # Project File Manager
//!
//! - `GET    /files?path&recursive` — list a directory (or the whole tree)
//! - `POST   /files/upload`         — replace the project with a ZIP archive
//! - `GET    /files/read?path`      — read a text file
//! - `PUT    /files`                — overwrite an existing file
//! - `DELETE /files?path`           — delete a file or a directory tree
//!
//! Store operations are synchronous and run on the blocking pool.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use deskhub_core::{Entry, ProjectError, ProjectPath};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::AppError;
use crate::extractors::{extract_json, extract_query};
use crate::state::AppState;

/// Multipart framing allowance on top of the archive itself.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

const UPLOAD_FIELD: &str = "file";

/// Build the file manager router. `max_upload_bytes` bounds the upload body.
pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/files",
            get(list_files).put(write_file).delete(delete_entry),
        )
        .route(
            "/files/upload",
            post(upload_project).layer(DefaultBodyLimit::max(
                max_upload_bytes.saturating_add(MULTIPART_OVERHEAD),
            )),
        )
        .route("/files/read", get(read_file))
}

// -- Request / response types -------------------------------------------------

/// Listing parameters.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Directory to list, relative to the project root. Defaults to the root.
    pub path: Option<String>,
    /// `true` or `1` for a nested listing of every descendant.
    pub recursive: Option<String>,
}

impl ListQuery {
    fn is_recursive(&self) -> bool {
        matches!(self.recursive.as_deref(), Some("true" | "1"))
    }
}

/// A single path parameter.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PathQuery {
    /// Path relative to the project root.
    pub path: String,
}

/// Directory listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct ListResponse {
    /// Entries with `name`, `type`, `path`, `size` (files) and `children`
    /// (directories in recursive listings).
    #[schema(value_type = Vec<Object>)]
    pub files: Vec<Entry>,
}

/// Result of a project upload.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    /// Files extracted.
    pub files: usize,
    /// Directories extracted.
    pub directories: usize,
}

/// File content.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ContentResponse {
    pub content: String,
}

/// New content for an existing file.
#[derive(Debug, Deserialize, ToSchema)]
pub struct WriteRequest {
    pub path: String,
    pub content: String,
}

/// Confirmation message.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileMessage {
    pub message: String,
}

// -- Handlers -----------------------------------------------------------------

/// List the project tree.
#[utoipa::path(
    get,
    path = "/files",
    params(ListQuery),
    responses(
        (status = 200, description = "Directory listing", body = ListResponse),
        (status = 422, description = "Invalid path", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "files"
)]
pub async fn list_files(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<ListResponse>, AppError> {
    let query = extract_query(query)?;
    let dir = ProjectPath::parse_optional(query.path.as_deref())?;
    let recursive = query.is_recursive();

    let project = state.project.clone();
    let files = tokio::task::spawn_blocking(move || project.list_tree(&dir, recursive)).await??;
    Ok(Json(ListResponse { files }))
}

/// Replace the project with the uploaded ZIP archive.
#[utoipa::path(
    post,
    path = "/files/upload",
    request_body(
        content = Vec<u8>,
        content_type = "multipart/form-data",
        description = "ZIP archive in the `file` field"
    ),
    responses(
        (status = 200, description = "Project replaced", body = UploadResponse),
        (status = 400, description = "Archive could not be extracted or was empty", body = crate::error::ErrorBody),
        (status = 413, description = "Archive too large", body = crate::error::ErrorBody),
        (status = 422, description = "Missing field or not a ZIP archive", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "files"
)]
pub async fn upload_project(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let limit = state.project.max_archive_bytes();

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or("upload.zip").to_string();
        let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
        upload = Some((name, bytes));
        break;
    }
    let (name, bytes) =
        upload.ok_or_else(|| AppError::Validation("The file field is required.".into()))?;

    tracing::info!(archive = %name, bytes = bytes.len(), "project upload received");
    let project = state.project.clone();
    let summary =
        tokio::task::spawn_blocking(move || project.replace_project(&name, &bytes)).await??;

    Ok(Json(UploadResponse {
        message: "Project uploaded and extracted successfully. Previous project has been replaced."
            .into(),
        files: summary.files,
        directories: summary.directories,
    }))
}

fn multipart_error(err: MultipartError, limit: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::from(ProjectError::PayloadTooLarge { size: limit + 1, limit })
    } else {
        AppError::BadRequest(err.body_text())
    }
}

/// Read a text file.
#[utoipa::path(
    get,
    path = "/files/read",
    params(PathQuery),
    responses(
        (status = 200, description = "File content", body = ContentResponse),
        (status = 400, description = "Binary file", body = crate::error::ErrorBody),
        (status = 404, description = "File not found", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "files"
)]
pub async fn read_file(
    State(state): State<AppState>,
    query: Result<Query<PathQuery>, QueryRejection>,
) -> Result<Json<ContentResponse>, AppError> {
    let query = extract_query(query)?;
    let file = ProjectPath::parse(&query.path)?;

    let project = state.project.clone();
    let content = tokio::task::spawn_blocking(move || project.read_file(&file)).await??;
    Ok(Json(ContentResponse { content }))
}

/// Overwrite an existing file.
#[utoipa::path(
    put,
    path = "/files",
    request_body = WriteRequest,
    responses(
        (status = 200, description = "File saved", body = FileMessage),
        (status = 404, description = "File not found", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "files"
)]
pub async fn write_file(
    State(state): State<AppState>,
    body: Result<Json<WriteRequest>, JsonRejection>,
) -> Result<Json<FileMessage>, AppError> {
    let req = extract_json(body)?;
    let file = ProjectPath::parse(&req.path)?;

    let project = state.project.clone();
    tokio::task::spawn_blocking(move || project.write_file(&file, &req.content)).await??;
    Ok(Json(FileMessage {
        message: "File saved successfully".into(),
    }))
}

/// Delete a file or directory.
#[utoipa::path(
    delete,
    path = "/files",
    params(PathQuery),
    responses(
        (status = 200, description = "Deleted", body = FileMessage),
        (status = 404, description = "Nothing at that path", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid path or the project root", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "files"
)]
pub async fn delete_entry(
    State(state): State<AppState>,
    query: Result<Query<PathQuery>, QueryRejection>,
) -> Result<Json<FileMessage>, AppError> {
    let query = extract_query(query)?;
    let target = ProjectPath::parse(&query.path)?;

    let project = state.project.clone();
    tokio::task::spawn_blocking(move || project.delete_entry(&target))
        .await?
        .map_err(|e| match e {
            ProjectError::NotFound(_) => AppError::NotFound("File or directory not found".into()),
            other => other.into(),
        })?;
    Ok(Json(FileMessage {
        message: "Deleted successfully".into(),
    }))
}
