//! File handlers for the HTTP transport.

use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use std::sync::Arc;

use crate::file::DropService;
use crate::web::dto::{ApiResponse, FileInfoResponse, FileUploadResponse};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// Filename used when the client sends a file part without one.
const FALLBACK_FILENAME: &str = "upload.bin";

/// Generate a safe Content-Disposition header value for file downloads.
///
/// Control characters are dropped and quotes/backslashes replaced in the
/// plain `filename` parameter; non-ASCII names also get an RFC 5987
/// `filename*` parameter.
fn content_disposition_header(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            _ => c,
        })
        .collect();

    if filename.is_ascii() && sanitized == filename {
        return format!("attachment; filename=\"{filename}\"");
    }

    let encoded = urlencoding::encode(filename);
    format!("attachment; filename=\"{sanitized}\"; filename*=UTF-8''{encoded}")
}

/// Run a blocking façade call off the async executor.
async fn run_blocking<T, F>(service: Arc<DropService>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&DropService) -> crate::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(service.as_ref()))
        .await
        .map_err(|e| {
            tracing::error!("Storage task failed: {}", e);
            ApiError::internal("An internal error occurred")
        })?
        .map_err(ApiError::from)
}

/// POST /api/files - Upload a file.
///
/// Expects a multipart body with a `file` part.
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<FileUploadResponse>>), ApiError> {
    let mut filename: Option<String> = None;
    let mut content: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!("Failed to read multipart field: {}", e);
        ApiError::bad_request("Invalid multipart data")
    })? {
        if field.name() != Some("file") {
            continue;
        }
        filename = Some(
            field
                .file_name()
                .filter(|name| !name.is_empty())
                .unwrap_or(FALLBACK_FILENAME)
                .to_string(),
        );
        content = Some(
            field
                .bytes()
                .await
                .map_err(|e| {
                    tracing::warn!("Failed to read file content: {}", e);
                    ApiError::bad_request("Failed to read file")
                })?
                .to_vec(),
        );
    }

    let filename = filename.ok_or_else(|| ApiError::bad_request("No file provided"))?;
    let content = content.ok_or_else(|| ApiError::bad_request("No file content"))?;

    let max_size = state.service.max_file_size();
    if content.len() as u64 > max_size {
        let max_mb = max_size / 1024 / 1024;
        return Err(ApiError::too_large(format!("File too large (max {max_mb}MB)")));
    }

    let record = run_blocking(state.service.clone(), move |service| {
        service.upload(&filename, &content)
    })
    .await?;

    let link = state.service.share_link(&record.id);
    let file = FileInfoResponse::from_record(record, state.service.retention());

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(FileUploadResponse { file, link })),
    ))
}

/// GET /api/files/:id - Download a file.
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response<Body>, ApiError> {
    let resolved = run_blocking(state.service.clone(), move |service| service.resolve(&id)).await?;

    let content_type = mime_guess::from_path(&resolved.record.original_name)
        .first_or_octet_stream()
        .to_string();

    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(&resolved.record.original_name),
        )
        .header(header::CONTENT_LENGTH, resolved.content.len())
        .body(Body::from(resolved.content))
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            ApiError::internal("Failed to build response")
        })
}

/// GET /api/files/:id/info - Metadata of a live file.
pub async fn get_file_info(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<FileInfoResponse>>, ApiError> {
    let record = run_blocking(state.service.clone(), move |service| service.info(&id)).await?;

    Ok(Json(ApiResponse::new(FileInfoResponse::from_record(
        record,
        state.service.retention(),
    ))))
}
