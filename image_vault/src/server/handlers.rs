//! REST handlers.
//!
//! Every handler moves file and cipher work onto the blocking pool; the
//! codec itself is synchronous.

use std::path::Path as FsPath;

use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::media::{extension_of, is_image_file, mime_for_extension, output_file_name};
use crate::metadata::{parse_tag_field, ImageMeta};
use crate::storage::{check_passphrase, ImageQuery, NewImage};

#[derive(Debug, Deserialize)]
pub struct KeyRequest {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct TagsRequest {
    pub key: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub id: String,
    pub name: String,
}

/// Unwrap a JSON body and require a non-empty key
fn require_key<T>(
    body: Result<Json<T>, JsonRejection>,
    key: impl Fn(&T) -> &str,
) -> ApiResult<T> {
    let Json(body) = body.map_err(|_| ApiError::BadRequest("Invalid request".into()))?;
    if key(&body).is_empty() {
        return Err(ApiError::BadRequest("Decryption key is required".into()));
    }
    Ok(body)
}

fn data_url(mime: &str, plaintext: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(plaintext))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("Upload too large".into())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// LISTING
// ═══════════════════════════════════════════════════════════════════════════

/// GET /api/images?album=&tag=&q=&page=&perPage=
pub async fn list_images(
    State(state): State<AppState>,
    Query(query): Query<ImageQuery>,
) -> ApiResult<Json<Value>> {
    let store = state.store.clone();
    let page = tokio::task::spawn_blocking(move || store.query(&query)).await??;

    Ok(Json(json!({
        "images": page.items,
        "total": page.total,
        "page": page.page,
        "perPage": page.per_page,
    })))
}

/// GET /api/albums
pub async fn list_albums(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let store = state.store.clone();
    let albums = tokio::task::spawn_blocking(move || store.albums()).await??;
    Ok(Json(json!({ "albums": albums })))
}

/// GET /api/albums/{album}/images
pub async fn album_images(
    State(state): State<AppState>,
    Path(album): Path<String>,
) -> ApiResult<Json<Value>> {
    let store = state.store.clone();
    let images = tokio::task::spawn_blocking(move || store.list(Some(album.as_str()))).await??;
    Ok(Json(json!({ "images": images })))
}

// ═══════════════════════════════════════════════════════════════════════════
// UPLOAD
// ═══════════════════════════════════════════════════════════════════════════

/// POST /api/encrypt
///
/// Multipart fields: `image` (file), `key`, and optional `name`, `tags`
/// (JSON array or comma list) and `album`.
pub async fn encrypt_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut image: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut key = None;
    let mut name = None;
    let mut tags = Vec::new();
    let mut album = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                image = Some((file_name, content_type, bytes.to_vec()));
            }
            "key" => key = Some(field.text().await.map_err(multipart_error)?),
            "name" => name = Some(field.text().await.map_err(multipart_error)?),
            "tags" => tags = parse_tag_field(&field.text().await.map_err(multipart_error)?),
            "album" => album = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }

    let (Some((file_name, content_type, plaintext)), Some(key)) = (image, key) else {
        return Err(ApiError::BadRequest("Missing required fields".into()));
    };

    if !is_image_file(FsPath::new(&file_name)) {
        return Err(ApiError::BadRequest("Only image files are allowed".into()));
    }
    check_passphrase(&key, state.min_passphrase_len)?;

    let extension = extension_of(FsPath::new(&file_name)).unwrap_or_default();
    let mime_type = content_type
        .filter(|ct| ct.starts_with("image/"))
        .unwrap_or_else(|| mime_for_extension(&extension).to_string());
    let original_name = name.filter(|n| !n.trim().is_empty()).unwrap_or(file_name);

    let new_image = NewImage {
        original_name,
        mime_type,
        tags,
        album: album.filter(|a| !a.trim().is_empty()),
        ..Default::default()
    };

    let store = state.store.clone();
    let meta =
        tokio::task::spawn_blocking(move || store.store(&plaintext, &key, new_image)).await??;

    Ok(Json(UploadResponse {
        success: true,
        id: meta.id(),
        name: meta.original_name().to_string(),
    }))
}

// ═══════════════════════════════════════════════════════════════════════════
// VIEW
// ═══════════════════════════════════════════════════════════════════════════

/// POST /api/decrypt/{id}
pub async fn decrypt_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<KeyRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = require_key(body, |r| r.key.as_str())?;
    let store = state.store.clone();
    let opened = tokio::task::spawn_blocking(move || store.open_image(&id, &request.key)).await??;

    Ok(Json(json!({
        "success": true,
        "image": data_url(opened.metadata.mime_or_default(), &opened.plaintext),
        "metadata": opened.metadata,
    })))
}

/// POST /api/thumbnail/{id}
///
/// Same payload as a full view; the frontend scales it down. Metadata
/// carries the album name.
pub async fn thumbnail(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<KeyRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = require_key(body, |r| r.key.as_str())?;
    let store = state.store.clone();
    let opened = tokio::task::spawn_blocking(move || store.open_image(&id, &request.key)).await??;

    let mut metadata = opened.metadata.as_map().clone();
    metadata.insert("album".into(), Value::from(opened.album.clone()));

    Ok(Json(json!({
        "success": true,
        "thumbnail": data_url(opened.metadata.mime_or_default(), &opened.plaintext),
        "metadata": metadata,
    })))
}

/// POST /api/images/{id}/download
pub async fn download_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<KeyRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let request = require_key(body, |r| r.key.as_str())?;
    let store = state.store.clone();
    let opened = tokio::task::spawn_blocking(move || store.open_image(&id, &request.key)).await??;

    let meta: &ImageMeta = &opened.metadata;
    let mime = meta.mime_or_default().to_string();
    let file_name = output_file_name(meta.original_name(), &mime);

    Ok((
        [
            (header::CONTENT_TYPE, mime),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", file_name)),
        ],
        opened.plaintext,
    )
        .into_response())
}

// ═══════════════════════════════════════════════════════════════════════════
// MUTATION
// ═══════════════════════════════════════════════════════════════════════════

/// POST /api/images/{id}/tags
pub async fn update_tags(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<TagsRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = require_key(body, |r| r.key.as_str())?;
    let store = state.store.clone();
    let meta = tokio::task::spawn_blocking(move || {
        store.update_tags(&id, &request.key, &request.tags)
    })
    .await??;

    Ok(Json(json!({ "success": true, "tags": meta.tags() })))
}

/// DELETE /api/images/{id}
pub async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || store.delete(&id)).await??;
    Ok(Json(json!({ "success": true })))
}
