use std::path::PathBuf;

use axum::{
    Extension, Json,
    body::Body,
    extract::{
        Multipart, Path, State,
        multipart::Field,
    },
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use uuid::Uuid;

use wishlist_db::Database;
use wishlist_db::models::FileRow;
use wishlist_types::api::FileResponse;

use crate::cleanup::{spawn_delete_blobs, spawn_remove_staged};
use crate::error::ApiError;
use crate::middleware::CurrentAccount;
use crate::state::{AppState, with_db};

const UPLOAD_FIELD: &str = "file";
const DEFAULT_MIME_TYPE: &str = "application/octet-stream";
const MAX_EXTENSION_LEN: usize = 16;

pub(crate) fn file_response(row: FileRow) -> FileResponse {
    FileResponse {
        id: row.id,
        owner_id: row.owner_id,
        extension: row.extension,
        mime_type: row.mime_type,
        size: row.size as u64,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

/// An avatar must exist (404) and must have been uploaded by the account
/// attaching it (403). Runs inside a `with_db` closure.
pub(crate) fn check_avatar(
    db: &Database,
    file_id: Uuid,
    account_id: i64,
) -> anyhow::Result<Result<(), ApiError>> {
    Ok(match db.get_file(file_id)? {
        None => Err(ApiError::not_found("avatar file not found")),
        Some(file) if file.owner_id != Some(account_id) => {
            Err(ApiError::not_allowed("avatar file was uploaded by another account"))
        }
        Some(_) => Ok(()),
    })
}

/// POST /files: multipart upload, blob goes to storage and metadata to the DB.
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let extension = field.file_name().map(extension_of).unwrap_or_default();
        let mime_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

        let (staged, size) = stage_field(&state, &mut field).await?;
        if size == 0 {
            spawn_remove_staged(state.clone(), staged);
            return Err(ApiError::bad_request("empty file"));
        }

        let file_id = Uuid::new_v4();
        if let Err(e) = state.storage.persist(&staged, file_id).await {
            spawn_remove_staged(state.clone(), staged);
            return Err(e.into());
        }

        let now = Utc::now();
        let row = FileRow {
            id: file_id,
            owner_id: Some(current.account_id),
            extension,
            mime_type,
            size: size as i64,
            created_at: now,
            updated_at: now,
        };
        let insert = row.clone();
        if let Err(e) = with_db(&state, move |db| db.insert_file(&insert)).await {
            spawn_delete_blobs(state.clone(), vec![file_id]);
            return Err(e);
        }

        info!(
            "File {} uploaded by account {} ({} bytes, {})",
            file_id, current.account_id, size, row.mime_type
        );
        return Ok((StatusCode::CREATED, Json(file_response(row))));
    }

    Err(ApiError::bad_request("missing 'file' field"))
}

/// Stream one multipart field into a staging file, enforcing the size
/// limit as bytes arrive. The staging file is cleaned up on failure.
async fn stage_field(
    state: &AppState,
    field: &mut Field<'_>,
) -> Result<(PathBuf, u64), ApiError> {
    let (staged, mut file) = state.storage.create_staged().await?;

    let limit = state.max_file_size;
    let written = async {
        let mut written: u64 = 0;
        while let Some(chunk) = field.chunk().await? {
            written += chunk.len() as u64;
            if written > limit {
                return Err(ApiError::TooLarge(format!(
                    "file exceeds the {} byte limit",
                    limit
                )));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok::<_, ApiError>(written)
    }
    .await;
    drop(file);

    match written {
        Ok(size) => Ok((staged, size)),
        Err(e) => {
            spawn_remove_staged(state.clone(), staged);
            Err(e)
        }
    }
}

/// GET /files/{file_id}: metadata only.
pub async fn get_file(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
    Extension(_current): Extension<CurrentAccount>,
) -> Result<Json<FileResponse>, ApiError> {
    let row = with_db(&state, move |db| db.get_file(file_id))
        .await?
        .ok_or_else(|| ApiError::not_found("file not found"))?;
    Ok(Json(file_response(row)))
}

/// GET /files/{file_id}/content: streams the stored blob.
pub async fn download_file(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
    Extension(_current): Extension<CurrentAccount>,
) -> Result<impl IntoResponse, ApiError> {
    let row = with_db(&state, move |db| db.get_file(file_id))
        .await?
        .ok_or_else(|| ApiError::not_found("file not found"))?;

    let path = state.storage.file_path(file_id);
    let file = tokio::fs::File::open(&path).await.map_err(|e| {
        warn!("Failed to open blob {}: {}", path.display(), e);
        if e.kind() == std::io::ErrorKind::NotFound {
            ApiError::not_found("file content missing")
        } else {
            ApiError::from(e)
        }
    })?;

    let filename = if row.extension.is_empty() {
        row.id.to_string()
    } else {
        format!("{}.{}", row.id, row.extension)
    };

    let headers = [
        (header::CONTENT_TYPE, row.mime_type),
        (header::CONTENT_LENGTH, row.size.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", filename),
        ),
    ];

    Ok((headers, Body::from_stream(ReaderStream::new(file))))
}

/// Lowercased extension of an uploaded file name, or empty if it has none
/// or it looks unreasonable.
fn extension_of(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.len() <= MAX_EXTENSION_LEN && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::extension_of;

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(extension_of("Photo.JPG"), "jpg");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
    }

    #[test]
    fn odd_extensions_are_dropped() {
        assert_eq!(extension_of("README"), "");
        assert_eq!(extension_of(".bashrc"), "");
        assert_eq!(extension_of("x.p!g"), "");
        assert_eq!(extension_of("x.abcdefghijklmnopq"), "");
    }
}
