use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::{AppState, with_db};

/// Staging files younger than this may still belong to a live upload.
const STALE_STAGING_AGE: Duration = Duration::from_secs(60 * 60);

/// Uploads nobody attached within this many hours are reclaimed.
const ORPHAN_FILE_AGE_HOURS: i64 = 24;

/// Background task that prunes staging files left behind by crashed or
/// aborted uploads, and uploads that were never used as an avatar.
pub async fn run_cleanup_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match state.storage.sweep_staging(STALE_STAGING_AGE).await {
            Ok(count) => {
                if count > 0 {
                    info!("Cleanup: removed {} stale staging files", count);
                }
            }
            Err(e) => {
                warn!("Cleanup error: {}", e);
            }
        }

        match sweep_orphan_files(&state, chrono::Duration::hours(ORPHAN_FILE_AGE_HOURS)).await {
            Ok(count) => {
                if count > 0 {
                    info!("Cleanup: removed {} unattached files", count);
                }
            }
            Err(e) => {
                warn!("Cleanup error: {}", e);
            }
        }
    }
}

/// Drop file rows older than `max_age` that no profile or wish uses, then
/// their blobs. Returns how many files went.
pub async fn sweep_orphan_files(state: &AppState, max_age: chrono::Duration) -> Result<usize, ApiError> {
    let cutoff = chrono::Utc::now() - max_age;
    let removed = with_db(state, move |db| db.delete_orphan_files(cutoff)).await?;

    for id in &removed {
        if let Err(e) = state.storage.delete_file(*id).await {
            warn!("Failed to delete blob {}: {}", id, e);
        }
    }
    Ok(removed.len())
}

/// Remove a staging file after the response has gone out.
pub fn spawn_remove_staged(state: AppState, path: PathBuf) {
    tokio::spawn(async move {
        if let Err(e) = state.storage.remove_staged(&path).await {
            warn!("Failed to remove staging file {}: {}", path.display(), e);
        }
    });
}

/// Remove blobs whose file rows were deleted.
pub fn spawn_delete_blobs(state: AppState, file_ids: Vec<Uuid>) {
    if file_ids.is_empty() {
        return;
    }
    tokio::spawn(async move {
        for id in file_ids {
            if let Err(e) = state.storage.delete_file(id).await {
                warn!("Failed to delete blob {}: {}", id, e);
            }
        }
    });
}
