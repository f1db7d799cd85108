use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::protocol::ServerEvent;
use crate::storage::AssetRecord;

use super::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// Original filename of the asset being uploaded
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub filename: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /upload?name=...
/// Stream one asset into the store, gated by the upload controller
pub async fn upload_asset(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let bytes_expected = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    // Rejections here are side-effect-free; admission takes the slot
    let guard = state
        .uploads
        .admit(&query.name, content_type, bytes_expected)
        .await?;

    let path = state.assets.path_of(guard.target_name());
    let mut file = File::create(&path).await?;

    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                // Client abort mid-transfer; dropping the guard cleans up
                warn!("upload stream aborted: {}", err);
                return Err(Error::Internal(anyhow::anyhow!(
                    "upload stream aborted: {err}"
                )));
            }
        };
        file.write_all(&chunk).await?;
        guard.progress(chunk.len() as u64).await;
    }
    file.flush().await?;
    drop(file);

    let filename = guard.complete().await;
    info!("stored uploaded asset: {}", filename);

    Ok((StatusCode::OK, Json(UploadResponse { filename })))
}

/// GET /assets
/// Current asset records, scanned from the media directory
pub async fn list_assets(State(state): State<AppState>) -> Result<Json<Vec<AssetRecord>>> {
    Ok(Json(state.assets.scan().await?))
}

/// DELETE /assets/:filename
/// Remove one asset and tell every participant
pub async fn delete_asset(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse> {
    if state.uploads.active_target().await.as_deref() == Some(filename.as_str()) {
        return Err(Error::Conflict(
            "asset is currently being uploaded".to_string(),
        ));
    }

    state.assets.delete(&filename).await?;
    info!("asset deleted: {}", filename);

    state
        .room
        .broadcast_all(ServerEvent::AssetDeleted {
            filename: filename.clone(),
        })
        .await;

    Ok((StatusCode::OK, Json(DeleteResponse { filename })))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
