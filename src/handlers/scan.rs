//! Leaf scan handler

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::advisory::Advice;
use crate::inference::ClassificationResult;
use crate::storage::{StoredUpload, UploadStore};
use crate::{AppError, AppResult, AppState};

/// Multipart field carrying the image
pub const UPLOAD_FIELD: &str = "file";

/// Classification plus the four advisories, flattened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResponse {
    pub crop: Option<String>,
    pub disease: String,
    pub confidence: f64,
    pub treatment: String,
    pub safety: String,
    pub cost_option: String,
    pub sustainability: String,
}

impl ScanResponse {
    pub fn assemble(result: ClassificationResult, advice: Advice) -> Self {
        Self {
            crop: result.crop,
            disease: result.disease,
            confidence: result.confidence,
            treatment: advice.treatment,
            safety: advice.safety,
            cost_option: advice.cost_option,
            sustainability: advice.sustainability,
        }
    }
}

/// Scan an uploaded leaf image
pub async fn scan_leaf(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<ScanResponse>> {
    let upload = receive_upload(&state.uploads, &mut multipart).await?;

    let result = state.inference.classify(upload.path().to_path_buf()).await;
    upload.release().await;

    tracing::info!(
        "Scan: crop={} disease={} confidence={:.3}",
        result.crop.as_deref().unwrap_or("-"),
        result.disease,
        result.confidence
    );

    let advice = state.advisories.advise(&result.disease);
    Ok(Json(ScanResponse::assemble(result, advice)))
}

/// Stream the `file` field to a fresh storage key
async fn receive_upload(store: &UploadStore, multipart: &mut Multipart) -> AppResult<StoredUpload> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let upload = store.allocate(field.file_name());
        let mut file = upload.create().await?;

        let mut written = 0usize;
        while let Some(chunk) = field.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;

        tracing::debug!("Stored {} bytes at {}", written, upload.path().display());
        return Ok(upload);
    }

    Err(AppError::MissingFile(UPLOAD_FIELD))
}
