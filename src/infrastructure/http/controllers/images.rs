use crate::domain::errors::{DomainError, DomainResult};
use crate::infrastructure::http::middleware::{ApiResult, AppState};
use axum::{
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Response},
};

/// Multipart field carrying the uploaded file.
pub const IMAGE_FIELD: &str = "image";

/// Content type served for the stored payload.
pub const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

/// POST /upload - Replace the stored image while holding the upload lock
pub async fn upload_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<String> {
    let report = state
        .orchestrator
        .upload(read_image_field(multipart))
        .await?;

    tracing::debug!("Upload finished: {:?}", report);
    Ok("Successfully uploaded file\n".to_string())
}

/// GET /image - Serve the last uploaded image
pub async fn get_image(State(state): State<AppState>) -> ApiResult<Response> {
    let bytes = state.orchestrator.fetch().await?;
    Ok(([(header::CONTENT_TYPE, IMAGE_CONTENT_TYPE)], bytes).into_response())
}

/// Buffer the `image` field in memory. Malformed multipart framing is treated
/// like a missing field; failures while streaming the field body are read errors.
async fn read_image_field(mut multipart: Multipart) -> DomainResult<Vec<u8>> {
    loop {
        let field = multipart.next_field().await.map_err(|e| {
            tracing::warn!("Malformed multipart upload: {}", e);
            DomainError::PayloadMissing(IMAGE_FIELD.to_string())
        })?;

        let Some(field) = field else {
            return Err(DomainError::PayloadMissing(IMAGE_FIELD.to_string()));
        };

        if field.name() == Some(IMAGE_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| DomainError::PayloadReadError(e.to_string()))?;
            return Ok(bytes.to_vec());
        }
    }
}
