//! Filestorage API Handlers

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use exesh_core::domain::BucketId;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// GET /filestorage/{bucket}/{file}
/// Raw content of a committed file
pub async fn download(
    State(state): State<AppState>,
    Path((bucket, file)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    tracing::debug!("Serving {}/{}", bucket, file);

    let lock = state.storage.get_file(&BucketId::new(bucket), &file)?;
    let content = tokio::fs::read(lock.path()).await?;
    drop(lock);

    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ApiError;
    use crate::filestorage::tests::temp_storage;
    use axum::http::StatusCode;
    use std::time::Duration;

    #[tokio::test]
    async fn test_download_committed_file() {
        let storage = temp_storage();
        let reservation = storage
            .reserve_bucket(&BucketId::new("ab12"), "a.out", Duration::from_secs(60))
            .unwrap();
        std::fs::write(reservation.path(), "binary").unwrap();
        reservation.commit().unwrap();

        let response = download(
            State(AppState { storage }),
            Path(("ab12".to_string(), "a.out".to_string())),
        )
        .await
        .unwrap()
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"binary");
    }

    #[tokio::test]
    async fn test_reserved_file_is_not_served() {
        let storage = temp_storage();
        let _reservation = storage
            .reserve_bucket(&BucketId::new("ab12"), "a.out", Duration::from_secs(60))
            .unwrap();

        let result = download(
            State(AppState { storage }),
            Path(("ab12".to_string(), "a.out".to_string())),
        )
        .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let result = download(
            State(AppState {
                storage: temp_storage(),
            }),
            Path(("ab12".to_string(), "..".to_string())),
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }
}
