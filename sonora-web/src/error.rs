//! Mapping of core errors to HTTP responses.

use axum::extract::rejection::PathRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use sonora_core::{CatalogError, StreamingError};
use tracing::{error, warn};

/// Errors returned by request handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Path segment is not a track id
    #[error("Invalid track id: {0}")]
    InvalidTrackId(#[from] PathRejection),

    /// Track lookup failed
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Stream could not start
    #[error(transparent)]
    Streaming(#[from] StreamingError),

    /// Stream task died before producing a response
    #[error("Stream task failed: {reason}")]
    Internal {
        /// What went wrong
        reason: String,
    },
}

impl ApiError {
    /// HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidTrackId(_) => StatusCode::BAD_REQUEST,
            ApiError::Catalog(CatalogError::TrackNotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Catalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Streaming(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Streaming(StreamingError::RangeUnsatisfiable { .. }) => {
                StatusCode::RANGE_NOT_SATISFIABLE
            }
            ApiError::Streaming(_) | ApiError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected with {}: {}", status, self);
        }

        let mut response = (
            status,
            Json(json!({
                "error": self.to_string(),
                "status": status.as_u16(),
            })),
        )
            .into_response();

        if let ApiError::Streaming(StreamingError::RangeUnsatisfiable { size }) = self
            && let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}"))
        {
            response.headers_mut().insert(header::CONTENT_RANGE, value);
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use sonora_core::{StorageError, StorageKey};

    use super::*;

    #[test]
    fn test_status_mapping() {
        let missing_track = ApiError::from(CatalogError::TrackNotFound { track_id: 9 });
        assert_eq!(missing_track.status(), StatusCode::NOT_FOUND);

        let missing_file = ApiError::from(StreamingError::ResourceUnavailable {
            key: StorageKey::new("abc"),
            source: StorageError::NotFound {
                key: StorageKey::new("abc"),
            },
        });
        assert_eq!(missing_file.status(), StatusCode::NOT_FOUND);

        let unreadable = ApiError::from(StreamingError::ResourceUnavailable {
            key: StorageKey::new("abc"),
            source: StorageError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied)),
        });
        assert_eq!(unreadable.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_invalid_track_id_has_json_body() {
        use axum::Router;
        use axum::body::Body;
        use axum::extract::Path;
        use axum::http::Request;
        use axum::routing::get;
        use tower::ServiceExt;

        async fn lookup(path: Result<Path<u64>, PathRejection>) -> Result<String, ApiError> {
            let Path(track_id) = path?;
            Ok(track_id.to_string())
        }

        let response = Router::new()
            .route("/tracks/{track_id}", get(lookup))
            .oneshot(Request::builder().uri("/tracks/abc").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["status"], 400);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid track id"));
    }

    #[test]
    fn test_unsatisfiable_range_carries_content_range() {
        let response =
            ApiError::from(StreamingError::RangeUnsatisfiable { size: 1000 }).into_response();

        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes */1000"
        );
    }
}
