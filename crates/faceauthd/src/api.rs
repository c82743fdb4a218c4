use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::engine::EngineError;
use crate::store::StoreError;

/// Body of a successful verification: the owning user of the first stored
/// embedding within the distance threshold.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    /// The request carried no `image` multipart field. Also covers bodies
    /// that are not multipart at all — from the caller's view there is no
    /// image either way.
    #[error("No image uploaded")]
    NoImageUploaded,
    /// The image decoded but the detector found zero faces.
    #[error("No face detected")]
    NoFaceDetected,
    /// Every stored embedding was scanned without a distance under threshold.
    #[error("No matching user")]
    NoMatchingUser,
    /// Infrastructure fault: corrupt image, inference failure, database
    /// failure, malformed stored embedding. Detail is logged, not returned.
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NoFaceDetected => ApiError::NoFaceDetected,
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NoImageUploaded | ApiError::NoFaceDetected => StatusCode::BAD_REQUEST,
            ApiError::NoMatchingUser => StatusCode::UNAUTHORIZED,
            ApiError::Internal(source) => {
                tracing::error!(error = ?source, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
