use anyhow::Context;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::response::Json;
use faceauth_core::{
    Embedding, FirstMatchScan, GalleryEntry, GalleryError, MatchOutcome, Matcher,
};
use image::RgbImage;

use crate::api::{ApiError, VerifyResponse};
use crate::multipart;
use crate::router::AppState;
use crate::store::StoredEmbeddingRow;

/// POST /generate-embedding — embed the first detected face of the upload.
///
/// The response body is the raw embedding as a JSON array of floats; the
/// enrollment flow stores it verbatim as the `embedding` column text.
pub async fn generate_embedding(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Vec<f32>>, ApiError> {
    let image = decode_upload(&headers, body).await?;
    let embedding = state.embedder.embed(image).await?;

    tracing::debug!(dim = embedding.len(), "embedding generated");
    Ok(Json(embedding.values))
}

/// POST /verify-face — embed the upload, then scan every stored embedding
/// in database order and answer with the first user under the threshold.
pub async fn verify_face(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<VerifyResponse>, ApiError> {
    let image = decode_upload(&headers, body).await?;
    let probe = state.embedder.embed(image).await?;

    let rows = state.store.fetch_all().await?;
    tracing::debug!(rows = rows.len(), "scanning stored embeddings");

    let probe_dim = probe.len();
    let gallery = rows.into_iter().map(move |row| parse_row(row, probe_dim));

    let outcome = FirstMatchScan
        .scan(&probe, gallery, state.match_threshold)
        .map_err(|e| ApiError::Internal(e.into()))?;

    match outcome {
        MatchOutcome::Hit {
            record_id,
            user_id,
            distance,
        } => {
            tracing::info!(record_id, user_id = %user_id, distance, "face verified");
            Ok(Json(VerifyResponse { user_id }))
        }
        MatchOutcome::Miss => Err(ApiError::NoMatchingUser),
    }
}

/// Extract the `image` multipart field and decode it into RGB pixels.
///
/// A missing field is the caller's fault; bytes that fail to decode as an
/// image are treated as an infrastructure fault.
async fn decode_upload(headers: &HeaderMap, body: Bytes) -> Result<RgbImage, ApiError> {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let image_bytes = multipart::extract_image(content_type, body).await?;

    let decoded = image::load_from_memory(&image_bytes)
        .context("decoding uploaded image")
        .map_err(ApiError::Internal)?;

    Ok(decoded.to_rgb8())
}

/// Parse one stored row into a gallery entry, validating that its dimension
/// matches the probe's. Called lazily during the scan, so rows past the
/// first match are never parsed.
fn parse_row(row: StoredEmbeddingRow, expected_dim: usize) -> Result<GalleryEntry, GalleryError> {
    let embedding = Embedding::parse_text(&row.embedding).map_err(|source| {
        GalleryError::Malformed {
            record_id: row.id,
            source,
        }
    })?;

    if embedding.len() != expected_dim {
        return Err(GalleryError::DimensionMismatch {
            record_id: row.id,
            got: embedding.len(),
            expected: expected_dim,
        });
    }

    Ok(GalleryEntry {
        record_id: row.id,
        user_id: row.user_id,
        embedding,
    })
}
