use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::endpoints;
use crate::engine::FaceEmbedder;
use crate::store::EmbeddingStore;

/// Shared handler state: the inference seam, the store seam, and the
/// distance threshold below which two embeddings are the same identity.
#[derive(Clone)]
pub struct AppState {
    pub embedder: Arc<dyn FaceEmbedder>,
    pub store: Arc<dyn EmbeddingStore>,
    pub match_threshold: f32,
}

async fn index() -> &'static str {
    "faceauthd"
}

/// Build the HTTP router.
///
/// CORS is deliberately permissive: the enrollment frontend is served from
/// a different origin and sends plain multipart POSTs.
pub fn router(
    embedder: Arc<dyn FaceEmbedder>,
    store: Arc<dyn EmbeddingStore>,
    match_threshold: f32,
    max_upload_bytes: usize,
) -> Router {
    let state = AppState {
        embedder,
        store,
        match_threshold,
    };

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_origin(AllowOrigin::mirror_request());

    Router::new()
        .route("/", get(index))
        .route("/_liveness", get(index))
        .route("/generate-embedding", post(endpoints::generate_embedding))
        .route("/verify-face", post(endpoints::verify_face))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
