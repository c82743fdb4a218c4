//! End-to-end tests of the HTTP surface with stubbed inference and storage.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use faceauth_core::Embedding;
use faceauthd::engine::{EngineError, FaceEmbedder};
use faceauthd::router::router;
use faceauthd::store::{EmbeddingStore, StoreError, StoredEmbeddingRow};
use http_body_util::BodyExt; // for `collect`
use image::RgbImage;
use serde_json::{json, Value};
use tower::ServiceExt; // for `oneshot`

const TEST_THRESHOLD: f32 = 0.45;
const TEST_BODY_LIMIT: usize = 1024 * 1024;

/// Embedder stub: returns a fixed embedding, or reports no detected face.
struct StubEmbedder {
    values: Option<Vec<f32>>,
}

impl StubEmbedder {
    fn fixed(values: Vec<f32>) -> Arc<Self> {
        Arc::new(StubEmbedder {
            values: Some(values),
        })
    }

    fn no_face() -> Arc<Self> {
        Arc::new(StubEmbedder { values: None })
    }
}

#[async_trait]
impl FaceEmbedder for StubEmbedder {
    async fn embed(&self, _image: RgbImage) -> Result<Embedding, EngineError> {
        match &self.values {
            Some(values) => Ok(Embedding {
                values: values.clone(),
                model_version: None,
            }),
            None => Err(EngineError::NoFaceDetected),
        }
    }
}

/// Store stub: serves rows from memory, preserving insertion order.
struct StubStore {
    rows: Vec<StoredEmbeddingRow>,
}

impl StubStore {
    fn with_rows(rows: Vec<(i64, &str, &str)>) -> Arc<Self> {
        Arc::new(StubStore {
            rows: rows
                .into_iter()
                .map(|(id, user_id, embedding)| StoredEmbeddingRow {
                    id,
                    user_id: user_id.into(),
                    embedding: embedding.into(),
                })
                .collect(),
        })
    }

    fn empty() -> Arc<Self> {
        Arc::new(StubStore { rows: Vec::new() })
    }
}

#[async_trait]
impl EmbeddingStore for StubStore {
    async fn fetch_all(&self) -> Result<Vec<StoredEmbeddingRow>, StoreError> {
        Ok(self.rows.clone())
    }
}

fn test_router(embedder: Arc<dyn FaceEmbedder>, store: Arc<dyn EmbeddingStore>) -> Router {
    router(embedder, store, TEST_THRESHOLD, TEST_BODY_LIMIT)
}

/// A tiny valid PNG for requests that must get past image decoding.
fn tiny_png() -> Vec<u8> {
    let img = RgbImage::from_pixel(4, 4, image::Rgb([90, 120, 150]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

const BOUNDARY: &str = "testboundary";

fn multipart_body(fields: &[(&str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, data) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{name}.png\"\r\n")
                .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_request(path: &str, fields: &[(&str, &[u8])]) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(fields)))
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn missing_image_field_is_rejected_on_both_endpoints() {
    for path in ["/generate-embedding", "/verify-face"] {
        let app = test_router(StubEmbedder::fixed(vec![1.0, 0.0]), StubStore::empty());
        let response = app
            .oneshot(multipart_request(path, &[("note", b"no image here")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{path}");
        assert_eq!(
            response_json(response).await,
            json!({"error": "No image uploaded"}),
            "{path}"
        );
    }
}

#[tokio::test]
async fn non_multipart_request_is_rejected_as_missing_image() {
    let app = test_router(StubEmbedder::fixed(vec![1.0, 0.0]), StubStore::empty());
    let request = Request::builder()
        .method(Method::POST)
        .uri("/generate-embedding")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"image": "zm9v"}"#))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response_json(response).await,
        json!({"error": "No image uploaded"})
    );
}

#[tokio::test]
async fn no_face_detected_is_rejected_on_both_endpoints() {
    for path in ["/generate-embedding", "/verify-face"] {
        let app = test_router(StubEmbedder::no_face(), StubStore::empty());
        let response = app
            .oneshot(multipart_request(path, &[("image", &tiny_png())]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{path}");
        assert_eq!(
            response_json(response).await,
            json!({"error": "No face detected"}),
            "{path}"
        );
    }
}

#[tokio::test]
async fn generate_embedding_returns_the_raw_vector() {
    let app = test_router(
        StubEmbedder::fixed(vec![0.25, -0.5, 0.125]),
        StubStore::empty(),
    );
    let response = app
        .oneshot(multipart_request("/generate-embedding", &[("image", &tiny_png())]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await, json!([0.25, -0.5, 0.125]));
}

#[tokio::test]
async fn verify_matches_identical_stored_embedding() {
    let app = test_router(
        StubEmbedder::fixed(vec![0.6, 0.8]),
        StubStore::with_rows(vec![(1, "alice", "[0.6, 0.8]")]),
    );
    let response = app
        .oneshot(multipart_request("/verify-face", &[("image", &tiny_png())]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await, json!({"userId": "alice"}));
}

#[tokio::test]
async fn verify_rejects_when_nothing_is_close_enough() {
    let app = test_router(
        StubEmbedder::fixed(vec![1.0, 0.0]),
        StubStore::with_rows(vec![(1, "alice", "[-1.0, 0.0]"), (2, "bob", "[0.0, 1.0]")]),
    );
    let response = app
        .oneshot(multipart_request("/verify-face", &[("image", &tiny_png())]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response_json(response).await,
        json!({"error": "No matching user"})
    );
}

#[tokio::test]
async fn verify_rejects_on_empty_table() {
    let app = test_router(StubEmbedder::fixed(vec![1.0, 0.0]), StubStore::empty());
    let response = app
        .oneshot(multipart_request("/verify-face", &[("image", &tiny_png())]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn verify_answers_with_first_match_not_closest() {
    // alice is within threshold at distance 0.3; bob is an exact match at
    // distance 0. Scan order wins: the response names alice.
    let app = test_router(
        StubEmbedder::fixed(vec![1.0, 0.0]),
        StubStore::with_rows(vec![(1, "alice", "[1.0, 0.3]"), (2, "bob", "[1.0, 0.0]")]),
    );
    let response = app
        .oneshot(multipart_request("/verify-face", &[("image", &tiny_png())]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await, json!({"userId": "alice"}));
}

#[tokio::test]
async fn verify_fails_on_malformed_stored_embedding() {
    let app = test_router(
        StubEmbedder::fixed(vec![1.0, 0.0]),
        StubStore::with_rows(vec![(1, "alice", "__import__('os')")]),
    );
    let response = app
        .oneshot(multipart_request("/verify-face", &[("image", &tiny_png())]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn verify_fails_on_dimension_mismatch() {
    let app = test_router(
        StubEmbedder::fixed(vec![1.0, 0.0]),
        StubStore::with_rows(vec![(1, "alice", "[1.0, 0.0, 0.0]")]),
    );
    let response = app
        .oneshot(multipart_request("/verify-face", &[("image", &tiny_png())]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn malformed_stored_row_after_the_match_is_ignored() {
    let app = test_router(
        StubEmbedder::fixed(vec![1.0, 0.0]),
        StubStore::with_rows(vec![(1, "alice", "[1.0, 0.0]"), (2, "bob", "not json")]),
    );
    let response = app
        .oneshot(multipart_request("/verify-face", &[("image", &tiny_png())]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await, json!({"userId": "alice"}));
}

#[tokio::test]
async fn corrupt_image_bytes_are_an_internal_fault() {
    let app = test_router(StubEmbedder::fixed(vec![1.0, 0.0]), StubStore::empty());
    let response = app
        .oneshot(multipart_request(
            "/generate-embedding",
            &[("image", b"definitely not an image")],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn oversized_body_is_refused() {
    let app = router(
        StubEmbedder::fixed(vec![1.0, 0.0]),
        StubStore::empty(),
        TEST_THRESHOLD,
        64, // tiny limit
    );
    let response = app
        .oneshot(multipart_request(
            "/generate-embedding",
            &[("image", &[0u8; 4096])],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn cors_preflight_is_permissive() {
    let app = test_router(StubEmbedder::fixed(vec![1.0, 0.0]), StubStore::empty());
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/verify-face")
        .header(header::ORIGIN, "http://enroll.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("http://enroll.example")
    );
}

#[tokio::test]
async fn liveness_route_answers() {
    let app = test_router(StubEmbedder::fixed(vec![1.0, 0.0]), StubStore::empty());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/_liveness")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
