//! faceauth-core — Face detection and embedding extraction engine.
//!
//! Uses SCRFD for face detection and ArcFace for embedding extraction,
//! both running via ONNX Runtime for CPU inference, plus the embedding
//! and gallery-matching types shared with the daemon.

pub mod alignment;
pub mod detector;
pub mod recognizer;
pub mod types;

pub use detector::FaceDetector;
pub use recognizer::FaceRecognizer;
pub use types::{
    BoundingBox, Embedding, EmbeddingTextError, FirstMatchScan, GalleryEntry, GalleryError,
    MatchOutcome, Matcher,
};
