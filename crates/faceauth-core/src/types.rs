use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

#[derive(Error, Debug)]
pub enum EmbeddingTextError {
    #[error("not a JSON array of numbers: {0}")]
    NotNumericArray(#[source] serde_json::Error),
    #[error("empty array")]
    Empty,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Parse the textual column format: a JSON array of numbers.
    ///
    /// This is a strict parser. Anything that does not deserialize as
    /// `Vec<f32>` is rejected — strings, nested arrays, objects, and any
    /// expression syntax a looser evaluator might accept.
    pub fn parse_text(text: &str) -> Result<Embedding, EmbeddingTextError> {
        let values: Vec<f32> =
            serde_json::from_str(text).map_err(EmbeddingTextError::NotNumericArray)?;
        if values.is_empty() {
            return Err(EmbeddingTextError::Empty);
        }
        Ok(Embedding {
            values,
            model_version: None,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Both vectors must have the same length; callers validate dimensions
    /// before comparing.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One enrolled embedding, parsed from its stored row.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub record_id: i64,
    pub user_id: String,
    pub embedding: Embedding,
}

/// A stored row that cannot participate in a scan.
#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("stored embedding {record_id} is malformed: {source}")]
    Malformed {
        record_id: i64,
        source: EmbeddingTextError,
    },
    #[error("stored embedding {record_id} has dimension {got}, expected {expected}")]
    DimensionMismatch {
        record_id: i64,
        got: usize,
        expected: usize,
    },
}

/// Result of scanning a probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// The first entry strictly under the threshold, in scan order.
    Hit {
        record_id: i64,
        user_id: String,
        distance: f32,
    },
    /// Every entry was scanned; none came under the threshold.
    Miss,
}

/// Strategy for scanning a probe embedding against a gallery of enrolled faces.
pub trait Matcher {
    fn scan<I>(
        &self,
        probe: &Embedding,
        gallery: I,
        threshold: f32,
    ) -> Result<MatchOutcome, GalleryError>
    where
        I: IntoIterator<Item = Result<GalleryEntry, GalleryError>>;
}

/// Euclidean scan that answers with the FIRST entry strictly under the
/// threshold, in gallery order, and stops consuming the gallery there.
///
/// This is deliberately not a nearest-neighbor search: a later entry with a
/// smaller distance never wins over an earlier in-threshold one, so the
/// outcome depends on gallery ordering. Entries after the answering one are
/// never inspected — a bad row past the first hit does not fail the scan.
pub struct FirstMatchScan;

impl Matcher for FirstMatchScan {
    fn scan<I>(
        &self,
        probe: &Embedding,
        gallery: I,
        threshold: f32,
    ) -> Result<MatchOutcome, GalleryError>
    where
        I: IntoIterator<Item = Result<GalleryEntry, GalleryError>>,
    {
        for entry in gallery {
            let entry = entry?;
            let distance = probe.euclidean_distance(&entry.embedding);
            if distance < threshold {
                return Ok(MatchOutcome::Hit {
                    record_id: entry.record_id,
                    user_id: entry.user_id,
                    distance,
                });
            }
        }

        Ok(MatchOutcome::Miss)
    }
}
