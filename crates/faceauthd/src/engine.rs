use async_trait::async_trait;
use faceauth_core::{Embedding, FaceDetector, FaceRecognizer};
use image::RgbImage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Queue depth for pending inference requests; further requests wait on send.
const ENGINE_QUEUE_DEPTH: usize = 4;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] faceauth_core::detector::DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] faceauth_core::recognizer::RecognizerError),
    #[error("no face detected in the uploaded image")]
    NoFaceDetected,
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Provider seam between the HTTP handlers and the inference pipeline.
///
/// The daemon wires in [`EngineHandle`]; endpoint tests substitute a stub.
#[async_trait]
pub trait FaceEmbedder: Send + Sync {
    /// Compute the embedding of the first detected face in the image.
    async fn embed(&self, image: RgbImage) -> Result<Embedding, EngineError>;
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Embed {
        image: RgbImage,
        reply: oneshot::Sender<Result<Embedding, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

#[async_trait]
impl FaceEmbedder for EngineHandle {
    async fn embed(&self, image: RgbImage) -> Result<Embedding, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Embed {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the inference engine on a dedicated OS thread.
///
/// Loads both ONNX models synchronously and fails fast if either is
/// unavailable. The thread owns both sessions; requests are serialized
/// through a bounded channel.
pub fn spawn_engine(scrfd_path: &str, arcface_path: &str) -> Result<EngineHandle, EngineError> {
    let mut detector = FaceDetector::load(scrfd_path)?;
    tracing::info!(path = scrfd_path, "SCRFD detector loaded");

    let mut recognizer = FaceRecognizer::load(arcface_path)?;
    tracing::info!(path = arcface_path, "ArcFace recognizer loaded");

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(ENGINE_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("faceauth-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Embed { image, reply } => {
                        let _ = reply.send(run_embed(&mut detector, &mut recognizer, &image));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    Ok(EngineHandle { tx })
}

/// Detect faces and extract the embedding of the first (most confident) one.
fn run_embed(
    detector: &mut FaceDetector,
    recognizer: &mut FaceRecognizer,
    image: &RgbImage,
) -> Result<Embedding, EngineError> {
    let faces = detector.detect(image)?;

    let Some(face) = faces.first() else {
        return Err(EngineError::NoFaceDetected);
    };

    tracing::debug!(
        faces = faces.len(),
        confidence = face.confidence,
        "embedding first detected face"
    );

    Ok(recognizer.extract(image, face)?)
}
