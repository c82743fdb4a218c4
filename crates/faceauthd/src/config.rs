use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Listen address for the HTTP server (default: 0.0.0.0:5000).
    pub bind_addr: String,
    /// Postgres DSN for the embedding store.
    pub database_url: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Euclidean distance threshold for a positive match.
    pub match_threshold: f32,
    /// Maximum accepted request body size in bytes.
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load configuration from `FACEAUTH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("FACEAUTH_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:5000".to_string()),
            database_url: std::env::var("FACEAUTH_DATABASE_URL")
                .unwrap_or_else(|_| "postgres://faceauth@localhost/faceauth".to_string()),
            model_dir: std::env::var("FACEAUTH_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/usr/share/faceauth/models")),
            match_threshold: env_f32("FACEAUTH_MATCH_THRESHOLD", 0.45),
            max_upload_bytes: env_usize("FACEAUTH_MAX_UPLOAD_BYTES", 10 * 1024 * 1024),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join("w600k_r50.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
