use presencia_core::{ClassifierError, CodecError, DetectorError};
use thiserror::Error;

/// Error taxonomy for engine operations.
///
/// `ClassifierError::NotInitialized` never surfaces from training: the
/// controllers check `is_initialized()` and fall back to `train` instead.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("image decode failed: {0}")]
    Decode(#[from] CodecError),
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("no training data")]
    NoTrainingData,
    #[error("invalid identity name: {0:?}")]
    InvalidIdentity(String),
    #[error("model artifact i/o: {0}")]
    Artifact(#[source] std::io::Error),
    #[error("corrupt model artifact: {0}")]
    CorruptArtifact(String),
    #[error("photo store i/o: {0}")]
    PhotoStore(#[source] std::io::Error),
    #[error("photo encode/decode: {0}")]
    PhotoImage(#[from] image::ImageError),
    #[error("attendance store: {0}")]
    Attendance(String),
}
