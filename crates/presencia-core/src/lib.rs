//! presencia-core — Face detection and trainable face classification.
//!
//! Uses SCRFD for face detection and ArcFace embeddings for classification,
//! both running via ONNX Runtime for CPU inference. The classifier is
//! incrementally trainable: it keeps one prototype embedding per enrolled
//! photo and predicts by nearest prototype.

pub mod classifier;
pub mod codec;
pub mod detector;
pub mod embedder;
pub mod embedding;
pub mod normalize;
pub mod types;

pub use classifier::{ClassifierError, FaceClassifier, PrototypeClassifier};
pub use codec::{decode_image, CodecError};
pub use detector::{DetectorError, FaceDetector, ScrfdDetector};
pub use embedder::FaceEmbedder;
pub use embedding::Embedding;
pub use normalize::normalize;
pub use types::{FaceBox, Patch, Prediction, TrainingSample, PATCH_SIZE};
