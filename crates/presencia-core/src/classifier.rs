//! Trainable face classifier.
//!
//! The capability contract is [`FaceClassifier`]: a mutable model that maps a
//! canonical face patch to a `(label, distance)` prediction, supports full
//! (`train`) and incremental (`update`) training, and can export/import its
//! learned state as opaque bytes for artifact persistence.
//!
//! The production implementation keeps one ArcFace prototype embedding per
//! trained photo and predicts by nearest prototype, reporting
//! `distance = 1 − cosine similarity` so that smaller means stronger.

use crate::embedder::FaceEmbedder;
use crate::embedding::Embedding;
use crate::types::{Patch, Prediction, TrainingSample};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const STATE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0} — download from insightface and place in the model dir")]
    ModelNotFound(String),
    #[error("classifier has no trained state")]
    NotInitialized,
    #[error("empty training batch")]
    EmptyBatch,
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("unsupported classifier state (version {0})")]
    UnsupportedState(u32),
    #[error("corrupt classifier state: {0}")]
    CorruptState(#[from] serde_json::Error),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Capability contract for a trainable face classification model.
///
/// `distance` follows the distance-metric convention: smaller = stronger
/// match. `update` fails with [`ClassifierError::NotInitialized`] when no
/// prior state exists; callers are expected to check [`is_initialized`]
/// first and fall back to `train`.
///
/// [`is_initialized`]: FaceClassifier::is_initialized
pub trait FaceClassifier: Send {
    fn is_initialized(&self) -> bool;

    /// Replace all learned state with this batch.
    fn train(&mut self, samples: &[TrainingSample]) -> Result<(), ClassifierError>;

    /// Extend learned state without forgetting prior identities.
    fn update(&mut self, samples: &[TrainingSample]) -> Result<(), ClassifierError>;

    fn predict(&mut self, patch: &Patch) -> Result<Prediction, ClassifierError>;

    /// Serialize learned state to opaque bytes.
    fn export_state(&self) -> Result<Vec<u8>, ClassifierError>;

    /// Restore learned state from [`export_state`](FaceClassifier::export_state) bytes.
    fn import_state(&mut self, bytes: &[u8]) -> Result<(), ClassifierError>;
}

/// One labeled gallery entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Prototype {
    label: u32,
    embedding: Embedding,
}

#[derive(Serialize, Deserialize)]
struct PrototypeState {
    version: u32,
    prototypes: Vec<Prototype>,
}

/// Find the nearest prototype by cosine similarity.
///
/// Returns `(label, distance)` with `distance = 1 − similarity` ∈ [0, 2].
fn nearest(prototypes: &[Prototype], probe: &Embedding) -> Option<(u32, f32)> {
    let mut best: Option<(u32, f32)> = None;
    for proto in prototypes {
        let sim = probe.similarity(&proto.embedding);
        if best.map_or(true, |(_, s)| sim > s) {
            best = Some((proto.label, sim));
        }
    }
    best.map(|(label, sim)| (label, 1.0 - sim))
}

/// Production classifier: ArcFace embedder + nearest-prototype gallery.
pub struct PrototypeClassifier {
    embedder: FaceEmbedder,
    prototypes: Vec<Prototype>,
}

impl PrototypeClassifier {
    pub fn new(embedder: FaceEmbedder) -> Self {
        Self {
            embedder,
            prototypes: Vec::new(),
        }
    }

    fn embed_batch(&mut self, samples: &[TrainingSample]) -> Result<Vec<Prototype>, ClassifierError> {
        if samples.is_empty() {
            return Err(ClassifierError::EmptyBatch);
        }
        // Embed the whole batch before touching the gallery so a mid-batch
        // inference failure leaves the learned state untouched.
        let mut out = Vec::with_capacity(samples.len());
        for sample in samples {
            out.push(Prototype {
                label: sample.label,
                embedding: self.embedder.embed(&sample.patch)?,
            });
        }
        Ok(out)
    }
}

impl FaceClassifier for PrototypeClassifier {
    fn is_initialized(&self) -> bool {
        !self.prototypes.is_empty()
    }

    fn train(&mut self, samples: &[TrainingSample]) -> Result<(), ClassifierError> {
        let batch = self.embed_batch(samples)?;
        self.prototypes = batch;
        tracing::debug!(prototypes = self.prototypes.len(), "classifier retrained");
        Ok(())
    }

    fn update(&mut self, samples: &[TrainingSample]) -> Result<(), ClassifierError> {
        if !self.is_initialized() {
            return Err(ClassifierError::NotInitialized);
        }
        let batch = self.embed_batch(samples)?;
        self.prototypes.extend(batch);
        tracing::debug!(prototypes = self.prototypes.len(), "classifier updated");
        Ok(())
    }

    fn predict(&mut self, patch: &Patch) -> Result<Prediction, ClassifierError> {
        if !self.is_initialized() {
            return Err(ClassifierError::NotInitialized);
        }
        let probe = self.embedder.embed(patch)?;
        // is_initialized checked above; nearest cannot come back empty.
        let (label, distance) =
            nearest(&self.prototypes, &probe).ok_or(ClassifierError::NotInitialized)?;
        Ok(Prediction { label, distance })
    }

    fn export_state(&self) -> Result<Vec<u8>, ClassifierError> {
        let state = PrototypeState {
            version: STATE_VERSION,
            prototypes: self.prototypes.clone(),
        };
        Ok(serde_json::to_vec(&state)?)
    }

    fn import_state(&mut self, bytes: &[u8]) -> Result<(), ClassifierError> {
        let state: PrototypeState = serde_json::from_slice(bytes)?;
        if state.version != STATE_VERSION {
            return Err(ClassifierError::UnsupportedState(state.version));
        }
        self.prototypes = state.prototypes;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proto(label: u32, values: Vec<f32>) -> Prototype {
        Prototype {
            label,
            embedding: Embedding { values },
        }
    }

    #[test]
    fn nearest_empty_gallery() {
        let probe = Embedding { values: vec![1.0, 0.0] };
        assert!(nearest(&[], &probe).is_none());
    }

    #[test]
    fn nearest_picks_best_prototype() {
        let gallery = vec![
            proto(0, vec![0.0, 1.0, 0.0]),
            proto(1, vec![0.0, 0.0, 1.0]),
            proto(2, vec![1.0, 0.0, 0.0]),
        ];
        let probe = Embedding { values: vec![1.0, 0.0, 0.0] };
        let (label, distance) = nearest(&gallery, &probe).unwrap();
        assert_eq!(label, 2);
        assert!(distance.abs() < 1e-6);
    }

    #[test]
    fn nearest_distance_is_one_minus_similarity() {
        let gallery = vec![proto(5, vec![0.0, 1.0])];
        let probe = Embedding { values: vec![1.0, 0.0] };
        let (label, distance) = nearest(&gallery, &probe).unwrap();
        assert_eq!(label, 5);
        // Orthogonal vectors: similarity 0 → distance 1.
        assert!((distance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn state_roundtrip() {
        let state = PrototypeState {
            version: STATE_VERSION,
            prototypes: vec![proto(0, vec![0.1, 0.2]), proto(1, vec![0.3, 0.4])],
        };
        let bytes = serde_json::to_vec(&state).unwrap();
        let restored: PrototypeState = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(restored.prototypes.len(), 2);
        assert_eq!(restored.prototypes[1].label, 1);
    }

    #[test]
    fn state_version_mismatch_detected() {
        let bytes =
            serde_json::to_vec(&PrototypeState { version: 99, prototypes: vec![] }).unwrap();
        let state: PrototypeState = serde_json::from_slice(&bytes).unwrap();
        assert_ne!(state.version, STATE_VERSION);
    }
}
