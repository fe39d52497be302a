//! Training orchestration: enrollment photos in, trained model out.
//!
//! Incremental training folds one identity's pending photos into the
//! existing model; full retraining rebuilds classifier and registry from
//! every holding area. Both run under the model mutation lock, so they are
//! mutually exclusive with each other and with recognition reads.

use crate::error::EngineError;
use crate::model::ModelState;
use crate::pending::PendingPhotoStore;
use presencia_core::{codec, normalize, FaceDetector, TrainingSample};
use std::sync::{Arc, Mutex, PoisonError};

/// Result of `train_incremental`.
#[derive(Debug, Clone)]
pub struct IncrementalTrainReport {
    pub identity: String,
    pub images_processed: usize,
}

/// Result of `train_full`.
#[derive(Debug, Clone)]
pub struct FullTrainReport {
    pub identities: usize,
    pub images_total: usize,
}

/// Reject anything that could escape the identity's holding area when used
/// as a directory name.
fn sanitize_identity(identity: &str) -> Result<&str, EngineError> {
    let name = identity.trim();
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
    {
        return Err(EngineError::InvalidIdentity(identity.to_string()));
    }
    Ok(name)
}

pub struct TrainingController {
    detector: Arc<Mutex<Box<dyn FaceDetector>>>,
    model: Arc<ModelState>,
    photos: Arc<dyn PendingPhotoStore>,
}

impl TrainingController {
    pub fn new(
        detector: Arc<Mutex<Box<dyn FaceDetector>>>,
        model: Arc<ModelState>,
        photos: Arc<dyn PendingPhotoStore>,
    ) -> Self {
        Self {
            detector,
            model,
            photos,
        }
    }

    /// Capture one enrollment photo: decode, detect, normalize, queue.
    ///
    /// Returns the stored photo's display path. The patch written here goes
    /// through the same normalization as the recognition path.
    pub fn enroll_photo(&self, identity: &str, payload: &str) -> Result<String, EngineError> {
        let name = sanitize_identity(identity)?;
        let gray = codec::decode_image(payload)?;

        let boxes = self
            .detector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .detect(gray.as_raw(), gray.width(), gray.height())?;
        let Some(face) = boxes.first() else {
            return Err(EngineError::NoFaceDetected);
        };

        let patch = normalize(&gray, face);
        let key = format!(
            "face_{}_{}",
            chrono::Utc::now().timestamp_millis(),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let ruta = self.photos.write(name, &key, &patch)?;

        tracing::info!(identity = name, key = %key, "enrollment photo queued");
        Ok(ruta)
    }

    /// Fold one identity's pending photos into the model.
    ///
    /// Uses `update` when the classifier already has learned state, else
    /// falls back to `train` — which is only acceptable when the state was
    /// empty, since `train` discards identities outside the batch.
    /// Consumed photos are deleted only after the new state is persisted.
    pub fn train_incremental(
        &self,
        identity: &str,
    ) -> Result<IncrementalTrainReport, EngineError> {
        let name = sanitize_identity(identity)?.to_string();

        let pending = self.photos.list(&name)?;
        if pending.is_empty() {
            return Err(EngineError::NoTrainingData);
        }

        self.model.mutate(|m| {
            let label = m.registry.allocate(&name);
            let samples: Vec<TrainingSample> = pending
                .iter()
                .map(|(_, patch)| TrainingSample {
                    patch: patch.clone(),
                    label,
                })
                .collect();

            if m.classifier.is_initialized() {
                m.classifier.update(&samples)?;
            } else {
                tracing::info!(identity = %name, "classifier empty, full train on first batch");
                m.classifier.train(&samples)?;
            }
            Ok(())
        })?;

        for (key, _) in &pending {
            self.photos.delete(&name, key)?;
        }

        tracing::info!(
            identity = %name,
            images = pending.len(),
            "incremental training complete"
        );
        Ok(IncrementalTrainReport {
            identity: name,
            images_processed: pending.len(),
        })
    }

    /// Rebuild the whole model from every pending holding area.
    ///
    /// Labels are reassigned from scratch in holding-area enumeration order,
    /// the registry is replaced entirely, and the classifier is trained
    /// (never updated) on one combined batch. Every holding area is then
    /// deleted in full, regardless of per-photo delete failures.
    pub fn train_full(&self) -> Result<FullTrainReport, EngineError> {
        let identities = self.photos.list_identities()?;
        if identities.is_empty() {
            return Err(EngineError::NoTrainingData);
        }

        let mut batches: Vec<(String, Vec<(String, presencia_core::Patch)>)> = Vec::new();
        let mut samples: Vec<TrainingSample> = Vec::new();
        for (label, name) in identities.iter().enumerate() {
            let pending = self.photos.list(name)?;
            for (_, patch) in &pending {
                samples.push(TrainingSample {
                    patch: patch.clone(),
                    label: label as u32,
                });
            }
            batches.push((name.clone(), pending));
        }
        if samples.is_empty() {
            return Err(EngineError::NoTrainingData);
        }

        self.model.mutate(|m| {
            m.registry.rebuild(identities.clone());
            m.classifier.train(&samples)?;
            Ok(())
        })?;

        for (name, pending) in &batches {
            for (key, _) in pending {
                if let Err(e) = self.photos.delete(name, key) {
                    tracing::warn!(identity = %name, key = %key, error = %e, "failed to delete consumed photo");
                }
            }
        }

        tracing::info!(
            identities = identities.len(),
            images = samples.len(),
            "full retraining complete"
        );
        Ok(FullTrainReport {
            identities: identities.len(),
            images_total: samples.len(),
        })
    }
}
