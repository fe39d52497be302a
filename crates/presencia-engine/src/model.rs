//! Process-wide model state: classifier + registry + artifact persistence.
//!
//! The classifier and the registry are one unit. They are stored in a single
//! artifact document and guarded by a single lock, so no reader can observe
//! a classifier trained against labels from an old registry or vice versa.

use crate::error::EngineError;
use crate::registry::IdentityRegistry;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use presencia_core::FaceClassifier;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Persistence boundary for the trained model artifact.
pub trait ModelArtifactStore: Send + Sync {
    /// Returns `None` when no artifact has ever been saved.
    fn load(&self) -> Result<Option<Vec<u8>>, EngineError>;
    fn save(&self, bytes: &[u8]) -> Result<(), EngineError>;
}

/// File-backed artifact store. Saves via temp file + rename so a crash
/// mid-write cannot leave a truncated artifact behind.
pub struct FsArtifactStore {
    path: PathBuf,
}

impl FsArtifactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ModelArtifactStore for FsArtifactStore {
    fn load(&self) -> Result<Option<Vec<u8>>, EngineError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::Artifact(e)),
        }
    }

    fn save(&self, bytes: &[u8]) -> Result<(), EngineError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(EngineError::Artifact)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, bytes).map_err(EngineError::Artifact)?;
        std::fs::rename(&tmp, &self.path).map_err(EngineError::Artifact)?;
        Ok(())
    }
}

/// On-disk artifact layout: the registry's ordered name list plus the
/// classifier's opaque exported state, together in one document.
#[derive(Serialize, Deserialize)]
struct ArtifactDoc {
    identities: Vec<String>,
    classifier: String, // base64 of FaceClassifier::export_state
}

pub struct ModelInner {
    pub classifier: Box<dyn FaceClassifier>,
    pub registry: IdentityRegistry,
}

/// The single long-lived mutable model object.
///
/// Mutated exclusively through [`ModelState::mutate`] (training operations);
/// read through [`ModelState::with_model`]. Both paths take the same lock,
/// so training is mutually exclusive with any read of the
/// (classifier, registry) pair and the swap appears atomic to readers.
pub struct ModelState {
    inner: Mutex<ModelInner>,
    artifacts: Box<dyn ModelArtifactStore>,
}

impl ModelState {
    /// Construct by loading an existing artifact if present, else empty.
    ///
    /// A present-but-corrupt artifact is an error: silently starting empty
    /// would orphan every enrolled identity.
    pub fn load_or_empty(
        mut classifier: Box<dyn FaceClassifier>,
        artifacts: Box<dyn ModelArtifactStore>,
    ) -> Result<Self, EngineError> {
        let mut registry = IdentityRegistry::new();

        if let Some(bytes) = artifacts.load()? {
            let doc: ArtifactDoc = serde_json::from_slice(&bytes)
                .map_err(|e| EngineError::CorruptArtifact(e.to_string()))?;
            let state = STANDARD
                .decode(&doc.classifier)
                .map_err(|e| EngineError::CorruptArtifact(e.to_string()))?;
            classifier.import_state(&state)?;
            registry = IdentityRegistry::from_names(doc.identities);
            tracing::info!(identities = registry.len(), "model artifact loaded");
        } else {
            tracing::info!("no model artifact found, starting empty");
        }

        Ok(Self {
            inner: Mutex::new(ModelInner { classifier, registry }),
            artifacts,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ModelInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a training mutation and persist the result before releasing the
    /// lock. On any failure — the mutation itself or persistence — the prior
    /// in-memory state is restored, so a partial mutation is never visible.
    pub fn mutate<T>(
        &self,
        f: impl FnOnce(&mut ModelInner) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut inner = self.lock();
        let saved_registry = inner.registry.clone();
        let saved_classifier = inner.classifier.export_state()?;

        let result = f(&mut inner).and_then(|out| {
            Self::persist(self.artifacts.as_ref(), &inner)?;
            Ok(out)
        });

        if result.is_err() {
            inner.registry = saved_registry;
            if let Err(e) = inner.classifier.import_state(&saved_classifier) {
                tracing::error!(error = %e, "failed to roll back classifier state");
            }
        }
        result
    }

    /// Read the consistent (classifier, registry) pair. The closure receives
    /// `&mut` because prediction drives an inference session, but callers
    /// must not use this for training mutations — nothing is persisted.
    pub fn with_model<T>(&self, f: impl FnOnce(&mut ModelInner) -> T) -> T {
        let mut inner = self.lock();
        f(&mut inner)
    }

    /// Persist the current state. Explicit shutdown/flush step; training
    /// operations already persist on every mutation.
    pub fn flush(&self) -> Result<(), EngineError> {
        let inner = self.lock();
        Self::persist(self.artifacts.as_ref(), &inner)
    }

    fn persist(
        artifacts: &dyn ModelArtifactStore,
        inner: &ModelInner,
    ) -> Result<(), EngineError> {
        let doc = ArtifactDoc {
            identities: inner.registry.snapshot(),
            classifier: STANDARD.encode(inner.classifier.export_state()?),
        };
        let bytes =
            serde_json::to_vec(&doc).map_err(|e| EngineError::CorruptArtifact(e.to_string()))?;
        artifacts.save(&bytes)
    }
}
