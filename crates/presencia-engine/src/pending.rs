//! Pending-photo queue — transient per-identity holding areas.
//!
//! Normalized patches wait here between enrollment and training. Photos are
//! never retained after training consumes them; durability lives in the
//! classifier's learned state, not in stored images.

use crate::error::EngineError;
use presencia_core::{Patch, PATCH_SIZE};
use std::path::PathBuf;

/// Transient per-identity holding area for normalized face patches.
pub trait PendingPhotoStore: Send + Sync {
    /// Store a patch under `identity`/`key`. Returns a display path for the
    /// caller's receipt.
    fn write(&self, identity: &str, key: &str, patch: &Patch) -> Result<String, EngineError>;

    /// All pending patches for one identity, in stable key order.
    fn list(&self, identity: &str) -> Result<Vec<(String, Patch)>, EngineError>;

    /// Remove one consumed patch. Removing the last patch removes the
    /// holding area itself.
    fn delete(&self, identity: &str, key: &str) -> Result<(), EngineError>;

    /// Identities with a non-empty holding area, in stable order. This order
    /// is the label order of a full retrain.
    fn list_identities(&self) -> Result<Vec<String>, EngineError>;
}

/// File-backed store: `<root>/<identity>/<key>.png`.
pub struct FsPhotoStore {
    root: PathBuf,
}

impl FsPhotoStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn identity_dir(&self, identity: &str) -> PathBuf {
        self.root.join(identity)
    }
}

impl PendingPhotoStore for FsPhotoStore {
    fn write(&self, identity: &str, key: &str, patch: &Patch) -> Result<String, EngineError> {
        let dir = self.identity_dir(identity);
        std::fs::create_dir_all(&dir).map_err(EngineError::PhotoStore)?;
        let path = dir.join(format!("{key}.png"));
        patch
            .to_image()
            .save_with_format(&path, image::ImageFormat::Png)?;
        Ok(path.to_string_lossy().into_owned())
    }

    fn list(&self, identity: &str) -> Result<Vec<(String, Patch)>, EngineError> {
        let dir = self.identity_dir(identity);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::PhotoStore(e)),
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
            .collect();
        paths.sort();

        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(key) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            let img = match image::open(&path) {
                Ok(img) => img.to_luma8(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable pending photo");
                    continue;
                }
            };
            match Patch::from_image(&img) {
                Some(patch) => out.push((key, patch)),
                None => {
                    tracing::warn!(
                        path = %path.display(),
                        width = img.width(),
                        height = img.height(),
                        expected = PATCH_SIZE,
                        "skipping pending photo with non-canonical size"
                    );
                }
            }
        }
        Ok(out)
    }

    fn delete(&self, identity: &str, key: &str) -> Result<(), EngineError> {
        let dir = self.identity_dir(identity);
        std::fs::remove_file(dir.join(format!("{key}.png"))).map_err(EngineError::PhotoStore)?;
        // Drop the holding area once it is empty; leftovers (non-photo
        // files) keep it alive.
        if std::fs::read_dir(&dir).map_or(false, |mut it| it.next().is_none()) {
            let _ = std::fs::remove_dir(&dir);
        }
        Ok(())
    }

    fn list_identities(&self) -> Result<Vec<String>, EngineError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::PhotoStore(e)),
        };

        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter(|e| {
                std::fs::read_dir(e.path()).map_or(false, |mut it| it.next().is_some())
            })
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }
}
