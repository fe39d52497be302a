//! presencia-engine — Attendance recognition/training core.
//!
//! Owns the process-wide [`ModelState`] (trained classifier + identity
//! registry + artifact persistence), the transient pending-photo queue, and
//! the two controllers around them: [`TrainingController`] for enrollment and
//! (re)training, [`RecognitionController`] for per-frame recognition with
//! time-windowed attendance deduplication.

pub mod attendance;
pub mod error;
pub mod model;
pub mod pending;
pub mod recognition;
pub mod registry;
pub mod session;
pub mod training;

pub use attendance::{
    AttendanceFilter, AttendanceNotifier, AttendanceRecord, AttendanceStore, StoreNotifier,
    STATUS_PRESENT,
};
pub use error::EngineError;
pub use model::{FsArtifactStore, ModelArtifactStore, ModelInner, ModelState};
pub use pending::{FsPhotoStore, PendingPhotoStore};
pub use recognition::{Recognition, RecognitionController};
pub use registry::{IdentityRegistry, UnknownLabel};
pub use session::{Clock, Observation, SessionState, SystemClock};
pub use training::{FullTrainReport, IncrementalTrainReport, TrainingController};

#[cfg(test)]
pub(crate) mod testutil;
