//! Deterministic fakes shared by the engine unit tests.

use crate::attendance::{AttendanceFilter, AttendanceNotifier, AttendanceRecord, AttendanceStore};
use crate::error::EngineError;
use crate::model::{ModelArtifactStore, ModelState};
use crate::pending::PendingPhotoStore;
use crate::session::Clock;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use presencia_core::{
    ClassifierError, DetectorError, FaceBox, FaceClassifier, FaceDetector, Patch, Prediction,
    TrainingSample,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Uniform gray PNG wrapped as a `data:` URL payload.
pub fn png_payload(width: u32, height: u32, fill: u8) -> String {
    let img = image::GrayImage::from_pixel(width, height, image::Luma([fill]));
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("png encode");
    format!("data:image/png;base64,{}", STANDARD.encode(&bytes))
}

/// Detector that returns a fixed box list for every frame.
pub struct StubDetector {
    faces: Vec<FaceBox>,
}

impl FaceDetector for StubDetector {
    fn detect(
        &mut self,
        _gray: &[u8],
        _width: u32,
        _height: u32,
    ) -> Result<Vec<FaceBox>, DetectorError> {
        Ok(self.faces.clone())
    }
}

pub fn detector_with_faces(faces: Vec<FaceBox>) -> Arc<Mutex<Box<dyn FaceDetector>>> {
    Arc::new(Mutex::new(Box::new(StubDetector { faces })))
}

/// One confident face box inside a 64×64 frame.
pub fn detector_with_one_face() -> Arc<Mutex<Box<dyn FaceDetector>>> {
    detector_with_faces(vec![FaceBox {
        x: 8.0,
        y: 8.0,
        width: 48.0,
        height: 48.0,
        confidence: 0.99,
    }])
}

/// Shared knob for the distance a [`StubClassifier`] reports on a gallery hit.
#[derive(Clone)]
pub struct DistanceHandle(Arc<Mutex<f32>>);

impl DistanceHandle {
    pub fn set(&self, distance: f32) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = distance;
    }

    fn get(&self) -> f32 {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Classifier fake: remembers trained patches byte-for-byte and predicts the
/// trained label when the probe matches exactly. Deterministic on purpose:
/// enrollment and recognition share normalization, so the same source image
/// yields the same patch bytes on both paths.
pub struct StubClassifier {
    gallery: Vec<(Vec<u8>, u32)>,
    distance: DistanceHandle,
}

impl StubClassifier {
    pub fn new() -> Self {
        Self::with_distance(DistanceHandle(Arc::new(Mutex::new(0.1))))
    }

    pub fn with_distance(distance: DistanceHandle) -> Self {
        Self {
            gallery: Vec::new(),
            distance,
        }
    }
}

impl FaceClassifier for StubClassifier {
    fn is_initialized(&self) -> bool {
        !self.gallery.is_empty()
    }

    fn train(&mut self, samples: &[TrainingSample]) -> Result<(), ClassifierError> {
        if samples.is_empty() {
            return Err(ClassifierError::EmptyBatch);
        }
        self.gallery = samples
            .iter()
            .map(|s| (s.patch.as_bytes().to_vec(), s.label))
            .collect();
        Ok(())
    }

    fn update(&mut self, samples: &[TrainingSample]) -> Result<(), ClassifierError> {
        if !self.is_initialized() {
            return Err(ClassifierError::NotInitialized);
        }
        if samples.is_empty() {
            return Err(ClassifierError::EmptyBatch);
        }
        self.gallery.extend(
            samples
                .iter()
                .map(|s| (s.patch.as_bytes().to_vec(), s.label)),
        );
        Ok(())
    }

    fn predict(&mut self, patch: &Patch) -> Result<Prediction, ClassifierError> {
        if !self.is_initialized() {
            return Err(ClassifierError::NotInitialized);
        }
        match self
            .gallery
            .iter()
            .find(|(bytes, _)| bytes.as_slice() == patch.as_bytes())
        {
            Some(&(_, label)) => Ok(Prediction {
                label,
                distance: self.distance.get(),
            }),
            // Probe unseen: far distance, label outside any sane registry.
            None => Ok(Prediction {
                label: u32::MAX,
                distance: 9.9,
            }),
        }
    }

    fn export_state(&self) -> Result<Vec<u8>, ClassifierError> {
        Ok(serde_json::to_vec(&self.gallery)?)
    }

    fn import_state(&mut self, bytes: &[u8]) -> Result<(), ClassifierError> {
        self.gallery = serde_json::from_slice(bytes)?;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryArtifactStore {
    bytes: Arc<Mutex<Option<Vec<u8>>>>,
}

impl ModelArtifactStore for MemoryArtifactStore {
    fn load(&self) -> Result<Option<Vec<u8>>, EngineError> {
        Ok(self.bytes.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, bytes: &[u8]) -> Result<(), EngineError> {
        *self.bytes.lock().unwrap_or_else(PoisonError::into_inner) = Some(bytes.to_vec());
        Ok(())
    }
}

pub fn model_with_stub() -> Arc<ModelState> {
    Arc::new(
        ModelState::load_or_empty(
            Box::new(StubClassifier::new()),
            Box::new(MemoryArtifactStore::default()),
        )
        .expect("empty model"),
    )
}

pub fn model_with_stub_distance() -> (Arc<ModelState>, DistanceHandle) {
    let handle = DistanceHandle(Arc::new(Mutex::new(0.1)));
    let model = Arc::new(
        ModelState::load_or_empty(
            Box::new(StubClassifier::with_distance(handle.clone())),
            Box::new(MemoryArtifactStore::default()),
        )
        .expect("empty model"),
    );
    (model, handle)
}

/// In-memory pending-photo mapping; enumeration order is key order, like the
/// sorted filesystem store.
#[derive(Default)]
pub struct MemoryPhotoStore {
    areas: Mutex<BTreeMap<String, BTreeMap<String, Patch>>>,
}

impl PendingPhotoStore for MemoryPhotoStore {
    fn write(&self, identity: &str, key: &str, patch: &Patch) -> Result<String, EngineError> {
        self.areas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(identity.to_string())
            .or_default()
            .insert(key.to_string(), patch.clone());
        Ok(format!("mem://{identity}/{key}"))
    }

    fn list(&self, identity: &str) -> Result<Vec<(String, Patch)>, EngineError> {
        Ok(self
            .areas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .map(|area| area.iter().map(|(k, p)| (k.clone(), p.clone())).collect())
            .unwrap_or_default())
    }

    fn delete(&self, identity: &str, key: &str) -> Result<(), EngineError> {
        let mut areas = self.areas.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(area) = areas.get_mut(identity) {
            area.remove(key);
            if area.is_empty() {
                areas.remove(identity);
            }
        }
        Ok(())
    }

    fn list_identities(&self) -> Result<Vec<String>, EngineError> {
        Ok(self
            .areas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, area)| !area.is_empty())
            .map(|(name, _)| name.clone())
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryAttendanceStore {
    records: Mutex<Vec<AttendanceRecord>>,
}

impl AttendanceStore for MemoryAttendanceStore {
    fn register(
        &self,
        student: &str,
        status: &str,
        subject: &str,
    ) -> Result<AttendanceRecord, EngineError> {
        let record = AttendanceRecord::new(student, status, subject);
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(record)
    }

    fn query(&self, filter: &AttendanceFilter) -> Result<Vec<AttendanceRecord>, EngineError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(match filter {
            AttendanceFilter::All => records.clone(),
            AttendanceFilter::Student(name) => records
                .iter()
                .filter(|r| &r.student == name)
                .cloned()
                .collect(),
        })
    }

    fn get(&self, id: &str) -> Result<Option<AttendanceRecord>, EngineError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }
}

/// Counts notifications; can be armed to fail the next call.
#[derive(Default)]
pub struct CountingNotifier {
    count: AtomicUsize,
    fail_next: AtomicBool,
}

impl CountingNotifier {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl AttendanceNotifier for CountingNotifier {
    fn notify(&self, _identity: &str) -> Result<(), EngineError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(EngineError::Attendance("stub failure".into()));
        }
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Clock whose time only moves when the test says so.
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
