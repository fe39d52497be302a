//! Per-frame recognition and the attendance decision.
//!
//! One frame in, one structured result out: no face, recognized, or
//! unknown. A recognized identity additionally walks the session dedup
//! state machine, and the attendance notifier fires on the single
//! window-crossing transition.

use crate::attendance::AttendanceNotifier;
use crate::error::EngineError;
use crate::model::ModelState;
use crate::session::{Clock, Observation, SessionState};
use presencia_core::{codec, normalize, FaceDetector};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};

/// Per-frame recognition result. Serializes to the external wire shapes;
/// `confianza` carries the raw classifier distance (lower = stronger).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "estado")]
pub enum Recognition {
    #[serde(rename = "sin_rostro")]
    NoFace,
    #[serde(rename = "reconocido")]
    Recognized {
        #[serde(rename = "estudiante")]
        student: String,
        #[serde(rename = "confianza")]
        distance: f32,
        #[serde(rename = "box")]
        face: [i32; 4],
    },
    #[serde(rename = "desconocido")]
    Unknown {
        #[serde(rename = "confianza")]
        distance: f32,
        #[serde(rename = "box")]
        face: [i32; 4],
    },
}

pub struct RecognitionController {
    detector: Arc<Mutex<Box<dyn FaceDetector>>>,
    model: Arc<ModelState>,
    session: Arc<SessionState>,
    notifier: Arc<dyn AttendanceNotifier>,
    clock: Arc<dyn Clock>,
    /// Maximum distance still accepted as a match.
    acceptance_threshold: f32,
}

impl RecognitionController {
    pub fn new(
        detector: Arc<Mutex<Box<dyn FaceDetector>>>,
        model: Arc<ModelState>,
        session: Arc<SessionState>,
        notifier: Arc<dyn AttendanceNotifier>,
        clock: Arc<dyn Clock>,
        acceptance_threshold: f32,
    ) -> Self {
        Self {
            detector,
            model,
            session,
            notifier,
            clock,
            acceptance_threshold,
        }
    }

    /// Recognize the most prominent face in one frame.
    ///
    /// Only the first detector box is processed — single-subject-per-frame
    /// policy. A predicted label outside the registry is reported as
    /// unknown, not as an error.
    pub fn recognize(&self, payload: &str) -> Result<Recognition, EngineError> {
        let gray = codec::decode_image(payload)?;

        let boxes = self
            .detector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .detect(gray.as_raw(), gray.width(), gray.height())?;
        let Some(face) = boxes.first() else {
            return Ok(Recognition::NoFace);
        };

        let patch = normalize(&gray, face);

        // Predict and resolve under one lock: the classifier must never be
        // read against labels from a different registry.
        let (prediction, resolved) = self.model.with_model(|m| {
            let prediction = m.classifier.predict(&patch)?;
            let resolved = m
                .registry
                .resolve(prediction.label)
                .ok()
                .map(str::to_owned);
            Ok::<_, EngineError>((prediction, resolved))
        })?;

        let bbox = face.to_xywh();

        let student = match resolved {
            Some(name) if prediction.distance < self.acceptance_threshold => name,
            _ => {
                tracing::debug!(
                    label = prediction.label,
                    distance = prediction.distance,
                    "below acceptance: unknown"
                );
                return Ok(Recognition::Unknown {
                    distance: prediction.distance,
                    face: bbox,
                });
            }
        };

        if self.session.observe(&student, self.clock.now()) == Observation::Register {
            // The session transition is already committed; a ledger failure
            // must not fail the frame or re-arm the notifier.
            if let Err(e) = self.notifier.notify(&student) {
                tracing::warn!(identity = %student, error = %e, "attendance notification failed");
            }
        }

        Ok(Recognition::Recognized {
            student,
            distance: prediction.distance,
            face: bbox,
        })
    }

    /// Start a fresh attendance window. No effect on the model.
    pub fn reset_session(&self) {
        self.session.reset();
    }

    /// Ordered names of all enrolled identities.
    pub fn list_identities(&self) -> Vec<String> {
        self.model.with_model(|m| m.registry.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use crate::testutil::{
        detector_with_faces, detector_with_one_face, model_with_stub,
        model_with_stub_distance, png_payload, CountingNotifier, ManualClock, MemoryPhotoStore,
    };
    use crate::training::TrainingController;
    use presencia_core::{Patch, TrainingSample, PATCH_SIZE};
    use std::time::Duration;

    const WINDOW: Duration = Duration::from_secs(2);

    struct Fixture {
        controller: RecognitionController,
        notifier: Arc<CountingNotifier>,
        clock: Arc<ManualClock>,
    }

    /// Controller over a stub model trained so that `patch(fill)` for each
    /// `(fill, label)` pair predicts that label with the given distance.
    fn fixture(trained: &[(u8, u32)], distance: f32, threshold: f32) -> Fixture {
        let (model, stub) = model_with_stub_distance();
        model
            .mutate(|m| {
                m.registry.allocate("ana");
                m.registry.allocate("ben");
                let samples: Vec<TrainingSample> = trained
                    .iter()
                    .map(|&(fill, label)| TrainingSample {
                        patch: Patch::from_raw(vec![fill; (PATCH_SIZE * PATCH_SIZE) as usize])
                            .unwrap(),
                        label,
                    })
                    .collect();
                m.classifier.train(&samples)?;
                Ok(())
            })
            .unwrap();
        stub.set(distance);

        let notifier = Arc::new(CountingNotifier::default());
        let clock = Arc::new(ManualClock::new());
        let controller = RecognitionController::new(
            detector_with_one_face(),
            model,
            Arc::new(SessionState::new(WINDOW)),
            notifier.clone(),
            clock.clone(),
            threshold,
        );
        Fixture {
            controller,
            notifier,
            clock,
        }
    }

    // The stub detector box over a uniform 64×64 image crops a uniform
    // patch, so `png_payload(64, 64, fill)` recognizes as the label trained
    // with `patch(fill)`.
    #[test]
    fn no_face_when_detector_returns_nothing() {
        let model = model_with_stub();
        let controller = RecognitionController::new(
            detector_with_faces(vec![]),
            model,
            Arc::new(SessionState::new(WINDOW)),
            Arc::new(CountingNotifier::default()),
            Arc::new(ManualClock::new()),
            0.6,
        );
        let result = controller.recognize(&png_payload(64, 64, 128)).unwrap();
        assert_eq!(result, Recognition::NoFace);
    }

    #[test]
    fn recognizes_trained_identity() {
        let fx = fixture(&[(128, 0)], 0.1, 0.6);
        let result = fx.controller.recognize(&png_payload(64, 64, 128)).unwrap();
        match result {
            Recognition::Recognized { student, distance, face } => {
                assert_eq!(student, "ana");
                assert!((distance - 0.1).abs() < 1e-6);
                assert_eq!(face.len(), 4);
            }
            other => panic!("expected recognized, got {other:?}"),
        }
    }

    #[test]
    fn distance_at_or_above_threshold_is_unknown() {
        let fx = fixture(&[(128, 0)], 0.6, 0.6);
        let result = fx.controller.recognize(&png_payload(64, 64, 128)).unwrap();
        assert!(matches!(result, Recognition::Unknown { .. }));
    }

    #[test]
    fn threshold_is_monotonic() {
        // Same predicted distance: a tighter threshold can only lose the
        // match, a looser one can only gain it.
        let strict = fixture(&[(128, 0)], 0.5, 0.4);
        assert!(matches!(
            strict.controller.recognize(&png_payload(64, 64, 128)).unwrap(),
            Recognition::Unknown { .. }
        ));

        let loose = fixture(&[(128, 0)], 0.5, 0.9);
        assert!(matches!(
            loose.controller.recognize(&png_payload(64, 64, 128)).unwrap(),
            Recognition::Recognized { .. }
        ));
    }

    #[test]
    fn out_of_registry_label_is_unknown_not_error() {
        // Stub trained with label 7; registry only has labels 0..2.
        let fx = fixture(&[(128, 7)], 0.1, 0.6);
        let result = fx.controller.recognize(&png_payload(64, 64, 128)).unwrap();
        assert!(matches!(result, Recognition::Unknown { .. }));
        assert_eq!(fx.notifier.count(), 0);
    }

    #[test]
    fn dedup_registers_exactly_once_per_session() {
        let fx = fixture(&[(128, 0)], 0.1, 0.6);
        let payload = png_payload(64, 64, 128);

        fx.controller.recognize(&payload).unwrap(); // t=0: first seen
        assert_eq!(fx.notifier.count(), 0);

        fx.clock.advance(Duration::from_secs(1));
        fx.controller.recognize(&payload).unwrap(); // t=1: still pending
        assert_eq!(fx.notifier.count(), 0);

        fx.clock.advance(Duration::from_millis(1500));
        fx.controller.recognize(&payload).unwrap(); // t=2.5: register
        assert_eq!(fx.notifier.count(), 1);

        fx.clock.advance(Duration::from_secs(5));
        fx.controller.recognize(&payload).unwrap(); // already registered
        assert_eq!(fx.notifier.count(), 1);
    }

    #[test]
    fn recognition_is_still_reported_while_pending() {
        let fx = fixture(&[(128, 0)], 0.1, 0.6);
        let result = fx.controller.recognize(&png_payload(64, 64, 128)).unwrap();
        // First sighting: no notifier call yet, but the result shape is the
        // full recognition.
        assert!(matches!(result, Recognition::Recognized { .. }));
        assert_eq!(fx.notifier.count(), 0);
    }

    #[test]
    fn reset_session_rearms_notifier_once() {
        let fx = fixture(&[(128, 0)], 0.1, 0.6);
        let payload = png_payload(64, 64, 128);

        fx.controller.recognize(&payload).unwrap();
        fx.clock.advance(Duration::from_secs(3));
        fx.controller.recognize(&payload).unwrap();
        assert_eq!(fx.notifier.count(), 1);

        fx.controller.reset_session();

        fx.controller.recognize(&payload).unwrap();
        fx.clock.advance(Duration::from_secs(3));
        fx.controller.recognize(&payload).unwrap();
        fx.clock.advance(Duration::from_secs(1));
        fx.controller.recognize(&payload).unwrap();
        assert_eq!(fx.notifier.count(), 2);
    }

    #[test]
    fn notifier_failure_does_not_fail_the_frame() {
        let fx = fixture(&[(128, 0)], 0.1, 0.6);
        fx.notifier.fail_next();
        let payload = png_payload(64, 64, 128);

        fx.controller.recognize(&payload).unwrap();
        fx.clock.advance(Duration::from_secs(3));
        let result = fx.controller.recognize(&payload).unwrap();
        assert!(matches!(result, Recognition::Recognized { .. }));
        // The transition is committed; the failed notification is not retried.
        fx.clock.advance(Duration::from_secs(1));
        fx.controller.recognize(&payload).unwrap();
        assert_eq!(fx.notifier.count(), 0);
    }

    #[test]
    fn enroll_train_recognize_roundtrip() {
        let model = model_with_stub();
        let photos = Arc::new(MemoryPhotoStore::default());
        let detector = detector_with_one_face();
        let training =
            TrainingController::new(detector.clone(), model.clone(), photos.clone());

        let payload = png_payload(64, 64, 200);
        training.enroll_photo("ana", &payload).unwrap();
        training.train_incremental("ana").unwrap();

        let notifier = Arc::new(CountingNotifier::default());
        let recognition = RecognitionController::new(
            detector,
            model,
            Arc::new(SessionState::new(WINDOW)),
            notifier,
            Arc::new(ManualClock::new()),
            0.6,
        );

        match recognition.recognize(&payload).unwrap() {
            Recognition::Recognized { student, .. } => assert_eq!(student, "ana"),
            other => panic!("expected recognized, got {other:?}"),
        }
        assert_eq!(recognition.list_identities(), vec!["ana".to_string()]);
    }

    #[test]
    fn wire_shapes_match_contract() {
        let no_face = serde_json::to_value(Recognition::NoFace).unwrap();
        assert_eq!(no_face, serde_json::json!({"estado": "sin_rostro"}));

        let recognized = serde_json::to_value(Recognition::Recognized {
            student: "ana".into(),
            distance: 0.25,
            face: [1, 2, 3, 4],
        })
        .unwrap();
        assert_eq!(recognized["estado"], "reconocido");
        assert_eq!(recognized["estudiante"], "ana");
        assert!((recognized["confianza"].as_f64().unwrap() - 0.25).abs() < 1e-6);
        assert_eq!(recognized["box"], serde_json::json!([1, 2, 3, 4]));

        let unknown = serde_json::to_value(Recognition::Unknown {
            distance: 0.8,
            face: [0, 0, 10, 10],
        })
        .unwrap();
        assert_eq!(unknown["estado"], "desconocido");
        assert!(unknown.get("estudiante").is_none());
    }

    #[test]
    fn uninitialized_model_propagates_classifier_error() {
        let model = model_with_stub();
        let controller = RecognitionController::new(
            detector_with_one_face(),
            model,
            Arc::new(SessionState::new(WINDOW)),
            Arc::new(CountingNotifier::default()),
            Arc::new(ManualClock::new()),
            0.6,
        );
        assert!(matches!(
            controller.recognize(&png_payload(64, 64, 128)),
            Err(EngineError::Classifier(_))
        ));
    }
}
