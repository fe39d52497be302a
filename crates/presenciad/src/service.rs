//! Engine thread and D-Bus service surface.
//!
//! Every model-touching operation is funnelled through one dedicated OS
//! thread via a request channel: a single-writer queue, so training and
//! recognition are serialized against the shared model state without the
//! D-Bus handlers ever blocking the async runtime.

use presencia_engine::{
    AttendanceFilter, AttendanceStore, EngineError, FullTrainReport, IncrementalTrainReport,
    Recognition, RecognitionController, TrainingController, STATUS_PRESENT,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use zbus::interface;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("engine thread exited")]
    ChannelClosed,
}

pub enum TrainKind {
    Incremental(String),
    Full,
}

pub enum TrainOutcome {
    Incremental(IncrementalTrainReport),
    Full(FullTrainReport),
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Recognize {
        payload: String,
        reply: oneshot::Sender<Result<Recognition, EngineError>>,
    },
    Enroll {
        student: String,
        payload: String,
        reply: oneshot::Sender<Result<String, EngineError>>,
    },
    Train {
        kind: TrainKind,
        reply: oneshot::Sender<Result<TrainOutcome, EngineError>>,
    },
    ListStudents {
        reply: oneshot::Sender<Vec<String>>,
    },
    ResetSession {
        reply: oneshot::Sender<()>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn send<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, ServiceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| ServiceError::ChannelClosed)?;
        reply_rx.await.map_err(|_| ServiceError::ChannelClosed)
    }

    pub async fn recognize(&self, payload: String) -> Result<Recognition, ServiceError> {
        self.send(|reply| EngineRequest::Recognize { payload, reply })
            .await?
            .map_err(ServiceError::Engine)
    }

    pub async fn enroll(&self, student: String, payload: String) -> Result<String, ServiceError> {
        self.send(|reply| EngineRequest::Enroll {
            student,
            payload,
            reply,
        })
        .await?
        .map_err(ServiceError::Engine)
    }

    pub async fn train(&self, kind: TrainKind) -> Result<TrainOutcome, ServiceError> {
        self.send(|reply| EngineRequest::Train { kind, reply })
            .await?
            .map_err(ServiceError::Engine)
    }

    pub async fn list_students(&self) -> Result<Vec<String>, ServiceError> {
        self.send(|reply| EngineRequest::ListStudents { reply }).await
    }

    pub async fn reset_session(&self) -> Result<(), ServiceError> {
        self.send(|reply| EngineRequest::ResetSession { reply }).await
    }
}

/// Spawn the engine on a dedicated OS thread and enter its request loop.
pub fn spawn_engine(
    training: TrainingController,
    recognition: RecognitionController,
) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("presencia-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Recognize { payload, reply } => {
                        let _ = reply.send(recognition.recognize(&payload));
                    }
                    EngineRequest::Enroll {
                        student,
                        payload,
                        reply,
                    } => {
                        let _ = reply.send(training.enroll_photo(&student, &payload));
                    }
                    EngineRequest::Train { kind, reply } => {
                        let result = match kind {
                            TrainKind::Incremental(student) => training
                                .train_incremental(&student)
                                .map(TrainOutcome::Incremental),
                            TrainKind::Full => training.train_full().map(TrainOutcome::Full),
                        };
                        let _ = reply.send(result);
                    }
                    EngineRequest::ListStudents { reply } => {
                        let _ = reply.send(recognition.list_identities());
                    }
                    EngineRequest::ResetSession { reply } => {
                        recognition.reset_session();
                        let _ = reply.send(());
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}

// --- Wire envelopes ---
//
// D-Bus methods answer with JSON strings. Failures ride in-band in the
// `ok`/`msg` (or `estado: error`) envelopes the frontend already speaks.

fn recognition_envelope(result: Result<Recognition, ServiceError>) -> String {
    match result {
        Ok(recognition) => serde_json::to_string(&recognition)
            .unwrap_or_else(|e| error_envelope(&e.to_string())),
        Err(e) => error_envelope(&e.to_string()),
    }
}

fn error_envelope(message: &str) -> String {
    serde_json::json!({"estado": "error", "mensaje": message}).to_string()
}

fn enroll_envelope(result: Result<String, ServiceError>) -> String {
    match result {
        Ok(ruta) => {
            serde_json::json!({"ok": true, "msg": "guardado", "ruta": ruta}).to_string()
        }
        Err(e) => serde_json::json!({"ok": false, "msg": e.to_string()}).to_string(),
    }
}

fn train_envelope(result: Result<TrainOutcome, ServiceError>) -> String {
    match result {
        Ok(TrainOutcome::Incremental(report)) => serde_json::json!({
            "ok": true,
            "msg": "Modelo entrenado",
            "imagenes_procesadas": report.images_processed,
        })
        .to_string(),
        Ok(TrainOutcome::Full(report)) => serde_json::json!({
            "ok": true,
            "msg": "Modelo entrenado completo",
            "personas": report.identities,
            "imagenes_totales": report.images_total,
        })
        .to_string(),
        Err(e) => serde_json::json!({"ok": false, "msg": e.to_string()}).to_string(),
    }
}

/// D-Bus interface for the attendance daemon.
///
/// Bus name: org.presencia.Attendance1
/// Object path: /org/presencia/Attendance1
pub struct AttendanceService {
    engine: EngineHandle,
    attendance: Arc<dyn AttendanceStore>,
    default_subject: String,
}

impl AttendanceService {
    pub fn new(
        engine: EngineHandle,
        attendance: Arc<dyn AttendanceStore>,
        default_subject: String,
    ) -> Self {
        Self {
            engine,
            attendance,
            default_subject,
        }
    }
}

#[interface(name = "org.presencia.Attendance1")]
impl AttendanceService {
    /// Recognize the face in a base64 image payload.
    async fn recognize(&self, image: &str) -> String {
        recognition_envelope(self.engine.recognize(image.to_string()).await)
    }

    /// Queue one enrollment photo for a student.
    async fn enroll_photo(&self, student: &str, photo: &str) -> String {
        tracing::info!(student, "enroll photo requested");
        enroll_envelope(
            self.engine
                .enroll(student.to_string(), photo.to_string())
                .await,
        )
    }

    /// Train the model. `kind` is "completo" for a full retrain, anything
    /// else trains the named student incrementally.
    async fn train(&self, student: &str, kind: &str) -> String {
        tracing::info!(student, kind, "training requested");
        let kind = if kind == "completo" {
            TrainKind::Full
        } else {
            TrainKind::Incremental(student.to_string())
        };
        train_envelope(self.engine.train(kind).await)
    }

    /// List students enrolled in the model.
    async fn list_students(&self) -> String {
        match self.engine.list_students().await {
            Ok(students) => serde_json::json!({
                "total": students.len(),
                "estudiantes": students,
            })
            .to_string(),
            Err(e) => error_envelope(&e.to_string()),
        }
    }

    /// Start a fresh attendance session.
    async fn reset_session(&self) -> String {
        match self.engine.reset_session().await {
            Ok(()) => serde_json::json!({"ok": true, "msg": "sesión reiniciada"}).to_string(),
            Err(e) => serde_json::json!({"ok": false, "msg": e.to_string()}).to_string(),
        }
    }

    /// Register an attendance record manually.
    async fn register_attendance(&self, student: &str, status: &str, subject: &str) -> String {
        let status = if status.is_empty() { STATUS_PRESENT } else { status };
        let subject = if subject.is_empty() {
            self.default_subject.as_str()
        } else {
            subject
        };
        match self.attendance.register(student, status, subject) {
            Ok(record) => serde_json::to_string(&record)
                .unwrap_or_else(|e| error_envelope(&e.to_string())),
            Err(e) => error_envelope(&e.to_string()),
        }
    }

    /// Query attendance records, optionally by record id or student name.
    async fn query_attendance(&self, student: &str, id: &str) -> String {
        if !id.is_empty() {
            return match self.attendance.get(id) {
                Ok(Some(record)) => serde_json::to_string(&record)
                    .unwrap_or_else(|e| error_envelope(&e.to_string())),
                Ok(None) => error_envelope("Asistencia no encontrada"),
                Err(e) => error_envelope(&e.to_string()),
            };
        }

        let filter = if student.is_empty() {
            AttendanceFilter::All
        } else {
            AttendanceFilter::Student(student.to_string())
        };
        match self.attendance.query(&filter) {
            Ok(records) => serde_json::json!({
                "total": records.len(),
                "asistencias": records,
            })
            .to_string(),
            Err(e) => error_envelope(&e.to_string()),
        }
    }

    /// Daemon status summary.
    async fn status(&self) -> String {
        let students = self.engine.list_students().await.unwrap_or_default();
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "estudiantes": students.len(),
        })
        .to_string()
    }
}
