use anyhow::Result;
use presencia_core::{FaceDetector, FaceEmbedder, PrototypeClassifier, ScrfdDetector};
use presencia_engine::{
    FsArtifactStore, FsPhotoStore, ModelState, RecognitionController, SessionState, StoreNotifier,
    SystemClock, TrainingController,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod service;
mod store;

use config::Config;
use service::AttendanceService;
use store::SqliteAttendanceStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("presenciad starting");

    let config = Config::from_env();

    let detector: Box<dyn FaceDetector> =
        Box::new(ScrfdDetector::load(&config.scrfd_model_path())?);
    let embedder = FaceEmbedder::load(&config.arcface_model_path())?;
    let classifier = Box::new(PrototypeClassifier::new(embedder));

    let model = Arc::new(ModelState::load_or_empty(
        classifier,
        Box::new(FsArtifactStore::new(&config.model_path)),
    )?);
    let photos = Arc::new(FsPhotoStore::new(&config.data_dir));
    let attendance = Arc::new(SqliteAttendanceStore::open(&config.db_path)?);
    let notifier = Arc::new(StoreNotifier::new(
        attendance.clone(),
        config.subject.clone(),
    ));
    let session = Arc::new(SessionState::new(Duration::from_secs(
        config.dedup_window_secs,
    )));
    let detector = Arc::new(Mutex::new(detector));

    let training = TrainingController::new(detector.clone(), model.clone(), photos);
    let recognition = RecognitionController::new(
        detector,
        model.clone(),
        session,
        notifier,
        Arc::new(SystemClock),
        config.acceptance_threshold,
    );

    let engine = service::spawn_engine(training, recognition);
    let service = AttendanceService::new(engine, attendance, config.subject.clone());

    let _conn = zbus::connection::Builder::system()?
        .name("org.presencia.Attendance1")?
        .serve_at("/org/presencia/Attendance1", service)?
        .build()
        .await?;

    tracing::info!(
        threshold = config.acceptance_threshold,
        window_secs = config.dedup_window_secs,
        "presenciad ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("presenciad shutting down");
    model.flush()?;

    Ok(())
}
