use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Root directory of the pending-photo holding areas.
    pub data_dir: PathBuf,
    /// Path of the persisted model artifact.
    pub model_path: PathBuf,
    /// Directory containing the ONNX model files.
    pub onnx_dir: PathBuf,
    /// Path to the SQLite attendance database.
    pub db_path: PathBuf,
    /// Maximum classifier distance still accepted as a match.
    pub acceptance_threshold: f32,
    /// Seconds between first recognition and attendance registration.
    pub dedup_window_secs: u64,
    /// Subject written on automatic attendance records.
    pub subject: String,
}

impl Config {
    /// Load configuration from `PRESENCIA_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_home = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("presencia");

        let data_dir = std::env::var("PRESENCIA_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_home.join("pending"));

        let model_path = std::env::var("PRESENCIA_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_home.join("model.json"));

        let onnx_dir = std::env::var("PRESENCIA_ONNX_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/usr/share/presencia/models"));

        let db_path = std::env::var("PRESENCIA_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_home.join("asistencias.db"));

        Self {
            data_dir,
            model_path,
            onnx_dir,
            db_path,
            acceptance_threshold: env_f32("PRESENCIA_ACCEPTANCE_THRESHOLD", 0.60),
            dedup_window_secs: env_u64("PRESENCIA_DEDUP_WINDOW_SECS", 2),
            subject: std::env::var("PRESENCIA_SUBJECT").unwrap_or_else(|_| "Física".to_string()),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.onnx_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace embedding model.
    pub fn arcface_model_path(&self) -> String {
        self.onnx_dir
            .join("w600k_r50.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
