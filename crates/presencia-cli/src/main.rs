use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

// D-Bus proxy — `#[zbus::proxy]` generates `AttendanceProxy` from the
// daemon's org.presencia.Attendance1 interface.
#[zbus::proxy(
    interface = "org.presencia.Attendance1",
    default_service = "org.presencia.Attendance1",
    default_path = "/org/presencia/Attendance1"
)]
trait Attendance {
    async fn recognize(&self, image: &str) -> zbus::Result<String>;
    async fn enroll_photo(&self, student: &str, photo: &str) -> zbus::Result<String>;
    async fn train(&self, student: &str, kind: &str) -> zbus::Result<String>;
    async fn list_students(&self) -> zbus::Result<String>;
    async fn reset_session(&self) -> zbus::Result<String>;
    async fn register_attendance(
        &self,
        student: &str,
        status: &str,
        subject: &str,
    ) -> zbus::Result<String>;
    async fn query_attendance(&self, student: &str, id: &str) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "presencia", about = "Presencia classroom attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue an enrollment photo for a student
    Enroll {
        /// Student name
        student: String,
        /// Image file (png or jpeg)
        image: PathBuf,
    },
    /// Recognize the face in an image
    Recognize {
        /// Image file (png or jpeg)
        image: PathBuf,
    },
    /// Train the model from queued photos
    Train {
        /// Student to train incrementally; omit with --full
        student: Option<String>,
        /// Rebuild the whole model from every queue
        #[arg(long)]
        full: bool,
    },
    /// List students enrolled in the model
    List,
    /// Start a fresh attendance session
    ResetSession,
    /// Register or query attendance records
    Attendance {
        /// Register a record for this student instead of querying
        #[arg(long)]
        register: Option<String>,
        /// Filter queries by student name
        #[arg(long)]
        student: Option<String>,
        /// Fetch one record by id
        #[arg(long)]
        id: Option<String>,
    },
    /// Show daemon status
    Status,
}

/// Read an image file into the `data:` URL payload the daemon expects.
fn image_payload(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let media_type = match path.extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "image/png",
    };
    Ok(format!("data:{media_type};base64,{}", STANDARD.encode(&bytes)))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let connection = zbus::Connection::system()
        .await
        .context("connecting to the system bus — is presenciad running?")?;
    let proxy = AttendanceProxy::new(&connection).await?;

    let response = match cli.command {
        Commands::Enroll { student, image } => {
            proxy.enroll_photo(&student, &image_payload(&image)?).await?
        }
        Commands::Recognize { image } => proxy.recognize(&image_payload(&image)?).await?,
        Commands::Train { student, full } => {
            if full {
                proxy.train("", "completo").await?
            } else {
                let student = student
                    .context("a student name is required unless --full is given")?;
                proxy.train(&student, "incremental").await?
            }
        }
        Commands::List => proxy.list_students().await?,
        Commands::ResetSession => proxy.reset_session().await?,
        Commands::Attendance {
            register,
            student,
            id,
        } => {
            if let Some(name) = register {
                proxy.register_attendance(&name, "", "").await?
            } else {
                proxy
                    .query_attendance(student.as_deref().unwrap_or(""), id.as_deref().unwrap_or(""))
                    .await?
            }
        }
        Commands::Status => proxy.status().await?,
    };

    println!("{response}");
    Ok(())
}
