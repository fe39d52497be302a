//! Attendance ledger collaborators.
//!
//! The engine only ever talks to the ledger through these narrow traits.
//! Production backs [`AttendanceStore`] with SQLite (in the daemon crate);
//! tests use an in-memory store.

use crate::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Default status written by the automatic recognition path.
pub const STATUS_PRESENT: &str = "Presente";

/// One attendance event. Field names are the ledger's external contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    #[serde(rename = "estudiante")]
    pub student: String,
    #[serde(rename = "estadoAsistencia")]
    pub status: String,
    #[serde(rename = "asignatura")]
    pub subject: String,
    #[serde(rename = "fecha")]
    pub recorded_at: DateTime<Utc>,
}

impl AttendanceRecord {
    pub fn new(student: &str, status: &str, subject: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            student: student.to_string(),
            status: status.to_string(),
            subject: subject.to_string(),
            recorded_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum AttendanceFilter {
    All,
    Student(String),
}

/// Narrow write/query interface over the persistent attendance ledger.
pub trait AttendanceStore: Send + Sync {
    fn register(
        &self,
        student: &str,
        status: &str,
        subject: &str,
    ) -> Result<AttendanceRecord, EngineError>;

    fn query(&self, filter: &AttendanceFilter) -> Result<Vec<AttendanceRecord>, EngineError>;

    fn get(&self, id: &str) -> Result<Option<AttendanceRecord>, EngineError>;
}

/// Records an attendance event for an identity. Invoked by the recognition
/// controller at most once per identity per session.
pub trait AttendanceNotifier: Send + Sync {
    fn notify(&self, identity: &str) -> Result<(), EngineError>;
}

/// Production notifier: writes a "Presente" record for the configured
/// subject into the attendance store.
pub struct StoreNotifier {
    store: Arc<dyn AttendanceStore>,
    subject: String,
}

impl StoreNotifier {
    pub fn new(store: Arc<dyn AttendanceStore>, subject: impl Into<String>) -> Self {
        Self {
            store,
            subject: subject.into(),
        }
    }
}

impl AttendanceNotifier for StoreNotifier {
    fn notify(&self, identity: &str) -> Result<(), EngineError> {
        let record = self.store.register(identity, STATUS_PRESENT, &self.subject)?;
        tracing::info!(
            identity,
            record_id = %record.id,
            subject = %self.subject,
            "attendance registered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemoryAttendanceStore;

    #[test]
    fn record_serializes_with_ledger_field_names() {
        let record = AttendanceRecord::new("ana", STATUS_PRESENT, "Física");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["estudiante"], "ana");
        assert_eq!(value["estadoAsistencia"], "Presente");
        assert_eq!(value["asignatura"], "Física");
        assert!(value["fecha"].is_string());
        assert!(value["id"].is_string());
    }

    #[test]
    fn store_notifier_writes_present_record() {
        let store = Arc::new(MemoryAttendanceStore::default());
        let notifier = StoreNotifier::new(store.clone(), "Física");

        notifier.notify("ana").unwrap();

        let records = store.query(&AttendanceFilter::Student("ana".into())).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, STATUS_PRESENT);
        assert_eq!(records[0].subject, "Física");
    }
}
