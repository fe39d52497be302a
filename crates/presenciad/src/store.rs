//! SQLite-backed attendance ledger.

use chrono::{DateTime, Utc};
use presencia_engine::{AttendanceFilter, AttendanceRecord, AttendanceStore, EngineError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS asistencias (
    id         TEXT PRIMARY KEY,
    estudiante TEXT NOT NULL,
    estado     TEXT NOT NULL,
    asignatura TEXT NOT NULL,
    fecha      TEXT NOT NULL
)";

fn sql_err(e: rusqlite::Error) -> EngineError {
    EngineError::Attendance(e.to_string())
}

pub struct SqliteAttendanceStore {
    conn: Mutex<Connection>,
}

impl SqliteAttendanceStore {
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::Attendance(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(sql_err)?;
        Self::with_conn(conn)
    }

    fn with_conn(conn: Connection) -> Result<Self, EngineError> {
        conn.execute(SCHEMA, []).map_err(sql_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let fecha: String = row.get(4)?;
    let recorded_at = DateTime::parse_from_rfc3339(&fecha)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;
    Ok(AttendanceRecord {
        id: row.get(0)?,
        student: row.get(1)?,
        status: row.get(2)?,
        subject: row.get(3)?,
        recorded_at,
    })
}

impl AttendanceStore for SqliteAttendanceStore {
    fn register(
        &self,
        student: &str,
        status: &str,
        subject: &str,
    ) -> Result<AttendanceRecord, EngineError> {
        let record = AttendanceRecord::new(student, status, subject);
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .execute(
                "INSERT INTO asistencias (id, estudiante, estado, asignatura, fecha)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    record.student,
                    record.status,
                    record.subject,
                    record.recorded_at.to_rfc3339(),
                ],
            )
            .map_err(sql_err)?;
        Ok(record)
    }

    fn query(&self, filter: &AttendanceFilter) -> Result<Vec<AttendanceRecord>, EngineError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records = Vec::new();
        match filter {
            AttendanceFilter::All => {
                let mut stmt = conn
                    .prepare("SELECT id, estudiante, estado, asignatura, fecha FROM asistencias ORDER BY fecha")
                    .map_err(sql_err)?;
                let rows = stmt.query_map([], row_to_record).map_err(sql_err)?;
                for row in rows {
                    records.push(row.map_err(sql_err)?);
                }
            }
            AttendanceFilter::Student(name) => {
                let mut stmt = conn
                    .prepare("SELECT id, estudiante, estado, asignatura, fecha FROM asistencias WHERE estudiante = ?1 ORDER BY fecha")
                    .map_err(sql_err)?;
                let rows = stmt.query_map([name], row_to_record).map_err(sql_err)?;
                for row in rows {
                    records.push(row.map_err(sql_err)?);
                }
            }
        }
        Ok(records)
    }

    fn get(&self, id: &str) -> Result<Option<AttendanceRecord>, EngineError> {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .query_row(
                "SELECT id, estudiante, estado, asignatura, fecha FROM asistencias WHERE id = ?1",
                [id],
                row_to_record,
            )
            .optional()
            .map_err(sql_err)
    }
}
