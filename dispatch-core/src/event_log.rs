use crate::error::DispatchError;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Reported,
    Assigned,
    Reassigned,
    StatusChanged,
    PriorityChanged,
    NoteAdded,
    Deleted,
}

impl EventType {
    pub fn is_assignment(&self) -> bool {
        matches!(self, EventType::Assigned | EventType::Reassigned)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Option<i64>,
    pub incident_id: String,
    pub event_type: EventType,
    pub actor: String,
    pub description: String,
    pub details: Option<serde_json::Value>,
    pub timestamp: String,
}

/// Append-only audit trail; outlives the incidents it describes.
#[derive(Clone)]
pub struct EventLog {
    db_path: Arc<PathBuf>,
}

impl EventLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DispatchError> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| DispatchError::Store(e.to_string()))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        create_schema(&conn)?;

        Ok(Self {
            db_path: Arc::new(db_path),
        })
    }

    fn connect(&self) -> Result<Connection, DispatchError> {
        let conn = Connection::open(&*self.db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    pub fn append(&self, event: &Event) -> Result<i64, DispatchError> {
        let conn = self.connect()?;
        insert_event(&conn, event)
    }

    pub fn events_for_incident(&self, incident_id: &str) -> Result<Vec<Event>, DispatchError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, incident_id, event_type, actor, description, details, timestamp
             FROM events
             WHERE incident_id = ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![incident_id], map_row)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }
}

pub(crate) fn create_schema(conn: &Connection) -> Result<(), DispatchError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            incident_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            actor TEXT NOT NULL,
            description TEXT NOT NULL,
            details TEXT,
            timestamp TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_events_incident ON events(incident_id);
        ",
    )?;
    Ok(())
}

/// Appends on an open connection, so callers can share a transaction.
pub(crate) fn insert_event(conn: &Connection, event: &Event) -> Result<i64, DispatchError> {
    let event_type = serde_json::to_string(&event.event_type)?;
    let details = event.details.as_ref().map(serde_json::to_string).transpose()?;

    conn.execute(
        "INSERT INTO events (incident_id, event_type, actor, description, details, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.incident_id,
            event_type,
            event.actor,
            event.description,
            details,
            event.timestamp,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    let event_type_str: String = row.get(2)?;
    let details_str: Option<String> = row.get(5)?;

    let event_type: EventType = serde_json::from_str(&event_type_str).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(err))
    })?;

    let details = details_str
        .map(|s| {
            serde_json::from_str(&s).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(err))
            })
        })
        .transpose()?;

    Ok(Event {
        id: row.get(0)?,
        incident_id: row.get(1)?,
        event_type,
        actor: row.get(3)?,
        description: row.get(4)?,
        details,
        timestamp: row.get(6)?,
    })
}
