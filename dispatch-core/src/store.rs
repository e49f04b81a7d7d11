//! Incident persistence.
//!
//! [`IncidentStore`] and [`ResponderDirectory`] are the seams the dispatch
//! service talks to. [`SqliteStore`] implements both on one SQLite file: each
//! incident is a JSON document plus a handful of projected columns used for
//! filtering, ordering and aggregation. Audit events handed to a write land
//! in the same transaction as the incident row.

use crate::error::DispatchError;
use crate::event_log::{self, Event};
use crate::model::{Incident, IncidentType, Priority, Responder, Role, Status};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IncidentFilter {
    pub status: Option<Status>,
    pub incident_type: Option<IncidentType>,
    pub priority: Option<Priority>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    Priority,
    Status,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortOrder {
    pub field: SortField,
    pub descending: bool,
}

impl Default for SortOrder {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            descending: true,
        }
    }
}

impl FromStr for SortOrder {
    type Err = DispatchError;

    /// `createdAt`, `priority` or `status`, prefixed with `-` for descending.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (descending, key) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let field = match key {
            "createdAt" => SortField::CreatedAt,
            "priority" => SortField::Priority,
            "status" => SortField::Status,
            other => {
                return Err(DispatchError::validation(
                    "sort",
                    format!("cannot sort by '{other}'"),
                ))
            }
        };
        Ok(Self { field, descending })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListQuery {
    pub filter: IncidentFilter,
    /// 1-based.
    pub page: u32,
    pub limit: u32,
    pub sort: SortOrder,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            filter: IncidentFilter::default(),
            page: 1,
            limit: 10,
            sort: SortOrder::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn pages(&self) -> u64 {
        if self.limit == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.limit))
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
            total: self.total,
        }
    }
}

/// Closed interval of creation times.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TallyRow {
    pub status: Status,
    pub priority: Priority,
    pub incident_type: IncidentType,
    pub count: u64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tally {
    pub rows: Vec<TallyRow>,
    /// Mean of `response_completed_at - created_at` over completed incidents.
    pub mean_completion_ms: Option<f64>,
}

/// Writes take the audit events describing them; an event that cannot be
/// recorded fails the whole write.
pub trait IncidentStore: Send + Sync {
    fn insert(&self, incident: &Incident, events: &[Event]) -> Result<(), DispatchError>;

    fn get(&self, id: &str) -> Result<Option<Incident>, DispatchError>;

    /// Writes `incident` only if the stored version still equals
    /// `incident.version`. Returns the stored copy with its new version.
    fn update(&self, incident: &Incident, events: &[Event]) -> Result<Incident, DispatchError>;

    /// Events are only recorded when a row was actually removed.
    fn delete(&self, id: &str, events: &[Event]) -> Result<bool, DispatchError>;

    fn list(&self, query: &ListQuery) -> Result<Page<Incident>, DispatchError>;

    /// Incidents bound to `responder_id`, most recently assigned first.
    fn assigned_to(
        &self,
        responder_id: &str,
        filter: &IncidentFilter,
    ) -> Result<Vec<Incident>, DispatchError>;

    fn tally(&self, window: &TimeWindow) -> Result<Tally, DispatchError>;
}

pub trait ResponderDirectory: Send + Sync {
    /// Resolves an account; deleted accounts resolve to `None`.
    fn find_responder(&self, id: &str) -> Result<Option<Responder>, DispatchError>;
}

#[derive(Clone)]
pub struct SqliteStore {
    db_path: Arc<PathBuf>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DispatchError> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| DispatchError::Store(e.to_string()))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            CREATE TABLE IF NOT EXISTS incidents (
                id TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                incident_type TEXT NOT NULL,
                status TEXT NOT NULL,
                status_rank INTEGER NOT NULL,
                priority TEXT NOT NULL,
                priority_rank INTEGER NOT NULL,
                assigned_to TEXT,
                assigned_at_ms INTEGER,
                created_at_ms INTEGER NOT NULL,
                completed_at_ms INTEGER,
                document TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_incidents_created ON incidents(created_at_ms);
            CREATE INDEX IF NOT EXISTS idx_incidents_assignee ON incidents(assigned_to, assigned_at_ms);
            CREATE TABLE IF NOT EXISTS responders (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                role TEXT NOT NULL,
                active INTEGER NOT NULL,
                deleted INTEGER NOT NULL
            );
            ",
        )?;
        event_log::create_schema(&conn)?;

        Ok(Self {
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection, DispatchError> {
        let conn = Connection::open(&*self.db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    pub fn upsert_responder(&self, responder: &Responder) -> Result<(), DispatchError> {
        let conn = self.connect()?;
        let role = serde_json::to_string(&responder.role)?;
        conn.execute(
            "INSERT INTO responders (id, name, role, active, deleted)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                role = excluded.role,
                active = excluded.active,
                deleted = excluded.deleted",
            params![
                responder.id,
                responder.name,
                role,
                responder.active,
                responder.deleted
            ],
        )?;
        Ok(())
    }

    fn exists(&self, conn: &Connection, id: &str) -> Result<bool, DispatchError> {
        let found = conn
            .query_row("SELECT 1 FROM incidents WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }
}

impl IncidentStore for SqliteStore {
    fn insert(&self, incident: &Incident, events: &[Event]) -> Result<(), DispatchError> {
        let mut conn = self.connect()?;
        let p = Projection::of(incident)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO incidents (
                id, version, incident_type, status, status_rank, priority, priority_rank,
                assigned_to, assigned_at_ms, created_at_ms, completed_at_ms, document
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                incident.id,
                incident.version,
                incident.incident_type.as_str(),
                incident.status.as_str(),
                incident.status.index(),
                incident.priority.as_str(),
                incident.priority.rank(),
                incident.assignment.assigned_to,
                p.assigned_at_ms,
                p.created_at_ms,
                p.completed_at_ms,
                p.document,
            ],
        )?;
        append_all(&tx, events)?;
        tx.commit()?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Incident>, DispatchError> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT document, version FROM incidents WHERE id = ?1",
                params![id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        row.map(decode).transpose()
    }

    fn update(&self, incident: &Incident, events: &[Event]) -> Result<Incident, DispatchError> {
        let mut conn = self.connect()?;
        let expected = incident.version;
        let mut next = incident.clone();
        next.version = expected + 1;
        let p = Projection::of(&next)?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE incidents SET
                version = ?1,
                status = ?2,
                status_rank = ?3,
                priority = ?4,
                priority_rank = ?5,
                assigned_to = ?6,
                assigned_at_ms = ?7,
                completed_at_ms = ?8,
                document = ?9
             WHERE id = ?10 AND version = ?11",
            params![
                next.version,
                next.status.as_str(),
                next.status.index(),
                next.priority.as_str(),
                next.priority.rank(),
                next.assignment.assigned_to,
                p.assigned_at_ms,
                p.completed_at_ms,
                p.document,
                next.id,
                expected,
            ],
        )?;

        if changed == 0 {
            if self.exists(&tx, &incident.id)? {
                tracing::warn!(
                    incident_id = %incident.id,
                    expected_version = expected,
                    "conditional update lost a race"
                );
                return Err(DispatchError::ConcurrentModification(incident.id.clone()));
            }
            return Err(DispatchError::IncidentNotFound(incident.id.clone()));
        }
        append_all(&tx, events)?;
        tx.commit()?;
        Ok(next)
    }

    fn delete(&self, id: &str, events: &[Event]) -> Result<bool, DispatchError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute("DELETE FROM incidents WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Ok(false);
        }
        append_all(&tx, events)?;
        tx.commit()?;
        Ok(true)
    }

    fn list(&self, query: &ListQuery) -> Result<Page<Incident>, DispatchError> {
        let conn = self.connect()?;
        let mut clauses = Vec::new();
        let mut args = Vec::new();
        push_filter(&query.filter, &mut clauses, &mut args);
        let where_sql = where_clause(&clauses);

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM incidents{where_sql}"),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        let column = match query.sort.field {
            SortField::CreatedAt => "created_at_ms",
            SortField::Priority => "priority_rank",
            SortField::Status => "status_rank",
        };
        let direction = if query.sort.descending { "DESC" } else { "ASC" };
        let page = query.page.max(1);
        let limit = query.limit.max(1);
        args.push(Value::Integer(i64::from(limit)));
        args.push(Value::Integer(i64::from(page - 1).saturating_mul(i64::from(limit))));

        let items = select_documents(
            &conn,
            &format!(
                "SELECT document, version FROM incidents{where_sql}
                 ORDER BY {column} {direction}, created_at_ms DESC, id ASC
                 LIMIT ? OFFSET ?"
            ),
            &args,
        )?;

        Ok(Page {
            items,
            page,
            limit,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    fn assigned_to(
        &self,
        responder_id: &str,
        filter: &IncidentFilter,
    ) -> Result<Vec<Incident>, DispatchError> {
        let conn = self.connect()?;
        let mut clauses = vec!["assigned_to = ?"];
        let mut args = vec![Value::Text(responder_id.to_string())];
        push_filter(filter, &mut clauses, &mut args);

        select_documents(
            &conn,
            &format!(
                "SELECT document, version FROM incidents{}
                 ORDER BY assigned_at_ms DESC, id ASC",
                where_clause(&clauses)
            ),
            &args,
        )
    }

    fn tally(&self, window: &TimeWindow) -> Result<Tally, DispatchError> {
        let conn = self.connect()?;
        let start = window.start.timestamp_millis();
        let end = window.end.timestamp_millis();

        let mut stmt = conn.prepare(
            "SELECT status, priority, incident_type, COUNT(*)
             FROM incidents
             WHERE created_at_ms >= ?1 AND created_at_ms <= ?2
             GROUP BY status, priority, incident_type",
        )?;
        let raw = stmt.query_map(params![start, end], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut rows = Vec::new();
        for row in raw {
            let (status, priority, incident_type, count) = row?;
            rows.push(TallyRow {
                status: stored(status.parse())?,
                priority: stored(priority.parse())?,
                incident_type: stored(incident_type.parse())?,
                count: u64::try_from(count).unwrap_or_default(),
            });
        }

        let mean_completion_ms: Option<f64> = conn.query_row(
            "SELECT AVG(completed_at_ms - created_at_ms)
             FROM incidents
             WHERE created_at_ms >= ?1 AND created_at_ms <= ?2 AND completed_at_ms IS NOT NULL",
            params![start, end],
            |row| row.get(0),
        )?;

        Ok(Tally {
            rows,
            mean_completion_ms,
        })
    }
}

impl ResponderDirectory for SqliteStore {
    fn find_responder(&self, id: &str) -> Result<Option<Responder>, DispatchError> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT id, name, role, active, deleted FROM responders
                 WHERE id = ?1 AND deleted = 0",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, bool>(4)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, name, role, active, deleted)| -> Result<Responder, DispatchError> {
            let role: Role = serde_json::from_str(&role)?;
            Ok(Responder {
                id,
                name,
                role,
                active,
                deleted,
            })
        })
        .transpose()
    }
}

struct Projection {
    assigned_at_ms: Option<i64>,
    created_at_ms: i64,
    completed_at_ms: Option<i64>,
    document: String,
}

impl Projection {
    fn of(incident: &Incident) -> Result<Self, DispatchError> {
        Ok(Self {
            assigned_at_ms: incident.assignment.assigned_at.map(|t| t.timestamp_millis()),
            created_at_ms: incident.created_at.timestamp_millis(),
            completed_at_ms: incident.response_completed_at.map(|t| t.timestamp_millis()),
            document: serde_json::to_string(incident)?,
        })
    }
}

fn append_all(conn: &Connection, events: &[Event]) -> Result<(), DispatchError> {
    for event in events {
        event_log::insert_event(conn, event)?;
    }
    Ok(())
}

fn push_filter(filter: &IncidentFilter, clauses: &mut Vec<&'static str>, args: &mut Vec<Value>) {
    if let Some(status) = filter.status {
        clauses.push("status = ?");
        args.push(Value::Text(status.as_str().into()));
    }
    if let Some(incident_type) = filter.incident_type {
        clauses.push("incident_type = ?");
        args.push(Value::Text(incident_type.as_str().into()));
    }
    if let Some(priority) = filter.priority {
        clauses.push("priority = ?");
        args.push(Value::Text(priority.as_str().into()));
    }
}

fn where_clause(clauses: &[&str]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

fn select_documents(
    conn: &Connection,
    sql: &str,
    args: &[Value],
) -> Result<Vec<Incident>, DispatchError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(decode(row?)?);
    }
    Ok(out)
}

fn decode((document, version): (String, i64)) -> Result<Incident, DispatchError> {
    let mut incident: Incident = serde_json::from_str(&document)?;
    incident.version = version;
    Ok(incident)
}

fn stored<T>(parsed: Result<T, DispatchError>) -> Result<T, DispatchError> {
    parsed.map_err(|e| DispatchError::Store(format!("corrupt incident row: {e}")))
}
