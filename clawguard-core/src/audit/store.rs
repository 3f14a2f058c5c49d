//! SQLite-backed audit store.
//!
//! Single-writer durable persistence for request records, approval
//! grants, paired approvers, and service overrides. The database runs
//! in WAL mode; schema changes after first release are applied as
//! additive `ALTER TABLE` migrations so history is never rewritten.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::record::{
    ApprovalRow, AuditRecord, DashboardStats, OverrideRow, PairedApprover, RequestOutcome,
};

/// Errors that can occur in audit store operations.
#[derive(Debug, thiserror::Error)]
pub enum AuditStoreError {
    /// Failed to open or prepare the database.
    #[error("failed to open audit database: {0}")]
    Open(String),

    /// A query failed.
    #[error("audit query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// IO error during storage operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable audit persistence over a single SQLite connection.
///
/// Writers serialize on an internal mutex; the gateway's request
/// pipeline is the only writer of `requests`, the approval coordinator
/// of `approvals`, and the admin plane of `service_overrides`.
pub struct AuditStore {
    conn: Arc<Mutex<Connection>>,
}

impl AuditStore {
    /// Open (and create if needed) the store at `path`.
    ///
    /// Applies the base schema, switches on WAL journaling, and runs
    /// additive migrations.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, AuditStoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)
            .map_err(|e| AuditStoreError::Open(format!("{}: {e}", path.display())))?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(include_str!("schema.sql"))?;
        migrate(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ----- requests ---------------------------------------------------

    /// Append one terminal request outcome. Returns the row id.
    pub fn record_request(&self, outcome: &RequestOutcome) -> Result<i64, AuditStoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO requests
                (timestamp, service, method, path, approved, response_status,
                 agent_ip, request_body, response_body)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                Utc::now().timestamp(),
                outcome.service,
                outcome.method,
                outcome.path,
                outcome.approved,
                outcome.response_status,
                outcome.agent_ip,
                outcome.request_body,
                outcome.response_body,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The most recent request rows, newest first.
    pub fn recent_requests(&self, limit: usize) -> Result<Vec<AuditRecord>, AuditStoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, service, method, path, approved, response_status,
                    agent_ip, request_body, response_body
             FROM requests ORDER BY id DESC LIMIT ?",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(AuditRecord {
                id: row.get(0)?,
                timestamp: from_unix(row.get(1)?),
                service: row.get(2)?,
                method: row.get(3)?,
                path: row.get(4)?,
                approved: row.get(5)?,
                response_status: row.get::<_, Option<i64>>(6)?.map(|s| s as u16),
                agent_ip: row.get(7)?,
                request_body: row.get(8)?,
                response_body: row.get(9)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ----- approvals --------------------------------------------------

    /// Persist a freshly granted approval. Returns the row id.
    pub fn insert_approval(
        &self,
        service: &str,
        approved_by: &str,
        ttl_seconds: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<i64, AuditStoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO approvals (timestamp, service, approved_by, ttl_seconds, expires_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                Utc::now().timestamp(),
                service,
                approved_by,
                ttl_seconds,
                expires_at.timestamp(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Mark every live grant row for `service` revoked. Returns the
    /// number of rows touched.
    pub fn revoke_approvals(&self, service: &str) -> Result<usize, AuditStoreError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE approvals SET revoked = 1
             WHERE service = ? AND revoked = 0 AND expires_at > ?",
            params![service, Utc::now().timestamp()],
        )?;
        Ok(changed)
    }

    /// Garbage-collect rows whose expiry has passed. Returns the count.
    pub fn delete_expired_approvals(&self) -> Result<usize, AuditStoreError> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM approvals WHERE expires_at <= ?",
            params![Utc::now().timestamp()],
        )?;
        Ok(deleted)
    }

    /// Non-revoked, non-expired grant rows, newest first.
    pub fn active_approvals(&self) -> Result<Vec<ApprovalRow>, AuditStoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, service, approved_by, ttl_seconds, expires_at, revoked
             FROM approvals
             WHERE revoked = 0 AND expires_at > ?
             ORDER BY id DESC",
        )?;
        let rows = stmt.query_map(params![Utc::now().timestamp()], |row| {
            Ok(ApprovalRow {
                id: row.get(0)?,
                timestamp: from_unix(row.get(1)?),
                service: row.get(2)?,
                approved_by: row.get(3)?,
                ttl_seconds: row.get(4)?,
                expires_at: from_unix(row.get(5)?),
                revoked: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ----- paired approvers -------------------------------------------

    /// Record a pairing handshake. Re-pairing updates the display name
    /// but keeps the original paired-at timestamp.
    pub fn pair_approver(&self, chat_id: i64, name: &str) -> Result<(), AuditStoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO paired_approvers (chat_id, name, paired_at) VALUES (?, ?, ?)
             ON CONFLICT(chat_id) DO UPDATE SET name = excluded.name",
            params![chat_id, name, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Remove a pairing. Returns whether one existed.
    pub fn unpair_approver(&self, chat_id: i64) -> Result<bool, AuditStoreError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "DELETE FROM paired_approvers WHERE chat_id = ?",
            params![chat_id],
        )?;
        Ok(changed > 0)
    }

    /// Whether a chat identity is currently paired.
    pub fn is_paired(&self, chat_id: i64) -> Result<bool, AuditStoreError> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT chat_id FROM paired_approvers WHERE chat_id = ?",
                params![chat_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Every paired approver.
    pub fn paired_approvers(&self) -> Result<Vec<PairedApprover>, AuditStoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT chat_id, name, paired_at FROM paired_approvers ORDER BY chat_id")?;
        let rows = stmt.query_map([], |row| {
            Ok(PairedApprover {
                chat_id: row.get(0)?,
                name: row.get(1)?,
                paired_at: from_unix(row.get(2)?),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ----- service overrides ------------------------------------------

    /// Insert or update an override for `service_name`.
    pub fn upsert_override(
        &self,
        service_name: &str,
        config_json: &str,
    ) -> Result<(), AuditStoreError> {
        let conn = self.conn.lock();
        let now = Utc::now().timestamp();
        conn.execute(
            "INSERT INTO service_overrides (service_name, config_json, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(service_name) DO UPDATE SET
                 config_json = excluded.config_json,
                 updated_at = excluded.updated_at",
            params![service_name, config_json, now, now],
        )?;
        Ok(())
    }

    /// Fetch one override by service name.
    pub fn get_override(&self, service_name: &str) -> Result<Option<OverrideRow>, AuditStoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT service_name, config_json, created_at, updated_at
                 FROM service_overrides WHERE service_name = ?",
                params![service_name],
                override_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Every persisted override.
    pub fn list_overrides(&self) -> Result<Vec<OverrideRow>, AuditStoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT service_name, config_json, created_at, updated_at
             FROM service_overrides ORDER BY service_name",
        )?;
        let rows = stmt.query_map([], override_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Delete one override. Returns whether it existed.
    pub fn delete_override(&self, service_name: &str) -> Result<bool, AuditStoreError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "DELETE FROM service_overrides WHERE service_name = ?",
            params![service_name],
        )?;
        Ok(changed > 0)
    }

    // ----- dashboard aggregations -------------------------------------

    /// Group-by aggregations over requests since `cutoff`.
    pub fn stats_since(&self, cutoff: DateTime<Utc>) -> Result<DashboardStats, AuditStoreError> {
        let conn = self.conn.lock();
        let since = cutoff.timestamp();

        let mut by_service_stmt = conn.prepare(
            "SELECT service, COUNT(*) FROM requests WHERE timestamp >= ?
             GROUP BY service ORDER BY COUNT(*) DESC, service",
        )?;
        let by_service = by_service_stmt
            .query_map(params![since], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<(String, i64)>, _>>()?;

        let mut by_hour_stmt = conn.prepare(
            "SELECT CAST(strftime('%H', timestamp, 'unixepoch') AS INTEGER) AS hour, COUNT(*)
             FROM requests WHERE timestamp >= ? GROUP BY hour ORDER BY hour",
        )?;
        let by_hour = by_hour_stmt
            .query_map(params![since], |row| {
                Ok((row.get::<_, i64>(0)? as u8, row.get(1)?))
            })?
            .collect::<Result<Vec<(u8, i64)>, _>>()?;

        let mut by_method_stmt = conn.prepare(
            "SELECT method, COUNT(*) FROM requests WHERE timestamp >= ?
             GROUP BY method ORDER BY COUNT(*) DESC, method",
        )?;
        let by_method = by_method_stmt
            .query_map(params![since], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<(String, i64)>, _>>()?;

        let approved: i64 = conn.query_row(
            "SELECT COUNT(*) FROM requests WHERE timestamp >= ? AND approved = 1",
            params![since],
            |row| row.get(0),
        )?;
        let denied: i64 = conn.query_row(
            "SELECT COUNT(*) FROM requests WHERE timestamp >= ? AND approved = 0",
            params![since],
            |row| row.get(0),
        )?;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM requests WHERE timestamp >= ?",
            params![since],
            |row| row.get(0),
        )?;

        Ok(DashboardStats {
            by_service,
            by_hour,
            by_method,
            approved,
            denied,
            total,
        })
    }
}

fn override_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OverrideRow> {
    Ok(OverrideRow {
        service_name: row.get(0)?,
        config_json: row.get(1)?,
        created_at: from_unix(row.get(2)?),
        updated_at: from_unix(row.get(3)?),
    })
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

/// Additive migrations for columns introduced after first release.
fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    ensure_column(conn, "requests", "response_body", "TEXT")?;
    Ok(())
}

/// Add a nullable column when it is missing. Existing rows keep NULL;
/// history is never rewritten.
fn ensure_column(
    conn: &Connection,
    table: &str,
    column: &str,
    ddl_type: &str,
) -> Result<(), rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let existing = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    if !existing.iter().any(|c| c == column) {
        conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {ddl_type}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn open_store() -> (tempfile::TempDir, AuditStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AuditStore::new(dir.path().join("audit.db")).unwrap();
        (dir, store)
    }

    fn outcome(service: &str, method: &str, approved: bool, status: Option<u16>) -> RequestOutcome {
        RequestOutcome {
            service: service.to_string(),
            method: method.to_string(),
            path: "/x".to_string(),
            approved,
            response_status: status,
            agent_ip: "127.0.0.1".to_string(),
            request_body: None,
            response_body: None,
        }
    }

    #[test]
    fn test_record_and_read_back_requests() {
        let (_dir, store) = open_store();

        store
            .record_request(&outcome("gh", "GET", true, Some(200)))
            .unwrap();
        store
            .record_request(&outcome("gh", "DELETE", false, Some(403)))
            .unwrap();

        let recent = store.recent_requests(50).unwrap();
        assert_eq!(recent.len(), 2);
        // Newest first.
        assert_eq!(recent[0].method, "DELETE");
        assert!(!recent[0].approved);
        assert_eq!(recent[0].response_status, Some(403));
        assert_eq!(recent[1].method, "GET");
    }

    #[test]
    fn test_recent_requests_respects_limit() {
        let (_dir, store) = open_store();
        for _ in 0..5 {
            store
                .record_request(&outcome("gh", "GET", true, Some(200)))
                .unwrap();
        }
        assert_eq!(store.recent_requests(3).unwrap().len(), 3);
    }

    #[test]
    fn test_captured_bodies_round_trip() {
        let (_dir, store) = open_store();
        let mut o = outcome("gh", "POST", true, Some(201));
        o.request_body = Some("{\"a\":1}".to_string());
        o.response_body = Some("created".to_string());
        store.record_request(&o).unwrap();

        let recent = store.recent_requests(1).unwrap();
        assert_eq!(recent[0].request_body.as_deref(), Some("{\"a\":1}"));
        assert_eq!(recent[0].response_body.as_deref(), Some("created"));
    }

    #[test]
    fn test_approvals_lifecycle() {
        let (_dir, store) = open_store();
        let expires = Utc::now() + Duration::hours(1);
        store.insert_approval("gh", "alice", 3600, expires).unwrap();

        let active = store.active_approvals().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].service, "gh");
        assert_eq!(active[0].approved_by, "alice");
        assert!(!active[0].revoked);

        assert_eq!(store.revoke_approvals("gh").unwrap(), 1);
        assert!(store.active_approvals().unwrap().is_empty());

        // Idempotent.
        assert_eq!(store.revoke_approvals("gh").unwrap(), 0);
    }

    #[test]
    fn test_expired_approvals_are_not_active_and_gc() {
        let (_dir, store) = open_store();
        let past = Utc::now() - Duration::minutes(5);
        store.insert_approval("gh", "alice", 60, past).unwrap();
        let future = Utc::now() + Duration::hours(1);
        store.insert_approval("slack", "alice", 3600, future).unwrap();

        let active = store.active_approvals().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].service, "slack");

        assert_eq!(store.delete_expired_approvals().unwrap(), 1);
        assert_eq!(store.active_approvals().unwrap().len(), 1);
    }

    #[test]
    fn test_active_approvals_newest_first() {
        let (_dir, store) = open_store();
        let expires = Utc::now() + Duration::hours(1);
        store.insert_approval("gh", "alice", 3600, expires).unwrap();
        store
            .insert_approval("gh", "bob", 900, Utc::now() + Duration::minutes(15))
            .unwrap();

        let active = store.active_approvals().unwrap();
        assert_eq!(active[0].approved_by, "bob");
        assert_eq!(active[1].approved_by, "alice");
    }

    #[test]
    fn test_pairing_round_trip() {
        let (_dir, store) = open_store();
        assert!(!store.is_paired(42).unwrap());

        store.pair_approver(42, "alice").unwrap();
        assert!(store.is_paired(42).unwrap());

        // Re-pairing refreshes the name.
        store.pair_approver(42, "alice-2").unwrap();
        let approvers = store.paired_approvers().unwrap();
        assert_eq!(approvers.len(), 1);
        assert_eq!(approvers[0].name, "alice-2");

        assert!(store.unpair_approver(42).unwrap());
        assert!(!store.is_paired(42).unwrap());
        assert!(!store.unpair_approver(42).unwrap());
    }

    #[test]
    fn test_override_upsert_and_delete() {
        let (_dir, store) = open_store();
        assert!(store.get_override("gh").unwrap().is_none());

        store.upsert_override("gh", "{\"v\":1}").unwrap();
        store.upsert_override("gh", "{\"v\":2}").unwrap();

        let row = store.get_override("gh").unwrap().unwrap();
        assert_eq!(row.config_json, "{\"v\":2}");
        assert_eq!(store.list_overrides().unwrap().len(), 1);

        assert!(store.delete_override("gh").unwrap());
        assert!(!store.delete_override("gh").unwrap());
        assert!(store.list_overrides().unwrap().is_empty());
    }

    #[test]
    fn test_dashboard_stats() {
        let (_dir, store) = open_store();
        store
            .record_request(&outcome("gh", "GET", true, Some(200)))
            .unwrap();
        store
            .record_request(&outcome("gh", "GET", true, Some(200)))
            .unwrap();
        store
            .record_request(&outcome("slack", "POST", false, Some(403)))
            .unwrap();

        let stats = store.stats_since(Utc::now() - Duration::hours(1)).unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.approved, 2);
        assert_eq!(stats.denied, 1);
        assert_eq!(stats.by_service[0], ("gh".to_string(), 2));
        assert_eq!(stats.by_method[0], ("GET".to_string(), 2));
        assert_eq!(stats.by_hour.iter().map(|(_, n)| n).sum::<i64>(), 3);

        // A future cutoff sees nothing.
        let empty = store.stats_since(Utc::now() + Duration::hours(1)).unwrap();
        assert_eq!(empty.total, 0);
    }

    #[test]
    fn test_reopen_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");

        {
            let store = AuditStore::new(&path).unwrap();
            store
                .record_request(&outcome("gh", "GET", true, Some(200)))
                .unwrap();
        }

        let store = AuditStore::new(&path).unwrap();
        assert_eq!(store.recent_requests(10).unwrap().len(), 1);
    }
}
