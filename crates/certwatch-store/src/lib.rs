//! # CertWatch Store
//!
//! SQLite persistence for the whole system: tenants, users, compliance
//! records, notification rules, the notification ledger, and the audit log.
//!
//! Tenant isolation is enforced at write time — a record's owner, a rule's
//! escalation recipients, and a ledger row's record/rule must all belong to
//! the same tenant as the parent entity.

mod ledger;
mod records;
mod rules;
mod util;

pub use ledger::{ClaimTicket, LogCounts, ERROR_MESSAGE_MAX, PAYLOAD_SUMMARY_MAX};
pub use records::NotifiableRecord;

use rusqlite::{Connection, params};
use std::path::Path;

use certwatch_core::error::{CertWatchError, Result};
use certwatch_core::model::{Tenant, User, UserRole};

use crate::util::{parse_utc, text_to};

/// CertWatch database manager.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create the database at `path` (":memory:" works for tests).
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| CertWatchError::Store(format!("DB open error: {e}")))?;

        // WAL mode allows concurrent readers/writers; busy_timeout prevents
        // "database is locked" when a manual and a scheduled sweep overlap.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(|e| CertWatchError::Store(format!("DB pragma error: {e}")))?;

        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Run schema migrations.
    fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS tenants (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                code TEXT UNIQUE,
                is_active INTEGER DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                email TEXT NOT NULL,
                role TEXT DEFAULT 'manager',
                is_active INTEGER DEFAULT 1,
                notify_enabled INTEGER DEFAULT 1,
                created_at TEXT NOT NULL,
                UNIQUE(tenant_id, email)
            );
            CREATE INDEX IF NOT EXISTS idx_users_tenant_role
                ON users(tenant_id, role, is_active);

            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                title TEXT NOT NULL,
                record_type TEXT NOT NULL DEFAULT 'certificate',
                category TEXT NOT NULL DEFAULT 'other',
                reference_no TEXT,
                issuing_authority TEXT,
                issue_date TEXT,
                expiry_date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                owner_id TEXT REFERENCES users(id),
                department TEXT,
                site_location TEXT,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_records_tenant_status_expiry
                ON records(tenant_id, status, expiry_date);
            CREATE INDEX IF NOT EXISTS idx_records_tenant_type_category
                ON records(tenant_id, record_type, category);

            CREATE TABLE IF NOT EXISTS notification_rules (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                name TEXT NOT NULL,
                enabled INTEGER DEFAULT 1,
                applies_to_all INTEGER DEFAULT 1,
                record_type TEXT,
                category TEXT,
                reminder_offsets TEXT NOT NULL DEFAULT '[]',
                escalate_enabled INTEGER DEFAULT 1,
                escalate_offsets TEXT NOT NULL DEFAULT '[]',
                escalation_recipients TEXT NOT NULL DEFAULT '[]',
                channel TEXT NOT NULL DEFAULT 'email',
                subject_template TEXT,
                body_template TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_rules_tenant_enabled
                ON notification_rules(tenant_id, enabled);

            CREATE TABLE IF NOT EXISTS notification_log (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                record_id TEXT NOT NULL REFERENCES records(id),
                rule_id TEXT NOT NULL REFERENCES notification_rules(id),
                kind TEXT NOT NULL,
                trigger_date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                sent_at TEXT,
                error_message TEXT,
                recipients TEXT NOT NULL DEFAULT '[]',
                payload_summary TEXT,
                created_at TEXT NOT NULL,
                UNIQUE(record_id, rule_id, kind, trigger_date)
            );
            CREATE INDEX IF NOT EXISTS idx_log_tenant_status_date
                ON notification_log(tenant_id, status, trigger_date);

            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_type TEXT NOT NULL,
                actor TEXT NOT NULL,
                details TEXT,
                created_at TEXT DEFAULT (datetime('now'))
            );
        ",
            )
            .map_err(|e| CertWatchError::Store(format!("Migration error: {e}")))?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    // ── Tenants ────────────────────────────────────

    /// Create a new tenant.
    pub fn create_tenant(&self, name: &str, code: Option<&str>) -> Result<Tenant> {
        let tenant = Tenant::new(name, code);
        self.conn
            .execute(
                "INSERT INTO tenants (id, name, code, is_active, created_at) VALUES (?1,?2,?3,?4,?5)",
                params![
                    tenant.id,
                    tenant.name,
                    tenant.code,
                    tenant.is_active as i32,
                    tenant.created_at.to_rfc3339()
                ],
            )
            .map_err(|e| CertWatchError::Store(format!("Insert tenant: {e}")))?;
        Ok(tenant)
    }

    /// Get a tenant by ID.
    pub fn get_tenant(&self, id: &str) -> Result<Tenant> {
        self.conn
            .query_row(
                "SELECT id, name, code, is_active, created_at FROM tenants WHERE id=?1",
                params![id],
                row_to_tenant,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    CertWatchError::NotFound(format!("tenant {id}"))
                }
                e => CertWatchError::Store(format!("Get tenant: {e}")),
            })
    }

    /// List active tenants, ordered by name.
    pub fn list_active_tenants(&self) -> Result<Vec<Tenant>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, code, is_active, created_at FROM tenants
                 WHERE is_active=1 ORDER BY name",
            )
            .map_err(|e| CertWatchError::Store(format!("Prepare: {e}")))?;

        let tenants = stmt
            .query_map([], row_to_tenant)
            .map_err(|e| CertWatchError::Store(format!("Query: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| CertWatchError::Store(format!("Decode tenant: {e}")))?;
        Ok(tenants)
    }

    /// Deactivate a tenant — the sweep skips inactive tenants.
    pub fn set_tenant_active(&self, id: &str, active: bool) -> Result<()> {
        self.conn
            .execute(
                "UPDATE tenants SET is_active=?1 WHERE id=?2",
                params![active as i32, id],
            )
            .map_err(|e| CertWatchError::Store(format!("Update tenant: {e}")))?;
        Ok(())
    }

    // ── Users ────────────────────────────────────

    /// Create a user inside a tenant.
    pub fn create_user(&self, user: &User) -> Result<()> {
        self.get_tenant(&user.tenant_id)?;
        self.conn
            .execute(
                "INSERT INTO users (id, tenant_id, email, role, is_active, notify_enabled, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7)",
                params![
                    user.id,
                    user.tenant_id,
                    user.email,
                    user.role.as_str(),
                    user.is_active as i32,
                    user.notify_enabled as i32,
                    user.created_at.to_rfc3339()
                ],
            )
            .map_err(|e| CertWatchError::Store(format!("Insert user: {e}")))?;
        Ok(())
    }

    /// Get a single user by ID.
    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        match self.conn.query_row(
            "SELECT id, tenant_id, email, role, is_active, notify_enabled, created_at
             FROM users WHERE id=?1",
            params![id],
            row_to_user,
        ) {
            Ok(u) => Ok(Some(u)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CertWatchError::Store(format!("Get user: {e}"))),
        }
    }

    /// Active admin/manager users of a tenant with a non-empty email — the
    /// fallback recipients for escalations.
    pub fn escalation_contacts(&self, tenant_id: &str) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, tenant_id, email, role, is_active, notify_enabled, created_at
                 FROM users
                 WHERE tenant_id=?1 AND role IN ('admin','manager')
                   AND is_active=1 AND email != ''
                 ORDER BY created_at",
            )
            .map_err(|e| CertWatchError::Store(format!("Prepare: {e}")))?;

        let users = stmt
            .query_map(params![tenant_id], row_to_user)
            .map_err(|e| CertWatchError::Store(format!("Query: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| CertWatchError::Store(format!("Decode user: {e}")))?;
        Ok(users)
    }

    // ── Audit log ────────────────────────────────────

    /// Append an audit event.
    pub fn log_event(&self, event_type: &str, actor: &str, details: Option<&str>) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO audit_log (event_type, actor, details) VALUES (?1,?2,?3)",
                params![event_type, actor, details],
            )
            .map_err(|e| CertWatchError::Store(format!("Log event: {e}")))?;
        Ok(())
    }

    /// Recent audit events, newest first: (event_type, actor, details).
    pub fn recent_events(&self, limit: usize) -> Result<Vec<(String, String, Option<String>)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT event_type, actor, details FROM audit_log ORDER BY id DESC LIMIT ?1")
            .map_err(|e| CertWatchError::Store(format!("Prepare: {e}")))?;

        let events = stmt
            .query_map(params![limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .map_err(|e| CertWatchError::Store(format!("Query: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(events)
    }
}

fn row_to_tenant(row: &rusqlite::Row) -> rusqlite::Result<Tenant> {
    Ok(Tenant {
        id: row.get(0)?,
        name: row.get(1)?,
        code: row.get(2)?,
        is_active: row.get::<_, i32>(3)? != 0,
        created_at: parse_utc(4, row.get::<_, String>(4)?)?,
    })
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        email: row.get(2)?,
        role: text_to::<UserRole>(3, row.get::<_, String>(3)?)?,
        is_active: row.get::<_, i32>(4)? != 0,
        notify_enabled: row.get::<_, i32>(5)? != 0,
        created_at: parse_utc(6, row.get::<_, String>(6)?)?,
    })
}
