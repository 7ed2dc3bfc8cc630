//! The dedup ledger — durable, append-only notification log.
//!
//! `claim` inserts a `pending` row under the UNIQUE(record, rule, kind,
//! trigger_date) constraint; the constraint violation on a repeat claim is
//! translated to "already claimed", never surfaced as an error. That single
//! atomically-checked insert is what makes the sweep idempotent and safe
//! under overlapping invocations, without any external lock.
//!
//! Known limitation, kept on purpose: a process crash between claim and
//! finalize leaves the row `pending` forever. A later run's claim for the
//! same key sees the constraint and counts it as skipped; nothing re-sends.

use chrono::{NaiveDate, Utc};
use rusqlite::params;

use certwatch_core::error::{CertWatchError, Result};
use certwatch_core::model::{
    NotificationKind, NotificationLog, NotificationRule, NotificationStatus, Record,
};

use crate::util::{json_to_strings, parse_date, parse_utc, text_to};
use crate::Store;

/// Stored error messages are capped to this many characters.
pub const ERROR_MESSAGE_MAX: usize = 5000;
/// Stored payload summaries (rendered subject) are capped to this.
pub const PAYLOAD_SUMMARY_MAX: usize = 255;

/// Proof of a successful claim; the caller must finalize it.
#[derive(Debug, Clone)]
pub struct ClaimTicket {
    pub log_id: String,
    pub kind: NotificationKind,
}

/// Per-status row counts for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogCounts {
    pub pending: u32,
    pub sent: u32,
    pub failed: u32,
    pub skipped: u32,
}

const LOG_SELECT: &str = "SELECT id, tenant_id, record_id, rule_id, kind, trigger_date, status,
    sent_at, error_message, recipients, payload_summary, created_at FROM notification_log";

fn row_to_log(row: &rusqlite::Row) -> rusqlite::Result<NotificationLog> {
    Ok(NotificationLog {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        record_id: row.get(2)?,
        rule_id: row.get(3)?,
        kind: text_to::<NotificationKind>(4, row.get::<_, String>(4)?)?,
        trigger_date: parse_date(5, row.get::<_, String>(5)?)?,
        status: text_to::<NotificationStatus>(6, row.get::<_, String>(6)?)?,
        sent_at: row
            .get::<_, Option<String>>(7)?
            .map(|s| parse_utc(7, s))
            .transpose()?,
        error_message: row.get(8)?,
        recipients: json_to_strings(9, row.get::<_, String>(9)?)?,
        payload_summary: row.get(10)?,
        created_at: parse_utc(11, row.get::<_, String>(11)?)?,
    })
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

impl Store {
    /// Atomically reserve the (record, rule, kind, trigger_date) slot.
    ///
    /// Returns `Ok(Some(ticket))` when this caller owns the slot and
    /// `Ok(None)` when a prior (or concurrent) claim already owns it.
    pub fn claim(
        &self,
        record: &Record,
        rule: &NotificationRule,
        kind: NotificationKind,
        trigger_date: NaiveDate,
    ) -> Result<Option<ClaimTicket>> {
        if record.tenant_id != rule.tenant_id {
            return Err(CertWatchError::Validation(
                "Ledger entries must not cross tenant boundaries.".into(),
            ));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let result = self.conn().execute(
            "INSERT INTO notification_log
             (id, tenant_id, record_id, rule_id, kind, trigger_date, status, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,'pending',?7)",
            params![
                id,
                record.tenant_id,
                record.id,
                rule.id,
                kind.as_str(),
                trigger_date.to_string(),
                Utc::now().to_rfc3339()
            ],
        );

        match result {
            Ok(_) => Ok(Some(ClaimTicket { log_id: id, kind })),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(None)
            }
            Err(e) => Err(CertWatchError::Store(format!("Claim: {e}"))),
        }
    }

    /// Finalize a claimed slot as sent, snapshotting the recipients and the
    /// rendered subject.
    pub fn finalize_sent(
        &self,
        ticket: &ClaimTicket,
        recipients: &[String],
        payload_summary: &str,
    ) -> Result<()> {
        let recipients_json = serde_json::to_string(recipients)
            .map_err(|e| CertWatchError::Store(format!("Encode recipients: {e}")))?;
        self.conn()
            .execute(
                "UPDATE notification_log
                 SET status='sent', sent_at=?1, recipients=?2, payload_summary=?3
                 WHERE id=?4",
                params![
                    Utc::now().to_rfc3339(),
                    recipients_json,
                    truncate_chars(payload_summary, PAYLOAD_SUMMARY_MAX),
                    ticket.log_id
                ],
            )
            .map_err(|e| CertWatchError::Store(format!("Finalize sent: {e}")))?;
        Ok(())
    }

    /// Finalize a claimed slot as failed. The error text is truncated to
    /// [`ERROR_MESSAGE_MAX`] characters.
    pub fn finalize_failed(&self, ticket: &ClaimTicket, error: &str) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE notification_log SET status='failed', error_message=?1 WHERE id=?2",
                params![truncate_chars(error, ERROR_MESSAGE_MAX), ticket.log_id],
            )
            .map_err(|e| CertWatchError::Store(format!("Finalize failed: {e}")))?;
        Ok(())
    }

    /// Finalize a claimed slot as skipped, with a human-readable reason.
    pub fn finalize_skipped(&self, ticket: &ClaimTicket, reason: &str) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE notification_log SET status='skipped', error_message=?1 WHERE id=?2",
                params![truncate_chars(reason, ERROR_MESSAGE_MAX), ticket.log_id],
            )
            .map_err(|e| CertWatchError::Store(format!("Finalize skipped: {e}")))?;
        Ok(())
    }

    /// Get a ledger row by ID.
    pub fn get_log(&self, id: &str) -> Result<NotificationLog> {
        self.conn()
            .query_row(&format!("{LOG_SELECT} WHERE id=?1"), params![id], row_to_log)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    CertWatchError::NotFound(format!("notification log {id}"))
                }
                e => CertWatchError::Store(format!("Get log: {e}")),
            })
    }

    /// Look up the row owning a specific uniqueness key, if any.
    pub fn find_log(
        &self,
        record_id: &str,
        rule_id: &str,
        kind: NotificationKind,
        trigger_date: NaiveDate,
    ) -> Result<Option<NotificationLog>> {
        match self.conn().query_row(
            &format!(
                "{LOG_SELECT} WHERE record_id=?1 AND rule_id=?2 AND kind=?3 AND trigger_date=?4"
            ),
            params![record_id, rule_id, kind.as_str(), trigger_date.to_string()],
            row_to_log,
        ) {
            Ok(log) => Ok(Some(log)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CertWatchError::Store(format!("Find log: {e}"))),
        }
    }

    /// Ledger rows of a tenant for one status and trigger date.
    pub fn logs_by_status(
        &self,
        tenant_id: &str,
        status: NotificationStatus,
        trigger_date: NaiveDate,
    ) -> Result<Vec<NotificationLog>> {
        let mut stmt = self
            .conn()
            .prepare(&format!(
                "{LOG_SELECT} WHERE tenant_id=?1 AND status=?2 AND trigger_date=?3
                 ORDER BY created_at"
            ))
            .map_err(|e| CertWatchError::Store(format!("Prepare: {e}")))?;

        let logs = stmt
            .query_map(
                params![tenant_id, status.as_str(), trigger_date.to_string()],
                row_to_log,
            )
            .map_err(|e| CertWatchError::Store(format!("Query: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| CertWatchError::Store(format!("Decode log: {e}")))?;
        Ok(logs)
    }

    /// Per-status counts for a tenant and trigger date.
    pub fn log_counts(&self, tenant_id: &str, trigger_date: NaiveDate) -> Result<LogCounts> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT status, COUNT(*) FROM notification_log
                 WHERE tenant_id=?1 AND trigger_date=?2 GROUP BY status",
            )
            .map_err(|e| CertWatchError::Store(format!("Prepare: {e}")))?;

        let mut counts = LogCounts::default();
        let rows = stmt
            .query_map(params![tenant_id, trigger_date.to_string()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
            })
            .map_err(|e| CertWatchError::Store(format!("Query: {e}")))?;
        for row in rows.filter_map(|r| r.ok()) {
            match row.0.as_str() {
                "pending" => counts.pending = row.1,
                "sent" => counts.sent = row.1,
                "failed" => counts.failed = row.1,
                "skipped" => counts.skipped = row.1,
                _ => {}
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{temp_db, tenant_with_manager};
    use certwatch_core::model::{NotificationRule, Record};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fixture(store: &Store) -> (Record, NotificationRule) {
        let (tenant, _) = tenant_with_manager(store, "Acme", "m@acme.com");
        let rec = Record::new(&tenant.id, "ISO 9001", date(2026, 12, 1));
        store.insert_record(&rec).unwrap();
        let mut rule = NotificationRule::new(&tenant.id, "default");
        store.save_rule(&mut rule).unwrap();
        (rec, rule)
    }

    #[test]
    fn test_claim_is_exclusive() {
        let store = temp_db();
        let (rec, rule) = fixture(&store);
        let day = date(2026, 11, 1);

        let first = store
            .claim(&rec, &rule, NotificationKind::Reminder, day)
            .unwrap();
        assert!(first.is_some());

        // Second claim for the same key hits the unique constraint.
        let second = store
            .claim(&rec, &rule, NotificationKind::Reminder, day)
            .unwrap();
        assert!(second.is_none());

        // Different kind or date is a different slot.
        assert!(store
            .claim(&rec, &rule, NotificationKind::Escalation, day)
            .unwrap()
            .is_some());
        assert!(store
            .claim(&rec, &rule, NotificationKind::Reminder, date(2026, 11, 2))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_claim_starts_pending() {
        let store = temp_db();
        let (rec, rule) = fixture(&store);
        let ticket = store
            .claim(&rec, &rule, NotificationKind::Reminder, date(2026, 11, 1))
            .unwrap()
            .unwrap();
        let log = store.get_log(&ticket.log_id).unwrap();
        assert_eq!(log.status, NotificationStatus::Pending);
        assert_eq!(log.tenant_id, rec.tenant_id);
    }

    #[test]
    fn test_finalize_sent_snapshot() {
        let store = temp_db();
        let (rec, rule) = fixture(&store);
        let ticket = store
            .claim(&rec, &rule, NotificationKind::Reminder, date(2026, 11, 1))
            .unwrap()
            .unwrap();

        store
            .finalize_sent(&ticket, &["m@acme.com".to_string()], "Reminder • ISO 9001")
            .unwrap();

        let log = store.get_log(&ticket.log_id).unwrap();
        assert_eq!(log.status, NotificationStatus::Sent);
        assert!(log.sent_at.is_some());
        assert_eq!(log.recipients, vec!["m@acme.com"]);
        assert_eq!(log.payload_summary.as_deref(), Some("Reminder • ISO 9001"));
    }

    #[test]
    fn test_failed_error_truncated_to_bound() {
        let store = temp_db();
        let (rec, rule) = fixture(&store);
        let ticket = store
            .claim(&rec, &rule, NotificationKind::Escalation, date(2026, 11, 1))
            .unwrap()
            .unwrap();

        let huge = "x".repeat(6000);
        store.finalize_failed(&ticket, &huge).unwrap();

        let log = store.get_log(&ticket.log_id).unwrap();
        assert_eq!(log.status, NotificationStatus::Failed);
        assert_eq!(log.error_message.unwrap().len(), ERROR_MESSAGE_MAX);
    }

    #[test]
    fn test_cross_tenant_claim_rejected() {
        let store = temp_db();
        let (rec, _) = fixture(&store);
        let other = store.create_tenant("Other", None).unwrap();
        let mut foreign_rule = NotificationRule::new(&other.id, "foreign");
        store.save_rule(&mut foreign_rule).unwrap();

        let err = store
            .claim(&rec, &foreign_rule, NotificationKind::Reminder, date(2026, 11, 1))
            .unwrap_err();
        assert!(matches!(err, CertWatchError::Validation(_)));
    }

    #[test]
    fn test_counts_and_status_query() {
        let store = temp_db();
        let (rec, rule) = fixture(&store);
        let day = date(2026, 11, 1);

        let t1 = store
            .claim(&rec, &rule, NotificationKind::Reminder, day)
            .unwrap()
            .unwrap();
        store.finalize_sent(&t1, &["m@acme.com".into()], "subj").unwrap();

        let t2 = store
            .claim(&rec, &rule, NotificationKind::Escalation, day)
            .unwrap()
            .unwrap();
        store.finalize_skipped(&t2, "No escalation recipients").unwrap();

        let counts = store.log_counts(&rec.tenant_id, day).unwrap();
        assert_eq!(counts.sent, 1);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.pending, 0);

        let skipped = store
            .logs_by_status(&rec.tenant_id, NotificationStatus::Skipped, day)
            .unwrap();
        assert_eq!(skipped.len(), 1);
        assert_eq!(
            skipped[0].error_message.as_deref(),
            Some("No escalation recipients")
        );
    }
}
