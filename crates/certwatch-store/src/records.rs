//! Compliance record persistence.

use chrono::NaiveDate;
use rusqlite::params;

use certwatch_core::error::{CertWatchError, Result};
use certwatch_core::model::{Record, RecordCategory, RecordStatus, RecordType};

use crate::util::{parse_date, parse_utc, text_to};
use crate::Store;

/// A record as the engine consumes it: the row plus the owner's email,
/// resolved in the same query.
#[derive(Debug, Clone)]
pub struct NotifiableRecord {
    pub record: Record,
    pub owner_email: Option<String>,
}

const RECORD_SELECT: &str = "SELECT r.id, r.tenant_id, r.title, r.record_type, r.category,
    r.reference_no, r.issuing_authority, r.issue_date, r.expiry_date, r.status,
    r.owner_id, r.department, r.site_location, r.notes, r.created_at, r.updated_at
    FROM records r";

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<Record> {
    Ok(Record {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        title: row.get(2)?,
        record_type: text_to::<RecordType>(3, row.get::<_, String>(3)?)?,
        category: text_to::<RecordCategory>(4, row.get::<_, String>(4)?)?,
        reference_no: row.get(5)?,
        issuing_authority: row.get(6)?,
        issue_date: row
            .get::<_, Option<String>>(7)?
            .map(|s| parse_date(7, s))
            .transpose()?,
        expiry_date: parse_date(8, row.get::<_, String>(8)?)?,
        status: text_to::<RecordStatus>(9, row.get::<_, String>(9)?)?,
        owner_id: row.get(10)?,
        department: row.get(11)?,
        site_location: row.get(12)?,
        notes: row.get(13)?,
        created_at: parse_utc(14, row.get::<_, String>(14)?)?,
        updated_at: parse_utc(15, row.get::<_, String>(15)?)?,
    })
}

impl Store {
    /// Insert a record. Validates the record itself and, when an owner is
    /// set, that the owner belongs to the same tenant.
    pub fn insert_record(&self, record: &Record) -> Result<()> {
        record.validate()?;
        self.get_tenant(&record.tenant_id)?;

        if let Some(owner_id) = &record.owner_id {
            let owner = self
                .get_user(owner_id)?
                .ok_or_else(|| CertWatchError::NotFound(format!("user {owner_id}")))?;
            if owner.tenant_id != record.tenant_id {
                return Err(CertWatchError::Validation(
                    "Owner must belong to the same tenant as the record.".into(),
                ));
            }
        }

        self.conn()
            .execute(
                "INSERT INTO records (id, tenant_id, title, record_type, category, reference_no,
                 issuing_authority, issue_date, expiry_date, status, owner_id, department,
                 site_location, notes, created_at, updated_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
                params![
                    record.id,
                    record.tenant_id,
                    record.title,
                    record.record_type.as_str(),
                    record.category.as_str(),
                    record.reference_no,
                    record.issuing_authority,
                    record.issue_date.map(|d| d.to_string()),
                    record.expiry_date.to_string(),
                    record.status.as_str(),
                    record.owner_id,
                    record.department,
                    record.site_location,
                    record.notes,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| CertWatchError::Store(format!("Insert record: {e}")))?;
        Ok(())
    }

    /// Get a record by ID.
    pub fn get_record(&self, id: &str) -> Result<Record> {
        self.conn()
            .query_row(
                &format!("{RECORD_SELECT} WHERE r.id=?1"),
                params![id],
                row_to_record,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    CertWatchError::NotFound(format!("record {id}"))
                }
                e => CertWatchError::Store(format!("Get record: {e}")),
            })
    }

    /// Records of a tenant the sweep should look at — everything except
    /// archived, with the owner's email joined in.
    pub fn list_notifiable_records(&self, tenant_id: &str) -> Result<Vec<NotifiableRecord>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT r.id, r.tenant_id, r.title, r.record_type, r.category,
                        r.reference_no, r.issuing_authority, r.issue_date, r.expiry_date,
                        r.status, r.owner_id, r.department, r.site_location, r.notes,
                        r.created_at, r.updated_at, u.email
                 FROM records r
                 LEFT JOIN users u ON u.id = r.owner_id
                 WHERE r.tenant_id=?1 AND r.status != 'archived'
                 ORDER BY r.expiry_date, r.title",
            )
            .map_err(|e| CertWatchError::Store(format!("Prepare: {e}")))?;

        let records = stmt
            .query_map(params![tenant_id], |row| {
                Ok(NotifiableRecord {
                    record: row_to_record(row)?,
                    owner_email: row.get(16)?,
                })
            })
            .map_err(|e| CertWatchError::Store(format!("Query: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| CertWatchError::Store(format!("Decode record: {e}")))?;
        Ok(records)
    }

    /// Update a record's lifecycle status.
    pub fn update_record_status(&self, id: &str, status: RecordStatus) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE records SET status=?1, updated_at=datetime('now') WHERE id=?2",
                params![status.as_str(), id],
            )
            .map_err(|e| CertWatchError::Store(format!("Update record status: {e}")))?;
        Ok(())
    }

    /// Mark records past their expiry date as expired. Archived and already
    /// expired records are left alone. Returns the number of rows touched.
    pub fn refresh_expired_statuses(&self, tenant_id: &str, today: NaiveDate) -> Result<usize> {
        let n = self
            .conn()
            .execute(
                "UPDATE records SET status='expired', updated_at=datetime('now')
                 WHERE tenant_id=?1 AND expiry_date < ?2
                   AND status NOT IN ('archived','expired')",
                params![tenant_id, today.to_string()],
            )
            .map_err(|e| CertWatchError::Store(format!("Refresh statuses: {e}")))?;
        if n > 0 {
            tracing::info!("Marked {n} record(s) expired for tenant {tenant_id}");
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{temp_db, tenant_with_manager};
    use certwatch_core::model::{Record, RecordStatus, User, UserRole};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let store = temp_db();
        let (tenant, owner) = tenant_with_manager(&store, "Acme", "mgr@acme.com");

        let mut rec = Record::new(&tenant.id, "ISO 9001", date(2026, 12, 1));
        rec.owner_id = Some(owner.id.clone());
        rec.reference_no = Some("ISO-001".into());
        store.insert_record(&rec).unwrap();

        let loaded = store.get_record(&rec.id).unwrap();
        assert_eq!(loaded.title, "ISO 9001");
        assert_eq!(loaded.expiry_date, date(2026, 12, 1));
        assert_eq!(loaded.status, RecordStatus::Active);
    }

    #[test]
    fn test_cross_tenant_owner_rejected() {
        let store = temp_db();
        let (t1, _) = tenant_with_manager(&store, "A", "a@a.com");
        let t2 = store.create_tenant("B", None).unwrap();
        let outsider = User::new(&t2.id, "b@b.com", UserRole::Manager);
        store.create_user(&outsider).unwrap();

        let mut rec = Record::new(&t1.id, "Permit", date(2026, 5, 1));
        rec.owner_id = Some(outsider.id);
        assert!(store.insert_record(&rec).is_err());
    }

    #[test]
    fn test_notifiable_excludes_archived_and_joins_owner() {
        let store = temp_db();
        let (tenant, owner) = tenant_with_manager(&store, "Acme", "mgr@acme.com");

        let mut active = Record::new(&tenant.id, "Active", date(2026, 6, 1));
        active.owner_id = Some(owner.id.clone());
        store.insert_record(&active).unwrap();

        let mut archived = Record::new(&tenant.id, "Old", date(2025, 1, 1));
        archived.status = RecordStatus::Archived;
        store.insert_record(&archived).unwrap();

        let rows = store.list_notifiable_records(&tenant.id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.title, "Active");
        assert_eq!(rows[0].owner_email.as_deref(), Some("mgr@acme.com"));
    }

    #[test]
    fn test_refresh_expired_statuses() {
        let store = temp_db();
        let (tenant, _) = tenant_with_manager(&store, "Acme", "mgr@acme.com");

        let past = Record::new(&tenant.id, "Lapsed", date(2026, 1, 1));
        store.insert_record(&past).unwrap();
        let mut archived = Record::new(&tenant.id, "Archived", date(2026, 1, 1));
        archived.status = RecordStatus::Archived;
        store.insert_record(&archived).unwrap();
        let future = Record::new(&tenant.id, "Fresh", date(2027, 1, 1));
        store.insert_record(&future).unwrap();

        let n = store
            .refresh_expired_statuses(&tenant.id, date(2026, 2, 1))
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(store.get_record(&past.id).unwrap().status, RecordStatus::Expired);
        assert_eq!(store.get_record(&archived.id).unwrap().status, RecordStatus::Archived);
        assert_eq!(store.get_record(&future.id).unwrap().status, RecordStatus::Active);
    }
}
