//! Notification rule persistence.
//!
//! Rules are validated and normalized on every write; malformed offsets or
//! an impossible scope never reach the engine.

use rusqlite::params;

use certwatch_core::error::{CertWatchError, Result};
use certwatch_core::model::{
    parse_offsets, Channel, NotificationRule, RecordCategory, RecordType,
};

use crate::util::{json_to_strings, parse_utc, text_to};
use crate::Store;

const RULE_SELECT: &str = "SELECT id, tenant_id, name, enabled, applies_to_all, record_type,
    category, reminder_offsets, escalate_enabled, escalate_offsets, escalation_recipients,
    channel, subject_template, body_template, created_at, updated_at FROM notification_rules";

fn row_to_rule(row: &rusqlite::Row) -> rusqlite::Result<NotificationRule> {
    // Offset columns go through parse_offsets so a hand-edited row with a
    // negative number is rejected here rather than coerced.
    let reminder_json: String = row.get(7)?;
    let escalate_json: String = row.get(9)?;
    let decode = |idx: usize, json: &str| {
        parse_offsets(json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    };

    Ok(NotificationRule {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        enabled: row.get::<_, i32>(3)? != 0,
        applies_to_all: row.get::<_, i32>(4)? != 0,
        record_type: row
            .get::<_, Option<String>>(5)?
            .map(|s| text_to::<RecordType>(5, s))
            .transpose()?,
        category: row
            .get::<_, Option<String>>(6)?
            .map(|s| text_to::<RecordCategory>(6, s))
            .transpose()?,
        reminder_offsets: decode(7, &reminder_json)?,
        escalate_enabled: row.get::<_, i32>(8)? != 0,
        escalate_offsets: decode(9, &escalate_json)?,
        escalation_recipients: json_to_strings(10, row.get::<_, String>(10)?)?,
        channel: text_to::<Channel>(11, row.get::<_, String>(11)?)?,
        subject_template: row.get(12)?,
        body_template: row.get(13)?,
        created_at: parse_utc(14, row.get::<_, String>(14)?)?,
        updated_at: parse_utc(15, row.get::<_, String>(15)?)?,
    })
}

impl Store {
    /// Insert or update a rule. Runs validation/normalization first and
    /// checks that every explicit escalation recipient belongs to the
    /// rule's tenant.
    pub fn save_rule(&self, rule: &mut NotificationRule) -> Result<()> {
        rule.validate_and_normalize()?;
        self.get_tenant(&rule.tenant_id)?;

        for user_id in &rule.escalation_recipients {
            let user = self
                .get_user(user_id)?
                .ok_or_else(|| CertWatchError::NotFound(format!("user {user_id}")))?;
            if user.tenant_id != rule.tenant_id {
                return Err(CertWatchError::Validation(
                    "Escalation recipients must belong to the rule's tenant.".into(),
                ));
            }
        }

        let reminder_json = serde_json::to_string(&rule.reminder_offsets)
            .map_err(|e| CertWatchError::Store(format!("Encode offsets: {e}")))?;
        let escalate_json = serde_json::to_string(&rule.escalate_offsets)
            .map_err(|e| CertWatchError::Store(format!("Encode offsets: {e}")))?;
        let recipients_json = serde_json::to_string(&rule.escalation_recipients)
            .map_err(|e| CertWatchError::Store(format!("Encode recipients: {e}")))?;

        self.conn()
            .execute(
                "INSERT INTO notification_rules (id, tenant_id, name, enabled, applies_to_all,
                 record_type, category, reminder_offsets, escalate_enabled, escalate_offsets,
                 escalation_recipients, channel, subject_template, body_template, created_at, updated_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)
                 ON CONFLICT(id) DO UPDATE SET
                   name=?3, enabled=?4, applies_to_all=?5, record_type=?6, category=?7,
                   reminder_offsets=?8, escalate_enabled=?9, escalate_offsets=?10,
                   escalation_recipients=?11, channel=?12, subject_template=?13,
                   body_template=?14, updated_at=datetime('now')",
                params![
                    rule.id,
                    rule.tenant_id,
                    rule.name,
                    rule.enabled as i32,
                    rule.applies_to_all as i32,
                    rule.record_type.map(|t| t.as_str()),
                    rule.category.map(|c| c.as_str()),
                    reminder_json,
                    rule.escalate_enabled as i32,
                    escalate_json,
                    recipients_json,
                    rule.channel.as_str(),
                    rule.subject_template,
                    rule.body_template,
                    rule.created_at.to_rfc3339(),
                    rule.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| CertWatchError::Store(format!("Save rule: {e}")))?;
        Ok(())
    }

    /// Get a rule by ID.
    pub fn get_rule(&self, id: &str) -> Result<NotificationRule> {
        self.conn()
            .query_row(&format!("{RULE_SELECT} WHERE id=?1"), params![id], row_to_rule)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    CertWatchError::NotFound(format!("rule {id}"))
                }
                e => CertWatchError::Store(format!("Get rule: {e}")),
            })
    }

    /// Enabled rules of a tenant, in a stable order.
    pub fn list_enabled_rules(&self, tenant_id: &str) -> Result<Vec<NotificationRule>> {
        let mut stmt = self
            .conn()
            .prepare(&format!(
                "{RULE_SELECT} WHERE tenant_id=?1 AND enabled=1 ORDER BY name"
            ))
            .map_err(|e| CertWatchError::Store(format!("Prepare: {e}")))?;

        // A row that fails to decode (e.g. hand-edited offsets) is a store
        // error, not a rule that quietly vanishes from the sweep.
        let rules = stmt
            .query_map(params![tenant_id], row_to_rule)
            .map_err(|e| CertWatchError::Store(format!("Query: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| CertWatchError::Store(format!("Decode rule: {e}")))?;
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{temp_db, tenant_with_manager};
    use certwatch_core::error::CertWatchError;
    use certwatch_core::model::{NotificationRule, RecordType, User, UserRole};

    #[test]
    fn test_save_normalizes_offsets() {
        let store = temp_db();
        let (tenant, _) = tenant_with_manager(&store, "Acme", "m@acme.com");

        let mut rule = NotificationRule::new(&tenant.id, "default");
        rule.reminder_offsets = vec![7, 60, 7, 30];
        rule.escalate_offsets = vec![1, 0, 7, 1];
        store.save_rule(&mut rule).unwrap();

        let loaded = store.get_rule(&rule.id).unwrap();
        assert_eq!(loaded.reminder_offsets, vec![60, 30, 7]);
        assert_eq!(loaded.escalate_offsets, vec![7, 1, 0]);
    }

    #[test]
    fn test_invalid_scope_rejected_at_save() {
        let store = temp_db();
        let (tenant, _) = tenant_with_manager(&store, "Acme", "m@acme.com");

        let mut rule = NotificationRule::new(&tenant.id, "narrow");
        rule.applies_to_all = false;
        assert!(store.save_rule(&mut rule).is_err());

        rule.record_type = Some(RecordType::License);
        store.save_rule(&mut rule).unwrap();
    }

    #[test]
    fn test_cross_tenant_recipient_rejected() {
        let store = temp_db();
        let (t1, _) = tenant_with_manager(&store, "A", "a@a.com");
        let t2 = store.create_tenant("B", None).unwrap();
        let outsider = User::new(&t2.id, "b@b.com", UserRole::Admin);
        store.create_user(&outsider).unwrap();

        let mut rule = NotificationRule::new(&t1.id, "esc");
        rule.escalation_recipients = vec![outsider.id];
        assert!(store.save_rule(&mut rule).is_err());
    }

    #[test]
    fn test_list_enabled_only() {
        let store = temp_db();
        let (tenant, _) = tenant_with_manager(&store, "Acme", "m@acme.com");

        let mut on = NotificationRule::new(&tenant.id, "on");
        store.save_rule(&mut on).unwrap();
        let mut off = NotificationRule::new(&tenant.id, "off");
        off.enabled = false;
        store.save_rule(&mut off).unwrap();

        let rules = store.list_enabled_rules(&tenant.id).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "on");
    }

    #[test]
    fn test_corrupted_offsets_surface_as_store_error() {
        let store = temp_db();
        let (tenant, _) = tenant_with_manager(&store, "Acme", "m@acme.com");
        let mut rule = NotificationRule::new(&tenant.id, "default");
        rule.reminder_offsets = vec![30];
        store.save_rule(&mut rule).unwrap();

        // Hand-edited row bypassing save-time validation.
        store
            .conn()
            .execute("UPDATE notification_rules SET reminder_offsets='[-5]'", [])
            .unwrap();

        let err = store.list_enabled_rules(&tenant.id).unwrap_err();
        assert!(matches!(err, CertWatchError::Store(_)));
    }

    #[test]
    fn test_upsert_updates_in_place() {
        let store = temp_db();
        let (tenant, _) = tenant_with_manager(&store, "Acme", "m@acme.com");

        let mut rule = NotificationRule::new(&tenant.id, "default");
        store.save_rule(&mut rule).unwrap();
        rule.subject_template = Some("{kind}: {title}".into());
        store.save_rule(&mut rule).unwrap();

        let rules = store.list_enabled_rules(&tenant.id).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].subject_template.as_deref(), Some("{kind}: {title}"));
    }
}
