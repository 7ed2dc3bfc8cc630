//! Trigger evaluation — is today a reminder or escalation day?

use chrono::NaiveDate;

use certwatch_core::model::{NotificationRule, Record, RecordStatus};

/// Signed days from `run_date` to `expiry` — negative once expired.
/// Expiry dates are mandatory on records by construction, so there is no
/// "missing expiry" case to skip here.
pub fn days_left(expiry: NaiveDate, run_date: NaiveDate) -> i64 {
    (expiry - run_date).num_days()
}

fn in_offsets(offsets: &[u32], days: i64) -> bool {
    u32::try_from(days).is_ok_and(|d| offsets.contains(&d))
}

/// A reminder fires iff days-left is one of the rule's reminder offsets.
pub fn reminder_due(rule: &NotificationRule, days: i64) -> bool {
    in_offsets(&rule.reminder_offsets, days)
}

/// An escalation fires iff escalation is enabled, days-left is one of the
/// escalation offsets, and the record has not already been renewed or
/// archived.
pub fn escalation_due(rule: &NotificationRule, record: &Record, days: i64) -> bool {
    if !rule.escalate_enabled || !in_offsets(&rule.escalate_offsets, days) {
        return false;
    }
    !matches!(
        record.status,
        RecordStatus::Renewed | RecordStatus::Archived
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use certwatch_core::model::NotificationRule;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rule() -> NotificationRule {
        let mut r = NotificationRule::new("t1", "default");
        r.reminder_offsets = vec![60, 30, 14, 7];
        r.escalate_offsets = vec![7, 1, 0];
        r
    }

    #[test]
    fn test_days_left_signed() {
        assert_eq!(days_left(date(2026, 3, 10), date(2026, 3, 3)), 7);
        assert_eq!(days_left(date(2026, 3, 1), date(2026, 3, 3)), -2);
    }

    #[test]
    fn test_reminder_fires_only_on_offsets() {
        let r = rule();
        assert!(reminder_due(&r, 30));
        assert!(reminder_due(&r, 7));
        assert!(!reminder_due(&r, 29));
        assert!(!reminder_due(&r, -7)); // expired records never remind
    }

    #[test]
    fn test_escalation_zero_offset() {
        let r = rule();
        let rec = Record::new("t1", "X", date(2026, 3, 3));
        assert!(escalation_due(&r, &rec, 0));
    }

    #[test]
    fn test_escalation_skips_renewed_and_archived() {
        let r = rule();
        let mut rec = Record::new("t1", "X", date(2026, 3, 10));
        assert!(escalation_due(&r, &rec, 7));

        rec.status = RecordStatus::Renewed;
        assert!(!escalation_due(&r, &rec, 7));
        rec.status = RecordStatus::Archived;
        assert!(!escalation_due(&r, &rec, 7));
        // Reminders are unaffected by renewal.
        assert!(reminder_due(&r, 7));
    }

    #[test]
    fn test_escalation_respects_enabled_flag() {
        let mut r = rule();
        r.escalate_enabled = false;
        let rec = Record::new("t1", "X", date(2026, 3, 10));
        assert!(!escalation_due(&r, &rec, 7));
    }

    #[test]
    fn test_reminder_and_escalation_can_coincide() {
        let r = rule();
        let rec = Record::new("t1", "X", date(2026, 3, 10));
        assert!(reminder_due(&r, 7) && escalation_due(&r, &rec, 7));
    }
}
