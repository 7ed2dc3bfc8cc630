//! Rule-to-record scope matching.

use certwatch_core::model::{NotificationRule, Record};

/// Does this rule apply to this record?
///
/// Records from another tenant never match. An "applies to all" rule
/// matches everything in its tenant; otherwise every dimension the rule
/// sets must equal the record's field, and an unset dimension is a
/// wildcard. No side effects.
pub fn matches(rule: &NotificationRule, record: &Record) -> bool {
    if record.tenant_id != rule.tenant_id {
        return false;
    }
    if rule.applies_to_all {
        return true;
    }
    if let Some(t) = rule.record_type
        && record.record_type != t
    {
        return false;
    }
    if let Some(c) = rule.category
        && record.category != c
    {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use certwatch_core::model::{RecordCategory, RecordType};
    use chrono::NaiveDate;

    fn record(tenant: &str) -> Record {
        let mut r = Record::new(tenant, "ISO 9001", NaiveDate::from_ymd_opt(2026, 6, 1).unwrap());
        r.record_type = RecordType::Certificate;
        r.category = RecordCategory::Quality;
        r
    }

    #[test]
    fn test_applies_to_all() {
        let rule = NotificationRule::new("t1", "all");
        assert!(matches(&rule, &record("t1")));
    }

    #[test]
    fn test_tenant_mismatch_never_matches() {
        let rule = NotificationRule::new("t1", "all");
        assert!(!matches(&rule, &record("t2")));
    }

    #[test]
    fn test_both_dimensions_must_match() {
        let mut rule = NotificationRule::new("t1", "narrow");
        rule.applies_to_all = false;
        rule.record_type = Some(RecordType::Certificate);
        rule.category = Some(RecordCategory::Quality);

        let mut rec = record("t1");
        assert!(matches(&rule, &rec));

        // Changing either field flips the match.
        rec.record_type = RecordType::License;
        assert!(!matches(&rule, &rec));
        rec.record_type = RecordType::Certificate;
        rec.category = RecordCategory::Vendor;
        assert!(!matches(&rule, &rec));
    }

    #[test]
    fn test_unset_dimension_is_wildcard() {
        let mut rule = NotificationRule::new("t1", "type-only");
        rule.applies_to_all = false;
        rule.record_type = Some(RecordType::Certificate);

        let mut rec = record("t1");
        rec.category = RecordCategory::Vendor;
        assert!(matches(&rule, &rec));
    }
}
