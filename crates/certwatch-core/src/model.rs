//! Domain model — tenants, users, records, notification rules and logs.
//!
//! Every entity below `Tenant` carries a `tenant_id`; records, rules, and
//! logs must never cross tenant boundaries. The store enforces that at
//! write time, not just at read time.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CertWatchError, Result};

/// Kind of compliance record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Certificate,
    License,
    Permit,
    Other,
}

/// Business category of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordCategory {
    Quality,
    Hse,
    Environment,
    Compliance,
    Vendor,
    Other,
}

/// Record lifecycle status.
///
/// Informational for the engine, with two exceptions: archived records are
/// excluded from the sweep outright, and renewed/archived records are
/// excluded from escalation (but not from reminders).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Active,
    ExpiringSoon,
    Expired,
    Renewed,
    Archived,
}

/// Role-based authorization within a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Manager,
    Viewer,
}

/// Notification kind — reminder goes to the record owner, escalation to
/// managers/admins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Reminder,
    Escalation,
}

/// Status of a single notification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
    Skipped,
}

/// Delivery channel. Only email dispatch exists today; teams is declared
/// for the future.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Teams,
    Other,
}

macro_rules! string_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = CertWatchError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(CertWatchError::Validation(format!(
                        "Unknown {}: '{other}'",
                        stringify!($ty)
                    ))),
                }
            }
        }
    };
}

string_enum!(RecordType {
    Certificate => "certificate",
    License => "license",
    Permit => "permit",
    Other => "other",
});

string_enum!(RecordCategory {
    Quality => "quality",
    Hse => "hse",
    Environment => "environment",
    Compliance => "compliance",
    Vendor => "vendor",
    Other => "other",
});

string_enum!(RecordStatus {
    Active => "active",
    ExpiringSoon => "expiring_soon",
    Expired => "expired",
    Renewed => "renewed",
    Archived => "archived",
});

string_enum!(UserRole {
    Admin => "admin",
    Manager => "manager",
    Viewer => "viewer",
});

string_enum!(NotificationKind {
    Reminder => "reminder",
    Escalation => "escalation",
});

string_enum!(NotificationStatus {
    Pending => "pending",
    Sent => "sent",
    Failed => "failed",
    Skipped => "skipped",
});

string_enum!(Channel {
    Email => "email",
    Teams => "teams",
    Other => "other",
});

impl NotificationKind {
    /// Human-facing label used in rendered subjects/bodies.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Reminder => "Reminder",
            Self::Escalation => "Escalation",
        }
    }
}

/// Tenant — the isolation boundary for all domain data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub code: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(name: &str, code: Option<&str>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            code: code.map(String::from),
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// User attached to a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub tenant_id: String,
    pub email: String,
    pub role: UserRole,
    pub is_active: bool,
    pub notify_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(tenant_id: &str, email: &str, role: UserRole) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            email: email.to_string(),
            role,
            is_active: true,
            notify_enabled: true,
            created_at: Utc::now(),
        }
    }
}

/// A compliance record (certificate / license / permit) with a mandatory
/// expiry date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub tenant_id: String,
    pub title: String,
    pub record_type: RecordType,
    pub category: RecordCategory,
    pub reference_no: Option<String>,
    pub issuing_authority: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub expiry_date: NaiveDate,
    pub status: RecordStatus,
    pub owner_id: Option<String>,
    pub department: Option<String>,
    pub site_location: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn new(tenant_id: &str, title: &str, expiry_date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            title: title.to_string(),
            record_type: RecordType::Certificate,
            category: RecordCategory::Other,
            reference_no: None,
            issuing_authority: None,
            issue_date: None,
            expiry_date,
            status: RecordStatus::Active,
            owner_id: None,
            department: None,
            site_location: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Write-time validation.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(CertWatchError::Validation("Record title is required.".into()));
        }
        if let Some(issue) = self.issue_date
            && issue > self.expiry_date
        {
            return Err(CertWatchError::Validation(
                "Expiry date must be after issue date.".into(),
            ));
        }
        Ok(())
    }
}

/// Defines how/when to notify for expiring records.
///
/// Example offsets: `[60, 30, 14, 7]` — a reminder fires when days-to-expiry
/// equals any offset. Scope is either "applies to all" or a predicate over
/// record type and/or category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRule {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub enabled: bool,
    pub applies_to_all: bool,
    pub record_type: Option<RecordType>,
    pub category: Option<RecordCategory>,
    /// Days before expiry; normalized to descending, de-duplicated.
    pub reminder_offsets: Vec<u32>,
    pub escalate_enabled: bool,
    pub escalate_offsets: Vec<u32>,
    /// User ids receiving escalations; empty means "fall back to tenant
    /// admins/managers".
    pub escalation_recipients: Vec<String>,
    pub channel: Channel,
    pub subject_template: Option<String>,
    pub body_template: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationRule {
    pub fn new(tenant_id: &str, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
            enabled: true,
            applies_to_all: true,
            record_type: None,
            category: None,
            reminder_offsets: Vec::new(),
            escalate_enabled: true,
            escalate_offsets: Vec::new(),
            escalation_recipients: Vec::new(),
            channel: Channel::Email,
            subject_template: None,
            body_template: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Write-time validation + normalization. Offset sets become
    /// de-duplicated and descending-sorted; a rule that applies to nothing
    /// is rejected.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CertWatchError::Validation("Rule name is required.".into()));
        }
        if !self.applies_to_all && self.record_type.is_none() && self.category.is_none() {
            return Err(CertWatchError::Validation(
                "If applies_to_all is false, you must specify record_type and/or category.".into(),
            ));
        }
        self.reminder_offsets = normalize_offsets(&self.reminder_offsets);
        self.escalate_offsets = normalize_offsets(&self.escalate_offsets);
        Ok(())
    }
}

/// Sort descending and de-duplicate an offset set.
fn normalize_offsets(offsets: &[u32]) -> Vec<u32> {
    let mut out: Vec<u32> = offsets.to_vec();
    out.sort_unstable_by(|a, b| b.cmp(a));
    out.dedup();
    out
}

/// Parse a JSON offsets list (as stored in the rules table, or typed on the
/// CLI) into a normalized offset set. Negative numbers are rejected, never
/// silently coerced.
pub fn parse_offsets(json: &str) -> Result<Vec<u32>> {
    let raw: Vec<i64> = serde_json::from_str(json)
        .map_err(|e| CertWatchError::Validation(format!("Offsets must be a list of integers: {e}")))?;
    let mut out = Vec::with_capacity(raw.len());
    for x in raw {
        let v = u32::try_from(x).map_err(|_| {
            CertWatchError::Validation("All offsets must be non-negative integers.".into())
        })?;
        out.push(v);
    }
    Ok(normalize_offsets(&out))
}

/// One notification attempt — the durable dedup ledger row.
///
/// At most one row exists per (record, rule, kind, trigger_date); that
/// uniqueness is the idempotence mechanism of the whole engine. Rows are
/// never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationLog {
    pub id: String,
    pub tenant_id: String,
    pub record_id: String,
    pub rule_id: String,
    pub kind: NotificationKind,
    pub trigger_date: NaiveDate,
    pub status: NotificationStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Snapshot of the addresses the message went to.
    pub recipients: Vec<String>,
    /// Short summary of what was sent, e.g. the rendered subject.
    pub payload_summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_offsets_normalized_on_validate() {
        let mut rule = NotificationRule::new("t1", "default");
        rule.reminder_offsets = vec![7, 30, 7, 60, 14, 30];
        rule.escalate_offsets = vec![0, 1, 7, 1];
        rule.validate_and_normalize().unwrap();
        assert_eq!(rule.reminder_offsets, vec![60, 30, 14, 7]);
        assert_eq!(rule.escalate_offsets, vec![7, 1, 0]);
    }

    #[test]
    fn test_scopeless_rule_rejected() {
        let mut rule = NotificationRule::new("t1", "narrow");
        rule.applies_to_all = false;
        let err = rule.validate_and_normalize().unwrap_err();
        assert!(matches!(err, CertWatchError::Validation(_)));

        // Setting either dimension makes it valid again.
        rule.category = Some(RecordCategory::Hse);
        rule.validate_and_normalize().unwrap();
    }

    #[test]
    fn test_negative_offsets_rejected() {
        let err = parse_offsets("[60, -1, 7]").unwrap_err();
        assert!(matches!(err, CertWatchError::Validation(_)));
        assert!(parse_offsets("[\"x\"]").is_err());
        assert_eq!(parse_offsets("[7, 60, 7]").unwrap(), vec![60, 7]);
    }

    #[test]
    fn test_record_date_validation() {
        let mut rec = Record::new("t1", "ISO 9001", date(2026, 6, 1));
        rec.validate().unwrap();
        rec.issue_date = Some(date(2026, 7, 1));
        assert!(rec.validate().is_err());
    }

    #[test]
    fn test_enum_strings_round_trip() {
        assert_eq!(RecordStatus::ExpiringSoon.as_str(), "expiring_soon");
        assert_eq!(
            "escalation".parse::<NotificationKind>().unwrap(),
            NotificationKind::Escalation
        );
        assert!("bogus".parse::<UserRole>().is_err());
    }
}
