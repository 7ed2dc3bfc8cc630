//! Message rendering — literal token substitution, not a template language.
//!
//! Recognized tokens: `{kind}`, `{title}`, `{ref}`, `{expiry}`, `{days}`.
//! Anything else is left verbatim; the token names are part of the
//! rule-authoring contract.

use certwatch_core::config::NotifyConfig;
use certwatch_core::model::{NotificationKind, Record};

fn substitute(template: &str, record: &Record, kind: NotificationKind, days_left: i64) -> String {
    template
        .replace("{kind}", kind.label())
        .replace("{title}", &record.title)
        .replace("{ref}", record.reference_no.as_deref().unwrap_or("N/A"))
        .replace("{expiry}", &record.expiry_date.to_string())
        .replace("{days}", &days_left.to_string())
}

/// Render the subject line: the rule's template when set, else the
/// configured default.
pub fn render_subject(
    template: Option<&str>,
    defaults: &NotifyConfig,
    record: &Record,
    kind: NotificationKind,
    days_left: i64,
) -> String {
    let template = template.unwrap_or(&defaults.default_subject_template);
    substitute(template, record, kind, days_left).trim().to_string()
}

/// Render the body the same way.
pub fn render_body(
    template: Option<&str>,
    defaults: &NotifyConfig,
    record: &Record,
    kind: NotificationKind,
    days_left: i64,
) -> String {
    let template = template.unwrap_or(&defaults.default_body_template);
    substitute(template, record, kind, days_left)
}
