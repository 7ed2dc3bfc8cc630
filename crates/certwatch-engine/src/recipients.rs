//! Recipient resolution — who a message actually goes to.
//!
//! Reminders go to the record owner. Escalations go to the rule's explicit
//! recipients, falling back to the tenant's active admins/managers. An
//! empty result is a skip for the caller, never an error.

use certwatch_core::error::Result;
use certwatch_core::model::NotificationRule;
use certwatch_store::Store;

/// RFC 5321 practical ceiling for an address.
const EMAIL_MAX_LEN: usize = 254;

/// Keep syntactically plausible addresses, trimmed, de-duplicated while
/// preserving first-seen order.
pub fn sanitize_emails<'a, I>(emails: I) -> Vec<String>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut out: Vec<String> = Vec::new();
    for email in emails.into_iter().flatten() {
        let email = email.trim();
        if email.contains('@') && email.len() <= EMAIL_MAX_LEN && !out.iter().any(|e| e == email) {
            out.push(email.to_string());
        }
    }
    out
}

/// Reminder recipients: the record owner's email, if present and valid.
pub fn reminder_recipients(owner_email: Option<&str>) -> Vec<String> {
    sanitize_emails([owner_email])
}

/// Escalation recipients: explicit rule recipients first; when none of
/// those yield a usable address, fall back to the tenant's active
/// admin/manager emails.
pub fn escalation_recipients(store: &Store, rule: &NotificationRule) -> Result<Vec<String>> {
    let mut explicit: Vec<String> = Vec::new();
    for user_id in &rule.escalation_recipients {
        if let Some(user) = store.get_user(user_id)? {
            explicit.push(user.email);
        }
    }
    let emails = sanitize_emails(explicit.iter().map(|e| Some(e.as_str())));
    if !emails.is_empty() {
        return Ok(emails);
    }

    let contacts = store.escalation_contacts(&rule.tenant_id)?;
    Ok(sanitize_emails(contacts.iter().map(|u| Some(u.email.as_str()))))
}
