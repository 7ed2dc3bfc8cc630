//! The sweep driver — iterates tenants → rules → records and orchestrates
//! claim, resolution, rendering, and dispatch.
//!
//! Per (record, rule, kind) attempt the states are:
//! `not-due → claimed(pending) → sent | failed | skipped`. A claim lost to
//! a prior run counts as skipped in the summary. A dispatch failure is
//! recorded on its ledger row and never aborts the sweep; only store-level
//! errors abort the current tenant's run.

use chrono::NaiveDate;

use certwatch_core::config::NotifyConfig;
use certwatch_core::error::Result;
use certwatch_core::model::{NotificationKind, NotificationRule, Record};
use certwatch_mailer::Mailer;
use certwatch_store::Store;

use crate::matcher;
use crate::recipients;
use crate::render;
use crate::trigger;

/// Aggregate counts for one tenant's sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub tenant_id: String,
    pub date: NaiveDate,
    /// Ledger rows created (slots claimed) by this run.
    pub created: u32,
    pub sent: u32,
    pub failed: u32,
    /// Already-claimed slots plus recipient-less attempts.
    pub skipped: u32,
}

impl RunSummary {
    fn new(tenant_id: &str, date: NaiveDate) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            date,
            created: 0,
            sent: 0,
            failed: 0,
            skipped: 0,
        }
    }
}

/// Run the sweep for one tenant on `run_date`.
pub async fn run_for_tenant(
    store: &Store,
    mailer: &dyn Mailer,
    defaults: &NotifyConfig,
    tenant_id: &str,
    run_date: NaiveDate,
) -> Result<RunSummary> {
    let tenant = store.get_tenant(tenant_id)?;
    if !tenant.is_active {
        tracing::warn!("Tenant '{}' is inactive; nothing to sweep", tenant.name);
        return Ok(RunSummary::new(tenant_id, run_date));
    }
    let rules = store.list_enabled_rules(tenant_id)?;
    let records = store.list_notifiable_records(tenant_id)?;
    tracing::debug!(
        "Sweeping tenant '{}': {} rule(s), {} record(s)",
        tenant.name,
        rules.len(),
        records.len()
    );

    let mut summary = RunSummary::new(tenant_id, run_date);

    for rule in &rules {
        for row in &records {
            let record = &row.record;
            if !matcher::matches(rule, record) {
                continue;
            }
            let days = trigger::days_left(record.expiry_date, run_date);

            // Reminder and escalation are evaluated independently; both may
            // fire on the same day for the same record/rule.
            if trigger::reminder_due(rule, days) {
                process_attempt(
                    store,
                    mailer,
                    defaults,
                    record,
                    rule,
                    NotificationKind::Reminder,
                    run_date,
                    days,
                    || Ok(recipients::reminder_recipients(row.owner_email.as_deref())),
                    "No owner email to send reminder.",
                    &mut summary,
                )
                .await?;
            }

            if trigger::escalation_due(rule, record, days) {
                process_attempt(
                    store,
                    mailer,
                    defaults,
                    record,
                    rule,
                    NotificationKind::Escalation,
                    run_date,
                    days,
                    || recipients::escalation_recipients(store, rule),
                    "No escalation recipients configured and no tenant managers found.",
                    &mut summary,
                )
                .await?;
            }
        }
    }

    tracing::info!(
        "Sweep for '{}' on {}: created={} sent={} failed={} skipped={}",
        tenant.name,
        run_date,
        summary.created,
        summary.sent,
        summary.failed,
        summary.skipped
    );
    Ok(summary)
}

/// Run the sweep for every active tenant. A store failure in one tenant is
/// logged and does not stop the others.
pub async fn run_all(
    store: &Store,
    mailer: &dyn Mailer,
    defaults: &NotifyConfig,
    run_date: NaiveDate,
) -> Result<Vec<RunSummary>> {
    let mut summaries = Vec::new();
    for tenant in store.list_active_tenants()? {
        match run_for_tenant(store, mailer, defaults, &tenant.id, run_date).await {
            Ok(summary) => summaries.push(summary),
            Err(e) => tracing::error!("Sweep aborted for tenant '{}': {e}", tenant.name),
        }
    }
    Ok(summaries)
}

/// One (record, rule, kind) attempt: claim the slot, resolve recipients,
/// render, dispatch, finalize.
#[allow(clippy::too_many_arguments)]
async fn process_attempt(
    store: &Store,
    mailer: &dyn Mailer,
    defaults: &NotifyConfig,
    record: &Record,
    rule: &NotificationRule,
    kind: NotificationKind,
    run_date: NaiveDate,
    days: i64,
    resolve: impl FnOnce() -> Result<Vec<String>>,
    empty_reason: &str,
    summary: &mut RunSummary,
) -> Result<()> {
    let Some(ticket) = store.claim(record, rule, kind, run_date)? else {
        // A prior run (or a concurrent sweep) owns this slot.
        summary.skipped += 1;
        return Ok(());
    };
    summary.created += 1;

    let to = resolve()?;
    if to.is_empty() {
        store.finalize_skipped(&ticket, empty_reason)?;
        summary.skipped += 1;
        return Ok(());
    }

    let subject = render::render_subject(rule.subject_template.as_deref(), defaults, record, kind, days);
    let body = render::render_body(rule.body_template.as_deref(), defaults, record, kind, days);

    match mailer.send(&to, &subject, &body).await {
        Ok(()) => {
            store.finalize_sent(&ticket, &to, &subject)?;
            summary.sent += 1;
        }
        Err(e) => {
            tracing::warn!(
                "{} dispatch failed record={} rule={}: {e}",
                kind.label(),
                record.id,
                rule.id
            );
            store.finalize_failed(&ticket, &e.to_string())?;
            summary.failed += 1;
        }
    }
    Ok(())
}
