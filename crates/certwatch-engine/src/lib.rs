//! # CertWatch Engine
//!
//! The notification engine: a periodic batch sweep that walks every active
//! tenant's enabled rules and non-archived records, decides which reminder
//! and escalation events are due today, claims each (record, rule, kind,
//! date) slot exactly once in the ledger, and renders + dispatches the
//! resulting email.
//!
//! ## Architecture
//! ```text
//! sweep (per tenant, invoked by cron)
//!   ├── matcher     rule scope predicate over record type/category
//!   ├── trigger     days-to-expiry vs. the rule's offset sets
//!   ├── ledger      claim-or-skip under the uniqueness constraint
//!   ├── recipients  owner (reminder) / explicit-or-managers (escalation)
//!   ├── render      literal {token} substitution into subject/body
//!   └── mailer      single SMTP send, failure recorded and isolated
//! ```

pub mod matcher;
pub mod recipients;
pub mod render;
pub mod sweep;
pub mod trigger;

pub use sweep::{run_all, run_for_tenant, RunSummary};
