//! # CertWatch Core
//!
//! Shared foundation for the CertWatch workspace: the domain model
//! (tenants, users, records, notification rules and logs), the error type,
//! and the TOML configuration.

pub mod config;
pub mod error;
pub mod model;

pub use config::{CertWatchConfig, MailConfig, NotifyConfig};
pub use error::{CertWatchError, Result};
pub use model::{
    Channel, NotificationKind, NotificationLog, NotificationRule, NotificationStatus, Record,
    RecordCategory, RecordStatus, RecordType, Tenant, User, UserRole,
};
