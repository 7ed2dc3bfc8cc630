//! CertWatch configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertWatchConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

fn default_db_path() -> String {
    "~/.certwatch/certwatch.db".into()
}

impl Default for CertWatchConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            mail: MailConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl CertWatchConfig {
    /// Load config from the default path (~/.certwatch/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::CertWatchError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::CertWatchError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::CertWatchError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".certwatch")
            .join("config.toml")
    }

    /// Get the CertWatch home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".certwatch")
    }
}

/// Outbound mail configuration.
///
/// The system has exactly one authenticated sending identity (`mailbox`).
/// `from_display` may carry a display name, but it must contain the same
/// mailbox address or the mailbox is used verbatim — transport-level
/// "send as" rejections are not worth a prettier header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// Authenticated mailbox address (SMTP username).
    #[serde(default)]
    pub mailbox: String,
    #[serde(default)]
    pub password: String,
    /// Optional human-facing from header, e.g. `"Compliance <bot@corp.com>"`.
    #[serde(default)]
    pub from_display: Option<String>,
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

fn default_smtp_host() -> String {
    "smtp.office365.com".into()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_send_timeout() -> u64 {
    30
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            mailbox: String::new(),
            password: String::new(),
            from_display: None,
            send_timeout_secs: default_send_timeout(),
        }
    }
}

/// Notification rendering defaults, used when a rule carries no templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_subject_template")]
    pub default_subject_template: String,
    #[serde(default = "default_body_template")]
    pub default_body_template: String,
}

fn default_subject_template() -> String {
    "[CertWatch] {kind} • {title} ({ref}) • {days} day(s) left".into()
}

fn default_body_template() -> String {
    "Dear Team,\n\n\
     This is an automated {kind} from CertWatch.\n\n\
     Record Details:\n\
     - Title: {title}\n\
     - Reference No: {ref}\n\
     - Expiry Date: {expiry}\n\
     - Remaining: {days} day(s)\n\n\
     Action Required:\n\
     Please review and proceed with renewal / closure before the expiry date.\n\n\
     Regards,\nCertWatch\n"
        .into()
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            default_subject_template: default_subject_template(),
            default_body_template: default_body_template(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = CertWatchConfig::default();
        assert_eq!(cfg.mail.smtp_port, 587);
        assert_eq!(cfg.mail.send_timeout_secs, 30);
        assert!(cfg.notify.default_subject_template.contains("{kind}"));
        assert!(cfg.notify.default_body_template.contains("{expiry}"));
    }

    #[test]
    fn test_parse_partial_toml() {
        let cfg: CertWatchConfig = toml::from_str(
            r#"
            db_path = "/var/lib/certwatch/db.sqlite"

            [mail]
            mailbox = "no-reply@corp.com"
            password = "secret"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.db_path, "/var/lib/certwatch/db.sqlite");
        assert_eq!(cfg.mail.mailbox, "no-reply@corp.com");
        // Unset fields fall back to defaults
        assert_eq!(cfg.mail.smtp_host, "smtp.office365.com");
        assert!(cfg.notify.default_subject_template.contains("{title}"));
    }
}
