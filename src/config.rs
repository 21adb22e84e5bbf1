//! Process configuration, read from the environment once at startup.
//!
//! Every component receives its slice of this by value — there are no
//! ambient `env::var` lookups inside business logic.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Full relay configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub mail: MailConfig,
    pub webhook: WebhookConfig,
    pub crm: CrmConfig,
    /// Path to the local lead database file.
    pub lead_db_path: String,
    /// Idle pause between empty fetch cycles.
    pub poll_interval: Duration,
    /// Fixed delay before each reconnect attempt.
    pub backoff_delay: Duration,
    /// Consecutive connection failures tolerated before giving up.
    pub max_connect_attempts: u32,
}

/// Mailbox connection parameters.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    pub folder: String,
}

/// Automation webhook endpoint.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
    pub api_key: SecretString,
}

/// Secondary CRM system — session auth plus attachment upload.
#[derive(Debug, Clone)]
pub struct CrmConfig {
    pub base_url: String,
    pub service_email: String,
    pub service_password: SecretString,
}

impl Config {
    /// Build the full configuration from environment variables.
    ///
    /// Required: `EMAIL_HOST`, `EMAIL_USER`, `EMAIL_PASS`,
    /// `N8N_WEBHOOK_URL`, `N8N_API_KEY`, `CRM_BASE_URL`,
    /// `CRM_SERVICE_EMAIL`, `CRM_SERVICE_PASS`. Everything else defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mail = MailConfig {
            host: require("EMAIL_HOST")?,
            port: parse_or("EMAIL_PORT", 993),
            user: require("EMAIL_USER")?,
            password: SecretString::from(require("EMAIL_PASS")?),
            folder: std::env::var("EMAIL_PATH").unwrap_or_else(|_| "INBOX".to_string()),
        };

        let webhook = WebhookConfig {
            url: require("N8N_WEBHOOK_URL")?,
            api_key: SecretString::from(require("N8N_API_KEY")?),
        };

        let crm = CrmConfig {
            base_url: require("CRM_BASE_URL")?.trim_end_matches('/').to_string(),
            service_email: require("CRM_SERVICE_EMAIL")?,
            service_password: SecretString::from(require("CRM_SERVICE_PASS")?),
        };

        Ok(Self {
            mail,
            webhook,
            crm,
            lead_db_path: std::env::var("LEAD_DB_PATH")
                .unwrap_or_else(|_| "./data/leads.db".to_string()),
            poll_interval: Duration::from_secs(parse_or("POLL_INTERVAL_SECS", 5)),
            backoff_delay: Duration::from_secs(parse_or("BACKOFF_DELAY_SECS", 5)),
            max_connect_attempts: parse_or("MAX_CONNECT_ATTEMPTS", 50),
        })
    }
}

fn require(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_fails_without_host() {
        // SAFETY: no other test reads EMAIL_HOST concurrently.
        unsafe { std::env::remove_var("EMAIL_HOST") };
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "EMAIL_HOST"));
    }

    #[test]
    fn parse_or_uses_default_when_unset() {
        let port: u16 = parse_or("LEAD_RELAY_TEST_UNSET_VAR", 993);
        assert_eq!(port, 993);
    }
}
