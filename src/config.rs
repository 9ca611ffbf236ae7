use dotenv::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::constants::{
    DEFAULT_CHECK_INTERVAL_MINUTES, DEFAULT_DAILY_REPORT_HOUR, DEFAULT_DAILY_REPORT_MINUTE,
    META_API_VERSION, MONITOR_CONFIG_FILE,
};
use crate::models::Severity;
use crate::storage::{self, StorageError};

/// Process-level configuration from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub access_token: String,
    pub account_ids: Vec<String>,
    pub api_version: String,
    pub slack_webhook_url: Option<String>,
    pub storage_dir: PathBuf,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable not found: {0}")]
    MissingEnv(String),
    #[error("Invalid webhook URL: {0}")]
    InvalidWebhookUrl(String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let access_token = env::var("META_ACCESS_TOKEN")
            .map_err(|_| ConfigError::MissingEnv("META_ACCESS_TOKEN".to_string()))?;

        let account_ids = env::var("META_AD_ACCOUNT_IDS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        let api_version =
            env::var("META_API_VERSION").unwrap_or_else(|_| META_API_VERSION.to_string());

        let slack_webhook_url = match env::var("SLACK_WEBHOOK_URL") {
            Ok(raw) if !raw.is_empty() => {
                Url::parse(&raw).map_err(|e| ConfigError::InvalidWebhookUrl(e.to_string()))?;
                Some(raw)
            }
            _ => None,
        };

        let storage_dir = env::var("MONITOR_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("storage"));

        Ok(Self {
            access_token,
            account_ids,
            api_version,
            slack_webhook_url,
            storage_dir,
        })
    }
}

/// Execution policy for proposed actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPolicy {
    /// Report proposals in notifications only, never queue them.
    NotifyOnly,
    /// Queue proposals for human approval before execution.
    ApprovalRequired,
    /// Approve and execute proposals that pass the safety limits.
    AutoExecute,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredAccount {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub check_interval_minutes: i64,
    pub daily_report_hour: u32,
    pub daily_report_minute: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            check_interval_minutes: DEFAULT_CHECK_INTERVAL_MINUTES,
            daily_report_hour: DEFAULT_DAILY_REPORT_HOUR,
            daily_report_minute: DEFAULT_DAILY_REPORT_MINUTE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub send_hourly_alerts: bool,
    pub send_daily_report: bool,
    pub alert_severity_threshold: Severity,
    /// Rolling alert cool-down in minutes. `None` suppresses repeats within
    /// the same local calendar day instead.
    pub cooldown_minutes: Option<i64>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            send_hourly_alerts: true,
            send_daily_report: true,
            alert_severity_threshold: Severity::Warning,
            cooldown_minutes: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub execution_policy: ExecutionPolicy,
    /// Largest allowed budget raise, as a percentage of the current budget.
    pub max_budget_increase_percent: f64,
    /// Hard ceiling on any daily budget this tool will set.
    pub max_daily_budget: f64,
    /// Campaigns spending less than this per day are not evaluated.
    pub min_daily_spend: f64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            execution_policy: ExecutionPolicy::ApprovalRequired,
            max_budget_increase_percent: 20.0,
            max_daily_budget: 500_000.0,
            min_daily_spend: 1000.0,
        }
    }
}

/// Monitor settings persisted next to the other state files so the dashboard
/// process can edit them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled_accounts: Vec<MonitoredAccount>,
    pub schedule: ScheduleConfig,
    pub notifications: NotificationConfig,
    pub automation: AutomationConfig,
}

impl MonitorConfig {
    pub fn load(storage_dir: &Path) -> Result<Self, StorageError> {
        let path = storage_dir.join(MONITOR_CONFIG_FILE);
        Ok(storage::load_json(&path)?.unwrap_or_default())
    }

    pub fn save(&self, storage_dir: &Path) -> Result<(), StorageError> {
        storage::store_json(&storage_dir.join(MONITOR_CONFIG_FILE), self)
    }

    pub fn enabled_account_ids(&self) -> Vec<String> {
        self.enabled_accounts
            .iter()
            .filter(|a| a.enabled)
            .map(|a| a.id.clone())
            .collect()
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = MonitorConfig::default();
        assert_eq!(config.schedule.check_interval_minutes, 60);
        assert_eq!(config.schedule.daily_report_hour, 9);
        assert!(config.notifications.send_hourly_alerts);
        assert_eq!(
            config.notifications.alert_severity_threshold,
            Severity::Warning
        );
        assert_eq!(
            config.automation.execution_policy,
            ExecutionPolicy::ApprovalRequired
        );
        assert_eq!(config.automation.max_budget_increase_percent, 20.0);
        assert_eq!(config.automation.min_daily_spend, 1000.0);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = MonitorConfig::load(dir.path()).unwrap();
        assert!(config.enabled_accounts.is_empty());
        assert_eq!(config.schedule.check_interval_minutes, 60);
    }

    #[test]
    fn saved_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MonitorConfig::default();
        config.enabled_accounts.push(MonitoredAccount {
            id: "act_123".to_string(),
            name: "Main".to_string(),
            enabled: true,
        });
        config.enabled_accounts.push(MonitoredAccount {
            id: "act_456".to_string(),
            name: "Secondary".to_string(),
            enabled: false,
        });
        config.save(dir.path()).unwrap();

        let loaded = MonitorConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.enabled_account_ids(), vec!["act_123".to_string()]);
    }

    #[test]
    fn partial_json_uses_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MONITOR_CONFIG_FILE),
            r#"{"schedule": {"check_interval_minutes": 30}}"#,
        )
        .unwrap();

        let config = MonitorConfig::load(dir.path()).unwrap();
        assert_eq!(config.schedule.check_interval_minutes, 30);
        assert_eq!(config.schedule.daily_report_hour, 9);
        assert!(config.notifications.send_daily_report);
    }
}
