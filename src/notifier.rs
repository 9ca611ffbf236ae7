//! Alert dispatch gating: severity threshold plus a per-dedup-key cool-down
//! persisted between ticks, so a breach that stays breached does not spam
//! the channel every hour.

use chrono::{DateTime, Duration, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::NotificationConfig;
use crate::constants::NOTIFIER_STATE_FILE;
use crate::models::{Alert, Severity};
use crate::storage::{self, StorageError};

// Entries older than this are pruned on save; they are past every cool-down.
const STATE_RETENTION_HOURS: i64 = 48;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NotifierState {
    last_sent: HashMap<String, DateTime<Utc>>,
}

pub struct AlertGate {
    path: PathBuf,
    state: NotifierState,
    config: NotificationConfig,
}

impl AlertGate {
    pub fn load(storage_dir: &Path, config: NotificationConfig) -> Result<Self, StorageError> {
        let path = storage_dir.join(NOTIFIER_STATE_FILE);
        let state = storage::load_json(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            state,
            config,
        })
    }

    /// Whether the alert's dedup key is outside its cool-down window.
    /// Default window: no repeat within the same local calendar day.
    pub fn should_send(&self, alert: &Alert, now: DateTime<Utc>) -> bool {
        let Some(last) = self.state.last_sent.get(&alert.dedup_key) else {
            return true;
        };

        match self.config.cooldown_minutes {
            Some(minutes) => now - *last >= Duration::minutes(minutes),
            None => {
                last.with_timezone(&Local).date_naive() != now.with_timezone(&Local).date_naive()
            }
        }
    }

    /// Applies the severity threshold and the cool-down to a batch of
    /// alerts, preserving order.
    pub fn filter<'a>(&self, alerts: &'a [Alert], now: DateTime<Utc>) -> Vec<&'a Alert> {
        alerts
            .iter()
            .filter(|a| a.severity >= self.config.alert_severity_threshold)
            .filter(|a| self.should_send(a, now))
            .collect()
    }

    /// Records a successful dispatch. Not called on delivery failure, so the
    /// next tick's identical alert goes through again.
    pub fn mark_sent(&mut self, alert: &Alert, now: DateTime<Utc>) -> Result<(), StorageError> {
        self.state.last_sent.insert(alert.dedup_key.clone(), now);

        let cutoff = now - Duration::hours(STATE_RETENTION_HOURS);
        self.state.last_sent.retain(|_, sent| *sent > cutoff);

        storage::store_json(&self.path, &self.state)
    }

    pub fn mark_all_sent(
        &mut self,
        alerts: &[&Alert],
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        for alert in alerts {
            self.state.last_sent.insert(alert.dedup_key.clone(), now);
        }
        let cutoff = now - Duration::hours(STATE_RETENTION_HOURS);
        self.state.last_sent.retain(|_, sent| *sent > cutoff);
        storage::store_json(&self.path, &self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CampaignObjective;
    use chrono::TimeZone;

    // noon UTC keeps the +/-1h windows below inside one local day for any
    // machine timezone
    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()
    }

    fn alert(campaign_id: &str, severity: Severity) -> Alert {
        Alert {
            campaign_id: campaign_id.to_string(),
            campaign_name: "Followers JP".to_string(),
            objective: CampaignObjective::Traffic,
            severity,
            message: "CPF critical: ¥850".to_string(),
            timestamp: noon(),
            dedup_key: Alert::dedup_key_for(campaign_id, severity),
        }
    }

    fn gate(dir: &Path, config: NotificationConfig) -> AlertGate {
        AlertGate::load(dir, config).unwrap()
    }

    #[test]
    fn identical_dedup_key_suppressed_within_window() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = gate(dir.path(), NotificationConfig::default());
        let a = alert("c1", Severity::Critical);
        let now = noon();

        assert!(gate.should_send(&a, now));
        gate.mark_sent(&a, now).unwrap();

        // same key, same day: suppressed
        assert!(!gate.should_send(&a, now + Duration::minutes(60)));

        // a different severity is a different condition
        let warning = alert("c1", Severity::Warning);
        assert!(gate.should_send(&warning, now));
    }

    #[test]
    fn rolling_cooldown_expires() {
        let dir = tempfile::tempdir().unwrap();
        let config = NotificationConfig {
            cooldown_minutes: Some(120),
            ..NotificationConfig::default()
        };
        let mut gate = gate(dir.path(), config);
        let a = alert("c1", Severity::Critical);
        let now = noon();

        gate.mark_sent(&a, now).unwrap();
        assert!(!gate.should_send(&a, now + Duration::minutes(119)));
        assert!(gate.should_send(&a, now + Duration::minutes(120)));
    }

    #[test]
    fn severity_threshold_filters_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let config = NotificationConfig {
            alert_severity_threshold: Severity::Critical,
            ..NotificationConfig::default()
        };
        let gate = gate(dir.path(), config);

        let alerts = vec![alert("c1", Severity::Warning), alert("c2", Severity::Critical)];
        let passed = gate.filter(&alerts, Utc::now());
        assert_eq!(passed.len(), 1);
        assert_eq!(passed[0].campaign_id, "c2");
    }

    #[test]
    fn suppression_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let a = alert("c1", Severity::Critical);
        let now = noon();

        {
            let mut gate = gate(dir.path(), NotificationConfig::default());
            gate.mark_sent(&a, now).unwrap();
        }

        let gate = gate(dir.path(), NotificationConfig::default());
        assert!(!gate.should_send(&a, now + Duration::minutes(5)));
    }
}
