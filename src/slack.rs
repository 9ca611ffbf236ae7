use chrono::{Local, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

use crate::actions::{Action, ActionStatus};
use crate::models::{Alert, DailyReport, Severity};

#[derive(Error, Debug)]
pub enum SlackError {
    #[error("Failed to send message: {0}")]
    SendError(String),
    #[error("API request failed: {0}")]
    RequestError(#[from] reqwest::Error),
}

/// Incoming-webhook client. Payloads use Block Kit with a plain-text
/// fallback.
pub struct SlackNotifier {
    client: Client,
    webhook_url: String,
}

impl SlackNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            client: Client::new(),
            webhook_url,
        }
    }

    pub async fn send_message(&self, text: &str, blocks: Option<Value>) -> Result<(), SlackError> {
        let mut payload = json!({ "text": text });
        if let Some(blocks) = blocks {
            payload["blocks"] = blocks;
        }

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SlackError::SendError(error_text));
        }

        tracing::debug!("slack message delivered");
        Ok(())
    }

    /// Single alert, sent immediately for critical conditions.
    pub async fn send_alert(&self, alert: &Alert) -> Result<(), SlackError> {
        let blocks = json!([
            {
                "type": "header",
                "text": {
                    "type": "plain_text",
                    "text": format!("{} Alert detected", alert.severity.emoji()),
                    "emoji": true
                }
            },
            {
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!(
                        "*Campaign:* {} [{}]\n*Detail:* {}",
                        alert.campaign_name,
                        alert.objective.display_name(),
                        alert.message
                    )
                }
            },
            {
                "type": "context",
                "elements": [
                    {
                        "type": "mrkdwn",
                        "text": format!("Detected at {}", alert.timestamp.format("%Y-%m-%d %H:%M:%S"))
                    }
                ]
            }
        ]);

        self.send_message(
            &format!("{} Alert: {}", alert.severity.emoji(), alert.message),
            Some(blocks),
        )
        .await
    }

    /// Compact summary for the hourly check, one section per alert.
    pub async fn send_hourly_summary(&self, alerts: &[Alert]) -> Result<(), SlackError> {
        if alerts.is_empty() {
            return Ok(());
        }

        let critical = alerts
            .iter()
            .filter(|a| a.severity == Severity::Critical)
            .count();
        let header_text = if critical > 0 {
            format!("🔴 {critical} critical alert(s) detected")
        } else {
            format!("🟡 {} alert(s) detected", alerts.len())
        };

        let mut blocks = vec![
            json!({
                "type": "header",
                "text": { "type": "plain_text", "text": header_text.as_str(), "emoji": true }
            }),
            json!({
                "type": "context",
                "elements": [
                    {
                        "type": "mrkdwn",
                        "text": format!("⏰ Scheduled check | {}", Local::now().format("%Y-%m-%d %H:%M"))
                    }
                ]
            }),
            json!({ "type": "divider" }),
        ];

        for alert in alerts.iter().take(5) {
            blocks.push(json!({
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!(
                        "{} *{}* [{}]\n{}",
                        alert.severity.emoji(),
                        alert.campaign_name,
                        alert.objective.display_name(),
                        alert.message
                    )
                }
            }));
        }

        blocks.push(json!({ "type": "divider" }));
        blocks.push(json!({
            "type": "context",
            "elements": [
                { "type": "mrkdwn", "text": "💡 See the dashboard for full detail" }
            ]
        }));

        self.send_message(
            &format!("{header_text} - scheduled check"),
            Some(Value::Array(blocks)),
        )
        .await
    }

    pub async fn send_daily_report(&self, report: &DailyReport) -> Result<(), SlackError> {
        let summary = &report.summary;

        let mut blocks = vec![
            json!({
                "type": "header",
                "text": {
                    "type": "plain_text",
                    "text": format!("📊 Meta Ads daily report ({})", report.date.format("%Y/%m/%d")),
                    "emoji": true
                }
            }),
            json!({
                "type": "section",
                "text": { "type": "mrkdwn", "text": summary.message.as_str() }
            }),
            json!({ "type": "divider" }),
            json!({
                "type": "section",
                "fields": [
                    { "type": "mrkdwn", "text": format!("*Accounts checked*\n{}", summary.accounts_checked) },
                    { "type": "mrkdwn", "text": format!("*Alerts*\n{}", summary.total_alerts) },
                    { "type": "mrkdwn", "text": format!("*Critical alerts*\n{}", summary.critical_alerts) },
                    { "type": "mrkdwn", "text": format!("*Opportunities*\n{}", summary.total_opportunities) }
                ]
            }),
        ];

        if !report.alerts.is_empty() {
            blocks.push(json!({ "type": "divider" }));
            blocks.push(json!({
                "type": "section",
                "text": { "type": "mrkdwn", "text": "*🚨 Alerts*" }
            }));
            for alert in report.alerts.iter().take(5) {
                blocks.push(json!({
                    "type": "section",
                    "text": {
                        "type": "mrkdwn",
                        "text": format!("{} *{}*\n{}", alert.severity.emoji(), alert.campaign_name, alert.message)
                    }
                }));
            }
        }

        if !report.opportunities.is_empty() {
            blocks.push(json!({ "type": "divider" }));
            blocks.push(json!({
                "type": "section",
                "text": { "type": "mrkdwn", "text": "*🚀 Scaling opportunities*" }
            }));
            for opp in report.opportunities.iter().take(5) {
                let mut text = format!("🟢 *{}*\n{}", opp.campaign_name, opp.message);
                if let Some(action) = &opp.suggested_action {
                    text.push_str(&format!("\n_{action}_"));
                }
                blocks.push(json!({
                    "type": "section",
                    "text": { "type": "mrkdwn", "text": text }
                }));
            }
        }

        if !report.digests.is_empty() {
            blocks.push(json!({ "type": "divider" }));
            blocks.push(json!({
                "type": "section",
                "text": { "type": "mrkdwn", "text": "*📈 Yesterday vs 7-day average*" }
            }));
            for digest in report.digests.iter().take(10) {
                let kpi_line = match (digest.kpi, digest.kpi_yesterday) {
                    (Some(kind), Some(value)) => {
                        let avg = digest
                            .kpi_avg_7d
                            .map(|v| kind.format_value(v))
                            .unwrap_or_else(|| "-".to_string());
                        let change = digest
                            .change_percent
                            .map(|p| format!(" ({p:+.0}%)"))
                            .unwrap_or_default();
                        format!(
                            "{}: {} vs {} avg{}",
                            kind.label(),
                            kind.format_value(value),
                            avg,
                            change
                        )
                    }
                    _ => "no results yesterday".to_string(),
                };
                blocks.push(json!({
                    "type": "section",
                    "text": {
                        "type": "mrkdwn",
                        "text": format!(
                            "*{}*\n{} | spend ¥{:.0}",
                            digest.campaign_name, kpi_line, digest.spend_yesterday
                        )
                    }
                }));
            }
        }

        blocks.push(json!({ "type": "divider" }));
        blocks.push(json!({
            "type": "context",
            "elements": [
                {
                    "type": "mrkdwn",
                    "text": format!("🤖 Meta Ads Monitor | {}", Utc::now().format("%Y-%m-%d %H:%M:%S"))
                }
            ]
        }));

        self.send_message(
            &format!("📊 Meta Ads daily report - {}", summary.message),
            Some(Value::Array(blocks)),
        )
        .await
    }

    pub async fn send_action_result(&self, action: &Action) -> Result<(), SlackError> {
        let success = action.status == ActionStatus::Executed;
        let status_emoji = if success { "✅" } else { "❌" };

        let mut text = format!(
            "*Action:* {}\n*Campaign:* {}\n*Result:* {}",
            action.kind.describe(),
            action.campaign_name,
            if success { "executed" } else { "failed" }
        );
        if let Some(error) = &action.error {
            text.push_str(&format!("\n*Error:* {error}"));
        }

        let blocks = json!([
            {
                "type": "header",
                "text": {
                    "type": "plain_text",
                    "text": format!("{status_emoji} Action {}", if success { "executed" } else { "failed" }),
                    "emoji": true
                }
            },
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": text }
            }
        ]);

        self.send_message(
            &format!(
                "{status_emoji} Action {}: {}",
                if success { "executed" } else { "failed" },
                action.kind.describe()
            ),
            Some(blocks),
        )
        .await
    }

    pub async fn test_connection(&self) -> Result<(), SlackError> {
        let blocks = json!([
            {
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": "✅ *Slack connection test succeeded!*\n\nMeta Ads Monitor can deliver notifications here."
                }
            }
        ]);

        self.send_message("🤖 Test message from Meta Ads Monitor", Some(blocks))
            .await
    }
}
