use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;

use crate::constants::{META_BASE_URL, META_CAMPAIGN_FIELDS, META_INSIGHT_FIELDS};
use crate::models::{Campaign, CampaignObjective, CampaignStatus, MetricSnapshot, Period};

#[derive(Error, Debug)]
pub enum MetaApiError {
    #[error("API request failed: {0}")]
    RequestFailed(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl MetaApiError {
    /// Transport failures are retried on the next tick; auth errors are
    /// surfaced once and need operator intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RequestFailed(_))
    }
}

/// Read and write surface of the ads platform, so the scheduler and executor
/// can be driven by fakes in tests.
#[async_trait]
pub trait AdsApi: Send + Sync {
    async fn get_campaigns(&self, account_id: &str) -> Result<Vec<Campaign>, MetaApiError>;

    async fn get_campaign_insights(
        &self,
        campaign_id: &str,
        period: Period,
    ) -> Result<MetricSnapshot, MetaApiError>;

    async fn update_campaign_budget(
        &self,
        campaign_id: &str,
        daily_budget: i64,
    ) -> Result<(), MetaApiError>;

    async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: CampaignStatus,
    ) -> Result<(), MetaApiError>;
}

pub struct MetaAdsClient {
    client: Client,
    access_token: String,
    base_url: String,
}

impl MetaAdsClient {
    pub fn new(access_token: String, api_version: &str) -> Self {
        Self::with_base_url(access_token, format!("{META_BASE_URL}/{api_version}"))
    }

    pub fn with_base_url(access_token: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            access_token,
            base_url,
        }
    }

    /// Parses a Graph API response, splitting auth failures from everything
    /// else so the caller can decide what is retryable.
    async fn parse_body(response: reqwest::Response) -> Result<Value, MetaApiError> {
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| MetaApiError::InvalidResponse(e.to_string()))?;

        if let Some(error) = body.get("error") {
            let message = error["message"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string();
            let error_type = error["type"].as_str().unwrap_or("");

            if error_type == "OAuthException"
                || status == StatusCode::UNAUTHORIZED
                || status == StatusCode::FORBIDDEN
            {
                return Err(MetaApiError::Auth(message));
            }
            return Err(MetaApiError::RequestFailed(message));
        }

        Ok(body)
    }

    fn parse_campaign(value: &Value) -> Campaign {
        let objective = CampaignObjective::from_api(
            value["objective"].as_str().unwrap_or(""),
            value["smart_promotion_type"].as_str(),
        );

        Campaign {
            id: value["id"].as_str().unwrap_or("").to_string(),
            name: value["name"].as_str().unwrap_or("").to_string(),
            objective,
            status: value["effective_status"].as_str().unwrap_or("").to_string(),
            daily_budget: opt_f64(&value["daily_budget"]),
        }
    }

    fn parse_insight(campaign_id: &str, period: Period, insight: &Value) -> MetricSnapshot {
        let mut snapshot = MetricSnapshot::empty(campaign_id, period);
        snapshot.impressions = num_i64(&insight["impressions"]);
        snapshot.clicks = num_i64(&insight["clicks"]);
        snapshot.spend = num_f64(&insight["spend"]);

        if let Some(actions) = insight["actions"].as_array() {
            for action in actions {
                let action_type = action["action_type"].as_str().unwrap_or("");
                let value = num_i64(&action["value"]);
                match action_type {
                    "follow" | "like" => snapshot.follows += value,
                    "purchase" | "complete_registration" | "lead" | "omni_purchase" => {
                        snapshot.conversions += value
                    }
                    _ => {}
                }
            }
        }

        if let Some(action_values) = insight["action_values"].as_array() {
            for av in action_values {
                if matches!(
                    av["action_type"].as_str().unwrap_or(""),
                    "purchase" | "omni_purchase"
                ) {
                    snapshot.conversion_value += num_f64(&av["value"]);
                }
            }
        }

        if let Some(cost_per_action) = insight["cost_per_action_type"].as_array() {
            for item in cost_per_action {
                let value = opt_f64(&item["value"]);
                match item["action_type"].as_str().unwrap_or("") {
                    "follow" | "like" => snapshot.reported_cpf = value,
                    "purchase" | "complete_registration" | "lead" | "omni_purchase" => {
                        snapshot.reported_cpa = value
                    }
                    _ => {}
                }
            }
        }

        snapshot
    }
}

#[async_trait]
impl AdsApi for MetaAdsClient {
    async fn get_campaigns(&self, account_id: &str) -> Result<Vec<Campaign>, MetaApiError> {
        let account_id = account_id.trim_start_matches("act_");
        let url = format!("{}/act_{}/campaigns", self.base_url, account_id);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("access_token", self.access_token.as_str()),
                ("fields", META_CAMPAIGN_FIELDS),
                ("effective_status", r#"["ACTIVE"]"#),
            ])
            .send()
            .await
            .map_err(|e| MetaApiError::RequestFailed(e.to_string()))?;

        let body = Self::parse_body(response).await?;

        let campaigns = body["data"]
            .as_array()
            .map(|data| data.iter().map(Self::parse_campaign).collect())
            .unwrap_or_default();

        Ok(campaigns)
    }

    async fn get_campaign_insights(
        &self,
        campaign_id: &str,
        period: Period,
    ) -> Result<MetricSnapshot, MetaApiError> {
        let url = format!("{}/{}/insights", self.base_url, campaign_id);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("access_token", self.access_token.as_str()),
                ("fields", META_INSIGHT_FIELDS),
                ("date_preset", period.date_preset()),
            ])
            .send()
            .await
            .map_err(|e| MetaApiError::RequestFailed(e.to_string()))?;

        let body = Self::parse_body(response).await?;

        // An empty data array means no delivery in the period, not an error.
        let snapshot = body["data"]
            .as_array()
            .and_then(|data| data.first())
            .map(|insight| Self::parse_insight(campaign_id, period, insight))
            .unwrap_or_else(|| MetricSnapshot::empty(campaign_id, period));

        Ok(snapshot)
    }

    async fn update_campaign_budget(
        &self,
        campaign_id: &str,
        daily_budget: i64,
    ) -> Result<(), MetaApiError> {
        let url = format!("{}/{}", self.base_url, campaign_id);

        let response = self
            .client
            .post(&url)
            .query(&[
                ("access_token", self.access_token.as_str()),
                ("daily_budget", daily_budget.to_string().as_str()),
            ])
            .send()
            .await
            .map_err(|e| MetaApiError::RequestFailed(e.to_string()))?;

        let body = Self::parse_body(response).await?;

        if body["success"].as_bool().unwrap_or(false) {
            Ok(())
        } else {
            Err(MetaApiError::RequestFailed(format!(
                "budget update rejected for campaign {campaign_id}"
            )))
        }
    }

    async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: CampaignStatus,
    ) -> Result<(), MetaApiError> {
        let url = format!("{}/{}", self.base_url, campaign_id);

        let response = self
            .client
            .post(&url)
            .query(&[
                ("access_token", self.access_token.as_str()),
                ("status", status.as_api_str()),
            ])
            .send()
            .await
            .map_err(|e| MetaApiError::RequestFailed(e.to_string()))?;

        let body = Self::parse_body(response).await?;

        if body["success"].as_bool().unwrap_or(false) {
            Ok(())
        } else {
            Err(MetaApiError::RequestFailed(format!(
                "status update rejected for campaign {campaign_id}"
            )))
        }
    }
}

// The Graph API reports most numbers as strings; accept either form.
fn num_i64(value: &Value) -> i64 {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0)
}

fn num_f64(value: &Value) -> f64 {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0.0)
}

fn opt_f64(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}
