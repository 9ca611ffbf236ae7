use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Campaign objectives as reported by the Meta API, collapsed to the classes
/// the monitor cares about. ASC campaigns are flagged through
/// `smart_promotion_type` rather than the objective string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignObjective {
    Traffic,
    Engagement,
    Conversions,
    CatalogSales,
    Sales,
    AdvantageShopping,
    Reach,
    Awareness,
    Unknown,
}

impl CampaignObjective {
    pub fn from_api(objective: &str, smart_promotion_type: Option<&str>) -> Self {
        if smart_promotion_type == Some("ADVANTAGE_PLUS_SHOPPING") {
            return Self::AdvantageShopping;
        }

        match objective {
            "LINK_CLICKS" | "OUTCOME_TRAFFIC" => Self::Traffic,
            "POST_ENGAGEMENT" | "OUTCOME_ENGAGEMENT" => Self::Engagement,
            "CONVERSIONS" | "OUTCOME_LEADS" => Self::Conversions,
            "PRODUCT_CATALOG_SALES" => Self::CatalogSales,
            "OUTCOME_SALES" => Self::Sales,
            "REACH" => Self::Reach,
            "BRAND_AWARENESS" | "OUTCOME_AWARENESS" => Self::Awareness,
            _ => Self::Unknown,
        }
    }

    /// The KPI evaluated against targets for this objective. Traffic and
    /// engagement campaigns are judged on follow cost only; conversion
    /// metrics are meaningless for them.
    pub fn primary_kpi(&self) -> Option<KpiKind> {
        match self {
            Self::Traffic | Self::Engagement => Some(KpiKind::Cpf),
            Self::Conversions => Some(KpiKind::Cpa),
            Self::CatalogSales | Self::Sales | Self::AdvantageShopping => Some(KpiKind::Roas),
            Self::Reach | Self::Awareness => Some(KpiKind::Cpm),
            Self::Unknown => None,
        }
    }

    /// Which default target block applies when a campaign has no override.
    pub fn target_class(&self) -> TargetClass {
        match self {
            Self::Traffic | Self::Engagement => TargetClass::Traffic,
            _ => TargetClass::Sales,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Traffic => "Traffic / Followers",
            Self::Engagement => "Engagement / Followers",
            Self::Conversions => "Conversions",
            Self::CatalogSales => "Catalog Sales",
            Self::Sales => "Sales",
            Self::AdvantageShopping => "Advantage+ Shopping (ASC)",
            Self::Reach => "Reach",
            Self::Awareness => "Brand Awareness",
            Self::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetClass {
    Traffic,
    Sales,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiKind {
    Cpf,
    Cpa,
    Roas,
    Cpm,
}

impl KpiKind {
    /// ROAS is the only KPI where a higher value is better.
    pub fn higher_is_worse(&self) -> bool {
        !matches!(self, Self::Roas)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Cpf => "CPF",
            Self::Cpa => "CPA",
            Self::Roas => "ROAS",
            Self::Cpm => "CPM",
        }
    }

    pub fn format_value(&self, value: f64) -> String {
        match self {
            Self::Roas => format!("{value:.2}x"),
            _ => format!("¥{value:.0}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Active,
    Paused,
}

impl CampaignStatus {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Paused => "PAUSED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub objective: CampaignObjective,
    pub status: String,
    pub daily_budget: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Today,
    Yesterday,
    Last7d,
    Last30d,
}

impl Period {
    pub fn date_preset(&self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Yesterday => "yesterday",
            Self::Last7d => "last_7d",
            Self::Last30d => "last_30d",
        }
    }

    /// Days covered by the preset, used for daily averaging.
    pub fn days(&self) -> i64 {
        match self {
            Self::Today | Self::Yesterday => 1,
            Self::Last7d => 7,
            Self::Last30d => 30,
        }
    }
}

/// One normalized insights row for a campaign and period. Immutable once
/// fetched; recreated on every poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub campaign_id: String,
    pub period: Period,
    pub impressions: i64,
    pub clicks: i64,
    pub spend: f64,
    pub follows: i64,
    pub conversions: i64,
    pub conversion_value: f64,
    pub reported_cpf: Option<f64>,
    pub reported_cpa: Option<f64>,
}

impl MetricSnapshot {
    pub fn empty(campaign_id: &str, period: Period) -> Self {
        Self {
            campaign_id: campaign_id.to_string(),
            period,
            impressions: 0,
            clicks: 0,
            spend: 0.0,
            follows: 0,
            conversions: 0,
            conversion_value: 0.0,
            reported_cpf: None,
            reported_cpa: None,
        }
    }

    /// Computes the requested KPI, or `None` when its denominator is zero and
    /// the value is undefined.
    pub fn kpi(&self, kind: KpiKind) -> Option<f64> {
        match kind {
            KpiKind::Cpf => self
                .reported_cpf
                .or_else(|| Self::ratio(self.spend, self.follows)),
            KpiKind::Cpa => self
                .reported_cpa
                .or_else(|| Self::ratio(self.spend, self.conversions)),
            KpiKind::Roas => {
                if self.spend > 0.0 && self.conversion_value > 0.0 {
                    Some(self.conversion_value / self.spend)
                } else {
                    None
                }
            }
            KpiKind::Cpm => {
                if self.impressions > 0 {
                    Some(self.spend / self.impressions as f64 * 1000.0)
                } else {
                    None
                }
            }
        }
    }

    pub fn ctr(&self) -> Option<f64> {
        if self.impressions > 0 {
            Some(self.clicks as f64 / self.impressions as f64 * 100.0)
        } else {
            None
        }
    }

    /// Divides the accumulated counters down to a per-day view. Ratios like
    /// CPF/CPA survive unchanged since both sides scale together.
    pub fn daily_average(&self) -> MetricSnapshot {
        let days = self.period.days();
        if days <= 1 {
            return self.clone();
        }

        let d = days as f64;
        MetricSnapshot {
            campaign_id: self.campaign_id.clone(),
            period: self.period,
            impressions: self.impressions / days,
            clicks: self.clicks / days,
            spend: self.spend / d,
            follows: self.follows / days,
            conversions: self.conversions / days,
            conversion_value: self.conversion_value / d,
            reported_cpf: self.reported_cpf,
            reported_cpa: self.reported_cpa,
        }
    }

    fn ratio(spend: f64, results: i64) -> Option<f64> {
        if results > 0 && spend > 0.0 {
            Some(spend / results as f64)
        } else {
            None
        }
    }
}

/// Alert severity, ordered so `Normal < Warning < Critical` works as a
/// notification threshold.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Normal => "🟢",
            Self::Warning => "🟡",
            Self::Critical => "🔴",
        }
    }
}

/// Outcome of evaluating one campaign against its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    InsufficientData,
    Normal,
    Opportunity,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub campaign_id: String,
    pub campaign_name: String,
    pub objective: CampaignObjective,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub dedup_key: String,
}

impl Alert {
    pub fn dedup_key_for(campaign_id: &str, severity: Severity) -> String {
        format!("{campaign_id}:{}", severity.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub campaign_id: String,
    pub campaign_name: String,
    pub message: String,
    pub suggested_action: Option<String>,
}

/// Roll-up across everything checked in one cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub status: Severity,
    pub message: String,
    pub total_alerts: usize,
    pub critical_alerts: usize,
    pub total_opportunities: usize,
    pub accounts_checked: usize,
}

impl Summary {
    pub fn build(
        alerts: &[Alert],
        opportunities: &[Opportunity],
        accounts_checked: usize,
    ) -> Self {
        let critical_alerts = alerts
            .iter()
            .filter(|a| a.severity == Severity::Critical)
            .count();
        let total_alerts = alerts.len();
        let total_opportunities = opportunities.len();

        let (status, message) = if critical_alerts > 0 {
            (
                Severity::Critical,
                format!("🔴 Action required: {critical_alerts} critical alert(s)"),
            )
        } else if total_alerts > 0 {
            (
                Severity::Warning,
                format!("🟡 Needs review: {total_alerts} alert(s)"),
            )
        } else if total_opportunities > 0 {
            (
                Severity::Normal,
                format!("🟢 Scaling opportunity: {total_opportunities} campaign(s)"),
            )
        } else {
            (Severity::Normal, "✅ All campaigns healthy".to_string())
        };

        Self {
            status,
            message,
            total_alerts,
            critical_alerts,
            total_opportunities,
            accounts_checked,
        }
    }
}

/// Per-campaign line of the daily summary report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignDigest {
    pub campaign_id: String,
    pub campaign_name: String,
    pub objective: CampaignObjective,
    pub kpi: Option<KpiKind>,
    pub kpi_yesterday: Option<f64>,
    pub kpi_avg_7d: Option<f64>,
    pub spend_yesterday: f64,
    pub change_percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub summary: Summary,
    pub alerts: Vec<Alert>,
    pub opportunities: Vec<Opportunity>,
    pub digests: Vec<CampaignDigest>,
}

pub fn change_percent(current: f64, previous: f64) -> Option<f64> {
    if previous > 0.0 {
        Some((current - previous) / previous * 100.0)
    } else {
        None
    }
}
