//! Threshold evaluation: compares fetched metrics against the target
//! registry and turns breaches into alerts, healthy campaigns into scaling
//! proposals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actions::{ActionKind, ActionProposal};
use crate::config::AutomationConfig;
use crate::meta::{AdsApi, MetaApiError};
use crate::models::{
    Alert, Campaign, CampaignObjective, KpiKind, MetricSnapshot, Opportunity, Period, Severity,
    Verdict,
};
use crate::targets::{TargetRegistry, TargetSpec};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub campaign_id: String,
    pub campaign_name: String,
    pub objective: CampaignObjective,
    pub kpi: Option<KpiKind>,
    pub kpi_value: Option<f64>,
    pub verdict: Verdict,
    pub message: String,
}

/// Everything produced by one account check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub account_id: String,
    pub checked_at: DateTime<Utc>,
    pub evaluations: Vec<Evaluation>,
    pub alerts: Vec<Alert>,
    pub opportunities: Vec<Opportunity>,
    pub proposals: Vec<ActionProposal>,
    pub errors: Vec<String>,
}

impl CheckReport {
    fn new(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            checked_at: Utc::now(),
            evaluations: Vec::new(),
            alerts: Vec::new(),
            opportunities: Vec::new(),
            proposals: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Classifies one campaign snapshot against its target spec.
pub fn evaluate_campaign(
    campaign: &Campaign,
    snapshot: &MetricSnapshot,
    spec: &TargetSpec,
    min_daily_spend: f64,
) -> Evaluation {
    let base = |kpi, kpi_value, verdict, message: String| Evaluation {
        campaign_id: campaign.id.clone(),
        campaign_name: campaign.name.clone(),
        objective: campaign.objective,
        kpi,
        kpi_value,
        verdict,
        message,
    };

    let Some(kind) = campaign.objective.primary_kpi() else {
        return base(
            None,
            None,
            Verdict::InsufficientData,
            "no KPI mapped for this objective".to_string(),
        );
    };

    // Campaigns barely spending produce noise, not signal.
    if snapshot.spend < min_daily_spend {
        return base(
            Some(kind),
            None,
            Verdict::InsufficientData,
            format!(
                "skipped: spend ¥{:.0} below the ¥{:.0} floor",
                snapshot.spend, min_daily_spend
            ),
        );
    }

    let Some(value) = snapshot.kpi(kind) else {
        return base(
            Some(kind),
            None,
            Verdict::InsufficientData,
            format!("{} undefined: no results recorded yet", kind.label()),
        );
    };

    let target = spec.target_for(kind);
    let verdict = classify(kind, value, target, spec.thresholds_for(kind));
    let message = describe(kind, value, target, verdict);

    base(Some(kind), Some(value), verdict, message)
}

fn classify(
    kind: KpiKind,
    value: f64,
    target: Option<f64>,
    thresholds: Option<(f64, f64)>,
) -> Verdict {
    if let Some((warning, critical)) = thresholds {
        if kind.higher_is_worse() {
            if value >= critical {
                return Verdict::Critical;
            }
            if value >= warning {
                return Verdict::Warning;
            }
        } else {
            if value <= critical {
                return Verdict::Critical;
            }
            if value <= warning {
                return Verdict::Warning;
            }
        }
    }

    if let Some(target) = target {
        let beats_target = if kind.higher_is_worse() {
            value <= target
        } else {
            value >= target
        };
        if beats_target {
            return Verdict::Opportunity;
        }
    }

    Verdict::Normal
}

fn describe(kind: KpiKind, value: f64, target: Option<f64>, verdict: Verdict) -> String {
    let shown = kind.format_value(value);
    let target_note = target
        .map(|t| format!(" (target: {})", kind.format_value(t)))
        .unwrap_or_default();

    match verdict {
        Verdict::Critical => format!("{} critical: {}{}", kind.label(), shown, target_note),
        Verdict::Warning => format!("{} off target: {}{}", kind.label(), shown, target_note),
        Verdict::Opportunity => format!("{} on target: {}{}", kind.label(), shown, target_note),
        _ => format!("{}: {}{}", kind.label(), shown, target_note),
    }
}

fn alert_from(evaluation: &Evaluation, now: DateTime<Utc>) -> Alert {
    let severity = match evaluation.verdict {
        Verdict::Critical => Severity::Critical,
        _ => Severity::Warning,
    };

    Alert {
        campaign_id: evaluation.campaign_id.clone(),
        campaign_name: evaluation.campaign_name.clone(),
        objective: evaluation.objective,
        severity,
        message: evaluation.message.clone(),
        timestamp: now,
        dedup_key: Alert::dedup_key_for(&evaluation.campaign_id, severity),
    }
}

/// Suggests a 20% budget raise for a campaign beating its target.
fn scaling_proposal(
    account_id: &str,
    campaign: &Campaign,
    evaluation: &Evaluation,
) -> Option<ActionProposal> {
    let budget = campaign.daily_budget?;
    if budget <= 0.0 {
        return None;
    }

    let new_budget = (budget * 1.2).round();
    Some(ActionProposal {
        account_id: account_id.to_string(),
        campaign_id: campaign.id.clone(),
        campaign_name: campaign.name.clone(),
        kind: ActionKind::BudgetChange {
            current_budget: budget,
            new_budget,
        },
        reason: format!(
            "{}; raise daily budget ¥{:.0} → ¥{:.0} (+20%)",
            evaluation.message, budget, new_budget
        ),
    })
}

/// Runs one evaluation pass over an account. A failed insights fetch for one
/// campaign is recorded and the rest of the account still gets evaluated;
/// only the campaign listing itself is fatal.
pub async fn run_check<A: AdsApi + ?Sized>(
    api: &A,
    registry: &TargetRegistry,
    automation: &AutomationConfig,
    account_id: &str,
) -> Result<CheckReport, MetaApiError> {
    let campaigns = api.get_campaigns(account_id).await?;
    let mut report = CheckReport::new(account_id);
    let now = Utc::now();

    for campaign in &campaigns {
        let snapshot = match api.get_campaign_insights(&campaign.id, Period::Today).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(
                    campaign = %campaign.id,
                    error = %e,
                    "insights fetch failed, skipping campaign"
                );
                report.errors.push(format!("{}: {e}", campaign.name));
                continue;
            }
        };

        let spec = registry.for_campaign(&campaign.id, campaign.objective.target_class());
        let evaluation =
            evaluate_campaign(campaign, &snapshot, &spec, automation.min_daily_spend);

        match evaluation.verdict {
            Verdict::Critical | Verdict::Warning => {
                report.alerts.push(alert_from(&evaluation, now));
            }
            Verdict::Opportunity => {
                let proposal = scaling_proposal(account_id, campaign, &evaluation);
                report.opportunities.push(Opportunity {
                    campaign_id: campaign.id.clone(),
                    campaign_name: campaign.name.clone(),
                    message: evaluation.message.clone(),
                    suggested_action: proposal.as_ref().map(|p| p.reason.clone()),
                });
                report.proposals.extend(proposal);
            }
            _ => {}
        }

        report.evaluations.push(evaluation);
    }

    Ok(report)
}
