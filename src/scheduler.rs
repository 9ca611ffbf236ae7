//! Timer-driven monitoring loop. Wakes once a minute, runs the hourly
//! evaluation when the check interval has elapsed and the daily report once
//! the local report time has passed. Run timestamps persist so a restart
//! neither duplicates nor skips a cycle.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::time::{self, Duration};

use crate::actions::{self, ActionError, ActionProposal, ActionQueue};
use crate::config::{ExecutionPolicy, MonitorConfig};
use crate::constants::{RUN_STATE_FILE, TICK_INTERVAL_SECS};
use crate::evaluator::{self, CheckReport};
use crate::meta::AdsApi;
use crate::models::{
    change_percent, Alert, CampaignDigest, DailyReport, Opportunity, Period, Summary,
};
use crate::notifier::AlertGate;
use crate::slack::{SlackError, SlackNotifier};
use crate::storage::{self, StorageError};
use crate::targets::TargetRegistry;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunState {
    pub last_hourly_run: Option<DateTime<Utc>>,
    pub last_daily_run: Option<NaiveDate>,
}

impl RunState {
    pub fn load(storage_dir: &Path) -> Result<Self, StorageError> {
        let path = storage_dir.join(RUN_STATE_FILE);
        Ok(storage::load_json(&path)?.unwrap_or_default())
    }

    pub fn save(&self, storage_dir: &Path) -> Result<(), StorageError> {
        storage::store_json(&storage_dir.join(RUN_STATE_FILE), self)
    }
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error("All account checks failed: {0}")]
    AllAccountsFailed(String),
    #[error("Notification error: {0}")]
    Slack(#[from] SlackError),
}

/// Results of one evaluation cycle across every monitored account.
#[derive(Debug, Clone)]
pub struct AggregateReport {
    pub reports: Vec<CheckReport>,
    pub alerts: Vec<Alert>,
    pub opportunities: Vec<Opportunity>,
    pub proposals: Vec<ActionProposal>,
    pub summary: Summary,
}

pub struct Scheduler<A: AdsApi> {
    api: A,
    notifier: Option<SlackNotifier>,
    config: MonitorConfig,
    account_ids: Vec<String>,
    storage_dir: PathBuf,
    state: RunState,
}

impl<A: AdsApi> Scheduler<A> {
    pub fn new(
        api: A,
        notifier: Option<SlackNotifier>,
        config: MonitorConfig,
        account_ids: Vec<String>,
        storage_dir: PathBuf,
    ) -> Result<Self, StorageError> {
        let state = RunState::load(&storage_dir)?;
        Ok(Self {
            api,
            notifier,
            config,
            account_ids,
            storage_dir,
            state,
        })
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    fn hourly_due(&self, now: DateTime<Utc>) -> bool {
        match self.state.last_hourly_run {
            None => true,
            Some(last) => {
                now - last
                    >= chrono::Duration::minutes(self.config.schedule.check_interval_minutes)
            }
        }
    }

    fn daily_due(&self, local_now: NaiveDateTime) -> bool {
        let schedule = &self.config.schedule;
        let past_report_time = (local_now.hour(), local_now.minute())
            >= (schedule.daily_report_hour, schedule.daily_report_minute);
        past_report_time && self.state.last_daily_run != Some(local_now.date())
    }

    /// One evaluation pass over every account. An account whose check fails
    /// is logged and skipped; the cycle only errors when no account could be
    /// checked at all.
    pub async fn check_now(&self) -> Result<AggregateReport, SchedulerError> {
        // Reloaded every cycle so dashboard edits take effect without a restart.
        let registry = TargetRegistry::load(&self.storage_dir)?;
        let automation = &self.config.automation;

        let mut reports = Vec::new();
        let mut failures = Vec::new();

        for account_id in &self.account_ids {
            match evaluator::run_check(&self.api, &registry, automation, account_id).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(account = %account_id, error = %e, "account check failed");
                    failures.push(format!("{account_id}: {e}"));
                }
            }
        }

        if reports.is_empty() && !failures.is_empty() {
            return Err(SchedulerError::AllAccountsFailed(failures.join("; ")));
        }

        let alerts: Vec<Alert> = reports.iter().flat_map(|r| r.alerts.clone()).collect();
        let opportunities: Vec<Opportunity> = reports
            .iter()
            .flat_map(|r| r.opportunities.clone())
            .collect();
        let proposals: Vec<ActionProposal> =
            reports.iter().flat_map(|r| r.proposals.clone()).collect();
        let summary = Summary::build(&alerts, &opportunities, reports.len());

        Ok(AggregateReport {
            reports,
            alerts,
            opportunities,
            proposals,
            summary,
        })
    }

    async fn run_hourly(&self, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        tracing::info!("hourly evaluation starting");
        let report = self.check_now().await?;

        let mut queue = ActionQueue::load(&self.storage_dir)?;
        actions::enqueue_proposals(
            &mut queue,
            &self.config.automation,
            report.proposals.clone(),
        )?;

        let completed =
            if self.config.automation.execution_policy == ExecutionPolicy::AutoExecute {
                actions::execute_approved(&mut queue, &self.api, &self.config.automation).await?
            } else {
                Vec::new()
            };

        if let Some(notifier) = &self.notifier {
            if self.config.notifications.send_hourly_alerts {
                let mut gate =
                    AlertGate::load(&self.storage_dir, self.config.notifications.clone())?;
                let passed = gate.filter(&report.alerts, now);

                if !passed.is_empty() {
                    let batch: Vec<Alert> = passed.iter().map(|a| (*a).clone()).collect();
                    match notifier.send_hourly_summary(&batch).await {
                        Ok(()) => gate.mark_all_sent(&passed, now)?,
                        Err(e) => {
                            // Not retried this cycle; the next tick's fresh
                            // alerts go through the gate again.
                            tracing::error!(error = %e, "alert delivery failed");
                        }
                    }
                } else if !report.alerts.is_empty() {
                    tracing::info!(
                        suppressed = report.alerts.len(),
                        "alerts held back by threshold or cool-down"
                    );
                }
            }

            for action in &completed {
                if let Err(e) = notifier.send_action_result(action).await {
                    tracing::error!(error = %e, "action result notification failed");
                }
            }
        }

        tracing::info!(
            alerts = report.alerts.len(),
            opportunities = report.opportunities.len(),
            executed = completed.len(),
            "hourly evaluation finished"
        );
        Ok(())
    }

    /// Builds the daily summary: the current check plus yesterday-vs-7-day
    /// digests per campaign.
    pub async fn build_daily_report(&self) -> Result<DailyReport, SchedulerError> {
        let check = self.check_now().await?;
        let mut digests = Vec::new();

        for account_id in &self.account_ids {
            let campaigns = match self.api.get_campaigns(account_id).await {
                Ok(campaigns) => campaigns,
                Err(e) => {
                    tracing::warn!(account = %account_id, error = %e, "campaign listing failed for digest");
                    continue;
                }
            };

            for campaign in campaigns {
                let yesterday = match self
                    .api
                    .get_campaign_insights(&campaign.id, Period::Yesterday)
                    .await
                {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        tracing::warn!(campaign = %campaign.id, error = %e, "digest fetch failed");
                        continue;
                    }
                };
                let week = self
                    .api
                    .get_campaign_insights(&campaign.id, Period::Last7d)
                    .await
                    .ok()
                    .map(|s| s.daily_average());

                let kpi = campaign.objective.primary_kpi();
                let kpi_yesterday = kpi.and_then(|k| yesterday.kpi(k));
                let kpi_avg_7d = kpi.and_then(|k| week.as_ref().and_then(|w| w.kpi(k)));
                let change = match (kpi_yesterday, kpi_avg_7d) {
                    (Some(current), Some(previous)) => change_percent(current, previous),
                    _ => None,
                };

                digests.push(CampaignDigest {
                    campaign_id: campaign.id.clone(),
                    campaign_name: campaign.name.clone(),
                    objective: campaign.objective,
                    kpi,
                    kpi_yesterday,
                    kpi_avg_7d,
                    spend_yesterday: yesterday.spend,
                    change_percent: change,
                });
            }
        }

        Ok(DailyReport {
            date: Local::now().date_naive(),
            summary: check.summary,
            alerts: check.alerts,
            opportunities: check.opportunities,
            digests,
        })
    }

    /// One evaluation cycle on demand, with critical alerts pushed through
    /// the webhook immediately (still subject to the dedup gate).
    pub async fn manual_check(&self) -> Result<AggregateReport, SchedulerError> {
        let report = self.check_now().await?;

        if let Some(notifier) = &self.notifier {
            let now = Utc::now();
            let mut gate = AlertGate::load(&self.storage_dir, self.config.notifications.clone())?;
            for alert in &report.alerts {
                if alert.severity == crate::models::Severity::Critical
                    && gate.should_send(alert, now)
                {
                    match notifier.send_alert(alert).await {
                        Ok(()) => gate.mark_sent(alert, now)?,
                        Err(e) => tracing::error!(error = %e, "alert delivery failed"),
                    }
                }
            }
        }

        Ok(report)
    }

    /// Builds and sends the daily report immediately, propagating delivery
    /// failures to the caller.
    pub async fn send_daily_now(&self) -> Result<(), SchedulerError> {
        let report = self.build_daily_report().await?;
        if let Some(notifier) = &self.notifier {
            notifier.send_daily_report(&report).await?;
        }
        Ok(())
    }

    async fn run_daily(&self) -> Result<(), SchedulerError> {
        tracing::info!("daily report starting");
        let report = self.build_daily_report().await?;

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.send_daily_report(&report).await {
                tracing::error!(error = %e, "daily report delivery failed");
            }
        }
        Ok(())
    }

    pub async fn tick(&mut self) {
        self.tick_at(Utc::now(), Local::now().naive_local()).await;
    }

    /// One scheduler step at an explicit time. Run state only advances after
    /// a successful pass, so a transient fetch failure is retried on the
    /// next tick instead of being skipped.
    pub async fn tick_at(&mut self, now: DateTime<Utc>, local_now: NaiveDateTime) {
        if self.hourly_due(now) {
            match self.run_hourly(now).await {
                Ok(()) => {
                    self.state.last_hourly_run = Some(now);
                    if let Err(e) = self.state.save(&self.storage_dir) {
                        tracing::error!(error = %e, "failed to persist run state");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "hourly evaluation failed; retrying next cycle");
                }
            }
        }

        if self.daily_due(local_now) {
            let outcome = if self.config.notifications.send_daily_report {
                self.run_daily().await
            } else {
                tracing::info!("daily report disabled; skipping send");
                Ok(())
            };

            match outcome {
                Ok(()) => {
                    self.state.last_daily_run = Some(local_now.date());
                    if let Err(e) = self.state.save(&self.storage_dir) {
                        tracing::error!(error = %e, "failed to persist run state");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "daily report failed; retrying next cycle");
                }
            }
        }
    }

    pub async fn run(&mut self) {
        tracing::info!(
            accounts = self.account_ids.len(),
            check_interval_minutes = self.config.schedule.check_interval_minutes,
            report_hour = self.config.schedule.daily_report_hour,
            "scheduler started"
        );

        loop {
            self.tick().await;
            time::sleep(Duration::from_secs(TICK_INTERVAL_SECS)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::MetaApiError;
    use crate::models::{Campaign, CampaignObjective, CampaignStatus, MetricSnapshot};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeApi {
        campaign_calls: AtomicUsize,
        fail: bool,
    }

    impl FakeApi {
        fn new() -> Self {
            Self {
                campaign_calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                campaign_calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn calls(&self) -> usize {
            self.campaign_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AdsApi for FakeApi {
        async fn get_campaigns(&self, _account_id: &str) -> Result<Vec<Campaign>, MetaApiError> {
            self.campaign_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MetaApiError::RequestFailed("connection reset".to_string()));
            }
            Ok(vec![Campaign {
                id: "c1".to_string(),
                name: "Followers JP".to_string(),
                objective: CampaignObjective::Traffic,
                status: "ACTIVE".to_string(),
                daily_budget: Some(5000.0),
            }])
        }

        async fn get_campaign_insights(
            &self,
            campaign_id: &str,
            period: Period,
        ) -> Result<MetricSnapshot, MetaApiError> {
            Ok(MetricSnapshot {
                spend: 5500.0,
                follows: 100,
                clicks: 200,
                impressions: 20_000,
                ..MetricSnapshot::empty(campaign_id, period)
            })
        }

        async fn update_campaign_budget(
            &self,
            _campaign_id: &str,
            _daily_budget: i64,
        ) -> Result<(), MetaApiError> {
            Ok(())
        }

        async fn update_campaign_status(
            &self,
            _campaign_id: &str,
            _status: CampaignStatus,
        ) -> Result<(), MetaApiError> {
            Ok(())
        }
    }

    fn scheduler_at(dir: &Path, api: FakeApi) -> Scheduler<FakeApi> {
        Scheduler::new(
            api,
            None,
            MonitorConfig::default(),
            vec!["act_1".to_string()],
            dir.to_path_buf(),
        )
        .unwrap()
    }

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, h, m, 0).unwrap()
    }

    fn local(h: u32, m: u32) -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2025, 6, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn hourly_run_is_idempotent_within_the_interval() {
        let dir = tempfile::tempdir().unwrap();
        let mut scheduler = scheduler_at(dir.path(), FakeApi::new());

        scheduler.tick_at(utc(3, 0), local(3, 0)).await;
        assert_eq!(scheduler.api.calls(), 1);

        // repeated ticks inside the same minute and the same hour do nothing
        scheduler.tick_at(utc(3, 0), local(3, 0)).await;
        scheduler.tick_at(utc(3, 30), local(3, 30)).await;
        assert_eq!(scheduler.api.calls(), 1);

        // the next interval triggers again
        scheduler.tick_at(utc(4, 0), local(4, 0)).await;
        assert_eq!(scheduler.api.calls(), 2);
    }

    #[tokio::test]
    async fn run_state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();

        {
            let mut scheduler = scheduler_at(dir.path(), FakeApi::new());
            scheduler.tick_at(utc(3, 0), local(3, 0)).await;
            assert_eq!(scheduler.api.calls(), 1);
        }

        // a fresh process within the hour does not re-run the evaluation
        let mut scheduler = scheduler_at(dir.path(), FakeApi::new());
        scheduler.tick_at(utc(3, 20), local(3, 20)).await;
        assert_eq!(scheduler.api.calls(), 0);

        // but does once the interval has elapsed
        scheduler.tick_at(utc(4, 5), local(4, 5)).await;
        assert_eq!(scheduler.api.calls(), 1);
    }

    #[tokio::test]
    async fn transient_failure_does_not_advance_run_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut scheduler = scheduler_at(dir.path(), FakeApi::failing());

        scheduler.tick_at(utc(3, 0), local(3, 0)).await;
        assert!(scheduler.state().last_hourly_run.is_none());

        // the very next tick retries instead of waiting a full interval
        scheduler.tick_at(utc(3, 1), local(3, 1)).await;
        assert_eq!(scheduler.api.calls(), 2);
    }

    #[tokio::test]
    async fn daily_report_fires_once_after_report_time() {
        let dir = tempfile::tempdir().unwrap();
        let mut scheduler = scheduler_at(dir.path(), FakeApi::new());
        // keep the webhook out of it; only the run state matters here
        scheduler.config.notifications.send_daily_report = false;

        // before 09:00 local: not due
        scheduler.tick_at(utc(8, 0), local(8, 0)).await;
        assert!(scheduler.state().last_daily_run.is_none());

        // after 09:00: due exactly once
        scheduler.tick_at(utc(9, 1), local(9, 1)).await;
        assert_eq!(scheduler.state().last_daily_run, Some(local(9, 1).date()));

        let before = scheduler.api.calls();
        scheduler.tick_at(utc(10, 30), local(10, 30)).await;
        assert_eq!(scheduler.state().last_daily_run, Some(local(9, 1).date()));
        // the 10:30 tick ran the hourly check only, not a second report
        assert_eq!(scheduler.api.calls(), before + 1);
    }

    #[tokio::test]
    async fn check_now_aggregates_alert_counts() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_at(dir.path(), FakeApi::new());

        let report = scheduler.check_now().await.unwrap();
        assert_eq!(report.summary.accounts_checked, 1);
        // CPF 55 against the default 50 target: between target and warning
        assert!(report.alerts.is_empty());
    }
}
