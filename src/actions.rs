//! Remediation actions: a persisted approval queue and the executor that
//! applies approved changes through the ads API.
//!
//! Lifecycle: `Pending → Approved → Executed | Failed`, or `Pending →
//! Rejected`. Failed actions stay failed until retried manually.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{AutomationConfig, ExecutionPolicy};
use crate::constants::{ACTIONS_DIR, ACTION_HISTORY_FILE, PENDING_ACTIONS_FILE};
use crate::meta::{AdsApi, MetaApiError};
use crate::models::CampaignStatus;
use crate::storage::{self, StorageError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    BudgetChange {
        current_budget: f64,
        new_budget: f64,
    },
    StatusChange {
        status: CampaignStatus,
    },
}

impl ActionKind {
    pub fn describe(&self) -> String {
        match self {
            Self::BudgetChange {
                current_budget,
                new_budget,
            } => format!("daily budget ¥{current_budget:.0} → ¥{new_budget:.0}"),
            Self::StatusChange { status } => format!("set status {}", status.as_api_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
    Failed,
}

/// A change produced by the evaluator, before it enters the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionProposal {
    pub account_id: String,
    pub campaign_id: String,
    pub campaign_name: String,
    pub kind: ActionKind,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub account_id: String,
    pub campaign_id: String,
    pub campaign_name: String,
    pub kind: ActionKind,
    pub reason: String,
    pub status: ActionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reject_reason: Option<String>,
    #[serde(default)]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Action not found: {0}")]
    NotFound(String),
    #[error("Invalid transition: action {id} is {status:?}")]
    InvalidTransition { id: String, status: ActionStatus },
    #[error("Safety check failed: {0}")]
    SafetyCheck(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("API error: {0}")]
    Api(#[from] MetaApiError),
}

/// Approval queue persisted as two JSON files: open actions (pending and
/// approved) and a terminal history.
pub struct ActionQueue {
    pending_path: PathBuf,
    history_path: PathBuf,
    pending: Vec<Action>,
    history: Vec<Action>,
}

impl ActionQueue {
    pub fn load(storage_dir: &Path) -> Result<Self, StorageError> {
        let dir = storage_dir.join(ACTIONS_DIR);
        let pending_path = dir.join(PENDING_ACTIONS_FILE);
        let history_path = dir.join(ACTION_HISTORY_FILE);

        let pending = storage::load_json(&pending_path)?.unwrap_or_default();
        let history = storage::load_json(&history_path)?.unwrap_or_default();

        Ok(Self {
            pending_path,
            history_path,
            pending,
            history,
        })
    }

    pub fn propose(&mut self, proposal: ActionProposal) -> Result<String, ActionError> {
        let id = short_id();
        let action = Action {
            id: id.clone(),
            account_id: proposal.account_id,
            campaign_id: proposal.campaign_id,
            campaign_name: proposal.campaign_name,
            kind: proposal.kind,
            reason: proposal.reason,
            status: ActionStatus::Pending,
            created_at: Utc::now(),
            approved_at: None,
            rejected_at: None,
            reject_reason: None,
            executed_at: None,
            error: None,
        };

        tracing::info!(action = %id, campaign = %action.campaign_name, "action proposed");
        self.pending.push(action);
        self.save_pending()?;
        Ok(id)
    }

    pub fn approve(&mut self, id: &str) -> Result<Action, ActionError> {
        let action = self.open_action(id)?;
        if action.status != ActionStatus::Pending {
            return Err(ActionError::InvalidTransition {
                id: id.to_string(),
                status: action.status,
            });
        }

        action.status = ActionStatus::Approved;
        action.approved_at = Some(Utc::now());
        let approved = action.clone();
        self.save_pending()?;
        tracing::info!(action = %id, "action approved");
        Ok(approved)
    }

    pub fn reject(&mut self, id: &str, reason: &str) -> Result<Action, ActionError> {
        let index = self.open_index(id)?;
        if self.pending[index].status != ActionStatus::Pending {
            return Err(ActionError::InvalidTransition {
                id: id.to_string(),
                status: self.pending[index].status,
            });
        }

        let mut action = self.pending.remove(index);
        action.status = ActionStatus::Rejected;
        action.rejected_at = Some(Utc::now());
        action.reject_reason = Some(reason.to_string());

        self.history.push(action.clone());
        self.save_pending()?;
        self.save_history()?;
        tracing::info!(action = %id, "action rejected");
        Ok(action)
    }

    /// Records the execution outcome of an approved action and moves it to
    /// the history.
    pub fn record_result(
        &mut self,
        id: &str,
        result: Result<(), String>,
    ) -> Result<Action, ActionError> {
        let index = self.open_index(id)?;
        if self.pending[index].status != ActionStatus::Approved {
            return Err(ActionError::InvalidTransition {
                id: id.to_string(),
                status: self.pending[index].status,
            });
        }

        let mut action = self.pending.remove(index);
        action.executed_at = Some(Utc::now());
        match result {
            Ok(()) => {
                action.status = ActionStatus::Executed;
                tracing::info!(action = %id, campaign = %action.campaign_name, "action executed");
            }
            Err(detail) => {
                action.status = ActionStatus::Failed;
                tracing::error!(action = %id, error = %detail, "action execution failed");
                action.error = Some(detail);
            }
        }

        self.history.push(action.clone());
        self.save_pending()?;
        self.save_history()?;
        Ok(action)
    }

    /// Puts a failed action back in the queue as approved. Manual operation;
    /// there is no automatic retry.
    pub fn retry(&mut self, id: &str) -> Result<Action, ActionError> {
        let index = self
            .history
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| ActionError::NotFound(id.to_string()))?;
        if self.history[index].status != ActionStatus::Failed {
            return Err(ActionError::InvalidTransition {
                id: id.to_string(),
                status: self.history[index].status,
            });
        }

        let mut action = self.history.remove(index);
        action.status = ActionStatus::Approved;
        action.approved_at = Some(Utc::now());
        action.executed_at = None;
        action.error = None;

        self.pending.push(action.clone());
        self.save_pending()?;
        self.save_history()?;
        tracing::info!(action = %id, "failed action re-queued");
        Ok(action)
    }

    pub fn open_actions(&self) -> &[Action] {
        &self.pending
    }

    pub fn approved_ids(&self) -> Vec<String> {
        self.pending
            .iter()
            .filter(|a| a.status == ActionStatus::Approved)
            .map(|a| a.id.clone())
            .collect()
    }

    pub fn history(&self, limit: usize) -> &[Action] {
        let start = self.history.len().saturating_sub(limit);
        &self.history[start..]
    }

    fn open_action(&mut self, id: &str) -> Result<&mut Action, ActionError> {
        self.pending
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| ActionError::NotFound(id.to_string()))
    }

    fn open_index(&self, id: &str) -> Result<usize, ActionError> {
        self.pending
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| ActionError::NotFound(id.to_string()))
    }

    fn save_pending(&self) -> Result<(), StorageError> {
        storage::store_json(&self.pending_path, &self.pending)
    }

    fn save_history(&self) -> Result<(), StorageError> {
        storage::store_json(&self.history_path, &self.history)
    }
}

fn short_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

/// Guard rails applied before any budget change goes out.
pub fn safety_check(automation: &AutomationConfig, kind: &ActionKind) -> Result<(), ActionError> {
    if let ActionKind::BudgetChange {
        current_budget,
        new_budget,
    } = kind
    {
        if *new_budget > *current_budget && *current_budget > 0.0 {
            let increase_percent = (new_budget - current_budget) / current_budget * 100.0;
            if increase_percent > automation.max_budget_increase_percent + 1e-9 {
                return Err(ActionError::SafetyCheck(format!(
                    "budget raise of {increase_percent:.0}% exceeds the {:.0}% limit",
                    automation.max_budget_increase_percent
                )));
            }
        }
        if *new_budget > automation.max_daily_budget {
            return Err(ActionError::SafetyCheck(format!(
                "new budget ¥{new_budget:.0} exceeds the ¥{:.0} ceiling",
                automation.max_daily_budget
            )));
        }
    }
    Ok(())
}

/// Feeds evaluator proposals into the queue according to the execution
/// policy. Under `AutoExecute`, proposals passing the safety check are
/// approved immediately; the rest wait for a human.
pub fn enqueue_proposals(
    queue: &mut ActionQueue,
    automation: &AutomationConfig,
    proposals: Vec<ActionProposal>,
) -> Result<Vec<String>, ActionError> {
    if automation.execution_policy == ExecutionPolicy::NotifyOnly {
        return Ok(Vec::new());
    }

    let mut ids = Vec::new();
    for proposal in proposals {
        let safe = safety_check(automation, &proposal.kind);
        let id = queue.propose(proposal)?;

        if automation.execution_policy == ExecutionPolicy::AutoExecute {
            match safe {
                Ok(()) => {
                    queue.approve(&id)?;
                }
                Err(e) => {
                    tracing::warn!(action = %id, error = %e, "left pending for manual approval");
                }
            }
        }
        ids.push(id);
    }
    Ok(ids)
}

/// Applies one approved action through the API.
async fn apply<A: AdsApi + ?Sized>(api: &A, action: &Action) -> Result<(), ActionError> {
    match &action.kind {
        ActionKind::BudgetChange { new_budget, .. } => {
            api.update_campaign_budget(&action.campaign_id, new_budget.round() as i64)
                .await?
        }
        ActionKind::StatusChange { status } => {
            api.update_campaign_status(&action.campaign_id, *status)
                .await?
        }
    }
    Ok(())
}

/// Executes every approved action in the queue, recording each outcome.
/// Returns the actions that reached a terminal state in this pass.
pub async fn execute_approved<A: AdsApi + ?Sized>(
    queue: &mut ActionQueue,
    api: &A,
    automation: &AutomationConfig,
) -> Result<Vec<Action>, ActionError> {
    let mut completed = Vec::new();

    for id in queue.approved_ids() {
        let Some(action) = queue.open_actions().iter().find(|a| a.id == id).cloned() else {
            continue;
        };

        let outcome = match safety_check(automation, &action.kind) {
            Ok(()) => apply(api, &action).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        completed.push(queue.record_result(&id, outcome)?);
    }

    Ok(completed)
}
