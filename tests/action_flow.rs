//! Approval-gated action execution against a mock Graph API.

use meta_ads_monitor::actions::{
    self, ActionKind, ActionProposal, ActionQueue, ActionStatus,
};
use meta_ads_monitor::config::AutomationConfig;
use meta_ads_monitor::meta::MetaAdsClient;
use meta_ads_monitor::models::CampaignStatus;

fn budget_proposal() -> ActionProposal {
    ActionProposal {
        account_id: "act_1".to_string(),
        campaign_id: "c1".to_string(),
        campaign_name: "Followers JP".to_string(),
        kind: ActionKind::BudgetChange {
            current_budget: 5000.0,
            new_budget: 6000.0,
        },
        reason: "CPF on target; scale up".to_string(),
    }
}

fn pause_proposal() -> ActionProposal {
    ActionProposal {
        account_id: "act_1".to_string(),
        campaign_id: "c2".to_string(),
        campaign_name: "Summer Sale".to_string(),
        kind: ActionKind::StatusChange {
            status: CampaignStatus::Paused,
        },
        reason: "ROAS below break-even".to_string(),
    }
}

#[tokio::test]
async fn approved_actions_execute_against_the_api() {
    let mut server = mockito::Server::new_async().await;
    let budget_mock = server
        .mock("POST", mockito::Matcher::Regex("/c1".to_string()))
        .with_status(200)
        .with_body(r#"{"success": true}"#)
        .expect(1)
        .create_async()
        .await;
    let status_mock = server
        .mock("POST", mockito::Matcher::Regex("/c2".to_string()))
        .with_status(200)
        .with_body(r#"{"success": true}"#)
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut queue = ActionQueue::load(dir.path()).unwrap();
    let automation = AutomationConfig::default();

    let budget_id = queue.propose(budget_proposal()).unwrap();
    let pause_id = queue.propose(pause_proposal()).unwrap();
    queue.approve(&budget_id).unwrap();
    queue.approve(&pause_id).unwrap();

    let api = MetaAdsClient::with_base_url("token".to_string(), server.url());
    let completed = actions::execute_approved(&mut queue, &api, &automation)
        .await
        .unwrap();

    assert_eq!(completed.len(), 2);
    assert!(completed
        .iter()
        .all(|a| a.status == ActionStatus::Executed));
    assert!(queue.open_actions().is_empty());

    budget_mock.assert_async().await;
    status_mock.assert_async().await;
}

#[tokio::test]
async fn api_rejection_marks_the_action_failed_with_detail() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", mockito::Matcher::Regex("/c1".to_string()))
        .with_status(400)
        .with_body(
            r#"{"error": {"message": "Insufficient permissions", "type": "GraphMethodException"}}"#,
        )
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut queue = ActionQueue::load(dir.path()).unwrap();
    let automation = AutomationConfig::default();

    let id = queue.propose(budget_proposal()).unwrap();
    queue.approve(&id).unwrap();

    let api = MetaAdsClient::with_base_url("token".to_string(), server.url());
    let completed = actions::execute_approved(&mut queue, &api, &automation)
        .await
        .unwrap();

    assert_eq!(completed[0].status, ActionStatus::Failed);
    let error = completed[0].error.as_deref().unwrap();
    assert!(error.contains("Insufficient permissions"), "got: {error}");

    // the failure is terminal; a second pass does not reach the API again
    let completed = actions::execute_approved(&mut queue, &api, &automation)
        .await
        .unwrap();
    assert!(completed.is_empty());
    assert_eq!(queue.history(10)[0].status, ActionStatus::Failed);
}

#[tokio::test]
async fn queue_state_survives_process_restart_mid_approval() {
    let dir = tempfile::tempdir().unwrap();

    let id = {
        let mut queue = ActionQueue::load(dir.path()).unwrap();
        let id = queue.propose(budget_proposal()).unwrap();
        queue.approve(&id).unwrap();
        id
    };

    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", mockito::Matcher::Regex("/c1".to_string()))
        .with_status(200)
        .with_body(r#"{"success": true}"#)
        .expect(1)
        .create_async()
        .await;

    // a fresh process picks the approved action back up
    let mut queue = ActionQueue::load(dir.path()).unwrap();
    assert_eq!(queue.approved_ids(), vec![id]);

    let api = MetaAdsClient::with_base_url("token".to_string(), server.url());
    let automation = AutomationConfig::default();
    let completed = actions::execute_approved(&mut queue, &api, &automation)
        .await
        .unwrap();
    assert_eq!(completed[0].status, ActionStatus::Executed);
}
