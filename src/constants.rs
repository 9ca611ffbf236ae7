// API Versions
pub const META_API_VERSION: &str = "v21.0";

// API Base URLs
pub const META_BASE_URL: &str = "https://graph.facebook.com";

// Scheduler settings
pub const TICK_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_CHECK_INTERVAL_MINUTES: i64 = 60;
pub const DEFAULT_DAILY_REPORT_HOUR: u32 = 9;
pub const DEFAULT_DAILY_REPORT_MINUTE: u32 = 0;

// Storage file names (relative to the storage directory)
pub const TARGETS_FILE: &str = "campaign_targets.json";
pub const MONITOR_CONFIG_FILE: &str = "monitor_config.json";
pub const RUN_STATE_FILE: &str = "run_state.json";
pub const NOTIFIER_STATE_FILE: &str = "notifier_state.json";
pub const ACTIONS_DIR: &str = "actions";
pub const PENDING_ACTIONS_FILE: &str = "pending_actions.json";
pub const ACTION_HISTORY_FILE: &str = "action_history.json";
pub const PID_FILE: &str = "monitor.pid";
pub const LOG_FILE: &str = "monitor.log";

// Meta API fields
pub const META_CAMPAIGN_FIELDS: &str =
    "id,name,objective,status,effective_status,daily_budget,smart_promotion_type";
pub const META_INSIGHT_FIELDS: &str =
    "impressions,clicks,spend,actions,action_values,cost_per_action_type";
