use anyhow::bail;
use clap::{CommandFactory, Parser};
use std::path::Path;
use tracing_subscriber::EnvFilter;

use meta_ads_monitor::config::{Config, MonitorConfig};
use meta_ads_monitor::constants::LOG_FILE;
use meta_ads_monitor::meta::MetaAdsClient;
use meta_ads_monitor::scheduler::Scheduler;
use meta_ads_monitor::slack::SlackNotifier;

/// Meta Ads performance monitor
#[derive(Parser)]
#[command(name = "meta-ads-monitor", version, about)]
struct Cli {
    /// Run one evaluation cycle now
    #[arg(long)]
    check: bool,

    /// Send the daily summary now
    #[arg(long)]
    report: bool,

    /// Send a test message to the Slack webhook
    #[arg(long = "test-slack")]
    test_slack: bool,

    /// Run the scheduler loop
    #[arg(long)]
    start: bool,

    /// Account ids to monitor (overrides configuration)
    #[arg(long, num_args = 1..)]
    accounts: Vec<String>,
}

/// Daemon mode logs to a file in the storage directory; one-shot commands
/// log to stderr.
fn init_tracing(
    daemon: bool,
    storage_dir: &Path,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if daemon {
        let appender = tracing_appender::rolling::never(storage_dir, LOG_FILE);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        None
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if !(cli.check || cli.report || cli.test_slack || cli.start) {
        Cli::command().print_help()?;
        return Ok(());
    }

    let config = Config::from_env()?;
    let monitor_config = MonitorConfig::load(&config.storage_dir)?;
    let _log_guard = init_tracing(cli.start, &config.storage_dir);

    let notifier = config.slack_webhook_url.clone().map(SlackNotifier::new);

    if cli.test_slack {
        let Some(notifier) = &notifier else {
            bail!("SLACK_WEBHOOK_URL is not configured");
        };
        match notifier.test_connection().await {
            Ok(()) => println!("✅ Slack connection succeeded!"),
            Err(e) => {
                println!("❌ Slack connection failed: {e}");
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    // accounts: command line > monitor configuration > environment
    let account_ids = if !cli.accounts.is_empty() {
        cli.accounts.clone()
    } else {
        let configured = monitor_config.enabled_account_ids();
        if !configured.is_empty() {
            configured
        } else {
            config.account_ids.clone()
        }
    };

    if account_ids.is_empty() {
        bail!(
            "no accounts to monitor; pass --accounts, enable accounts in \
             monitor_config.json, or set META_AD_ACCOUNT_IDS"
        );
    }

    let schedule = monitor_config.schedule.clone();
    let api = MetaAdsClient::new(config.access_token.clone(), &config.api_version);
    let mut scheduler = Scheduler::new(
        api,
        notifier,
        monitor_config,
        account_ids,
        config.storage_dir.clone(),
    )?;

    if cli.check {
        let report = scheduler.manual_check().await?;

        println!("\n{}", report.summary.message);
        println!("Alerts: {}", report.summary.total_alerts);
        println!("Opportunities: {}", report.summary.total_opportunities);

        if !report.alerts.is_empty() {
            println!("\n🚨 Alerts:");
            for alert in &report.alerts {
                println!(
                    "  {} {}: {}",
                    alert.severity.emoji(),
                    alert.campaign_name,
                    alert.message
                );
            }
        }

        if !report.opportunities.is_empty() {
            println!("\n🚀 Opportunities:");
            for opportunity in &report.opportunities {
                println!(
                    "  🟢 {}: {}",
                    opportunity.campaign_name, opportunity.message
                );
            }
        }
    } else if cli.report {
        match scheduler.send_daily_now().await {
            Ok(()) => println!("✅ Daily report sent!"),
            Err(e) => {
                println!("❌ Daily report failed: {e}");
                std::process::exit(1);
            }
        }
    } else if cli.start {
        println!("🤖 Meta Ads Monitor starting");
        println!(
            "  - daily report: {:02}:{:02}",
            schedule.daily_report_hour, schedule.daily_report_minute
        );
        println!(
            "  - check interval: every {} min",
            schedule.check_interval_minutes
        );
        println!("  - Ctrl+C to stop");

        scheduler.run().await;
    }

    Ok(())
}
