//! ticketwatch CLI: runs the monitors and audits ticket histories offline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use ticketwatch::config::{CallGroup, Config, WatchConfig};
use ticketwatch::engine::{ControlConfig, ControlPlane, RuleEngine, run_cycle};
use ticketwatch::monitor::{
    CallsMonitor, ComplianceMonitor, ConnectivityMonitor, Monitor, UnscheduledMonitor,
};
use ticketwatch::normalize::normalize;
use ticketwatch::notify::{Dispatcher, NotifyChannel, TelegramChannel, WhatsAppChannel};
use ticketwatch::source::{EscalloClient, IxcClient, RawMessage};
use ticketwatch::state::StateStore;
use ticketwatch::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};
use tracing::info;

#[derive(Parser)]
#[command(name = "ticketwatch", about = "Service order and connectivity watchdog")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every enabled monitor until interrupted
    Serve,
    /// Run a single cycle of one monitor, then exit
    RunOnce {
        monitor: MonitorKind,
    },
    /// Replay a saved message history and print its violations
    Replay {
        /// JSON array of raw message records
        file: PathBuf,
        /// Rules file (defaults to RULES_FILE, then built-in defaults)
        #[arg(long)]
        rules: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MonitorKind {
    Compliance,
    Unscheduled,
    Connectivity,
    Calls,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => cmd_serve().await,
        Command::RunOnce { monitor } => cmd_run_once(monitor).await,
        Command::Replay { file, rules } => cmd_replay(&file, rules),
    }
}

fn telemetry(config: &Config) -> anyhow::Result<TelemetryGuard> {
    Ok(init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "ticketwatch".to_string(),
        default_filter: config.log_level.clone(),
    })?)
}

fn telegram(config: &Config) -> anyhow::Result<Arc<dyn NotifyChannel>> {
    Ok(Arc::new(TelegramChannel::new(
        config.telegram_api_url.clone(),
        config.telegram_token.clone(),
        config.telegram_chat_id.clone(),
    )?))
}

fn dispatcher(config: &Config, telegram: Arc<dyn NotifyChannel>) -> Dispatcher {
    let mut channels = vec![telegram];
    if let Some(group) = &config.whatsapp_group {
        channels.push(Arc::new(WhatsAppChannel::new(
            config.whatsapp_url.clone(),
            group.clone(),
        )));
    }
    let dispatcher = Dispatcher::new(channels);
    info!(channels = dispatcher.channel_count(), "notification channels ready");
    dispatcher
}

/// Telegram plus one WhatsApp group per department.
fn calls_dispatcher(config: &Config, telegram: Arc<dyn NotifyChannel>) -> Dispatcher {
    let mut dispatcher = Dispatcher::new(vec![telegram]);
    for group in [CallGroup::Commercial, CallGroup::Demands] {
        if let Some(id) = config.call_group(group) {
            dispatcher = dispatcher.with_route(
                group.as_str(),
                Arc::new(WhatsAppChannel::new(config.whatsapp_url.clone(), id)),
            );
        }
    }
    info!(channels = dispatcher.channel_count(), "call alert channels ready");
    dispatcher
}

/// Build the requested monitors, all sharing one source and dispatcher.
async fn build_monitors(
    config: &Config,
    watch: &WatchConfig,
    only: Option<MonitorKind>,
) -> anyhow::Result<Vec<Box<dyn Monitor>>> {
    let client = Arc::new(IxcClient::new(
        config.ixc_url.clone(),
        config.ixc_token.clone(),
    )?);
    let total = client.check_auth().await?;
    info!(clients = total, "IXC credentials accepted");

    let telegram = telegram(config)?;
    let dispatcher = dispatcher(config, telegram.clone());
    let wanted = |kind: MonitorKind, enabled: bool| match only {
        Some(selected) => selected == kind,
        None => enabled,
    };
    let dir = &config.state_dir;

    let mut monitors: Vec<Box<dyn Monitor>> = Vec::new();
    if wanted(MonitorKind::Compliance, watch.compliance.enabled) {
        monitors.push(Box::new(
            ComplianceMonitor::new(
                watch.compliance.clone(),
                client.clone(),
                dispatcher.clone(),
                StateStore::new(dir.join("compliance.json")),
            )
            .await?,
        ));
    }
    if wanted(MonitorKind::Unscheduled, watch.unscheduled.enabled) {
        monitors.push(Box::new(
            UnscheduledMonitor::new(
                watch.unscheduled.clone(),
                client.clone(),
                dispatcher.clone(),
                StateStore::new(dir.join("unscheduled.json")),
            )
            .await?,
        ));
    }
    if wanted(MonitorKind::Connectivity, watch.connectivity.enabled) {
        monitors.push(Box::new(
            ConnectivityMonitor::new(
                watch.connectivity.clone(),
                client.clone(),
                dispatcher,
                StateStore::new(dir.join("connectivity.json")),
            )
            .await?,
        ));
    }
    if wanted(MonitorKind::Calls, watch.calls.enabled) {
        match (&config.escallo_host, &config.escallo_token) {
            (Some(host), Some(token)) => {
                let pbx = Arc::new(EscalloClient::new(host.clone(), token.clone())?);
                monitors.push(Box::new(
                    CallsMonitor::new(
                        watch.calls.clone(),
                        pbx,
                        client.clone(),
                        calls_dispatcher(config, telegram),
                        StateStore::new(dir.join("calls.json")),
                    )
                    .await?,
                ));
            }
            _ if only.is_some() => {
                anyhow::bail!("ESCALLO_HOST and ESCALLO_TOKEN are required for the calls monitor")
            }
            _ => info!("call log not configured, calls monitor disabled"),
        }
    }
    Ok(monitors)
}

async fn cmd_serve() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let _guard = telemetry(&config)?;
    let watch = WatchConfig::load(config.rules_file.as_deref())?;

    let monitors = build_monitors(&config, &watch, None).await?;
    let control = ControlPlane::new(ControlConfig::default());

    let ctrl = control.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("interrupt received, stopping after current cycles");
        ctrl.shutdown();
    });

    control.run(monitors).await?;
    Ok(())
}

async fn cmd_run_once(kind: MonitorKind) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let _guard = telemetry(&config)?;
    let watch = WatchConfig::load(config.rules_file.as_deref())?;

    for mut monitor in build_monitors(&config, &watch, Some(kind)).await? {
        let report = run_cycle(monitor.as_mut()).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn cmd_replay(file: &Path, rules: Option<PathBuf>) -> anyhow::Result<()> {
    let rules = rules.or_else(|| std::env::var_os("RULES_FILE").map(PathBuf::from));
    let watch = WatchConfig::load(rules.as_deref())?;

    let content = std::fs::read_to_string(file)?;
    let messages: Vec<RawMessage> = serde_json::from_str(&content)?;

    let normalized = normalize(&messages, &watch.compliance.events, None);
    let rule_set = watch.compliance.rule_set();
    let replay = RuleEngine::new(&rule_set).replay(&normalized.events);

    println!(
        "{} event(s), {} dropped, {} violation(s)",
        normalized.events.len(),
        normalized.dropped,
        replay.violations.len()
    );
    for violation in &replay.violations {
        println!(
            "{}  {:<26}  {}",
            violation.timestamp.format("%d/%m/%Y %H:%M"),
            violation.kind,
            violation.description
        );
    }
    println!("---");
    println!("{}", serde_json::to_string_pretty(&replay.state)?);
    Ok(())
}
