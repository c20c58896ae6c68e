mod view;

use anyhow::Context;
use clap::Parser;
use pipeline_sync::{parse_bool_flag, SyncHandle, SyncNotification, SyncRuntime, SyncSettings};
use std::io;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use view::ViewState;

#[derive(Parser, Debug)]
#[command(name = "pipeline-monitor")]
struct Args {
    #[arg(long, default_value = "")]
    host: String,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long, default_value = "")]
    graphql_path: String,
    #[arg(long, default_value = "")]
    internal_api_base: String,
    #[arg(long)]
    realtime_base_port: Option<u16>,
    #[arg(long, default_value = "")]
    realtime_path: String,
    #[arg(long)]
    poll_interval_ms: Option<u64>,
    #[arg(long)]
    request_timeout_ms: Option<u64>,
    #[arg(long)]
    handshake_interval_ms: Option<u64>,
    #[arg(long)]
    refresh_on_push: Option<bool>,
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.debug);
    let settings = load_settings(&args).context("invalid settings")?;
    info!(
        event = "monitor_start",
        handshake_url = %settings.handshake_url().map(|url| url.to_string()).unwrap_or_default(),
        refresh_on_push = settings.refresh_on_push
    );

    let handle = SyncRuntime::connect(settings).context("failed to build control client")?;
    let mut notifications = handle.subscribe();
    let mut last_line = String::new();
    render(&handle, &mut last_line);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            received = notifications.recv() => match received {
                Ok(notification) => {
                    report(&notification);
                    render(&handle, &mut last_line);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(event = "notifications_lagged", skipped);
                    render(&handle, &mut last_line);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    handle.shutdown().await;
    info!(event = "monitor_stop");
    Ok(())
}

/// Flags win over `PIPELINE_*` variables, which win over defaults.
fn load_settings(args: &Args) -> Result<SyncSettings, pipeline_sync::SettingsError> {
    SyncSettings::from_lookup(|key| flag_value(args, key).or_else(|| std::env::var(key).ok()))
}

fn flag_value(args: &Args, key: &str) -> Option<String> {
    match key {
        "PIPELINE_API_HOST" => non_empty(&args.host),
        "PIPELINE_API_PORT" => args.port.map(|port| port.to_string()),
        "PIPELINE_GRAPHQL_PATH" => non_empty(&args.graphql_path),
        "PIPELINE_INTERNAL_API_BASE" => non_empty(&args.internal_api_base),
        "PIPELINE_REALTIME_BASE_PORT" => args.realtime_base_port.map(|port| port.to_string()),
        "PIPELINE_REALTIME_PATH" => non_empty(&args.realtime_path),
        "PIPELINE_POLL_INTERVAL_MS" => args.poll_interval_ms.map(|ms| ms.to_string()),
        "PIPELINE_REQUEST_TIMEOUT_MS" => args.request_timeout_ms.map(|ms| ms.to_string()),
        "PIPELINE_HANDSHAKE_INTERVAL_MS" => args.handshake_interval_ms.map(|ms| ms.to_string()),
        "PIPELINE_REFRESH_ON_PUSH" => args.refresh_on_push.map(|flag| flag.to_string()),
        _ => None,
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let enabled = std::env::var("PIPELINE_LOG_STDOUT")
        .ok()
        .as_deref()
        .and_then(parse_bool_flag)
        .unwrap_or(true);
    if enabled {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::sink)
            .try_init();
    }
}

fn report(notification: &SyncNotification) {
    match notification {
        SyncNotification::HealthChanged { from, to } => {
            debug!(event = "health", from = %from, to = %to);
        }
        SyncNotification::ConfigurationChanged(config) => {
            println!(
                "configuration: build {} pid {} offset {}",
                config.build_version, config.process_id, config.realtime_channel_offset
            );
        }
        SyncNotification::VersionAdvisory(advisory) => {
            println!("advisory: {advisory}");
        }
        SyncNotification::SnapshotReplaced(snapshot) => {
            debug!(
                event = "snapshot",
                projects = snapshot.projects.len(),
                workers = snapshot.workers.len()
            );
        }
        SyncNotification::Push(push) => {
            println!("push #{} {} {}", push.sequence, push.kind, push.payload);
        }
    }
}

fn render(handle: &SyncHandle, last_line: &mut String) {
    let line = ViewState::derive(&handle.status(), &handle.snapshot()).status_line();
    if *last_line != line {
        println!("{line}");
        *last_line = line;
    }
}
