//! Checkpoint - Automated periodic check-in runner
//!
//! CLI entry point for the Checkpoint orchestrator.

// Allow multiple crate versions from dependencies (can't easily control)
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use checkpoint::cli::CycleDisplay;
use checkpoint::client::HttpCheckinClient;
use checkpoint::cycle::CycleOrchestrator;
use checkpoint::geo::{CoordinateSimulator, Zone, ZoneCatalog};
use checkpoint::log::{init_tracing, JsonlLogger};
use checkpoint::notify::LogNotifier;
use checkpoint::policy::RemotePolicyCache;
use checkpoint::settings::Settings;
use checkpoint::signal::{ControlFlags, RunSignal};
use checkpoint::PeriodicJobScheduler;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Seconds to leave gate messages on screen before exiting.
const GATE_GRACE_SECS: u64 = 3;

/// Automated periodic check-in runner
///
/// Runs recurring check-in cycles against the remote service with
/// simulated coordinates, remote policy gates, and cycle history.
#[derive(Parser, Debug)]
#[command(name = "checkpoint", version, about)]
struct Cli {
    /// Path to the settings.toml file
    #[arg(long, default_value = "settings.toml")]
    config: PathBuf,

    /// Directory for logs and state (.checkpoint by default)
    #[arg(long, default_value = ".checkpoint")]
    log_dir: PathBuf,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Stop once check-ins succeed (overrides the settings file)
    #[arg(long)]
    exit_after_success: bool,
}

/// Resolve the active zone when zone randomization is enabled.
fn load_zone(settings: &Settings) -> Result<Option<Zone>> {
    if !settings.zone.enabled {
        return Ok(None);
    }
    let catalog = ZoneCatalog::from_path(&settings.zone.catalog_path).with_context(|| {
        format!("Failed to load zone catalog '{}'", settings.zone.catalog_path)
    })?;
    let Some(zone_id) = settings.zone.zone_id.as_deref() else {
        bail!("zone randomization is enabled but no zone_id is set");
    };
    let Some(zone) = catalog.get(zone_id) else {
        bail!(
            "zone '{zone_id}' not found in '{}' ({} zones available)",
            settings.zone.catalog_path,
            catalog.len()
        );
    };
    Ok(Some(zone.clone()))
}

/// Evaluate the startup gates against the freshly fetched policy. Fatal
/// denials leave their message on screen briefly, then exit.
async fn startup_gates(policy: &RemotePolicyCache, device_id: &str, signal: &RunSignal) {
    if let Err(update) = policy.required_update(VERSION) {
        eprintln!("{update}");
        signal.sleep_while_running(GATE_GRACE_SECS).await;
        std::process::exit(1);
    }

    if policy.is_globally_disabled() {
        eprintln!("{}", policy.global_disable_message());
        signal.sleep_while_running(GATE_GRACE_SECS).await;
        std::process::exit(1);
    }

    if !policy.is_device_allowed(device_id) {
        eprintln!("{}", policy.device_block_message(device_id));
        signal.sleep_while_running(GATE_GRACE_SECS).await;
        std::process::exit(1);
    }

    // A newer stable release is worth mentioning but never blocks.
    let latest = policy.latest_stable_version();
    if checkpoint::policy::version::parse(VERSION) < checkpoint::policy::version::parse(&latest) {
        info!(current = VERSION, latest = %latest, "a newer version is available");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _tracing_guard =
        init_tracing(&cli.log_dir).context("Failed to initialize logging")?;

    // Load configuration
    let mut settings = Settings::from_path(&cli.config)
        .with_context(|| format!("Failed to load settings from '{}'", cli.config.display()))?;
    if cli.exit_after_success {
        settings.exit_after_success.enabled = true;
    }

    let device_id = checkpoint::device::load_or_create(cli.log_dir.join("device_id"))
        .context("Failed to load device id")?;
    info!(device_id = %device_id, groups = settings.group_ids.len(), "starting");

    let signal = RunSignal::new();
    let flags = ControlFlags::new();

    // Ctrl-C clears the run signal; every cooperating sleep observes it
    // within a second.
    {
        let signal = signal.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                signal.clear();
            }
        });
    }

    // Remote policy: a failed startup fetch is non-fatal, the defaults
    // allow operation and the refresh job keeps retrying.
    let policy_sources = vec![
        format!("{}/api/policy", settings.base_url.trim_end_matches('/')),
        format!("{}/policy.json", settings.base_url.trim_end_matches('/')),
    ];
    let policy = Arc::new(RemotePolicyCache::new(policy_sources, signal.clone()));
    if !policy.fetch().await {
        warn!("initial policy fetch failed, continuing with defaults");
    }

    let display = CycleDisplay::new();
    if let Some(announcement) = policy.announcement() {
        display.announcement(&announcement.title, &announcement.message);
    }

    startup_gates(&policy, &device_id, &signal).await;

    let zone = load_zone(&settings)?;
    if let Some(zone) = &zone {
        info!(zone = %zone.id, hotspots = zone.hotspots.len(), "zone randomization active");
    }

    let client =
        HttpCheckinClient::new(settings.base_url.clone(), settings.session_credential.clone());
    let mut orchestrator = CycleOrchestrator::new(
        client,
        LogNotifier,
        settings.clone(),
        CoordinateSimulator::with_default_offset(),
        zone,
        Arc::clone(&policy),
        device_id,
        signal.clone(),
        flags.clone(),
    );
    orchestrator.attach_jsonl_logger(
        JsonlLogger::new(&cli.log_dir).context("Failed to initialize JSONL logger")?,
    );

    // Background policy refresh, interval remotely adjustable.
    let mut scheduler = PeriodicJobScheduler::new(signal.clone());
    let refresh_interval = policy.setting_u64("policy_refresh_interval_seconds", 900);
    {
        let policy = Arc::clone(&policy);
        scheduler.add_job("policy-refresh", refresh_interval, move || {
            let policy = Arc::clone(&policy);
            async move {
                policy.refresh_if_needed().await;
                Ok(())
            }
        })?;
    }
    scheduler.start();

    let result = if cli.once {
        orchestrator.run_once().await
    } else {
        orchestrator.run_loop().await
    };

    signal.clear();
    scheduler.join().await;

    let status = orchestrator.status();
    info!(
        cycles = status.cycles_completed,
        confirmed = status.total_confirmed,
        "stopped"
    );

    if let Err(denied) = result {
        error!(error = %denied, "service access denied");
        eprintln!("{denied}");
        std::process::exit(1);
    }

    Ok(())
}
