//! Cardwatch CLI entry point.

use std::process::ExitCode;

use anyhow::Context;
use cardwatch_cli::{
    Cli, Commands, EXIT_INIT_FAILURE, EXIT_WATCHDOG, LogIndicator, RunArgs, ScenarioPlayer,
};
use cardwatch_hardware::mock::MockReader;
use cardwatch_hardware::{SoftwareWatchdog, WatchdogExpiry};
use cardwatch_presence::{ControlLoop, MonitorError, MonitorStats};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    // Logs on stderr; stdout carries only report lines
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => run(args).await,
    };

    match result {
        Ok(stats) => {
            match serde_json::to_string(&stats) {
                Ok(json) => eprintln!("{json}"),
                Err(e) => warn!(error = %e, "Failed to encode stats"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            let fatal_init = e
                .downcast_ref::<MonitorError>()
                .is_some_and(MonitorError::is_fatal_init);
            if fatal_init {
                ExitCode::from(EXIT_INIT_FAILURE)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(args: RunArgs) -> anyhow::Result<MonitorStats> {
    let config = args.load_config()?;
    let scenario = args.load_scenario()?;
    info!(
        scenario_ms = scenario.duration().as_millis() as u64,
        steps = scenario.steps.len(),
        "Using simulated reader"
    );

    let watchdog = SoftwareWatchdog::start(config.watchdog_timeout, on_watchdog_expiry)
        .context("starting watchdog")?;

    let (reader, card) = MockReader::new();
    let mut player = ScenarioPlayer::new(scenario, card);
    player.prime();

    let mut monitor =
        ControlLoop::new(&config, reader, watchdog, LogIndicator, tokio::io::stdout())
            .with_tick_limit(args.max_ticks);

    let version = monitor.start().await.context("reader bring-up")?;
    info!(%version, "Monitoring card presence");

    let playback = tokio::spawn(player.run());
    let outcome = monitor.run_until(shutdown_signal()).await;
    playback.abort();
    outcome.context("control loop")?;

    let stats = monitor.stats();
    info!(
        ticks = stats.ticks,
        changes = stats.changes,
        removals = stats.removals,
        resyncs = stats.resyncs,
        "Monitor stopped"
    );
    Ok(stats)
}

fn on_watchdog_expiry(expiry: WatchdogExpiry) {
    let code = match expiry {
        WatchdogExpiry::Starved { .. } => EXIT_WATCHDOG,
        WatchdogExpiry::RestartRequested { .. } => EXIT_INIT_FAILURE,
    };
    error!(%expiry, code, "Exiting for restart");
    std::process::exit(i32::from(code));
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl-C handler unavailable");
        std::future::pending::<()>().await;
    }
}
