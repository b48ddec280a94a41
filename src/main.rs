mod config;
mod dispatch;
mod drone;
mod incident;
mod mailbox;
mod scenario;
mod shutdown;
mod simulation;
mod telemetry;

use config::FleetConfig;
use emberwatch_shared::format_hms;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = FleetConfig::from_env()?;
    info!("Emberwatch starting");
    info!("  Drones: {}", config.drone_count);
    info!("  Time scale: {:?} per simulated second", config.time_scale);

    let zones = scenario::zones()?;
    let events = scenario::events()?;
    info!("  Scenario: {} zones, {} events", zones.len(), events.len());

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let report = simulation::run(&config, zones, events, interrupt).await?;

    info!("Run complete: {} events confirmed", report.confirmations.len());
    for completion in &report.confirmations {
        info!(
            "  #{} {:?} by {}: {:?}",
            completion.event.id(),
            completion.event.status(),
            completion.drone,
            completion.outcome
        );
    }

    let summary = &report.summary;
    info!(
        "  Extinguished: {}, insufficient water: {}, faulted: {}, redispatched: {}",
        summary.extinguished,
        summary.insufficient_water,
        summary.faulted,
        summary.redispatched
    );
    if let (Some(mean), Some(max)) = (summary.mean_response_secs, summary.max_response_secs) {
        info!(
            "  Response time: mean {:.1}s, max {}",
            mean,
            format_hms(Duration::from_secs(max))
        );
    }
    for (drone, sorties) in &summary.sorties {
        info!("  {}: {} sorties", drone, sorties);
    }
    for drone in &report.drones {
        info!(
            "  {} {} at {} water={}L battery={:.0}s",
            drone.name, drone.state, drone.position, drone.water, drone.battery
        );
    }

    Ok(())
}
