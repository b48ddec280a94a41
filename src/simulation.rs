//! Wires the scheduler, drone subsystem and incident source into one run

use crate::config::FleetConfig;
use crate::dispatch::{DispatchQueue, Scheduler};
use crate::drone::DroneSubsystem;
use crate::incident::IncidentSource;
use crate::mailbox::{Completion, Destination, Mailbox, Package};
use crate::shutdown;
use crate::telemetry::{FanoutSink, MetricsAggregator, MetricsSummary, TelemetrySink, TracingSink};
use anyhow::Context;
use emberwatch_shared::state_machine::DroneSnapshot;
use emberwatch_shared::{Event, Zone};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a finished run
#[derive(Debug)]
pub struct Report {
    /// Confirmations received by the incident source, in arrival order
    pub confirmations: Vec<Completion>,
    pub summary: MetricsSummary,
    pub drones: Vec<DroneSnapshot>,
    /// Events still waiting in the dispatch queue at shutdown
    pub unserved: usize,
    /// Packages no component picked up before shutdown
    pub undelivered: usize,
}

/// Run the fleet until every event is confirmed or `interrupt` resolves
pub async fn run(
    config: &FleetConfig,
    zones: Vec<Zone>,
    events: Vec<Event>,
    interrupt: impl Future<Output = ()>,
) -> anyhow::Result<Report> {
    let mailbox = Arc::new(Mailbox::new());
    let queue = Arc::new(DispatchQueue::new());
    let metrics = Arc::new(MetricsAggregator::new());
    let telemetry: Arc<dyn TelemetrySink> = Arc::new(
        FanoutSink::new()
            .with(Arc::new(TracingSink))
            .with(metrics.clone()),
    );
    let (trigger, shutdown) = shutdown::channel();
    let trigger = Arc::new(trigger);

    let scheduler = Scheduler::new(zones, mailbox.clone(), queue.clone())
        .with_auto_clear(config.auto_clear_stuck);
    let scheduler_task = {
        let trigger = trigger.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let result = scheduler.run(shutdown).await;
            if result.is_err() {
                trigger.trigger();
            }
            result
        })
    };

    let subsystem = DroneSubsystem::start(
        config,
        mailbox.clone(),
        queue.clone(),
        telemetry,
        shutdown.clone(),
    );

    let source = IncidentSource::new(events, mailbox.clone())
        .with_time_scale(config.time_scale)
        .with_confirm_timeout(config.confirm_timeout);
    let mut source_task = tokio::spawn(source.run(shutdown));

    let source_result = tokio::select! {
        result = &mut source_task => result,
        _ = interrupt => {
            warn!("[SIMULATION] Interrupted, shutting down");
            trigger.trigger();
            (&mut source_task).await
        }
    };

    info!("[SIMULATION] Stopping");
    trigger.trigger();
    let scheduler_result = scheduler_task.await;
    let drones = subsystem.snapshots().await;
    let join_result = subsystem.join().await;

    scheduler_result.context("scheduler task panicked")??;
    join_result?;
    let confirmations = source_result.context("incident source panicked")??;

    let unserved = if queue.is_empty().await {
        0
    } else {
        let waiting = queue.len().await;
        warn!("[SIMULATION] {} events never reached a drone", waiting);
        waiting
    };

    Ok(Report {
        confirmations,
        summary: metrics.summary().await,
        drones,
        unserved,
        undelivered: undelivered(&mailbox).await,
    })
}

async fn undelivered(mailbox: &Mailbox<Package>) -> usize {
    let mut total = 0;
    for destination in Destination::ALL {
        if mailbox.is_empty(destination).await {
            continue;
        }
        let waiting = mailbox.len(destination).await;
        warn!("[SIMULATION] {} packages left for {:?}", waiting, destination);
        total += waiting;
    }
    total
}
