//! Drone subsystem orchestrator

use super::worker::DroneWorker;
use crate::config::FleetConfig;
use crate::dispatch::DispatchQueue;
use crate::mailbox::{Destination, Mailbox, Package, Take};
use crate::shutdown::Shutdown;
use crate::telemetry::TelemetrySink;
use anyhow::Context;
use emberwatch_shared::state_machine::{Drone, DroneIds, DroneSnapshot};
use emberwatch_shared::DroneState;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Read side of a running drone
#[derive(Clone)]
struct DroneHandle {
    id: u32,
    name: String,
    snapshot: Arc<RwLock<DroneSnapshot>>,
    clear: mpsc::UnboundedSender<()>,
}

impl DroneHandle {
    /// Last published state of the drone
    async fn snapshot(&self) -> DroneSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Release a STUCK drone. Returns false if the drone is not stuck.
    async fn clear_fault(&self) -> bool {
        // The read guard is held across the send so the worker cannot move
        // on to a new hold before this clear is queued
        let snapshot = self.snapshot.read().await;
        if snapshot.state != DroneState::Stuck {
            return false;
        }
        self.clear.send(()).is_ok()
    }
}

/// Running fleet of drone workers
pub struct DroneSubsystem {
    handles: Vec<DroneHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl DroneSubsystem {
    /// Spawn the drone workers and the control task.
    ///
    /// Drone ids come from the process-wide allocator.
    pub fn start(
        config: &FleetConfig,
        mailbox: Arc<Mailbox<Package>>,
        queue: Arc<DispatchQueue>,
        telemetry: Arc<dyn TelemetrySink>,
        shutdown: Shutdown,
    ) -> Self {
        Self::start_with_ids(DroneIds::global(), config, mailbox, queue, telemetry, shutdown)
    }

    /// Like `start`, drawing drone ids from `ids`
    pub fn start_with_ids(
        ids: &DroneIds,
        config: &FleetConfig,
        mailbox: Arc<Mailbox<Package>>,
        queue: Arc<DispatchQueue>,
        telemetry: Arc<dyn TelemetrySink>,
        shutdown: Shutdown,
    ) -> Self {
        let mut handles = Vec::with_capacity(config.drone_count);
        let mut tasks = Vec::with_capacity(config.drone_count + 1);

        for _ in 0..config.drone_count {
            let drone = Drone::new(ids).with_cruise_step(config.cruise_step_secs);
            let (clear_tx, clear_rx) = mpsc::unbounded_channel();
            let handle = DroneHandle {
                id: drone.id(),
                name: drone.name().to_string(),
                snapshot: Arc::new(RwLock::new(drone.snapshot())),
                clear: clear_tx,
            };

            let worker = DroneWorker {
                drone,
                snapshot: handle.snapshot.clone(),
                clear: clear_rx,
                queue: queue.clone(),
                mailbox: mailbox.clone(),
                telemetry: telemetry.clone(),
                time_scale: config.time_scale,
            };
            tasks.push(tokio::spawn(worker.run(shutdown.clone())));
            handles.push(handle);
        }

        tasks.push(tokio::spawn(control_loop(
            handles.clone(),
            mailbox,
            shutdown,
        )));

        info!("[SUBSYSTEM] Started {} drones", handles.len());
        Self { handles, tasks }
    }

    pub async fn snapshots(&self) -> Vec<DroneSnapshot> {
        let mut snapshots = Vec::with_capacity(self.handles.len());
        for handle in &self.handles {
            snapshots.push(handle.snapshot().await);
        }
        snapshots
    }

    /// Wait for every task to stop after shutdown
    pub async fn join(self) -> anyhow::Result<()> {
        for result in join_all(self.tasks).await {
            result.context("drone subsystem task panicked")?;
        }
        info!("[SUBSYSTEM] All drones stopped");
        Ok(())
    }
}

/// Handles operator traffic addressed to the subsystem
async fn control_loop(
    handles: Vec<DroneHandle>,
    mailbox: Arc<Mailbox<Package>>,
    mut shutdown: Shutdown,
) {
    loop {
        let package = match mailbox
            .take_until(Destination::DroneSubsystem, &mut shutdown)
            .await
        {
            Take::Item(package) => package,
            Take::Interrupted | Take::TimedOut => break,
        };

        match package {
            Package::ClearFault { drone } => {
                match handles.iter().find(|h| h.id == drone) {
                    Some(handle) => {
                        if handle.clear_fault().await {
                            info!("[SUBSYSTEM] Clear sent to {}", handle.name);
                        } else {
                            warn!("[SUBSYSTEM] {} is not stuck, ignoring clear", handle.name);
                        }
                    }
                    None => warn!("[SUBSYSTEM] Clear for unknown drone {}", drone),
                }
            }
            other => warn!("[SUBSYSTEM] Ignoring unexpected package: {:?}", other),
        }
    }
}
