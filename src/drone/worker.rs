//! Per-drone processing loop

use crate::dispatch::DispatchQueue;
use crate::mailbox::{Completion, Destination, Mailbox, Package, Take};
use crate::shutdown::Shutdown;
use crate::telemetry::{DroneReport, TelemetrySink};
use emberwatch_shared::state_machine::{arrival_time, Drone, DroneSnapshot, Notice, Transition};
use emberwatch_shared::{format_hms, DroneState, Event, FleetError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

/// Drives one drone. Sole writer of the drone's state.
pub(crate) struct DroneWorker {
    pub(crate) drone: Drone,
    pub(crate) snapshot: Arc<RwLock<DroneSnapshot>>,
    pub(crate) clear: mpsc::UnboundedReceiver<()>,
    pub(crate) queue: Arc<DispatchQueue>,
    pub(crate) mailbox: Arc<Mailbox<Package>>,
    pub(crate) telemetry: Arc<dyn TelemetrySink>,
    pub(crate) time_scale: Duration,
}

impl DroneWorker {
    pub(crate) async fn run(mut self, mut shutdown: Shutdown) {
        info!("[{}] Ready at base {}", self.drone.name(), self.drone.position());

        loop {
            let event = match self.queue.take_next_until(&mut shutdown).await {
                Take::Item(event) => event,
                Take::Interrupted | Take::TimedOut => break,
            };

            if let Err(rejected) = self.drone.assign(event) {
                match rejected.reason {
                    FleetError::DroneBusy { .. } => {
                        warn!("[{}] {}", self.drone.name(), rejected.reason);
                        self.queue.submit(rejected.event).await;
                    }
                    reason => error!(
                        "[{}] Dropping event {}: {}",
                        self.drone.name(),
                        rejected.event.id(),
                        reason
                    ),
                }
                continue;
            }

            if !self.fly(&mut shutdown).await {
                break;
            }
        }

        info!("[{}] Stopped", self.drone.name());
    }

    /// Advance the drone until it is AVAILABLE again.
    ///
    /// Returns false if shutdown interrupted the mission.
    async fn fly(&mut self, shutdown: &mut Shutdown) -> bool {
        loop {
            if self.drone.state().can_reroute() {
                self.check_task_switch().await;
            }

            let started = self.drone.clock();
            let transition = self.drone.advance();
            if transition.to == DroneState::Stuck && transition.from != DroneState::Stuck {
                self.discard_stale_clears();
            }
            self.publish(&transition).await;

            if !self.pause(self.drone.clock() - started, shutdown).await {
                return false;
            }

            match transition.to {
                DroneState::Stuck => {
                    if transition.from != DroneState::Stuck {
                        self.raise_alert(&transition).await;
                    }
                    if !self.await_clear(shutdown).await {
                        return false;
                    }
                }
                DroneState::Available => break,
                _ => {}
            }
        }

        self.finish().await;
        true
    }

    /// Switch to a more urgent queued event while still outbound
    async fn check_task_switch(&mut self) {
        let Some(severity) = self.drone.current().map(Event::severity) else {
            return;
        };
        let Some(candidate) = self.queue.take_if_higher(severity).await else {
            return;
        };

        match self.drone.reroute(candidate) {
            Ok(displaced) => {
                info!(
                    "[{}] Switching to event {}, event {} goes back to the queue",
                    self.drone.name(),
                    self.drone.current().map(Event::id).unwrap_or_default(),
                    displaced.id()
                );
                self.queue.submit(displaced).await;
            }
            Err(rejected) => {
                debug!("[{}] {}", self.drone.name(), rejected.reason);
                self.queue.submit(rejected.event).await;
            }
        }
    }

    async fn publish(&self, transition: &Transition) {
        let snapshot = self.drone.snapshot();
        *self.snapshot.write().await = snapshot.clone();

        self.log_notice(transition);
        self.telemetry
            .report_drone(&DroneReport {
                drone: snapshot.name,
                state: snapshot.state,
                clock: snapshot.clock,
                position: snapshot.position,
            })
            .await;
    }

    fn log_notice(&self, transition: &Transition) {
        let name = self.drone.name();
        let at = format_hms(Duration::from_secs(self.drone.clock()));

        match &transition.notice {
            Notice::Assigned { event } => {
                let eta = self
                    .drone
                    .current()
                    .and_then(Event::target)
                    .map(|target| arrival_time(&self.drone.position(), &target))
                    .unwrap_or_default();
                info!(
                    "[{}] Assigned event {} at {}, over zone in {:.0}s",
                    name, event, at, eta
                )
            }
            Notice::Arrived { event } => info!("[{}] Over zone of event {} at {}", name, event, at),
            Notice::Extinguished { event, water_used } => info!(
                "[{}] Event {} extinguished with {}L at {}",
                name, event, water_used, at
            ),
            Notice::InsufficientWater {
                event,
                needed,
                available,
            } => warn!(
                "[{}] Not enough water for event {}: needs {}L, tank holds {}L",
                name, event, needed, available
            ),
            Notice::FaultDetected(fault) => error!("[{}] {} fault detected at {}", name, fault, at),
            Notice::FaultResolved(fault) => info!("[{}] {} fault handled", name, fault),
            Notice::Recharged => info!("[{}] Battery recharged at {}", name, at),
            _ => debug!("[{}] {} -> {} at {}", name, transition.from, transition.to, at),
        }
    }

    /// Sleep for the simulated duration, scaled to real time
    async fn pause(&self, sim_secs: u64, shutdown: &mut Shutdown) -> bool {
        if sim_secs == 0 || self.time_scale.is_zero() {
            tokio::task::yield_now().await;
            return !shutdown.is_triggered();
        }

        let delay = self.time_scale.saturating_mul(u32::try_from(sim_secs).unwrap_or(u32::MAX));
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = shutdown.wait() => false,
        }
    }

    async fn raise_alert(&self, transition: &Transition) {
        let Notice::FaultDetected(fault) = transition.notice else {
            return;
        };
        self.mailbox
            .put(
                Destination::Scheduler,
                Package::FaultAlert {
                    drone: self.drone.id(),
                    name: self.drone.name().to_string(),
                    fault,
                },
            )
            .await;
    }

    /// Drop clears left over from an earlier hold.
    ///
    /// Runs before the STUCK snapshot is published, so every clear still
    /// queued was aimed at a hold that has already ended.
    fn discard_stale_clears(&mut self) {
        let mut stale = 0;
        while self.clear.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!("[{}] Discarded {} stale clears", self.drone.name(), stale);
        }
    }

    /// Hold a stuck drone until an operator clears it
    async fn await_clear(&mut self, shutdown: &mut Shutdown) -> bool {
        warn!("[{}] Holding until fault is cleared", self.drone.name());
        tokio::select! {
            cleared = self.clear.recv() => cleared.is_some() && self.drone.clear_fault(),
            _ = shutdown.wait() => false,
        }
    }

    /// Report the handled event and send it back to the scheduler
    async fn finish(&mut self) {
        let Some((event, outcome)) = self.drone.take_completed() else {
            return;
        };
        self.telemetry.report_event(&event, &outcome).await;
        self.mailbox
            .put(
                Destination::Scheduler,
                Package::Completion(Completion {
                    drone: self.drone.name().to_string(),
                    event,
                    outcome,
                }),
            )
            .await;
    }
}
