//! Scheduler loop: mailbox intake, zone resolution and confirmations

use super::DispatchQueue;
use crate::mailbox::{Completion, Destination, Mailbox, Package, Take};
use crate::shutdown::Shutdown;
use anyhow::Context;
use emberwatch_shared::{state_machine::Outcome, Event, Fault, FleetError, Zone};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Routes incidents to the dispatch queue and completions back to the source
pub struct Scheduler {
    zones: HashMap<u32, Zone>,
    mailbox: Arc<Mailbox<Package>>,
    queue: Arc<DispatchQueue>,
    /// Simulated operator response for stuck drones; `None` waits forever
    auto_clear_stuck: Option<Duration>,
}

impl Scheduler {
    pub fn new(
        zones: impl IntoIterator<Item = Zone>,
        mailbox: Arc<Mailbox<Package>>,
        queue: Arc<DispatchQueue>,
    ) -> Self {
        Self {
            zones: zones.into_iter().map(|zone| (zone.id(), zone)).collect(),
            mailbox,
            queue,
            auto_clear_stuck: None,
        }
    }

    pub fn with_auto_clear(mut self, delay: Option<Duration>) -> Self {
        self.auto_clear_stuck = delay;
        self
    }

    /// Process mailbox traffic until shutdown.
    ///
    /// Returns an error on the first configuration defect, which ends the run.
    pub async fn run(&self, mut shutdown: Shutdown) -> anyhow::Result<()> {
        info!("[SCHEDULER] Started with {} zones", self.zones.len());

        loop {
            let package = match self
                .mailbox
                .take_until(Destination::Scheduler, &mut shutdown)
                .await
            {
                Take::Item(package) => package,
                Take::Interrupted | Take::TimedOut => break,
            };

            if let Err(e) = self.handle(package).await {
                error!("[SCHEDULER] Fatal: {}", e);
                return Err(e).context("scheduler aborted");
            }
        }

        info!("[SCHEDULER] Stopped");
        Ok(())
    }

    async fn handle(&self, package: Package) -> Result<(), FleetError> {
        match package {
            Package::Incident(event) => self.intake(event).await?,
            Package::Completion(completion) => self.complete(completion).await,
            Package::FaultAlert { drone, name, fault } => self.fault_alert(drone, &name, fault),
            other => warn!("[SCHEDULER] Ignoring unexpected package: {:?}", other),
        }
        Ok(())
    }

    /// Attach the zone and queue the event
    pub async fn intake(&self, mut event: Event) -> Result<(), FleetError> {
        let zone = self
            .zones
            .get(&event.zone_id())
            .ok_or(FleetError::UnknownZone(event.zone_id()))?;
        event.resolve_zone(zone)?;

        info!("[SCHEDULER] Queued {}", event);
        self.queue.submit(event).await;
        Ok(())
    }

    async fn complete(&self, completion: Completion) {
        // A corrupt assignment comes back with its fault cleared and goes
        // straight back into the queue
        if completion.outcome == Outcome::Faulted(Fault::Corrupt) && completion.event.fault().is_none() {
            info!(
                "[SCHEDULER] Re-dispatching event {} released by {}",
                completion.event.id(),
                completion.drone
            );
            self.queue.submit(completion.event).await;
            return;
        }

        match &completion.outcome {
            Outcome::Extinguished => info!(
                "[SCHEDULER] Event {} resolved by {}",
                completion.event.id(),
                completion.drone
            ),
            outcome => warn!(
                "[SCHEDULER] Event {} closed unresolved by {}: {:?}",
                completion.event.id(),
                completion.drone,
                outcome
            ),
        }
        self.mailbox
            .put(Destination::FireIncident, Package::Confirmation(completion))
            .await;
    }

    fn fault_alert(&self, drone: u32, name: &str, fault: Fault) {
        warn!("[SCHEDULER] {} reports {} fault", name, fault);

        let Some(delay) = self.auto_clear_stuck else {
            return;
        };
        if fault != Fault::Stuck {
            return;
        }

        let mailbox = self.mailbox.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            info!("[SCHEDULER] Operator clearing {}", name);
            mailbox
                .put(Destination::DroneSubsystem, Package::ClearFault { drone })
                .await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown;
    use emberwatch_shared::{Coordinate, EventKind, Severity};

    fn setup() -> (Arc<Mailbox<Package>>, Arc<DispatchQueue>, Scheduler) {
        let mailbox = Arc::new(Mailbox::new());
        let queue = Arc::new(DispatchQueue::new());
        let zones = vec![Zone::new(1, Coordinate::ORIGIN, Coordinate::new(100.0, 100.0))];
        let scheduler = Scheduler::new(zones, mailbox.clone(), queue.clone());
        (mailbox, queue, scheduler)
    }

    fn event(id: u64, zone_id: u32, severity: Severity) -> Event {
        Event::new(id, Duration::ZERO, zone_id, EventKind::FireDetected, severity)
    }

    #[tokio::test]
    async fn test_intake_resolves_zone() {
        let (_, queue, scheduler) = setup();
        scheduler
            .intake(event(1, 1, Severity::Low))
            .await
            .expect("intake failed");

        let queued = queue.take_next().await;
        assert_eq!(queued.target(), Some(Coordinate::new(50.0, 50.0)));
    }

    #[tokio::test]
    async fn test_unknown_zone_aborts_run() {
        let (mailbox, queue, scheduler) = setup();
        let (_trigger, shutdown) = shutdown::channel();
        mailbox
            .put(Destination::Scheduler, Package::Incident(event(1, 99, Severity::High)))
            .await;

        let result = tokio::time::timeout(Duration::from_secs(2), scheduler.run(shutdown))
            .await
            .expect("scheduler hung");
        assert!(result.is_err());
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_completion_confirmed_to_source() {
        let (mailbox, _, scheduler) = setup();
        let completion = Completion {
            drone: "Drone1".into(),
            event: event(1, 1, Severity::Low),
            outcome: Outcome::Extinguished,
        };
        scheduler
            .handle(Package::Completion(completion.clone()))
            .await
            .expect("handle failed");

        let confirmation = mailbox.try_take(Destination::FireIncident).await;
        assert_eq!(confirmation, Some(Package::Confirmation(completion)));
    }

    #[tokio::test]
    async fn test_corrupt_release_is_redispatched() {
        let (mailbox, queue, scheduler) = setup();
        let completion = Completion {
            drone: "Drone2".into(),
            event: event(4, 1, Severity::Moderate),
            outcome: Outcome::Faulted(Fault::Corrupt),
        };
        scheduler
            .handle(Package::Completion(completion))
            .await
            .expect("handle failed");

        assert!(mailbox.is_empty(Destination::FireIncident).await);
        assert_eq!(queue.try_take_next().await.map(|e| e.id()), Some(4));
    }

    #[tokio::test]
    async fn test_stuck_alert_sends_clear() {
        let (mailbox, _, scheduler) = setup();
        let scheduler = scheduler.with_auto_clear(Some(Duration::from_millis(10)));
        scheduler
            .handle(Package::FaultAlert {
                drone: 3,
                name: "Drone3".into(),
                fault: Fault::Stuck,
            })
            .await
            .expect("handle failed");

        let clear = mailbox
            .take_timeout(Destination::DroneSubsystem, Duration::from_secs(2))
            .await;
        assert_eq!(clear, Take::Item(Package::ClearFault { drone: 3 }));
    }
}
