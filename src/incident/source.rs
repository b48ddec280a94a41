use crate::mailbox::{Completion, Destination, Mailbox, Package, Take};
use crate::shutdown::Shutdown;
use emberwatch_shared::{format_hms, Event};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Releases events into the scheduler and waits for their confirmations
pub struct IncidentSource {
    events: Vec<Event>,
    mailbox: Arc<Mailbox<Package>>,
    time_scale: Duration,
    confirm_timeout: Option<Duration>,
}

impl IncidentSource {
    pub fn new(mut events: Vec<Event>, mailbox: Arc<Mailbox<Package>>) -> Self {
        events.sort_by_key(|event| event.time());
        Self {
            events,
            mailbox,
            time_scale: Duration::ZERO,
            confirm_timeout: None,
        }
    }

    /// Real time per simulated second between releases
    pub fn with_time_scale(mut self, time_scale: Duration) -> Self {
        self.time_scale = time_scale;
        self
    }

    pub fn with_confirm_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    /// Release every event, then collect one confirmation per event.
    ///
    /// Stops early on shutdown and returns what was confirmed so far.
    pub async fn run(self, mut shutdown: Shutdown) -> anyhow::Result<Vec<Completion>> {
        let Self {
            events,
            mailbox,
            time_scale,
            confirm_timeout,
        } = self;

        let expected = events.len();
        let Some(start) = events.first().map(Event::time) else {
            info!("[INCIDENT] No events to release");
            return Ok(Vec::new());
        };

        let mut previous = start;
        for event in events {
            let gap = event.time().saturating_sub(previous);
            previous = event.time();
            if !pause(time_scale, gap, &mut shutdown).await {
                warn!("[INCIDENT] Shutdown before all events were released");
                return Ok(Vec::new());
            }

            info!(
                "[INCIDENT] Releasing {} (+{})",
                event,
                format_hms(event.time().saturating_sub(start))
            );
            mailbox
                .put(Destination::Scheduler, Package::Incident(event))
                .await;
        }

        let mut confirmed = Vec::with_capacity(expected);
        while confirmed.len() < expected {
            let taken = tokio::select! {
                taken = next_confirmation(&mailbox, confirm_timeout) => taken,
                _ = shutdown.wait() => Take::Interrupted,
            };

            match taken {
                Take::Item(Package::Confirmation(completion)) => {
                    info!(
                        "[INCIDENT] Event {} confirmed by {} ({}/{})",
                        completion.event.id(),
                        completion.drone,
                        confirmed.len() + 1,
                        expected
                    );
                    confirmed.push(completion);
                }
                Take::Item(other) => warn!("[INCIDENT] Ignoring unexpected package: {:?}", other),
                Take::Interrupted => {
                    warn!("[INCIDENT] Shutdown with {} confirmations outstanding", expected - confirmed.len());
                    break;
                }
                Take::TimedOut => anyhow::bail!(
                    "timed out waiting for confirmations: {} of {} received",
                    confirmed.len(),
                    expected
                ),
            }
        }

        Ok(confirmed)
    }
}

async fn next_confirmation(mailbox: &Mailbox<Package>, timeout: Option<Duration>) -> Take<Package> {
    match timeout {
        Some(timeout) => mailbox.take_timeout(Destination::FireIncident, timeout).await,
        None => Take::Item(mailbox.take(Destination::FireIncident).await),
    }
}

/// Sleep for a simulated gap scaled to real time
async fn pause(time_scale: Duration, gap: Duration, shutdown: &mut Shutdown) -> bool {
    if gap.is_zero() || time_scale.is_zero() {
        return !shutdown.is_triggered();
    }
    let delay = time_scale.mul_f64(gap.as_secs_f64());
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown.wait() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown;
    use emberwatch_shared::state_machine::Outcome;
    use emberwatch_shared::{EventKind, Severity};

    fn event(id: u64, secs: u64) -> Event {
        Event::new(
            id,
            Duration::from_secs(secs),
            1,
            EventKind::FireDetected,
            Severity::Low,
        )
    }

    fn confirmation(event: Event) -> Package {
        Package::Confirmation(Completion {
            drone: "Drone1".into(),
            event,
            outcome: Outcome::Extinguished,
        })
    }

    #[tokio::test]
    async fn test_releases_in_time_order() {
        let mailbox = Arc::new(Mailbox::new());
        let (_trigger, shutdown) = shutdown::channel();
        let source = IncidentSource::new(vec![event(2, 90), event(1, 30)], mailbox.clone())
            .with_confirm_timeout(Some(Duration::from_secs(2)));

        let task = tokio::spawn(source.run(shutdown));

        for expected in [1, 2] {
            let released = mailbox
                .take_timeout(Destination::Scheduler, Duration::from_secs(2))
                .await;
            let Take::Item(Package::Incident(released)) = released else {
                panic!("expected an incident, got {:?}", released);
            };
            assert_eq!(released.id(), expected);
            mailbox
                .put(Destination::FireIncident, confirmation(released))
                .await;
        }

        let confirmed = task.await.expect("source panicked").expect("source failed");
        let ids: Vec<u64> = confirmed.iter().map(|c| c.event.id()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_missing_confirmation_times_out() {
        let mailbox = Arc::new(Mailbox::new());
        let (_trigger, shutdown) = shutdown::channel();
        let source = IncidentSource::new(vec![event(1, 0)], mailbox.clone())
            .with_confirm_timeout(Some(Duration::from_millis(20)));

        let result = source.run(shutdown).await;
        assert!(result.is_err());
        assert_eq!(mailbox.len(Destination::Scheduler).await, 1);
    }

    #[tokio::test]
    async fn test_shutdown_ends_collection() {
        let mailbox = Arc::new(Mailbox::new());
        let (trigger, shutdown) = shutdown::channel();
        let source = IncidentSource::new(vec![event(1, 0), event(2, 0)], mailbox.clone());

        let task = tokio::spawn(source.run(shutdown));
        mailbox
            .put(Destination::FireIncident, confirmation(event(1, 0)))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.trigger();

        let confirmed = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("source hung")
            .expect("source panicked")
            .expect("source failed");
        assert_eq!(confirmed.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_feed() {
        let (_trigger, shutdown) = shutdown::channel();
        let source = IncidentSource::new(Vec::new(), Arc::new(Mailbox::new()));
        assert!(source.run(shutdown).await.expect("source failed").is_empty());
    }
}
