//! Run-wide metrics aggregated from telemetry reports

use super::{DroneReport, TelemetrySink};
use async_trait::async_trait;
use emberwatch_shared::{state_machine::Outcome, DroneState, Event, Fault};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Aggregated view of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSummary {
    pub extinguished: usize,
    pub insufficient_water: usize,
    pub faulted: usize,
    /// Corrupt packets released back to the scheduler for another attempt
    pub redispatched: usize,
    /// Drone transitions observed
    pub transitions: usize,
    /// Completed sorties per drone, counted on entry to REFILL
    pub sorties: BTreeMap<String, usize>,
    /// Mean seconds from assignment to extinguish
    pub mean_response_secs: Option<f64>,
    pub max_response_secs: Option<u64>,
}

#[derive(Debug, Default)]
struct Metrics {
    summary: MetricsSummary,
    response_times: Vec<u64>,
}

/// Aggregator shared by reference with the components that report into it
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    inner: RwLock<Metrics>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn summary(&self) -> MetricsSummary {
        self.inner.read().await.summary.clone()
    }
}

#[async_trait]
impl TelemetrySink for MetricsAggregator {
    async fn report_drone(&self, report: &DroneReport) {
        let mut metrics = self.inner.write().await;
        metrics.summary.transitions += 1;
        if report.state == DroneState::Refill {
            *metrics
                .summary
                .sorties
                .entry(report.drone.clone())
                .or_default() += 1;
        }
    }

    async fn report_event(&self, event: &Event, outcome: &Outcome) {
        let mut metrics = self.inner.write().await;
        match outcome {
            Outcome::Extinguished => {
                metrics.summary.extinguished += 1;
                if let (Some(assigned), Some(done)) = (event.assigned_at(), event.extinguished_at()) {
                    metrics.response_times.push(done.saturating_sub(assigned));
                }
            }
            Outcome::InsufficientWater { .. } => metrics.summary.insufficient_water += 1,
            Outcome::Faulted(Fault::Corrupt) => metrics.summary.redispatched += 1,
            Outcome::Faulted(_) => metrics.summary.faulted += 1,
        }

        if !metrics.response_times.is_empty() {
            let total: u64 = metrics.response_times.iter().sum();
            let mean = total as f64 / metrics.response_times.len() as f64;
            let max = metrics.response_times.iter().copied().max();
            metrics.summary.mean_response_secs = Some(mean);
            metrics.summary.max_response_secs = max;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emberwatch_shared::state_machine::{Drone, DroneIds};
    use emberwatch_shared::{Coordinate, EventKind, Fault, Severity, Zone};
    use std::time::Duration;

    fn flown_event(severity: Severity) -> Event {
        let zone = Zone::new(1, Coordinate::ORIGIN, Coordinate::new(400.0, 0.0));
        let mut event = Event::new(1, Duration::ZERO, 1, EventKind::FireDetected, severity);
        event.resolve_zone(&zone).expect("zone should match");

        let ids = DroneIds::new();
        let mut drone = Drone::new(&ids);
        drone.assign(event).expect("assign failed");
        while drone.completed().is_none() {
            drone.advance();
        }
        drone.take_completed().expect("no completed event").0
    }

    #[tokio::test]
    async fn test_counts_outcomes_separately() {
        let metrics = MetricsAggregator::new();
        let event = flown_event(Severity::Low);

        metrics.report_event(&event, &Outcome::Extinguished).await;
        metrics
            .report_event(
                &event,
                &Outcome::InsufficientWater {
                    needed: 30,
                    available: 10,
                },
            )
            .await;
        metrics
            .report_event(&event, &Outcome::Faulted(Fault::Jammed))
            .await;

        let summary = metrics.summary().await;
        assert_eq!(summary.extinguished, 1);
        assert_eq!(summary.insufficient_water, 1);
        assert_eq!(summary.faulted, 1);
        assert_eq!(summary.redispatched, 0);
    }

    #[tokio::test]
    async fn test_corrupt_release_is_not_a_failure() {
        let metrics = MetricsAggregator::new();
        let event = flown_event(Severity::High);

        metrics
            .report_event(&event, &Outcome::Faulted(Fault::Corrupt))
            .await;
        metrics
            .report_event(&event, &Outcome::Faulted(Fault::Stuck))
            .await;

        let summary = metrics.summary().await;
        assert_eq!(summary.redispatched, 1);
        assert_eq!(summary.faulted, 1);
        assert_eq!(summary.extinguished, 0);
    }

    #[tokio::test]
    async fn test_response_time_from_assignment() {
        let metrics = MetricsAggregator::new();
        let event = flown_event(Severity::Moderate);
        // 5s acceleration, 10s cruise to (200, 0), 10s drop
        assert_eq!(event.extinguished_at(), Some(25));

        metrics.report_event(&event, &Outcome::Extinguished).await;
        let summary = metrics.summary().await;
        assert_eq!(summary.mean_response_secs, Some(25.0));
        assert_eq!(summary.max_response_secs, Some(25));
    }

    #[tokio::test]
    async fn test_sorties_counted_per_drone() {
        let metrics = MetricsAggregator::new();
        for (drone, state) in [
            ("Drone1", DroneState::Refill),
            ("Drone1", DroneState::Available),
            ("Drone2", DroneState::Refill),
            ("Drone1", DroneState::Refill),
        ] {
            metrics
                .report_drone(&DroneReport {
                    drone: drone.into(),
                    state,
                    clock: 0,
                    position: Coordinate::ORIGIN,
                })
                .await;
        }

        let summary = metrics.summary().await;
        assert_eq!(summary.transitions, 4);
        assert_eq!(summary.sorties.get("Drone1"), Some(&2));
        assert_eq!(summary.sorties.get("Drone2"), Some(&1));
    }
}
