//! Telemetry push interface
//!
//! The core hands drone positions and event resolutions to a sink and never
//! formats or persists them itself.

mod tracing_sink;
mod metrics;

pub use tracing_sink::TracingSink;
pub use metrics::{MetricsAggregator, MetricsSummary};

use async_trait::async_trait;
use emberwatch_shared::{state_machine::Outcome, Coordinate, DroneState, Event};
use std::sync::Arc;

/// One drone state change
#[derive(Debug, Clone, PartialEq)]
pub struct DroneReport {
    pub drone: String,
    pub state: DroneState,
    pub clock: u64,
    pub position: Coordinate,
}

/// Receives telemetry from the drone subsystem
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Called after every drone transition
    async fn report_drone(&self, report: &DroneReport);

    /// Called once per handled event
    async fn report_event(&self, event: &Event, outcome: &Outcome);
}

/// Forwards every report to several sinks
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl TelemetrySink for FanoutSink {
    async fn report_drone(&self, report: &DroneReport) {
        for sink in &self.sinks {
            sink.report_drone(report).await;
        }
    }

    async fn report_event(&self, event: &Event, outcome: &Outcome) {
        for sink in &self.sinks {
            sink.report_event(event, outcome).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emberwatch_shared::{EventKind, Severity};
    use std::time::Duration;

    #[tokio::test]
    async fn test_fanout_reaches_every_sink() {
        let first = Arc::new(MetricsAggregator::new());
        let second = Arc::new(MetricsAggregator::new());
        let fanout = FanoutSink::new().with(first.clone()).with(second.clone());

        let event = Event::new(1, Duration::ZERO, 1, EventKind::FireDetected, Severity::Low);
        fanout.report_event(&event, &Outcome::Extinguished).await;
        fanout
            .report_drone(&DroneReport {
                drone: "Drone1".into(),
                state: DroneState::Refill,
                clock: 40,
                position: Coordinate::ORIGIN,
            })
            .await;

        for metrics in [first, second] {
            let summary = metrics.summary().await;
            assert_eq!(summary.extinguished, 1);
            assert_eq!(summary.transitions, 1);
        }
    }
}
