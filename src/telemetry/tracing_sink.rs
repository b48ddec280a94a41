//! Telemetry sink that writes to the tracing log

use super::{DroneReport, TelemetrySink};
use async_trait::async_trait;
use emberwatch_shared::{format_hms, state_machine::Outcome, Event, Fault};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Logs every report; stands in for the map renderer
#[derive(Debug, Default)]
pub struct TracingSink;

#[async_trait]
impl TelemetrySink for TracingSink {
    async fn report_drone(&self, report: &DroneReport) {
        debug!(
            "[{}] {} t={} at {}",
            report.drone,
            report.state,
            format_hms(Duration::from_secs(report.clock)),
            report.position
        );
    }

    async fn report_event(&self, event: &Event, outcome: &Outcome) {
        let stamp = |secs: Option<u64>| {
            secs.map(|s| format_hms(Duration::from_secs(s)))
                .unwrap_or_else(|| "--:--:--".into())
        };
        let timeline = format!(
            "start={} assigned={} arrived={} extinguished={}",
            format_hms(event.time()),
            stamp(event.assigned_at()),
            stamp(event.arrived_at()),
            stamp(event.extinguished_at())
        );

        match outcome {
            Outcome::Extinguished => info!("[TELEMETRY] Event {} extinguished: {}", event, timeline),
            Outcome::InsufficientWater { needed, available } => warn!(
                "[TELEMETRY] Event {} left unresolved, needed {}L had {}L: {}",
                event, needed, available, timeline
            ),
            Outcome::Faulted(Fault::Corrupt) => info!(
                "[TELEMETRY] Event {} released for redispatch after corrupt packet: {}",
                event, timeline
            ),
            Outcome::Faulted(fault) => warn!(
                "[TELEMETRY] Event {} interrupted by {} fault: {}",
                event, fault, timeline
            ),
        }
    }
}
