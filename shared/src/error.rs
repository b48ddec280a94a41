//! Error types shared across the fleet

use thiserror::Error;

use crate::DroneState;

/// Errors raised by intake, dispatch and drone assignment
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FleetError {
    #[error("Unknown severity token: {0:?}")]
    UnknownSeverity(String),

    #[error("Unknown event kind token: {0:?}")]
    UnknownEventKind(String),

    #[error("Unknown fault token: {0:?}")]
    UnknownFault(String),

    #[error("Invalid coordinate {0:?}, expected (x;y)")]
    InvalidCoordinate(String),

    #[error("Unknown zone: {0}")]
    UnknownZone(u32),

    #[error("Event {0} has no resolved zone")]
    UnresolvedZone(u64),

    #[error("{drone} cannot accept an event while {state}")]
    DroneBusy { drone: String, state: DroneState },

    #[error("{drone} cannot switch to event {event}: {reason}")]
    RerouteRejected {
        drone: String,
        event: u64,
        reason: &'static str,
    },
}
