//! Packages exchanged through the mailbox

use emberwatch_shared::{state_machine::Outcome, Event, Fault};

/// Logical recipients of mailbox traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// Dispatch side: incident intake and completion reports
    Scheduler,
    /// Control traffic for the drone subsystem
    DroneSubsystem,
    /// Confirmations back to the incident source
    FireIncident,
}

impl Destination {
    pub const ALL: [Destination; 3] = [
        Destination::Scheduler,
        Destination::DroneSubsystem,
        Destination::FireIncident,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            Destination::Scheduler => 0,
            Destination::DroneSubsystem => 1,
            Destination::FireIncident => 2,
        }
    }
}

/// A handled event together with how it ended
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub drone: String,
    pub event: Event,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Package {
    /// New incident from the source
    Incident(Event),
    /// Drone finished with an event
    Completion(Completion),
    /// Final word on an event, for the incident source
    Confirmation(Completion),
    /// A drone entered a fault state that needs an operator
    FaultAlert { drone: u32, name: String, fault: Fault },
    /// Operator cleared a stuck drone
    ClearFault { drone: u32 },
}
