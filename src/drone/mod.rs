//! Drone subsystem: one task per drone plus a control task for operator traffic

mod subsystem;
mod worker;

pub use subsystem::DroneSubsystem;
