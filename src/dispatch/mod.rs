//! Dispatch side of the fleet
//!
//! This module handles:
//! - Ordering pending events by severity
//! - Zone resolution at intake
//! - Re-dispatch of released events and confirmation of finished ones

mod queue;
mod scheduler;

pub use queue::DispatchQueue;
pub use scheduler::Scheduler;
