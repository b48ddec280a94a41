//! Inter-component mailboxes
//!
//! This module handles:
//! - Per-destination FIFO queues with blocking takes
//! - The packages exchanged between the incident source, the scheduler and
//!   the drone subsystem

mod buffer;
mod package;

pub use buffer::{Mailbox, Take};
pub use package::{Completion, Destination, Package};
