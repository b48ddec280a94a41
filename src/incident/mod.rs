//! Incident source: timed release of events and collection of confirmations

mod source;

pub use source::IncidentSource;
