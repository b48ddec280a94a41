//! Emberwatch Shared Types
//!
//! This crate provides the value types, fleet parameters and the drone state
//! machine shared by the dispatch side and the drone subsystem.

pub mod error;
pub mod state_machine;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use error::FleetError;

/// Physical parameters of the simulated fleet
pub mod params {
    /// Cruise speed in metres per second
    pub const TOP_SPEED_MPS: f64 = 20.0;

    /// Time to take off and reach cruise speed, in seconds
    pub const ACCELERATION_TIME_SECS: u64 = 5;

    /// Time spent releasing agent over a zone
    pub const DROP_TIME_SECS: u64 = 10;

    /// Time to refill the tank at base
    pub const REFILL_TIME_SECS: u64 = 20;

    /// Time to fully recharge the battery at base
    pub const RECHARGE_TIME_SECS: u64 = 60;

    /// Tank capacity in litres
    pub const MAX_WATER: u32 = 30;

    /// Battery capacity, expressed as seconds of flight
    pub const MAX_BATTERY_SECS: f64 = 600.0;

    /// Fraction of capacity below which a drone recharges after refilling
    pub const RECHARGE_THRESHOLD: f64 = 0.8;

    /// Default length of one cruise increment
    pub const CRUISE_STEP_SECS: u64 = 5;
}

/// A point on the simulation map, in metres
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    /// Location of the drone base
    pub const ORIGIN: Coordinate = Coordinate { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    pub fn midpoint(&self, other: &Coordinate) -> Coordinate {
        Coordinate::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    /// Move toward `target` by at most `distance` metres.
    ///
    /// Lands exactly on the target once it is within reach.
    pub fn step_toward(&self, target: &Coordinate, distance: f64) -> Coordinate {
        let remaining = self.distance_to(target);
        if remaining <= distance || remaining == 0.0 {
            return *target;
        }
        let ratio = distance / remaining;
        Coordinate::new(
            self.x + (target.x - self.x) * ratio,
            self.y + (target.y - self.y) * ratio,
        )
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1};{:.1})", self.x, self.y)
    }
}

/// Parses the zone feed notation `(x;y)`
impl FromStr for Coordinate {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FleetError::InvalidCoordinate(s.to_string());
        let inner = s
            .trim()
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(invalid)?;
        let (x, y) = inner.split_once(';').ok_or_else(invalid)?;
        let x = x.trim().parse::<f64>().map_err(|_| invalid())?;
        let y = y.trim().parse::<f64>().map_err(|_| invalid())?;
        Ok(Coordinate::new(x, y))
    }
}

/// A rectangular area that incidents are reported against
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    id: u32,
    start: Coordinate,
    end: Coordinate,
    center: Coordinate,
}

impl Zone {
    pub fn new(id: u32, start: Coordinate, end: Coordinate) -> Self {
        Self {
            id,
            start,
            end,
            center: start.midpoint(&end),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn start(&self) -> Coordinate {
        self.start
    }

    pub fn end(&self) -> Coordinate {
        self.end
    }

    /// Navigation target for drones sent to this zone
    pub fn center(&self) -> Coordinate {
        self.center
    }
}

/// Incident severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    High,
    Moderate,
    Low,
}

impl Severity {
    /// Dispatch priority; lower ranks are served first
    pub fn rank(self) -> u8 {
        match self {
            Severity::High => 0,
            Severity::Moderate => 1,
            Severity::Low => 2,
        }
    }

    /// Litres of agent needed to put out a fire of this severity
    pub fn water_required(self) -> u32 {
        match self {
            Severity::High => 30,
            Severity::Moderate => 20,
            Severity::Low => 10,
        }
    }

    /// True if this severity is served strictly before `other`
    pub fn outranks(self, other: Severity) -> bool {
        self.rank() < other.rank()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::High => write!(f, "High"),
            Severity::Moderate => write!(f, "Moderate"),
            Severity::Low => write!(f, "Low"),
        }
    }
}

impl FromStr for Severity {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "High" => Ok(Severity::High),
            "Moderate" => Ok(Severity::Moderate),
            "Low" => Ok(Severity::Low),
            other => Err(FleetError::UnknownSeverity(other.to_string())),
        }
    }
}

/// What the incident source observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    FireDetected,
    DroneRequest,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::FireDetected => write!(f, "FIRE_DETECTED"),
            EventKind::DroneRequest => write!(f, "DRONE_REQUEST"),
        }
    }
}

impl FromStr for EventKind {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FIRE_DETECTED" => Ok(EventKind::FireDetected),
            "DRONE_REQUEST" => Ok(EventKind::DroneRequest),
            other => Err(FleetError::UnknownEventKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Unresolved,
    Complete,
}

/// Fault injected into an event at intake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Drone gets stuck mid-flight and holds until cleared by an operator
    Stuck,
    /// Nozzle jams over the zone, nothing is dropped
    Jammed,
    /// Assignment packet arrives corrupted and must be re-dispatched
    Corrupt,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Stuck => write!(f, "Stuck"),
            Fault::Jammed => write!(f, "Jammed"),
            Fault::Corrupt => write!(f, "Corrupt"),
        }
    }
}

impl FromStr for Fault {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Stuck" => Ok(Fault::Stuck),
            "Jammed" => Ok(Fault::Jammed),
            "Corrupt" => Ok(Fault::Corrupt),
            other => Err(FleetError::UnknownFault(other.to_string())),
        }
    }
}

/// An incident reported against a zone
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    id: u64,
    time: Duration,
    zone_id: u32,
    /// Center of the owning zone, filled in at intake
    target: Option<Coordinate>,
    kind: EventKind,
    severity: Severity,
    status: EventStatus,
    fault: Option<Fault>,
    assigned_at: Option<u64>,
    arrived_at: Option<u64>,
    extinguished_at: Option<u64>,
}

impl Event {
    pub fn new(id: u64, time: Duration, zone_id: u32, kind: EventKind, severity: Severity) -> Self {
        Self {
            id,
            time,
            zone_id,
            target: None,
            kind,
            severity,
            status: EventStatus::Unresolved,
            fault: None,
            assigned_at: None,
            arrived_at: None,
            extinguished_at: None,
        }
    }

    /// Build an event from the raw kind and severity tokens of the event feed
    pub fn parse(
        id: u64,
        time: Duration,
        zone_id: u32,
        kind: &str,
        severity: &str,
    ) -> Result<Self, FleetError> {
        Ok(Self::new(id, time, zone_id, kind.parse()?, severity.parse()?))
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = Some(fault);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Time of creation, relative to the start of the simulation
    pub fn time(&self) -> Duration {
        self.time
    }

    pub fn zone_id(&self) -> u32 {
        self.zone_id
    }

    pub fn target(&self) -> Option<Coordinate> {
        self.target
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn status(&self) -> EventStatus {
        self.status
    }

    pub fn is_complete(&self) -> bool {
        self.status == EventStatus::Complete
    }

    pub fn fault(&self) -> Option<Fault> {
        self.fault
    }

    pub fn assigned_at(&self) -> Option<u64> {
        self.assigned_at
    }

    pub fn arrived_at(&self) -> Option<u64> {
        self.arrived_at
    }

    pub fn extinguished_at(&self) -> Option<u64> {
        self.extinguished_at
    }

    /// Attach the owning zone; the zone id must match
    pub fn resolve_zone(&mut self, zone: &Zone) -> Result<(), FleetError> {
        if zone.id() != self.zone_id {
            return Err(FleetError::UnknownZone(self.zone_id));
        }
        self.target = Some(zone.center());
        Ok(())
    }

    /// Mark the event complete. Returns false if it already was.
    pub fn complete(&mut self) -> bool {
        if self.is_complete() {
            return false;
        }
        self.status = EventStatus::Complete;
        true
    }

    pub fn clear_fault(&mut self) -> Option<Fault> {
        self.fault.take()
    }

    pub(crate) fn mark_assigned(&mut self, clock: u64) {
        self.assigned_at = Some(clock);
    }

    pub(crate) fn mark_arrived(&mut self, clock: u64) {
        self.arrived_at = Some(clock);
    }

    pub(crate) fn mark_extinguished(&mut self, clock: u64) {
        self.extinguished_at = Some(clock);
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} zone={} {} {}",
            self.id,
            format_hms(self.time),
            self.zone_id,
            self.kind,
            self.severity
        )?;
        if let Some(fault) = self.fault {
            write!(f, " fault={}", fault)?;
        }
        Ok(())
    }
}

/// Drone lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DroneState {
    Available,
    Ascending,
    Cruising,
    DropAgent,
    ReturningToBase,
    Refill,
    BatteryRecharging,
    /// Stuck in flight, waiting for an operator to clear it
    Stuck,
    NozzleJammed,
    PacketCorrupt,
}

impl DroneState {
    /// States in which a drone may switch to a more urgent event
    pub fn can_reroute(self) -> bool {
        matches!(self, DroneState::Ascending | DroneState::Cruising)
    }
}

impl fmt::Display for DroneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DroneState::Available => "AVAILABLE",
            DroneState::Ascending => "ASCENDING",
            DroneState::Cruising => "CRUISING",
            DroneState::DropAgent => "DROP_AGENT",
            DroneState::ReturningToBase => "RETURNING_TO_BASE",
            DroneState::Refill => "REFILL",
            DroneState::BatteryRecharging => "BATTERY_RECHARGING",
            DroneState::Stuck => "STUCK",
            DroneState::NozzleJammed => "NOZZLE_JAMMED",
            DroneState::PacketCorrupt => "PACKET_CORRUPT",
        };
        f.write_str(name)
    }
}

/// Format a duration as `HH:MM:SS`
pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_center_is_midpoint() {
        let zone = Zone::new(1, Coordinate::new(0.0, 0.0), Coordinate::new(700.0, 600.0));
        assert_eq!(zone.center(), Coordinate::new(350.0, 300.0));
    }

    #[test]
    fn test_coordinate_parse() {
        let c: Coordinate = "(650;1500)".parse().expect("parse failed");
        assert_eq!(c, Coordinate::new(650.0, 1500.0));
        assert!(matches!(
            "650;1500".parse::<Coordinate>(),
            Err(FleetError::InvalidCoordinate(_))
        ));
    }

    #[test]
    fn test_step_toward_lands_on_target() {
        let start = Coordinate::ORIGIN;
        let target = Coordinate::new(30.0, 40.0);
        assert_eq!(start.step_toward(&target, 25.0), Coordinate::new(15.0, 20.0));
        assert_eq!(start.step_toward(&target, 100.0), target);
    }

    #[test]
    fn test_severity_tokens_are_case_sensitive() {
        assert_eq!("High".parse::<Severity>(), Ok(Severity::High));
        assert_eq!(
            "high".parse::<Severity>(),
            Err(FleetError::UnknownSeverity("high".into()))
        );
        assert!("Severe".parse::<Severity>().is_err());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::High.outranks(Severity::Moderate));
        assert!(Severity::Moderate.outranks(Severity::Low));
        assert!(!Severity::Low.outranks(Severity::Low));
        assert_eq!(Severity::High.water_required(), 30);
        assert_eq!(Severity::Low.water_required(), 10);
    }

    #[test]
    fn test_event_parse_and_complete_once() {
        let mut event = Event::parse(1, Duration::from_secs(3615), 2, "FIRE_DETECTED", "Moderate")
            .expect("parse failed");
        assert_eq!(event.kind(), EventKind::FireDetected);
        assert_eq!(event.status(), EventStatus::Unresolved);
        assert!(event.complete());
        assert!(!event.complete());
        assert_eq!(event.status(), EventStatus::Complete);
        assert_eq!(event.to_string(), "#1 01:00:15 zone=2 FIRE_DETECTED Moderate");
    }

    #[test]
    fn test_event_parse_rejects_unknown_kind() {
        let result = Event::parse(1, Duration::ZERO, 1, "FIRE", "High");
        assert_eq!(result, Err(FleetError::UnknownEventKind("FIRE".into())));
    }

    #[test]
    fn test_resolve_zone_requires_matching_id() {
        let zone = Zone::new(3, Coordinate::ORIGIN, Coordinate::new(10.0, 10.0));
        let mut event = Event::new(1, Duration::ZERO, 4, EventKind::FireDetected, Severity::Low);
        assert_eq!(event.resolve_zone(&zone), Err(FleetError::UnknownZone(4)));
        assert!(event.target().is_none());
    }
}
