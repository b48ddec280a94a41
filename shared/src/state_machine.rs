//! Drone State Machine
//!
//! Each drone walks one event through its full lifecycle:
//! AVAILABLE -> ASCENDING -> CRUISING -> DROP_AGENT -> RETURNING_TO_BASE ->
//! REFILL -> (BATTERY_RECHARGING) -> AVAILABLE.
//! Faults carried by the event divert the drone into a dedicated fault state
//! that is resolved by a single handling step.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::{params, Coordinate, DroneState, Event, Fault, FleetError};

/// Hands out drone ids, starting at 1. Ids are never reused.
#[derive(Debug)]
pub struct DroneIds {
    next: AtomicU32,
}

static PROCESS_IDS: DroneIds = DroneIds::new();

impl DroneIds {
    pub const fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    /// Allocator shared by every fleet in the process
    pub fn global() -> &'static DroneIds {
        &PROCESS_IDS
    }

    pub fn allocate(&self) -> u32 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for DroneIds {
    fn default() -> Self {
        Self::new()
    }
}

/// How an event left the drone that handled it
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Agent dropped, event complete
    Extinguished,
    /// Tank held less than the severity requires; the event stays unresolved
    InsufficientWater { needed: u32, available: u32 },
    /// A fault interrupted the mission
    Faulted(Fault),
}

/// What happened during a single `advance` call
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Nothing assigned, nothing to do
    Idle,
    Assigned { event: u64 },
    Departed,
    Cruising { remaining_secs: u64 },
    Arrived { event: u64 },
    Extinguished { event: u64, water_used: u32 },
    InsufficientWater { event: u64, needed: u32, available: u32 },
    FaultDetected(Fault),
    /// Still waiting on an operator to clear the fault
    FaultHeld(Fault),
    FaultResolved(Fault),
    Returned { travel_secs: u64 },
    Refilled,
    Recharged,
}

/// Result of one state transition
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: DroneState,
    pub to: DroneState,
    pub notice: Notice,
}

/// An event the drone refused, handed back to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub reason: FleetError,
    pub event: Event,
}

/// Point-in-time copy of a drone for telemetry readers
#[derive(Debug, Clone, PartialEq)]
pub struct DroneSnapshot {
    pub id: u32,
    pub name: String,
    pub state: DroneState,
    pub position: Coordinate,
    pub clock: u64,
    pub water: u32,
    pub battery: f64,
    pub current_event: Option<u64>,
}

/// A single firefighting drone
#[derive(Debug)]
pub struct Drone {
    id: u32,
    name: String,
    position: Coordinate,
    state: DroneState,
    assigned: Option<Event>,
    current: Option<Event>,
    completed: Option<Event>,
    outcome: Option<Outcome>,
    battery: f64,
    water: u32,
    /// Simulated clock in whole seconds
    clock: u64,
    cruise_step_secs: u64,
    fault_cleared: bool,
}

impl Drone {
    /// Create a drone at base with full supplies
    pub fn new(ids: &DroneIds) -> Self {
        let id = ids.allocate();
        Self {
            id,
            name: format!("Drone{}", id),
            position: Coordinate::ORIGIN,
            state: DroneState::Available,
            assigned: None,
            current: None,
            completed: None,
            outcome: None,
            battery: params::MAX_BATTERY_SECS,
            water: params::MAX_WATER,
            clock: 0,
            cruise_step_secs: params::CRUISE_STEP_SECS,
            fault_cleared: false,
        }
    }

    pub fn with_cruise_step(mut self, secs: u64) -> Self {
        self.cruise_step_secs = secs.max(1);
        self
    }

    /// Override the starting supplies, clamped to capacity
    pub fn with_supplies(mut self, water: u32, battery: f64) -> Self {
        self.water = water.min(params::MAX_WATER);
        self.battery = battery.clamp(0.0, params::MAX_BATTERY_SECS);
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> DroneState {
        self.state
    }

    pub fn position(&self) -> Coordinate {
        self.position
    }

    pub fn water(&self) -> u32 {
        self.water
    }

    pub fn battery(&self) -> f64 {
        self.battery
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn assigned(&self) -> Option<&Event> {
        self.assigned.as_ref()
    }

    pub fn current(&self) -> Option<&Event> {
        self.current.as_ref()
    }

    pub fn completed(&self) -> Option<&Event> {
        self.completed.as_ref()
    }

    /// True when the drone is at rest with no event on hand
    pub fn can_accept(&self) -> bool {
        self.state == DroneState::Available && self.assigned.is_none() && self.current.is_none()
    }

    pub fn snapshot(&self) -> DroneSnapshot {
        DroneSnapshot {
            id: self.id,
            name: self.name.clone(),
            state: self.state,
            position: self.position,
            clock: self.clock,
            water: self.water,
            battery: self.battery,
            current_event: self.current.as_ref().map(Event::id),
        }
    }

    /// Hand an event to the drone. Only accepted while AVAILABLE and idle.
    pub fn assign(&mut self, event: Event) -> Result<(), Rejected> {
        if !self.can_accept() {
            return Err(Rejected {
                reason: FleetError::DroneBusy {
                    drone: self.name.clone(),
                    state: self.state,
                },
                event,
            });
        }
        if event.target().is_none() {
            return Err(Rejected {
                reason: FleetError::UnresolvedZone(event.id()),
                event,
            });
        }
        self.assigned = Some(event);
        Ok(())
    }

    /// Switch to a more urgent event while still outbound.
    ///
    /// Returns the displaced event so it can be dispatched again.
    pub fn reroute(&mut self, mut event: Event) -> Result<Event, Rejected> {
        let reject = |drone: &Drone, event: Event, reason: &'static str| Rejected {
            reason: FleetError::RerouteRejected {
                drone: drone.name.clone(),
                event: event.id(),
                reason,
            },
            event,
        };

        if !self.state.can_reroute() {
            return Err(reject(self, event, "not outbound"));
        }
        let current_severity = match &self.current {
            Some(current) => current.severity(),
            None => return Err(reject(self, event, "no current event")),
        };
        if !event.severity().outranks(current_severity) {
            return Err(reject(self, event, "not more urgent"));
        }
        if event.target().is_none() {
            return Err(Rejected {
                reason: FleetError::UnresolvedZone(event.id()),
                event,
            });
        }

        event.mark_assigned(self.clock);
        match self.current.as_mut() {
            Some(current) => Ok(std::mem::replace(current, event)),
            None => Err(reject(self, event, "no current event")),
        }
    }

    /// Operator clears a STUCK drone. Returns false if the drone is not stuck.
    pub fn clear_fault(&mut self) -> bool {
        if self.state != DroneState::Stuck {
            return false;
        }
        self.fault_cleared = true;
        true
    }

    /// Remove the last handled event together with its outcome
    pub fn take_completed(&mut self) -> Option<(Event, Outcome)> {
        match (self.completed.take(), self.outcome.take()) {
            (Some(event), Some(outcome)) => Some((event, outcome)),
            _ => None,
        }
    }

    /// Perform one state transition
    pub fn advance(&mut self) -> Transition {
        let from = self.state;
        let notice = match self.state {
            DroneState::Available => self.begin_assignment(),
            DroneState::Ascending => {
                self.clock += params::ACCELERATION_TIME_SECS;
                self.state = DroneState::Cruising;
                Notice::Departed
            }
            DroneState::Cruising => self.cruise(),
            DroneState::DropAgent => self.drop_agent(),
            DroneState::ReturningToBase => self.return_to_base(),
            DroneState::Refill => self.refill(),
            DroneState::BatteryRecharging => {
                self.clock += params::RECHARGE_TIME_SECS;
                self.battery = params::MAX_BATTERY_SECS;
                self.state = DroneState::Available;
                Notice::Recharged
            }
            DroneState::Stuck => self.hold_stuck(),
            DroneState::NozzleJammed => {
                self.outcome = Some(Outcome::Faulted(Fault::Jammed));
                self.state = DroneState::ReturningToBase;
                Notice::FaultResolved(Fault::Jammed)
            }
            DroneState::PacketCorrupt => self.release_corrupt(),
        };

        Transition {
            from,
            to: self.state,
            notice,
        }
    }

    fn begin_assignment(&mut self) -> Notice {
        let Some(mut event) = self.assigned.take() else {
            return Notice::Idle;
        };
        event.mark_assigned(self.clock);
        let id = event.id();
        let corrupt = event.fault() == Some(Fault::Corrupt);
        self.current = Some(event);
        self.outcome = None;

        if corrupt {
            self.state = DroneState::PacketCorrupt;
            return Notice::FaultDetected(Fault::Corrupt);
        }
        self.state = DroneState::Ascending;
        Notice::Assigned { event: id }
    }

    /// One bounded increment toward the current target.
    ///
    /// The remaining distance is recomputed from the current event every time,
    /// so a reroute takes effect on the next increment.
    fn cruise(&mut self) -> Notice {
        let (id, target, fault) = match &self.current {
            Some(event) => (
                event.id(),
                event.target().unwrap_or(Coordinate::ORIGIN),
                event.fault(),
            ),
            None => {
                self.state = DroneState::ReturningToBase;
                return Notice::Idle;
            }
        };

        match fault {
            Some(Fault::Stuck) => {
                self.fault_cleared = false;
                self.state = DroneState::Stuck;
                return Notice::FaultDetected(Fault::Stuck);
            }
            Some(Fault::Corrupt) => {
                self.state = DroneState::PacketCorrupt;
                return Notice::FaultDetected(Fault::Corrupt);
            }
            _ => {}
        }

        let remaining = travel_time(&self.position, &target);
        let step = remaining.min(self.cruise_step_secs as f64);
        self.position = self.position.step_toward(&target, step * params::TOP_SPEED_MPS);
        self.clock += step.ceil() as u64;

        if self.position == target {
            if let Some(event) = self.current.as_mut() {
                event.mark_arrived(self.clock);
            }
            self.state = DroneState::DropAgent;
            return Notice::Arrived { event: id };
        }

        Notice::Cruising {
            remaining_secs: (remaining - step).ceil() as u64,
        }
    }

    fn drop_agent(&mut self) -> Notice {
        self.state = DroneState::ReturningToBase;
        let clock = self.clock;
        let Some(event) = self.current.as_mut() else {
            return Notice::Idle;
        };

        if event.fault() == Some(Fault::Jammed) {
            self.state = DroneState::NozzleJammed;
            return Notice::FaultDetected(Fault::Jammed);
        }

        let needed = event.severity().water_required();
        if self.water < needed {
            // Not enough agent: give up on this event and head home
            self.outcome = Some(Outcome::InsufficientWater {
                needed,
                available: self.water,
            });
            return Notice::InsufficientWater {
                event: event.id(),
                needed,
                available: self.water,
            };
        }

        let done_at = clock + params::DROP_TIME_SECS;
        event.complete();
        event.mark_extinguished(done_at);
        let id = event.id();

        self.water -= needed;
        self.clock = done_at;
        self.drain(params::DROP_TIME_SECS);
        self.outcome = Some(Outcome::Extinguished);
        Notice::Extinguished {
            event: id,
            water_used: needed,
        }
    }

    fn return_to_base(&mut self) -> Notice {
        let travel_secs = travel_time(&self.position, &Coordinate::ORIGIN).round() as u64;
        self.clock += travel_secs;
        self.drain(travel_secs);
        self.position = Coordinate::ORIGIN;

        if let Some(event) = self.current.take() {
            self.completed = Some(event);
        }
        self.assigned = None;
        self.state = DroneState::Refill;
        Notice::Returned { travel_secs }
    }

    fn refill(&mut self) -> Notice {
        self.clock += params::REFILL_TIME_SECS;
        self.water = params::MAX_WATER;
        self.state = if self.battery < params::MAX_BATTERY_SECS * params::RECHARGE_THRESHOLD {
            DroneState::BatteryRecharging
        } else {
            DroneState::Available
        };
        Notice::Refilled
    }

    fn hold_stuck(&mut self) -> Notice {
        if !self.fault_cleared {
            return Notice::FaultHeld(Fault::Stuck);
        }
        self.fault_cleared = false;
        self.outcome = Some(Outcome::Faulted(Fault::Stuck));
        self.state = DroneState::ReturningToBase;
        Notice::FaultResolved(Fault::Stuck)
    }

    /// Drop the corrupted assignment so it can be dispatched again clean
    fn release_corrupt(&mut self) -> Notice {
        if let Some(mut event) = self.current.take() {
            event.clear_fault();
            self.completed = Some(event);
            self.outcome = Some(Outcome::Faulted(Fault::Corrupt));
        }
        self.assigned = None;
        // A reroute can hand over a corrupt event mid-flight
        self.state = if self.position == Coordinate::ORIGIN {
            DroneState::Available
        } else {
            DroneState::ReturningToBase
        };
        Notice::FaultResolved(Fault::Corrupt)
    }

    fn drain(&mut self, secs: u64) {
        self.battery = (self.battery - secs as f64).max(0.0);
    }
}

/// Seconds needed to fly between two points at top speed
pub fn travel_time(from: &Coordinate, to: &Coordinate) -> f64 {
    from.distance_to(to) / params::TOP_SPEED_MPS
}

/// Seconds from standstill at `from` until arrival over `to`
pub fn arrival_time(from: &Coordinate, to: &Coordinate) -> f64 {
    travel_time(from, to) + params::ACCELERATION_TIME_SECS as f64
}
