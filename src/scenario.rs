//! Built-in demonstration scenario

use anyhow::{Context, Result};
use emberwatch_shared::{Coordinate, Event, Fault, Zone};
use std::time::Duration;

/// Zone id, start corner, end corner
const ZONES: &[(u32, &str, &str)] = &[
    (1, "(0;0)", "(700;600)"),
    (2, "(0;600)", "(650;1500)"),
    (3, "(650;0)", "(2000;1000)"),
    (4, "(650;1000)", "(2000;1500)"),
];

/// Time, zone id, kind, severity, injected fault
const EVENTS: &[(&str, u32, &str, &str, Option<&str>)] = &[
    ("14:03:15", 3, "FIRE_DETECTED", "High", None),
    ("14:03:40", 1, "DRONE_REQUEST", "Moderate", None),
    ("14:04:10", 2, "FIRE_DETECTED", "Low", Some("Corrupt")),
    ("14:05:00", 4, "FIRE_DETECTED", "High", None),
    ("14:05:30", 1, "FIRE_DETECTED", "Moderate", Some("Stuck")),
    ("14:06:20", 3, "DRONE_REQUEST", "Low", None),
    ("14:07:00", 2, "FIRE_DETECTED", "High", Some("Jammed")),
    ("14:08:45", 4, "DRONE_REQUEST", "Moderate", None),
];

pub fn zones() -> Result<Vec<Zone>> {
    ZONES
        .iter()
        .map(|&(id, start, end)| {
            let start: Coordinate = start.parse().with_context(|| format!("zone {}", id))?;
            let end: Coordinate = end.parse().with_context(|| format!("zone {}", id))?;
            Ok(Zone::new(id, start, end))
        })
        .collect()
}

pub fn events() -> Result<Vec<Event>> {
    EVENTS
        .iter()
        .zip(1u64..)
        .map(|(&(time, zone, kind, severity, fault), id)| {
            let mut event = Event::parse(id, parse_time(time)?, zone, kind, severity)
                .with_context(|| format!("event {} at {}", id, time))?;
            if let Some(fault) = fault {
                let fault: Fault = fault
                    .parse()
                    .with_context(|| format!("event {} at {}", id, time))?;
                event = event.with_fault(fault);
            }
            Ok(event)
        })
        .collect()
}

/// Parse `HH:MM:SS` into time since midnight
pub fn parse_time(raw: &str) -> Result<Duration> {
    let parts = raw
        .split(':')
        .map(|part| part.parse::<u64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("invalid time {:?}", raw))?;

    match parts.as_slice() {
        &[h, m, s] if m < 60 && s < 60 => Ok(Duration::from_secs(h * 3600 + m * 60 + s)),
        _ => anyhow::bail!("invalid time {:?}, expected HH:MM:SS", raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emberwatch_shared::format_hms;

    #[test]
    fn test_scenario_parses() {
        let zones = zones().expect("zones should parse");
        let events = events().expect("events should parse");
        assert_eq!(zones.len(), 4);
        assert_eq!(events.len(), 8);
        assert!(events
            .iter()
            .all(|event| zones.iter().any(|zone| zone.id() == event.zone_id())));
        assert_eq!(events[2].fault(), Some(Fault::Corrupt));
    }

    #[test]
    fn test_parse_time() {
        let time = parse_time("14:03:15").expect("valid time");
        assert_eq!(format_hms(time), "14:03:15");
        assert!(parse_time("14:61:00").is_err());
        assert!(parse_time("14:03").is_err());
        assert!(parse_time("noon").is_err());
    }
}
