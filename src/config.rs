//! Run configuration

use anyhow::{Context, Result};
use emberwatch_shared::params;
use std::time::Duration;

/// Configuration for a simulation run
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Number of drones in the subsystem
    pub drone_count: usize,
    /// Real time paused per simulated second; zero runs flat out
    pub time_scale: Duration,
    /// Length of one cruise increment in simulated seconds
    pub cruise_step_secs: u64,
    /// Delay before the simulated operator clears a stuck drone
    pub auto_clear_stuck: Option<Duration>,
    /// How long the incident source waits for outstanding confirmations
    pub confirm_timeout: Option<Duration>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            drone_count: 3,
            time_scale: Duration::from_millis(2),
            cruise_step_secs: params::CRUISE_STEP_SECS,
            auto_clear_stuck: Some(Duration::from_millis(500)),
            confirm_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl FleetConfig {
    /// Defaults overridden by `EMBERWATCH_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(drones) = env_var("EMBERWATCH_DRONES") {
            config.drone_count = drones
                .parse()
                .with_context(|| format!("EMBERWATCH_DRONES must be a count, got {:?}", drones))?;
        }
        if let Some(scale) = env_var("EMBERWATCH_TIME_SCALE_MS") {
            let millis: u64 = scale
                .parse()
                .with_context(|| format!("EMBERWATCH_TIME_SCALE_MS must be milliseconds, got {:?}", scale))?;
            config.time_scale = Duration::from_millis(millis);
        }
        if let Some(step) = env_var("EMBERWATCH_CRUISE_STEP_SECS") {
            config.cruise_step_secs = step
                .parse()
                .with_context(|| format!("EMBERWATCH_CRUISE_STEP_SECS must be seconds, got {:?}", step))?;
        }

        anyhow::ensure!(config.drone_count > 0, "at least one drone is required");
        Ok(config)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FleetConfig::default();
        assert_eq!(config.drone_count, 3);
        assert_eq!(config.cruise_step_secs, params::CRUISE_STEP_SECS);
        assert!(config.auto_clear_stuck.is_some());
    }
}
