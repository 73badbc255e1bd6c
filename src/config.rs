//! Run configuration assembled from the command line.

use std::path::PathBuf;

use log::warn;

use crate::scenario::Scenario;
use crate::simulation::channel::CollisionMatrix;

/// Error type for invalid run configuration. Fatal: the simulation never
/// starts.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationError(pub String);

impl std::fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid configuration: {}", self.0)
    }
}

impl std::error::Error for ConfigurationError {}

/// Fully resolved configuration of one simulation run.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Number of end devices.
    pub n_devices: u32,
    /// Number of gateways.
    pub n_gateways: u32,
    /// Application traffic window; also the per-device traffic period, as in
    /// the reference scenario.
    pub simulation_time_secs: f64,
    pub collision_matrix: CollisionMatrix,
    /// Optional mobility trace. No trace means every node stays at its
    /// construction-time position.
    pub trace_file: Option<PathBuf>,
    /// Seed for device start offsets and shadowing.
    pub seed: u64,
    /// Radio and physics parameters.
    pub scenario: Scenario,
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.n_devices == 0 {
            return Err(ConfigurationError("device count must be positive".to_string()));
        }
        if self.n_gateways == 0 {
            return Err(ConfigurationError("gateway count must be positive".to_string()));
        }
        if !self.simulation_time_secs.is_finite() || self.simulation_time_secs <= 0.0 {
            return Err(ConfigurationError(format!(
                "simulation time must be positive, found {}",
                self.simulation_time_secs
            )));
        }
        Ok(())
    }
}

/// Resolve an interference matrix name from the command line.
///
/// An unrecognised name keeps the current default with a warning instead of
/// failing, preserving the reference behaviour.
pub fn resolve_collision_matrix(name: &str) -> CollisionMatrix {
    match CollisionMatrix::from_name(name) {
        Some(matrix) => matrix,
        None => {
            let fallback = CollisionMatrix::default();
            warn!("Unknown interference matrix '{name}', keeping default '{fallback}' (expected 'aloha' or 'goursaud')");
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> SimulationConfig {
        SimulationConfig {
            n_devices: 50,
            n_gateways: 1,
            simulation_time_secs: 50.0,
            collision_matrix: CollisionMatrix::Aloha,
            trace_file: None,
            seed: 1,
            scenario: Scenario::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn zero_counts_and_nonpositive_time_are_rejected() {
        let mut config = base_config();
        config.n_devices = 0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.n_gateways = 0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.simulation_time_secs = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_matrix_name_falls_back_to_default() {
        assert_eq!(resolve_collision_matrix("goursaud"), CollisionMatrix::Goursaud);
        assert_eq!(resolve_collision_matrix("capture"), CollisionMatrix::Aloha);
    }
}
