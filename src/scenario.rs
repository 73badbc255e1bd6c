//! Scenario loading, parsing, and validation.
//!
//! The scenario file is an optional JSON document overriding the radio and
//! physics parameters of the run: path loss model, LoRa modulation settings,
//! transmit power, payload size, and gateway placement. Every field has a
//! default reproducing the reference ALOHA throughput setup, so the file may
//! specify only what it changes.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::simulation::signal_calculations::{LoraParameters, PathLossParameters};
use crate::simulation::types::Point3;

/// Error type for scenario loading failures.
#[derive(Debug)]
pub enum ScenarioLoadError {
    FileReadError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ScenarioLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioLoadError::FileReadError(msg) => write!(f, "Failed to read file: {}", msg),
            ScenarioLoadError::ParseError(msg) => write!(f, "Failed to parse JSON: {}", msg),
            ScenarioLoadError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ScenarioLoadError {}

fn default_tx_power_dbm() -> f64 {
    14.0
}

fn default_payload_size() -> usize {
    50
}

fn default_gateway_position() -> Point3 {
    Point3::new(0.0, 0.0, 15.0)
}

/// Radio and physics parameters of a simulation run.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Path loss model parameters for the physical layer.
    #[serde(default)]
    pub path_loss_parameters: PathLossParameters,
    /// LoRa modulation parameters shared by all links.
    #[serde(default)]
    pub lora_parameters: LoraParameters,
    /// End device transmit power in dBm.
    #[serde(default = "default_tx_power_dbm")]
    pub tx_power_dbm: f64,
    /// Application payload size in bytes.
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,
    /// Explicit gateway positions. Gateways beyond this list use the default
    /// placement at (0, 0, 15) meters.
    #[serde(default)]
    pub gateway_positions: Vec<Point3>,
}

impl Default for Scenario {
    fn default() -> Self {
        Scenario {
            path_loss_parameters: PathLossParameters::default(),
            lora_parameters: LoraParameters::default(),
            tx_power_dbm: default_tx_power_dbm(),
            payload_size: default_payload_size(),
            gateway_positions: Vec::new(),
        }
    }
}

impl Scenario {
    /// Position for the `index`-th gateway.
    pub fn gateway_position(&self, index: usize) -> Point3 {
        self.gateway_positions.get(index).copied().unwrap_or_else(default_gateway_position)
    }
}

/// Load and validate a scenario from a JSON file.
pub fn load_scenario(path: &Path) -> Result<Scenario, ScenarioLoadError> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))
        .map_err(|e| ScenarioLoadError::FileReadError(e.to_string()))?;

    let scenario: Scenario = serde_json::from_str(&data)
        .context("Invalid JSON format")
        .map_err(|e| ScenarioLoadError::ParseError(e.to_string()))?;

    validate_scenario(&scenario).map_err(ScenarioLoadError::ValidationError)?;

    Ok(scenario)
}

/// Validate scenario parameters.
pub fn validate_scenario(scenario: &Scenario) -> Result<(), String> {
    const MIN_TX_POWER: f64 = -50.0;
    const MAX_TX_POWER: f64 = 50.0;
    const MAX_PAYLOAD: usize = 255;

    if scenario.tx_power_dbm < MIN_TX_POWER || scenario.tx_power_dbm > MAX_TX_POWER {
        return Err(format!(
            "tx_power_dbm {} outside realistic range ({} to {} dBm)",
            scenario.tx_power_dbm, MIN_TX_POWER, MAX_TX_POWER
        ));
    }
    if scenario.payload_size == 0 || scenario.payload_size > MAX_PAYLOAD {
        return Err(format!("payload_size {} must be within 1-{}", scenario.payload_size, MAX_PAYLOAD));
    }

    let path_loss = &scenario.path_loss_parameters;
    if path_loss.path_loss_exponent <= 0.0 {
        return Err("Invalid path_loss_exponent, must be positive".to_string());
    }
    if path_loss.reference_distance <= 0.0 {
        return Err("Invalid reference_distance, must be positive".to_string());
    }
    if path_loss.shadowing_sigma < 0.0 {
        return Err("Invalid shadowing_sigma, must be non-negative".to_string());
    }

    let lora = &scenario.lora_parameters;
    if lora.bandwidth == 0 {
        return Err("Invalid bandwidth, must be positive".to_string());
    }
    if lora.coding_rate < 1 || lora.coding_rate > 4 {
        return Err(format!("Invalid coding_rate {}, must be 1-4 (representing 4/5 to 4/8)", lora.coding_rate));
    }
    if lora.preamble_symbols < 0.0 {
        return Err("Invalid preamble_symbols, must be non-negative".to_string());
    }

    Ok(())
}
