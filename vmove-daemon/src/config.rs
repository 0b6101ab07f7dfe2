use std::path::Path;

use log::info;
use vmove_logic::SimulationSettings;

use crate::prelude::*;

/// Read settings from a JSON file, or use the defaults if no file was given.
/// Fields missing from the file keep their default values.
pub fn load_settings(path: Option<&Path>) -> Result<SimulationSettings> {
    let Some(path) = path else {
        return Ok(SimulationSettings::default());
    };

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let settings = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;

    info!("Loaded settings from {}", path.display());

    Ok(settings)
}
