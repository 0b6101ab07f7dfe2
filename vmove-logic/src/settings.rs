use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Local socket name the delegated provider host listens on by default
pub const DEFAULT_PROVIDER_SOCKET: &str = "vmove-provider.sock";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// Where the reporting loop sends positions
pub enum ReportingMode {
    /// Correct positions and push them to a mock provider in this process
    #[default]
    Direct,
    /// Forward uncorrected positions to a provider host process listening on `socket`, which
    /// corrects and pushes them
    Delegated { socket: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Settings for a simulation, missing fields fall back to [SimulationSettings::default]
pub struct SimulationSettings {
    /// Name of the mock provider registered with the host
    pub provider_name: String,
    /// Time between position reports
    pub tick_interval_ms: u64,
    /// Accuracy radius reported with every fix, in meters
    pub accuracy_m: f32,
    /// Altitude reported with every fix, in meters
    pub altitude_m: f64,
    /// Speed used when moving towards a destination
    pub speed_kmh: f64,
    /// Time between movement animation steps
    pub animation_interval_ms: u64,
    /// Whether to report directly or through a provider host
    pub mode: ReportingMode,
}

impl SimulationSettings {
    // Zero periods would spin (or panic in tokio::time::interval)
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn animation_interval(&self) -> Duration {
        Duration::from_millis(self.animation_interval_ms.max(1))
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            provider_name: "gps".to_string(),
            tick_interval_ms: 1000,
            accuracy_m: 1.0,
            altitude_m: 30.0,
            speed_kmh: 80.0,
            animation_interval_ms: 100,
            mode: ReportingMode::Direct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_use_defaults() {
        let settings: SimulationSettings =
            serde_json::from_str(r#"{"speed_kmh": 5.0, "mode": {"kind": "delegated", "socket": "x.sock"}}"#)
                .unwrap();

        assert_eq!(settings.speed_kmh, 5.0);
        assert_eq!(settings.tick_interval(), Duration::from_secs(1));
        assert_eq!(settings.provider_name, "gps");
        assert_eq!(
            settings.mode,
            ReportingMode::Delegated {
                socket: "x.sock".into()
            }
        );
    }
}
