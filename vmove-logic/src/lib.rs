mod error;
mod geo;
mod movement;
mod provider;
mod reporting;
mod service;
mod settings;
mod sim_state;
#[cfg(test)]
mod tests;

pub use error::SimError;
pub use geo::{Coordinate, GeoPoint, correct, distance_km, out_of_china, to_offset_frame};
pub use movement::{MovementDriver, MovementSegment, plan, position_at};
pub use provider::{
    AccuracyClass, Fix, MockLocationRegistry, MockProviderLifecycle, PowerRequirement,
    ProviderProperties, ProviderState, UtcDT,
};
pub use reporting::{DirectSink, ReportingLoop, ReportingSink};
pub use service::{ServicePhase, ServiceStateMachine, StateListener};
pub use settings::{DEFAULT_PROVIDER_SOCKET, ReportingMode, SimulationSettings};
pub use sim_state::SimulationState;

pub mod prelude {
    use anyhow::Error as AnyhowError;
    use std::result::Result as StdResult;
    pub type Result<T = (), E = AnyhowError> = StdResult<T, E>;
    pub use anyhow::Context;
}
