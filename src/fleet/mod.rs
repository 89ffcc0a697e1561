//! Per-vehicle runtime state, the telemetry polling loop with its failure
//! detectors, and the immutable fleet snapshot consumed by the decision
//! engine.

mod monitor;
mod state;
mod vehicle;


/// Stable unique identifier of one vehicle.
pub type VehicleID = usize;

pub use monitor::{FailureCallback, FleetMonitor, MonitorError};
pub use state::FleetState;
pub use vehicle::{FailureMode, VehiclePermissions, VehicleStatus};
