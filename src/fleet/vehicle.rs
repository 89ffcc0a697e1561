use super::VehicleID;
use crate::mission::TaskID;
use crate::telemetry::messages::TelemetryRecord;
use crate::util::{History, Vec3D};
use chrono::{DateTime, Utc};
use strum_macros::Display;

/// The failure channel that took a vehicle out of the operational set.
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "snake_case")]
pub enum FailureMode {
    /// No telemetry within the timeout threshold.
    Timeout,
    /// Discharge rate above the configured threshold.
    BatteryAnomaly,
    /// Position jump inconsistent with feasible motion.
    PositionAnomaly,
    /// Altitude outside the safe envelope.
    AltitudeViolation,
}

/// Per-vehicle special permissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VehiclePermissions {
    /// When set, the grid-boundary predicate is bypassed for this vehicle.
    pub may_exit_grid: bool,
}

/// Runtime record of one registered vehicle, owned exclusively by the fleet
/// monitor. External consumers only ever see the copies inside a
/// [`FleetState`](super::FleetState) snapshot.
///
/// A record that left the operational set never returns to it within the same
/// monitor instance; recovery is modeled as a fresh registration.
#[derive(Debug)]
pub struct VehicleStatus {
    pub(crate) id: VehicleID,
    pub(crate) connected: bool,
    pub(crate) operational: bool,
    pub(crate) last_telemetry: DateTime<Utc>,
    pub(crate) position: Vec3D<f64>,
    /// Attitude quaternion `[w, x, y, z]`.
    pub(crate) attitude: [f64; 4],
    pub(crate) battery_soc: f64,
    pub(crate) payload_capacity: f64,
    pub(crate) active_tasks: Vec<TaskID>,
    pub(crate) failure_mode: Option<FailureMode>,
    pub(crate) permissions: VehiclePermissions,
    /// `(timestamp, soc)` samples, newest first, for the discharge detector.
    pub(crate) battery_history: History<(DateTime<Utc>, f64)>,
    /// Recent positions, newest first, for the discontinuity detector.
    pub(crate) position_history: History<Vec3D<f64>>,
}

impl VehicleStatus {
    /// 30 seconds of battery samples at the nominal 2 Hz poll rate.
    pub(crate) const BATTERY_HISTORY_LEN: usize = 60;
    pub(crate) const POSITION_HISTORY_LEN: usize = 10;

    pub fn new(id: VehicleID, now: DateTime<Utc>) -> Self {
        Self {
            id,
            connected: true,
            operational: true,
            last_telemetry: now,
            position: Vec3D::zero(),
            attitude: [1.0, 0.0, 0.0, 0.0],
            battery_soc: 100.0,
            payload_capacity: 0.0,
            active_tasks: Vec::new(),
            failure_mode: None,
            permissions: VehiclePermissions::default(),
            battery_history: History::new(Self::BATTERY_HISTORY_LEN),
            position_history: History::new(Self::POSITION_HISTORY_LEN),
        }
    }

    /// Folds one telemetry sample into the record and both histories.
    pub(crate) fn update_telemetry(&mut self, record: &TelemetryRecord, now: DateTime<Utc>) {
        self.connected = true;
        self.last_telemetry = now;
        self.position = record.position();
        self.attitude = record.attitude();
        self.battery_soc = record.battery_soc();
        self.payload_capacity = record.payload_capacity();
        self.active_tasks = record.active_tasks().to_vec();
        self.battery_history.push((now, self.battery_soc));
        self.position_history.push(self.position);
    }

    /// Takes the vehicle out of the operational set. Irreversible for this
    /// record.
    pub(crate) fn mark_failed(&mut self, mode: FailureMode) {
        self.operational = false;
        self.failure_mode = Some(mode);
    }

    pub fn id(&self) -> VehicleID { self.id }

    pub fn is_connected(&self) -> bool { self.connected }

    pub fn is_operational(&self) -> bool { self.operational }

    pub fn last_telemetry(&self) -> DateTime<Utc> { self.last_telemetry }

    pub fn position(&self) -> Vec3D<f64> { self.position }

    pub fn attitude(&self) -> [f64; 4] { self.attitude }

    pub fn battery_soc(&self) -> f64 { self.battery_soc }

    pub fn payload_capacity(&self) -> f64 { self.payload_capacity }

    pub fn active_tasks(&self) -> &[TaskID] { &self.active_tasks }

    pub fn failure_mode(&self) -> Option<FailureMode> { self.failure_mode }

    pub fn permissions(&self) -> VehiclePermissions { self.permissions }
}
