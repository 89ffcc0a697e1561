use super::VehicleID;
use super::vehicle::VehiclePermissions;
use crate::mission::TaskID;
use crate::util::Vec3D;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Immutable fleet snapshot handed into the OODA cycle.
///
/// Produced by value by the fleet monitor; later telemetry never mutates a
/// decision in flight. Vehicle id lists are sorted ascending and the lost
/// task list is sorted and deduplicated so downstream consumers iterate
/// deterministically.
#[derive(Debug, Clone)]
pub struct FleetState {
    timestamp: DateTime<Utc>,
    operational: Vec<VehicleID>,
    failed: Vec<VehicleID>,
    positions: HashMap<VehicleID, Vec3D<f64>>,
    battery: HashMap<VehicleID, f64>,
    payloads: HashMap<VehicleID, f64>,
    lost_tasks: Vec<TaskID>,
    permissions: HashMap<VehicleID, VehiclePermissions>,
}

impl FleetState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamp: DateTime<Utc>,
        mut operational: Vec<VehicleID>,
        mut failed: Vec<VehicleID>,
        positions: HashMap<VehicleID, Vec3D<f64>>,
        battery: HashMap<VehicleID, f64>,
        payloads: HashMap<VehicleID, f64>,
        mut lost_tasks: Vec<TaskID>,
        permissions: HashMap<VehicleID, VehiclePermissions>,
    ) -> Self {
        operational.sort_unstable();
        failed.sort_unstable();
        lost_tasks.sort_unstable();
        lost_tasks.dedup();
        debug_assert!(operational.iter().all(|v| !failed.contains(v)));
        Self { timestamp, operational, failed, positions, battery, payloads, lost_tasks, permissions }
    }

    pub fn timestamp(&self) -> DateTime<Utc> { self.timestamp }

    /// Vehicle ids currently able to accept work, ascending.
    pub fn operational(&self) -> &[VehicleID] { &self.operational }

    /// Vehicle ids that failed during this monitor lifetime, ascending.
    pub fn failed(&self) -> &[VehicleID] { &self.failed }

    /// Task ids stranded on failed vehicles and awaiting reallocation.
    pub fn lost_tasks(&self) -> &[TaskID] { &self.lost_tasks }

    pub fn position_of(&self, vehicle: VehicleID) -> Option<Vec3D<f64>> {
        self.positions.get(&vehicle).copied()
    }

    pub fn battery_of(&self, vehicle: VehicleID) -> Option<f64> {
        self.battery.get(&vehicle).copied()
    }

    pub fn payload_of(&self, vehicle: VehicleID) -> Option<f64> {
        self.payloads.get(&vehicle).copied()
    }

    pub fn may_exit_grid(&self, vehicle: VehicleID) -> bool {
        self.permissions.get(&vehicle).is_some_and(|p| p.may_exit_grid)
    }
}
