use crate::config::{GCSConfig, GridBounds};
use crate::fleet::{FleetState, VehicleID};
use crate::mission::{MissionDatabase, Task};
use crate::util::Vec3D;
use crate::{event, warn};
use chrono::{DateTime, Utc};

/// Pure admissibility predicates over candidate (vehicle, task) pairs.
///
/// Stateless beyond configuration: every predicate is referentially
/// transparent given its inputs and safe to call concurrently. A `false`
/// verdict is not an error, it is the expected signal that drives the
/// optimizer's search and the engine's escalation logic.
pub struct ConstraintValidator {
    grid_bounds: GridBounds,
    /// Fraction of nominal capacity that may never be consumed.
    battery_safety_reserve: f64,
    safety_buffer_m: f64,
}

impl ConstraintValidator {
    /// Travel efficiency of the reference airframe, meters per Wh.
    const BATTERY_EFFICIENCY_M_PER_WH: f64 = 150.0;
    /// Nominal pack capacity, Wh.
    const BATTERY_CAPACITY_WH: f64 = 100.0;
    /// Cruise speed assumed for deadline feasibility, m/s.
    const AVERAGE_SPEED_MPS: f64 = 10.0;

    pub fn new(config: &GCSConfig) -> Self {
        Self {
            grid_bounds: config.grid_bounds,
            battery_safety_reserve: config.constraints.battery_safety_reserve_percent / 100.0,
            safety_buffer_m: config.constraints.safety_buffer_meters,
        }
    }

    /// Umbrella check, short-circuiting in fixed order: grid boundary,
    /// energy, payload (delivery tasks only), deadline (when present).
    /// Cheapest and most discriminating predicates run first.
    pub fn check_all(
        &self,
        vehicle: VehicleID,
        task: &Task,
        fleet: &FleetState,
        db: &MissionDatabase,
    ) -> bool {
        if !self.check_grid_boundary(vehicle, task, fleet) {
            return false;
        }
        if !self.check_energy(vehicle, task, fleet, db) {
            return false;
        }
        if task.payload_kg().is_some() && !self.check_payload(vehicle, task, fleet) {
            return false;
        }
        if task.deadline().is_some() && !self.check_deadline(vehicle, task, fleet, Utc::now()) {
            return false;
        }
        true
    }

    /// Task position must lie in the operational rectangle (closed interval)
    /// unless the vehicle holds the exit-grid permission.
    pub fn check_grid_boundary(&self, vehicle: VehicleID, task: &Task, fleet: &FleetState) -> bool {
        let pos = task.position();
        if self.grid_bounds.contains(pos.x(), pos.y()) {
            return true;
        }
        if fleet.may_exit_grid(vehicle) {
            event!("Vehicle {vehicle} may exit grid for task {} at {pos}", task.id());
            return true;
        }
        event!("Vehicle {vehicle} cannot reach task {} at {pos}: outside grid", task.id());
        false
    }

    /// Simplified round-trip energy model: the candidate task costs
    /// `2 * distance / efficiency` on top of the energy already committed to
    /// the vehicle's existing task chain and the safety reserve.
    pub fn check_energy(
        &self,
        vehicle: VehicleID,
        task: &Task,
        fleet: &FleetState,
        db: &MissionDatabase,
    ) -> bool {
        let (Some(vehicle_pos), Some(soc)) =
            (fleet.position_of(vehicle), fleet.battery_of(vehicle))
        else {
            return false;
        };
        let distance = vehicle_pos.distance_to(&task.position());
        let required_wh = distance * 2.0 / Self::BATTERY_EFFICIENCY_M_PER_WH;
        let committed_wh = self.committed_energy(vehicle, vehicle_pos, db);
        let available_wh = soc / 100.0 * Self::BATTERY_CAPACITY_WH;
        let spare_wh =
            available_wh - committed_wh - self.battery_safety_reserve * Self::BATTERY_CAPACITY_WH;
        if spare_wh >= required_wh {
            true
        } else {
            event!(
                "Vehicle {vehicle} short on energy for task {}: {spare_wh:.1} Wh spare, {required_wh:.1} Wh needed",
                task.id()
            );
            false
        }
    }

    /// Energy already promised to the vehicle's task list, chained leg by
    /// leg through the task sequence.
    fn committed_energy(&self, vehicle: VehicleID, vehicle_pos: Vec3D<f64>, db: &MissionDatabase) -> f64 {
        let mut total_wh = 0.0;
        let mut current = vehicle_pos;
        for task_id in db.tasks_of(vehicle) {
            if let Some(task) = db.get_task(task_id) {
                total_wh += current.distance_to(&task.position()) / Self::BATTERY_EFFICIENCY_M_PER_WH;
                current = task.position();
            }
        }
        total_wh
    }

    /// Spare payload capacity must cover the task's payload mass.
    pub fn check_payload(&self, vehicle: VehicleID, task: &Task, fleet: &FleetState) -> bool {
        let Some(required_kg) = task.payload_kg() else {
            return true;
        };
        let Some(spare_kg) = fleet.payload_of(vehicle) else {
            // no payload tracking for this vehicle
            return true;
        };
        if spare_kg >= required_kg {
            true
        } else {
            event!(
                "Vehicle {vehicle} short on payload for task {}: {spare_kg:.1} kg spare, {required_kg:.1} kg needed",
                task.id()
            );
            false
        }
    }

    /// Travel plus execution must fit before the task's deadline.
    pub fn check_deadline(
        &self,
        vehicle: VehicleID,
        task: &Task,
        fleet: &FleetState,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(deadline) = task.deadline() else {
            return true;
        };
        let Some(vehicle_pos) = fleet.position_of(vehicle) else {
            return false;
        };
        let travel_sec = vehicle_pos.distance_to(&task.position()) / Self::AVERAGE_SPEED_MPS;
        let execution_sec = task.duration().num_milliseconds() as f64 / 1000.0;
        let available_sec = (deadline - now).num_milliseconds() as f64 / 1000.0;
        available_sec >= travel_sec + execution_sec
    }

    /// Advisory static buffer check of proposed waypoints against every
    /// other operational vehicle's current position. Not consulted by the
    /// optimizer; spatiotemporal avoidance is a separate subsystem.
    pub fn check_collision(
        &self,
        vehicle: VehicleID,
        waypoints: &[Vec3D<f64>],
        fleet: &FleetState,
    ) -> bool {
        for &other in fleet.operational() {
            if other == vehicle {
                continue;
            }
            let Some(other_pos) = fleet.position_of(other) else {
                continue;
            };
            for waypoint in waypoints {
                let distance = waypoint.distance_to(&other_pos);
                if distance < self.safety_buffer_m {
                    warn!(
                        "Collision risk between vehicles {vehicle} and {other}: {distance:.1}m < {:.0}m",
                        self.safety_buffer_m
                    );
                    return false;
                }
            }
        }
        true
    }
}
