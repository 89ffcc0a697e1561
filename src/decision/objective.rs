use super::context::{MissionContext, MissionProfile};
use crate::fleet::{FleetState, VehicleID};
use crate::mission::{MissionDatabase, ReallocationPlan, Task};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{BTreeSet, HashMap};

/// Floating tolerance below which two allocation scores count as equal.
pub(crate) const SCORE_EPS: f64 = 1e-9;

/// Mission-dependent value model of an allocation.
///
/// Computes per-task priority `P`, the mission modifier `phi` and the
/// aggregate objective `J(A) = sum(P * phi) - lambda * |unallocated|`.
pub struct ObjectiveFunction {
    context: MissionContext,
    /// Time-normalized staleness per zone, filled by a surveillance coverage
    /// tracker when one is attached. An untracked zone has no gap.
    coverage_gaps: HashMap<usize, f64>,
}

impl ObjectiveFunction {
    /// Cruise speed assumed when estimating completion times, m/s.
    const AVERAGE_SPEED_MPS: f64 = 12.0;

    pub fn new(context: MissionContext) -> Self {
        Self { context, coverage_gaps: HashMap::new() }
    }

    pub fn context(&self) -> &MissionContext { &self.context }

    /// Records the time-normalized coverage staleness of a zone.
    pub fn set_coverage_gap(&mut self, zone: usize, gap: f64) {
        self.coverage_gaps.insert(zone, gap);
    }

    /// Task priority `P` in `[0, 1]`: weighted urgency plus criticality
    /// minus spatial cost.
    ///
    /// Urgency is the consumed fraction of a `2 * duration` window before
    /// the deadline (0.5 without a deadline); criticality is the configured
    /// priority normalized to `[0, 1]`; spatial cost is the ground distance
    /// to the nearest operational vehicle normalized by the maximum range
    /// (1.0 when no vehicle is operational).
    pub fn task_priority(&self, task: &Task, fleet: &FleetState, now: DateTime<Utc>) -> f64 {
        let urgency = if let Some(deadline) = task.deadline() {
            let remaining_sec = (deadline - now).num_milliseconds().max(0) as f64 / 1000.0;
            let window_sec = (task.duration().num_milliseconds() as f64 / 1000.0 * 2.0).max(1.0);
            1.0 - (remaining_sec / window_sec).min(1.0)
        } else {
            0.5
        };

        let criticality = task.priority() / 100.0;

        let mut min_distance = f64::INFINITY;
        for &vehicle in fleet.operational() {
            if let Some(pos) = fleet.position_of(vehicle) {
                min_distance = min_distance.min(pos.xy_distance_to(&task.position()));
            }
        }
        let spatial_cost = if min_distance.is_finite() {
            (min_distance / self.context.max_range_m()).min(1.0)
        } else {
            1.0
        };

        let w = self.context.weights();
        (w.temporal() * urgency + w.criticality() * criticality - w.spatial() * spatial_cost)
            .clamp(0.0, 1.0)
    }

    /// Mission-specific modifier `phi` for assigning `task` to `vehicle`.
    pub fn modifier(
        &self,
        task: &Task,
        vehicle: VehicleID,
        fleet: &FleetState,
        now: DateTime<Utc>,
    ) -> f64 {
        match self.context.profile() {
            MissionProfile::Surveillance { gamma_coverage_gap } => {
                let gap = task
                    .zone_id()
                    .and_then(|zone| self.coverage_gaps.get(&zone))
                    .copied()
                    .unwrap_or(0.0);
                1.0 - gamma_coverage_gap * gap
            }
            MissionProfile::SearchRescue { beta_golden_hour, golden_hour } => {
                let golden_sec = golden_hour.num_milliseconds() as f64 / 1000.0;
                if golden_sec <= 0.0 {
                    return 1.0;
                }
                let completion_sec = self.estimate_completion_sec(task, vehicle, fleet);
                let slack = ((golden_sec - completion_sec) / golden_sec).max(0.0);
                1.0 + beta_golden_hour * slack
            }
            MissionProfile::Delivery => {
                let Some(deadline) = task.deadline() else {
                    return 1.0;
                };
                let completion_sec = self.estimate_completion_sec(task, vehicle, fleet);
                let completion =
                    now + TimeDelta::milliseconds((completion_sec * 1000.0) as i64);
                if completion <= deadline { 1.0 } else { 0.5 }
            }
        }
    }

    /// Travel from the vehicle's snapshot position plus execution, seconds.
    fn estimate_completion_sec(&self, task: &Task, vehicle: VehicleID, fleet: &FleetState) -> f64 {
        let travel_sec = fleet
            .position_of(vehicle)
            .map_or(0.0, |pos| pos.xy_distance_to(&task.position()) / Self::AVERAGE_SPEED_MPS);
        travel_sec + task.duration().num_milliseconds() as f64 / 1000.0
    }

    /// Aggregate objective `J(A)` over an allocation, penalizing every lost
    /// task the allocation leaves out. Task ids unknown to the database are
    /// skipped.
    pub fn score(
        &self,
        allocation: &ReallocationPlan,
        fleet: &FleetState,
        lost: &[Task],
        db: &MissionDatabase,
        now: DateTime<Utc>,
    ) -> f64 {
        let mut score = 0.0;
        let mut assigned = BTreeSet::new();
        for (&vehicle, task_ids) in allocation {
            for &task_id in task_ids {
                let Some(task) = db.get_task(task_id) else {
                    continue;
                };
                assigned.insert(task_id);
                score += self.task_priority(&task, fleet, now)
                    * self.modifier(&task, vehicle, fleet, now);
            }
        }
        let unallocated = lost.iter().filter(|task| !assigned.contains(&task.id())).count();
        score - self.context.lambda_unallocated() * unallocated as f64
    }
}

/// Deterministic tie-breaking between equally scored allocations: higher
/// `J` wins outright; within tolerance the allocation assigning more lost
/// tasks wins; if still tied the lexicographically smaller sorted task-id
/// sequence wins.
pub(crate) fn candidate_wins(
    candidate_score: f64,
    candidate: &ReallocationPlan,
    best_score: f64,
    best: &ReallocationPlan,
) -> bool {
    if candidate_score > best_score + SCORE_EPS {
        return true;
    }
    if candidate_score < best_score - SCORE_EPS {
        return false;
    }
    let candidate_ids: BTreeSet<_> = candidate.values().flatten().copied().collect();
    let best_ids: BTreeSet<_> = best.values().flatten().copied().collect();
    if candidate_ids.len() != best_ids.len() {
        return candidate_ids.len() > best_ids.len();
    }
    candidate_ids.iter().collect::<Vec<_>>() < best_ids.iter().collect::<Vec<_>>()
}
