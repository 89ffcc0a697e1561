use super::context::MissionContext;
use super::objective::{ObjectiveFunction, SCORE_EPS, candidate_wins};
use crate::constraint::ConstraintValidator;
use crate::fleet::{FleetState, VehicleID};
use crate::mission::{MissionDatabase, ReallocationPlan, Task, TaskID};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Outcome of one optimization run.
#[derive(Debug, Clone)]
pub struct AllocationResult {
    allocation: ReallocationPlan,
    objective_score: f64,
    coverage_percentage: f64,
    unallocated_tasks: Vec<TaskID>,
    optimization_time_ms: f64,
    iterations: u32,
    /// Advisory distance-from-optimal figure; a heuristic, not a bound.
    optimality_gap_estimate: f64,
}

impl AllocationResult {
    pub fn allocation(&self) -> &ReallocationPlan { &self.allocation }

    pub fn objective_score(&self) -> f64 { self.objective_score }

    /// Share of the lost tasks the allocation covers, percent.
    pub fn coverage_percentage(&self) -> f64 { self.coverage_percentage }

    pub fn unallocated_tasks(&self) -> &[TaskID] { &self.unallocated_tasks }

    pub fn optimization_time_ms(&self) -> f64 { self.optimization_time_ms }

    pub fn iterations(&self) -> u32 { self.iterations }

    pub fn optimality_gap_estimate(&self) -> f64 { self.optimality_gap_estimate }
}

/// Two-stage allocation search: a priority-greedy seed refined by a
/// time-budgeted first-improvement local search over 1-task moves.
///
/// Deterministic given deterministic inputs: tasks are ranked by priority
/// with ascending-id tie-breaks, vehicles are swept in ascending id order
/// and score ties resolve through [`candidate_wins`].
pub struct AllocationOptimizer {
    objective: ObjectiveFunction,
    context: MissionContext,
}

impl AllocationOptimizer {
    /// Wall-clock slack reserved for the remainder of the decide phase, ms.
    const BUDGET_SAFETY_MARGIN_MS: f64 = 200.0;
    /// Minimum leftover budget that makes a refinement stage worthwhile, ms.
    const MIN_SEARCH_BUDGET_MS: f64 = 100.0;
    /// Upper clamp of the advisory optimality gap, percent.
    const GAP_CAP_PERCENT: f64 = 30.0;
    /// Share of the attainable improvement the local search is assumed to
    /// find, feeding the gap heuristic.
    const LOCAL_SEARCH_YIELD: f64 = 0.85;

    pub fn new(context: MissionContext) -> Self {
        Self { objective: ObjectiveFunction::new(context.clone()), context }
    }

    pub fn objective(&self) -> &ObjectiveFunction { &self.objective }

    pub fn objective_mut(&mut self) -> &mut ObjectiveFunction { &mut self.objective }

    /// Produces a feasible reallocation plan maximizing `J(A)` within the
    /// mission's wall-clock budget. The greedy stage always completes; the
    /// refinement stage stops on whichever bound (time, iteration cap,
    /// local optimum) hits first.
    pub fn optimize(
        &self,
        fleet: &FleetState,
        lost: &[Task],
        validator: &ConstraintValidator,
        db: &MissionDatabase,
        now: DateTime<Utc>,
    ) -> AllocationResult {
        let started = Instant::now();

        if lost.is_empty() {
            return AllocationResult {
                allocation: ReallocationPlan::new(),
                objective_score: 0.0,
                coverage_percentage: 100.0,
                unallocated_tasks: Vec::new(),
                optimization_time_ms: elapsed_ms(started),
                iterations: 0,
                optimality_gap_estimate: 0.0,
            };
        }
        if fleet.operational().is_empty() {
            let mut unallocated: Vec<TaskID> = lost.iter().map(Task::id).collect();
            unallocated.sort_unstable();
            let objective_score = self.objective.score(&ReallocationPlan::new(), fleet, lost, db, now);
            return AllocationResult {
                allocation: ReallocationPlan::new(),
                objective_score,
                coverage_percentage: 0.0,
                unallocated_tasks: unallocated,
                optimization_time_ms: elapsed_ms(started),
                iterations: 0,
                optimality_gap_estimate: 0.0,
            };
        }

        let mut best = self.greedy_seed(fleet, lost, validator, db, now);
        let initial_score = self.objective.score(&best, fleet, lost, db, now);
        let mut best_score = initial_score;
        let mut iterations = 1;

        let budget_ms = self.context.optimization_budget().as_secs_f64() * 1000.0;
        let remaining_ms = budget_ms - elapsed_ms(started) - Self::BUDGET_SAFETY_MARGIN_MS;
        if self.context.local_search_enabled() && remaining_ms > Self::MIN_SEARCH_BUDGET_MS {
            let deadline = Instant::now() + Duration::from_secs_f64(remaining_ms / 1000.0);
            iterations += self.local_search(
                &mut best,
                &mut best_score,
                fleet,
                lost,
                validator,
                db,
                now,
                deadline,
            );
        }

        let assigned: BTreeSet<TaskID> = best.values().flatten().copied().collect();
        let mut unallocated: Vec<TaskID> =
            lost.iter().map(Task::id).filter(|id| !assigned.contains(id)).collect();
        unallocated.sort_unstable();
        let coverage = assigned.len() as f64 / lost.len() as f64 * 100.0;

        AllocationResult {
            allocation: best,
            objective_score: best_score,
            coverage_percentage: coverage,
            unallocated_tasks: unallocated,
            optimization_time_ms: elapsed_ms(started),
            iterations,
            optimality_gap_estimate: Self::estimate_gap(initial_score, best_score),
        }
    }

    /// Stage 1: assign lost tasks in descending priority order to the
    /// nearest feasible vehicle. Infeasible tasks stay unallocated; vehicles
    /// without work never appear in the plan.
    fn greedy_seed(
        &self,
        fleet: &FleetState,
        lost: &[Task],
        validator: &ConstraintValidator,
        db: &MissionDatabase,
        now: DateTime<Utc>,
    ) -> ReallocationPlan {
        let mut ranked: Vec<(f64, &Task)> =
            lost.iter().map(|task| (self.objective.task_priority(task, fleet, now), task)).collect();
        ranked.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id().cmp(&b.1.id()))
        });

        let mut allocation = ReallocationPlan::new();
        for (_, task) in ranked {
            let mut nearest: Option<(f64, VehicleID)> = None;
            for &vehicle in fleet.operational() {
                if !validator.check_all(vehicle, task, fleet, db) {
                    continue;
                }
                let Some(pos) = fleet.position_of(vehicle) else {
                    continue;
                };
                let distance = pos.xy_distance_to(&task.position());
                // strict less keeps the smaller id on equal distance
                if nearest.is_none_or(|(best_distance, _)| distance < best_distance) {
                    nearest = Some((distance, vehicle));
                }
            }
            if let Some((_, vehicle)) = nearest {
                allocation.entry(vehicle).or_default().push(task.id());
            }
        }
        allocation
    }

    /// Stage 2: first-improvement search over the 1-move neighborhood,
    /// restarting the sweep after every adopted move.
    #[allow(clippy::too_many_arguments)]
    fn local_search(
        &self,
        best: &mut ReallocationPlan,
        best_score: &mut f64,
        fleet: &FleetState,
        lost: &[Task],
        validator: &ConstraintValidator,
        db: &MissionDatabase,
        now: DateTime<Utc>,
        deadline: Instant,
    ) -> u32 {
        let mut iterations = 0;
        while iterations < self.context.max_local_search_iterations() && Instant::now() < deadline {
            iterations += 1;
            let mut improved = false;

            'sweep: for (u_from, task_ids) in best.clone() {
                for task_id in task_ids {
                    let Some(task) = db.get_task(task_id) else {
                        continue;
                    };
                    for &u_to in fleet.operational() {
                        if u_to == u_from {
                            continue;
                        }
                        if Instant::now() >= deadline {
                            break 'sweep;
                        }
                        if !validator.check_all(u_to, &task, fleet, db) {
                            continue;
                        }
                        let mut candidate = best.clone();
                        if let Some(list) = candidate.get_mut(&u_from) {
                            list.retain(|t| *t != task_id);
                            if list.is_empty() {
                                candidate.remove(&u_from);
                            }
                        }
                        candidate.entry(u_to).or_default().push(task_id);

                        let score = self.objective.score(&candidate, fleet, lost, db, now);
                        if candidate_wins(score, &candidate, *best_score, best) {
                            *best = candidate;
                            *best_score = score;
                            improved = true;
                            break 'sweep;
                        }
                    }
                }
            }

            if !improved {
                break;
            }
        }
        iterations
    }

    /// Advisory optimality-gap heuristic derived from the refinement's
    /// relative improvement, clamped to `[0, 30]` percent.
    fn estimate_gap(initial_score: f64, final_score: f64) -> f64 {
        if initial_score.abs() <= SCORE_EPS {
            return 0.0;
        }
        let improvement_pct = (final_score - initial_score) / initial_score.abs() * 100.0;
        let estimated_remaining = if improvement_pct > 0.0 {
            improvement_pct * (1.0 - Self::LOCAL_SEARCH_YIELD) / Self::LOCAL_SEARCH_YIELD
        } else {
            0.0
        };
        estimated_remaining.clamp(0.0, Self::GAP_CAP_PERCENT)
    }
}

fn elapsed_ms(started: Instant) -> f64 { started.elapsed().as_secs_f64() * 1000.0 }
