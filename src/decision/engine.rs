use super::context::MissionContext;
use super::observer::DecisionObserver;
use super::optimizer::{AllocationOptimizer, AllocationResult};
use crate::config::GCSConfig;
use crate::constraint::ConstraintValidator;
use crate::fleet::FleetState;
use crate::mission::{MissionDatabase, MissionError, ReallocationPlan, Task};
use crate::util::{RollingStats, StatSummary};
use crate::{error, event, info, warn};
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Instant,
};
use strum_macros::Display;

/// Phases of one decision cycle.
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "snake_case")]
pub enum OODAPhase {
    Idle,
    Observe,
    Orient,
    Decide,
    Act,
}

/// Categorical outcome of a cycle. `FullReallocation` and
/// `PartialReallocation` ask the embedding to dispatch mission updates,
/// `OperatorEscalation` asks for a human, `AbortMission` for a shutdown
/// flow.
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum RecoveryStrategy {
    FullReallocation,
    PartialReallocation,
    OperatorEscalation,
    AbortMission,
}

/// Quantified failure impact, produced by the orient phase.
#[derive(Debug, Clone)]
pub struct MissionImpact {
    coverage_loss_percent: f64,
    affected_zones: Vec<usize>,
    /// Fleet-wide spare battery in percent-equivalent units: summed spare
    /// state-of-charge after the coarse committed-work estimate and the
    /// safety reserve. A coarse expectation-setter only; the validator is
    /// the real gate.
    fleet_capacity_battery: f64,
    /// Fleet-wide spare payload, kg.
    fleet_capacity_payload: f64,
    temporal_margin_sec: f64,
    recoverable_tasks: usize,
    total_lost_tasks: usize,
}

impl MissionImpact {
    pub fn coverage_loss_percent(&self) -> f64 { self.coverage_loss_percent }

    pub fn affected_zones(&self) -> &[usize] { &self.affected_zones }

    pub fn fleet_capacity_battery(&self) -> f64 { self.fleet_capacity_battery }

    pub fn fleet_capacity_payload(&self) -> f64 { self.fleet_capacity_payload }

    /// Seconds to the nearest task deadline, 0 when none is set.
    pub fn temporal_margin_sec(&self) -> f64 { self.temporal_margin_sec }

    pub fn recoverable_tasks(&self) -> usize { self.recoverable_tasks }

    pub fn total_lost_tasks(&self) -> usize { self.total_lost_tasks }
}

/// Wall-clock phase durations of one cycle, milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseTimings {
    observe_ms: f64,
    orient_ms: f64,
    decide_ms: f64,
    act_ms: f64,
}

impl PhaseTimings {
    pub fn observe_ms(&self) -> f64 { self.observe_ms }

    pub fn orient_ms(&self) -> f64 { self.orient_ms }

    pub fn decide_ms(&self) -> f64 { self.decide_ms }

    pub fn act_ms(&self) -> f64 { self.act_ms }

    pub fn total_ms(&self) -> f64 {
        self.observe_ms + self.orient_ms + self.decide_ms + self.act_ms
    }
}

/// Output of one OODA cycle.
#[derive(Debug, Clone)]
pub struct OODADecision {
    strategy: RecoveryStrategy,
    plan: ReallocationPlan,
    rationale: String,
    metrics: HashMap<&'static str, f64>,
    execution_time_ms: f64,
    phase_timings: PhaseTimings,
}

impl OODADecision {
    pub fn strategy(&self) -> RecoveryStrategy { self.strategy }

    pub fn plan(&self) -> &ReallocationPlan { &self.plan }

    pub fn rationale(&self) -> &str { &self.rationale }

    pub fn metrics(&self) -> &HashMap<&'static str, f64> { &self.metrics }

    pub fn metric(&self, key: &str) -> Option<f64> { self.metrics.get(key).copied() }

    pub fn execution_time_ms(&self) -> f64 { self.execution_time_ms }

    pub fn phase_timings(&self) -> PhaseTimings { self.phase_timings }
}

/// Aggregate decision-quality and timing statistics across cycles.
#[derive(Debug, Clone, Default)]
pub struct PerformanceStats {
    pub total_cycles: u32,
    pub total_tasks_lost: usize,
    pub total_tasks_recovered: usize,
    pub overall_recovery_rate: f64,
    pub observe_ms: Option<StatSummary>,
    pub orient_ms: Option<StatSummary>,
    pub decide_ms: Option<StatSummary>,
    pub act_ms: Option<StatSummary>,
    pub cycle_ms: Option<StatSummary>,
    pub recovery_rate: Option<StatSummary>,
    pub objective_score: Option<StatSummary>,
}

impl std::fmt::Display for PerformanceStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} cycle(s), {}/{} task(s) recovered ({:.1}%)",
            self.total_cycles,
            self.total_tasks_recovered,
            self.total_tasks_lost,
            self.overall_recovery_rate
        )?;
        if let Some(cycle) = self.cycle_ms {
            write!(f, ", cycle avg {:.1}ms (max {:.1}ms)", cycle.mean, cycle.max)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct PhaseBudgets {
    observe_ms: f64,
    orient_ms: f64,
    decide_ms: f64,
    act_ms: f64,
}

struct EngineState {
    context: MissionContext,
    /// Built lazily on the first decide phase, dropped on context changes.
    optimizer: Option<AllocationOptimizer>,
    cycle_count: u32,
    observe_times: RollingStats,
    orient_times: RollingStats,
    decide_times: RollingStats,
    act_times: RollingStats,
    cycle_times: RollingStats,
    recovery_rates: RollingStats,
    objective_scores: RollingStats,
    total_tasks_lost: usize,
    total_tasks_recovered: usize,
}

/// Orchestrates one Observe-Orient-Decide-Act cycle per failure event.
///
/// Cycles are serialized by an internal mutex: a failure arriving while a
/// cycle runs queues behind it. Any error escaping a phase degrades into an
/// operator-escalation decision instead of a crash; intelligent escalation
/// is a valid outcome. Phase budget breaches only log, aborting a recovery
/// cycle would make partial failure handling worse.
pub struct OODAEngine {
    state: Mutex<EngineState>,
    observers: Mutex<Vec<Arc<dyn DecisionObserver>>>,
    phase_budgets: PhaseBudgets,
    battery_safety_reserve_percent: f64,
}

impl OODAEngine {
    /// Coverage at or above which a plan counts as a full reallocation.
    const FULL_COVERAGE_PERCENT: f64 = 75.0;
    /// Coverage at or above which a plan still counts as partial recovery.
    const PARTIAL_COVERAGE_PERCENT: f64 = 50.0;
    /// Coarse per-task battery commitment used by the orient estimate,
    /// percent of state of charge.
    const ORIENT_TASK_BATTERY_PERCENT: f64 = 5.0;

    pub fn new(config: &GCSConfig) -> Self {
        Self {
            state: Mutex::new(EngineState {
                context: config.mission_context(),
                optimizer: None,
                cycle_count: 0,
                observe_times: RollingStats::default(),
                orient_times: RollingStats::default(),
                decide_times: RollingStats::default(),
                act_times: RollingStats::default(),
                cycle_times: RollingStats::default(),
                recovery_rates: RollingStats::default(),
                objective_scores: RollingStats::default(),
                total_tasks_lost: 0,
                total_tasks_recovered: 0,
            }),
            observers: Mutex::new(Vec::new()),
            phase_budgets: PhaseBudgets {
                observe_ms: config.ooda.observe_budget_ms,
                orient_ms: config.ooda.orient_budget_ms,
                decide_ms: config.ooda.decide_budget_ms,
                act_ms: config.ooda.act_budget_ms,
            },
            battery_safety_reserve_percent: config.constraints.battery_safety_reserve_percent,
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the mission context, dropping the cached optimizer.
    pub fn set_mission_context(&self, context: MissionContext) {
        let mut state = self.state();
        info!("Mission context updated: {}", context.kind());
        state.context = context;
        state.optimizer = None;
    }

    /// Attaches an observer notified on phase transitions and decisions.
    pub fn add_observer(&self, observer: Arc<dyn DecisionObserver>) {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner).push(observer);
    }

    /// Executes one complete OODA cycle over a frozen fleet snapshot.
    ///
    /// Safe to invoke from any task; concurrent triggers serialize. The
    /// returned decision is also the sole outward error channel: cycle
    /// failures surface as `OperatorEscalation` with the error in the
    /// rationale.
    pub fn trigger(
        &self,
        fleet_state: &FleetState,
        db: &MissionDatabase,
        validator: &ConstraintValidator,
    ) -> OODADecision {
        let cycle_start = Instant::now();
        let mut state = self.state();
        state.cycle_count += 1;
        let cycle = state.cycle_count;
        info!(
            "OODA cycle #{cycle} triggered: {} vehicle(s) failed, {} task(s) lost",
            fleet_state.failed().len(),
            fleet_state.lost_tasks().len()
        );

        let mut timings = PhaseTimings::default();
        let outcome = self.run_cycle(&mut state, fleet_state, db, validator, &mut timings, cycle);
        let execution_time_ms = cycle_start.elapsed().as_secs_f64() * 1000.0;

        let decision = match outcome {
            Ok(mut decision) => {
                decision.execution_time_ms = execution_time_ms;
                decision.phase_timings = timings;
                decision
            }
            Err(err) => {
                error!("OODA cycle #{cycle} failed: {err}");
                OODADecision {
                    strategy: RecoveryStrategy::OperatorEscalation,
                    plan: ReallocationPlan::new(),
                    rationale: format!("OODA cycle error: {err}"),
                    metrics: HashMap::new(),
                    execution_time_ms,
                    phase_timings: timings,
                }
            }
        };

        state.total_tasks_lost += fleet_state.lost_tasks().len();
        let recovered: usize = decision.plan.values().map(Vec::len).sum();
        state.total_tasks_recovered += recovered;
        state.observe_times.push(timings.observe_ms);
        state.orient_times.push(timings.orient_ms);
        state.decide_times.push(timings.decide_ms);
        state.act_times.push(timings.act_ms);
        state.cycle_times.push(timings.total_ms());
        if let Some(rate) = decision.metric("recovery_rate") {
            state.recovery_rates.push(rate);
        }
        if let Some(score) = decision.metric("objective_score") {
            state.objective_scores.push(score);
        }
        drop(state);

        info!(
            "OODA cycle #{cycle} completed: {} in {execution_time_ms:.1}ms (O:{:.1} O:{:.1} D:{:.1} A:{:.1})",
            decision.strategy,
            timings.observe_ms,
            timings.orient_ms,
            timings.decide_ms,
            timings.act_ms
        );
        self.notify_decision(cycle, &decision);
        decision
    }

    fn run_cycle(
        &self,
        state: &mut EngineState,
        fleet_state: &FleetState,
        db: &MissionDatabase,
        validator: &ConstraintValidator,
        timings: &mut PhaseTimings,
        cycle: u32,
    ) -> Result<OODADecision, MissionError> {
        let phase_start = Instant::now();
        self.notify_phase(cycle, OODAPhase::Observe);
        self.observe_phase(fleet_state);
        timings.observe_ms = phase_start.elapsed().as_secs_f64() * 1000.0;
        self.check_budget(OODAPhase::Observe, timings.observe_ms, self.phase_budgets.observe_ms);

        let phase_start = Instant::now();
        self.notify_phase(cycle, OODAPhase::Orient);
        let impact = self.orient_phase(fleet_state, db);
        timings.orient_ms = phase_start.elapsed().as_secs_f64() * 1000.0;
        self.check_budget(OODAPhase::Orient, timings.orient_ms, self.phase_budgets.orient_ms);

        let phase_start = Instant::now();
        self.notify_phase(cycle, OODAPhase::Decide);
        let decision = Self::decide_phase(state, &impact, fleet_state, db, validator);
        timings.decide_ms = phase_start.elapsed().as_secs_f64() * 1000.0;
        self.check_budget(OODAPhase::Decide, timings.decide_ms, self.phase_budgets.decide_ms);

        let phase_start = Instant::now();
        self.notify_phase(cycle, OODAPhase::Act);
        let act_result = Self::act_phase(&decision, db);
        timings.act_ms = phase_start.elapsed().as_secs_f64() * 1000.0;
        self.check_budget(OODAPhase::Act, timings.act_ms, self.phase_budgets.act_ms);
        self.notify_phase(cycle, OODAPhase::Idle);
        act_result?;

        Ok(decision)
    }

    /// OBSERVE: confirm the frozen snapshot. No mutations.
    fn observe_phase(&self, fleet_state: &FleetState) {
        info!(
            "Observing fleet: {} operational, {} failed, lost tasks {:?}",
            fleet_state.operational().len(),
            fleet_state.failed().len(),
            fleet_state.lost_tasks()
        );
    }

    /// ORIENT: quantify coverage loss, fleet capacity and temporal margin.
    fn orient_phase(&self, fleet_state: &FleetState, db: &MissionDatabase) -> MissionImpact {
        let total_tasks = db.task_count();
        let lost = fleet_state.lost_tasks().len();
        let coverage_loss_percent =
            if total_tasks > 0 { lost as f64 / total_tasks as f64 * 100.0 } else { 0.0 };

        let mut battery_spare = 0.0;
        for &vehicle in fleet_state.operational() {
            let soc = fleet_state.battery_of(vehicle).unwrap_or(0.0);
            let committed =
                db.tasks_of(vehicle).len() as f64 * Self::ORIENT_TASK_BATTERY_PERCENT;
            battery_spare += (soc - committed - self.battery_safety_reserve_percent).max(0.0);
        }

        let payload_spare: f64 = fleet_state
            .operational()
            .iter()
            .filter_map(|&vehicle| fleet_state.payload_of(vehicle))
            .sum();

        let temporal_margin_sec = db
            .nearest_deadline()
            .map_or(0.0, |deadline| (deadline - Utc::now()).num_milliseconds() as f64 / 1000.0);

        // iteratively debit the coarse model to count recoverable tasks
        let mut battery_left = battery_spare;
        let mut payload_left = payload_spare;
        let mut recoverable = 0;
        for &task_id in fleet_state.lost_tasks() {
            let Some(task) = db.get_task(task_id) else {
                continue;
            };
            let payload_ok = task.payload_kg().is_none_or(|kg| payload_left > kg);
            if battery_left > Self::ORIENT_TASK_BATTERY_PERCENT && payload_ok {
                recoverable += 1;
                battery_left -= Self::ORIENT_TASK_BATTERY_PERCENT;
                if let Some(kg) = task.payload_kg() {
                    payload_left -= kg;
                }
            }
        }

        let impact = MissionImpact {
            coverage_loss_percent,
            affected_zones: db.affected_zones(fleet_state.lost_tasks()),
            fleet_capacity_battery: battery_spare,
            fleet_capacity_payload: payload_spare,
            temporal_margin_sec,
            recoverable_tasks: recoverable,
            total_lost_tasks: lost,
        };
        event!(
            "Orient: {coverage_loss_percent:.1}% coverage loss, {recoverable}/{lost} task(s) recoverable"
        );
        impact
    }

    /// DECIDE: run the two-stage optimizer and classify the outcome.
    fn decide_phase(
        state: &mut EngineState,
        impact: &MissionImpact,
        fleet_state: &FleetState,
        db: &MissionDatabase,
        validator: &ConstraintValidator,
    ) -> OODADecision {
        let context = state.context.clone();
        let optimizer =
            state.optimizer.get_or_insert_with(|| AllocationOptimizer::new(context));

        // unknown ids are dropped; the optimizer works on real records
        let lost_tasks: Vec<Task> = fleet_state
            .lost_tasks()
            .iter()
            .filter_map(|&task_id| db.get_task(task_id))
            .collect();

        if lost_tasks.is_empty() || fleet_state.operational().is_empty() {
            let rationale = "No tasks to reallocate or no operational vehicles available.";
            return OODADecision {
                strategy: RecoveryStrategy::OperatorEscalation,
                plan: ReallocationPlan::new(),
                rationale: rationale.to_string(),
                metrics: Self::build_metrics(impact, fleet_state, None),
                execution_time_ms: 0.0,
                phase_timings: PhaseTimings::default(),
            };
        }

        let result = optimizer.optimize(fleet_state, &lost_tasks, validator, db, Utc::now());
        let coverage = result.coverage_percentage();
        let strategy = if coverage >= Self::FULL_COVERAGE_PERCENT {
            RecoveryStrategy::FullReallocation
        } else if coverage >= Self::PARTIAL_COVERAGE_PERCENT {
            RecoveryStrategy::PartialReallocation
        } else {
            RecoveryStrategy::OperatorEscalation
        };
        let recovered: usize = result.allocation().values().map(Vec::len).sum();
        let rationale = format!(
            "Optimized reallocation: {recovered} task(s) across {} vehicle(s). \
             Coverage: {coverage:.1}%, objective: {:.3}, optimization: {:.1}ms ({} iteration(s))",
            result.allocation().len(),
            result.objective_score(),
            result.optimization_time_ms(),
            result.iterations()
        );

        OODADecision {
            strategy,
            plan: result.allocation().clone(),
            rationale,
            metrics: Self::build_metrics(impact, fleet_state, Some(&result)),
            execution_time_ms: 0.0,
            phase_timings: PhaseTimings::default(),
        }
    }

    /// ACT: commit the plan; dispatching `update_mission` to vehicles is the
    /// external dispatcher's job.
    fn act_phase(decision: &OODADecision, db: &MissionDatabase) -> Result<(), MissionError> {
        if !decision.plan.is_empty() {
            db.commit_plan(&decision.plan)?;
        }
        Ok(())
    }

    fn build_metrics(
        impact: &MissionImpact,
        fleet_state: &FleetState,
        result: Option<&AllocationResult>,
    ) -> HashMap<&'static str, f64> {
        let recovered =
            result.map_or(0, |r| r.allocation().values().map(Vec::len).sum::<usize>());
        let mut metrics = HashMap::from([
            ("recovery_rate", result.map_or(0.0, AllocationResult::coverage_percentage)),
            ("coverage_loss", impact.coverage_loss_percent),
            ("tasks_recovered", recovered as f64),
            ("tasks_lost", fleet_state.lost_tasks().len() as f64),
            (
                "unallocated_count",
                result.map_or(fleet_state.lost_tasks().len(), |r| r.unallocated_tasks().len())
                    as f64,
            ),
            ("battery_spare", impact.fleet_capacity_battery),
            ("payload_spare", impact.fleet_capacity_payload),
            ("operational_uavs", fleet_state.operational().len() as f64),
            ("failed_uavs", fleet_state.failed().len() as f64),
            ("temporal_margin", impact.temporal_margin_sec),
            ("recoverable_tasks", impact.recoverable_tasks as f64),
            ("affected_zones", impact.affected_zones.len() as f64),
        ]);
        metrics.insert("objective_score", result.map_or(0.0, AllocationResult::objective_score));
        metrics.insert(
            "optimization_time_ms",
            result.map_or(0.0, AllocationResult::optimization_time_ms),
        );
        metrics.insert(
            "optimization_iterations",
            result.map_or(0.0, |r| f64::from(r.iterations())),
        );
        metrics.insert(
            "optimality_gap_estimate",
            result.map_or(0.0, AllocationResult::optimality_gap_estimate),
        );
        metrics
    }

    fn check_budget(&self, phase: OODAPhase, actual_ms: f64, budget_ms: f64) {
        if actual_ms > budget_ms {
            warn!("{phase} phase exceeded its budget: {actual_ms:.1}ms > {budget_ms:.0}ms");
        }
    }

    fn notify_phase(&self, cycle: u32, phase: OODAPhase) {
        for observer in self.observers.lock().unwrap_or_else(PoisonError::into_inner).iter() {
            observer.on_phase_transition(cycle, phase);
        }
    }

    fn notify_decision(&self, cycle: u32, decision: &OODADecision) {
        for observer in self.observers.lock().unwrap_or_else(PoisonError::into_inner).iter() {
            observer.on_decision(cycle, decision);
        }
    }

    /// Cycle counters, per-phase timing and decision-quality statistics over
    /// the bounded rolling windows.
    pub fn performance_stats(&self) -> PerformanceStats {
        let state = self.state();
        let overall = if state.total_tasks_lost > 0 {
            state.total_tasks_recovered as f64 / state.total_tasks_lost as f64 * 100.0
        } else {
            0.0
        };
        PerformanceStats {
            total_cycles: state.cycle_count,
            total_tasks_lost: state.total_tasks_lost,
            total_tasks_recovered: state.total_tasks_recovered,
            overall_recovery_rate: overall,
            observe_ms: state.observe_times.summary(),
            orient_ms: state.orient_times.summary(),
            decide_ms: state.decide_times.summary(),
            act_ms: state.act_times.summary(),
            cycle_ms: state.cycle_times.summary(),
            recovery_rate: state.recovery_rates.summary(),
            objective_score: state.objective_scores.summary(),
        }
    }
}
