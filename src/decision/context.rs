use crate::mission::TaskKind;
use chrono::TimeDelta;
use std::time::Duration;

/// Relative weights of the task-priority terms. The three weights are
/// expected to sum to roughly one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorityWeights {
    temporal: f64,
    criticality: f64,
    spatial: f64,
}

impl PriorityWeights {
    pub fn new(temporal: f64, criticality: f64, spatial: f64) -> Self {
        Self { temporal, criticality, spatial }
    }

    pub fn temporal(&self) -> f64 { self.temporal }

    pub fn criticality(&self) -> f64 { self.criticality }

    pub fn spatial(&self) -> f64 { self.spatial }
}

/// Mission-kind specific knobs of the objective function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MissionProfile {
    /// Persistent area surveillance: stale zones lose value.
    Surveillance { gamma_coverage_gap: f64 },
    /// Time-critical search and rescue: completing well inside the golden
    /// hour earns a bonus.
    SearchRescue { beta_golden_hour: f64, golden_hour: TimeDelta },
    /// Priority-ordered parcel delivery: late completion halves the value.
    Delivery,
}

/// Per-mission configuration injected into the decision engine.
///
/// Constructed at mission start and immutable for the mission's lifetime;
/// replacing it resets the engine's cached optimizer.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionContext {
    profile: MissionProfile,
    weights: PriorityWeights,
    /// Penalty per lost task the allocation leaves unassigned.
    lambda_unallocated: f64,
    /// Normalization range for the spatial cost term, meters.
    max_range_m: f64,
    optimization_budget: Duration,
    local_search_enabled: bool,
    max_local_search_iterations: u32,
}

impl MissionContext {
    /// Default wall-clock budget of the decide-phase optimizer.
    const DEFAULT_BUDGET: Duration = Duration::from_millis(1200);
    const DEFAULT_MAX_RANGE_M: f64 = 2000.0;
    const DEFAULT_ITERATION_CAP: u32 = 50;

    fn base(profile: MissionProfile, weights: PriorityWeights, lambda: f64) -> Self {
        Self {
            profile,
            weights,
            lambda_unallocated: lambda,
            max_range_m: Self::DEFAULT_MAX_RANGE_M,
            optimization_budget: Self::DEFAULT_BUDGET,
            local_search_enabled: true,
            max_local_search_iterations: Self::DEFAULT_ITERATION_CAP,
        }
    }

    pub fn for_surveillance() -> Self {
        Self::base(
            MissionProfile::Surveillance { gamma_coverage_gap: 0.2 },
            PriorityWeights::new(0.3, 0.5, 0.2),
            0.3,
        )
    }

    pub fn for_search_rescue(golden_hour: TimeDelta) -> Self {
        Self::base(
            MissionProfile::SearchRescue { beta_golden_hour: 0.5, golden_hour },
            PriorityWeights::new(0.5, 0.3, 0.2),
            0.5,
        )
    }

    pub fn for_delivery() -> Self {
        Self::base(MissionProfile::Delivery, PriorityWeights::new(0.2, 0.6, 0.2), 0.4)
    }

    pub fn kind(&self) -> TaskKind {
        match self.profile {
            MissionProfile::Surveillance { .. } => TaskKind::Surveillance,
            MissionProfile::SearchRescue { .. } => TaskKind::SearchRescue,
            MissionProfile::Delivery => TaskKind::Delivery,
        }
    }

    pub fn with_weights(mut self, weights: PriorityWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda_unallocated = lambda;
        self
    }

    pub fn with_max_range(mut self, max_range_m: f64) -> Self {
        self.max_range_m = max_range_m;
        self
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.optimization_budget = budget;
        self
    }

    pub fn with_local_search(mut self, enabled: bool) -> Self {
        self.local_search_enabled = enabled;
        self
    }

    pub fn with_iteration_cap(mut self, cap: u32) -> Self {
        self.max_local_search_iterations = cap;
        self
    }

    pub fn profile(&self) -> MissionProfile { self.profile }

    pub fn weights(&self) -> PriorityWeights { self.weights }

    pub fn lambda_unallocated(&self) -> f64 { self.lambda_unallocated }

    pub fn max_range_m(&self) -> f64 { self.max_range_m }

    pub fn optimization_budget(&self) -> Duration { self.optimization_budget }

    pub fn local_search_enabled(&self) -> bool { self.local_search_enabled }

    pub fn max_local_search_iterations(&self) -> u32 { self.max_local_search_iterations }
}
