//! The fault-tolerant decision core: mission contexts, the objective
//! function, the two-stage allocation optimizer and the OODA engine that
//! orchestrates them on every failure event.

mod context;
mod engine;
mod objective;
mod observer;
mod optimizer;

#[cfg(test)]
mod tests;

pub use context::{MissionContext, MissionProfile, PriorityWeights};
pub use engine::{
    MissionImpact, OODADecision, OODAEngine, OODAPhase, PerformanceStats, PhaseTimings,
    RecoveryStrategy,
};
pub use objective::ObjectiveFunction;
pub use observer::{DecisionObserver, EventLogObserver};
pub use optimizer::{AllocationOptimizer, AllocationResult};
