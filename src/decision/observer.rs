use super::engine::{OODADecision, OODAPhase};
use crate::event;

/// Attachment point for dashboards, loggers and metrics exporters.
///
/// Observers are notified synchronously from the engine's cycle path and
/// must return quickly. The engine itself never depends on them.
pub trait DecisionObserver: Send + Sync {
    fn on_phase_transition(&self, cycle: u32, phase: OODAPhase) {
        let _ = (cycle, phase);
    }

    fn on_decision(&self, cycle: u32, decision: &OODADecision) {
        let _ = (cycle, decision);
    }
}

/// Observer mirroring cycle progress onto the event log.
pub struct EventLogObserver;

impl DecisionObserver for EventLogObserver {
    fn on_phase_transition(&self, cycle: u32, phase: OODAPhase) {
        event!("Cycle {cycle}: entering {phase} phase");
    }

    fn on_decision(&self, cycle: u32, decision: &OODADecision) {
        event!("Cycle {cycle} decision: {} ({})", decision.strategy(), decision.rationale());
    }
}
