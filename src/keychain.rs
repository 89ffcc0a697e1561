use crate::config::GCSConfig;
use crate::constraint::ConstraintValidator;
use crate::decision::OODAEngine;
use crate::fleet::{FailureMode, FleetMonitor, VehicleID};
use crate::mission::MissionDatabase;
use crate::{error, info};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// Struct representing the key components of the ground station, providing
/// access to the fleet monitor, mission database, constraint validator and
/// decision engine.
#[derive(Clone)]
pub struct Keychain {
    /// The fleet monitor owning all vehicle state.
    f_mon: Arc<FleetMonitor>,
    /// The authoritative mission database.
    m_db: Arc<MissionDatabase>,
    /// The pure constraint predicate layer.
    validator: Arc<ConstraintValidator>,
    /// The OODA decision engine.
    engine: Arc<OODAEngine>,
}

impl Keychain {
    /// Creates a new instance of `Keychain` with all subsystems built from
    /// one configuration record.
    pub fn new(config: &GCSConfig) -> Self {
        Self {
            f_mon: Arc::new(FleetMonitor::new(config)),
            m_db: Arc::new(MissionDatabase::new()),
            validator: Arc::new(ConstraintValidator::new(config)),
            engine: Arc::new(OODAEngine::new(config)),
        }
    }

    /// Provides a cloned reference to the fleet monitor.
    pub fn f_mon(&self) -> Arc<FleetMonitor> { Arc::clone(&self.f_mon) }

    /// Provides a cloned reference to the mission database.
    pub fn m_db(&self) -> Arc<MissionDatabase> { Arc::clone(&self.m_db) }

    /// Provides a cloned reference to the constraint validator.
    pub fn validator(&self) -> Arc<ConstraintValidator> { Arc::clone(&self.validator) }

    /// Provides a cloned reference to the decision engine.
    pub fn engine(&self) -> Arc<OODAEngine> { Arc::clone(&self.engine) }

    /// Bridges monitor failure events onto a dedicated decision worker.
    ///
    /// The failure callback only enqueues, so the monitor's polling cadence
    /// is never disturbed by a long decide phase. The worker snapshots the
    /// fleet per event and runs cycles strictly sequentially; a failure
    /// arriving mid-cycle queues behind it.
    pub fn spawn_decision_worker(&self, token: CancellationToken) -> JoinHandle<()> {
        let (tx, mut rx) = mpsc::channel::<(VehicleID, FailureMode)>(16);
        self.f_mon.subscribe_failures(move |vehicle, mode| {
            if tx.try_send((vehicle, mode)).is_err() {
                error!("Failure queue full, dropping event for vehicle {vehicle}");
            }
        });

        let keychain = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    received = rx.recv() => {
                        let Some((vehicle, mode)) = received else { break };
                        info!("Decision worker handling {mode} failure of vehicle {vehicle}");
                        let state = keychain.f_mon.snapshot().await;
                        let decision =
                            keychain.engine.trigger(&state, &keychain.m_db, &keychain.validator);
                        info!(
                            "Recovery strategy for vehicle {vehicle}: {}",
                            decision.strategy()
                        );
                    }
                }
            }
        })
    }
}
