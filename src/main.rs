#![allow(dead_code)]
#![warn(clippy::shadow_reuse, clippy::shadow_same, clippy::builtin_type_shadow)]

mod config;
mod constraint;
mod decision;
mod fleet;
mod keychain;
mod logger;
mod mission;
mod telemetry;
mod util;

use crate::config::GCSConfig;
use crate::decision::EventLogObserver;
use crate::keychain::Keychain;
use crate::mission::surveillance_grid;
use crate::telemetry::SimVehicle;
use crate::util::Vec3D;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

/// Battery drain scripted onto the demo's failing vehicle, percent per
/// second. Enough to trip the discharge detector within a few polls.
const DEMO_DISCHARGE_RATE: f64 = 2.0;

/// Initial allocation of the nine grid zones across the five vehicles.
const INITIAL_ASSIGNMENTS: [(usize, usize); 9] =
    [(1, 1), (4, 1), (2, 2), (3, 2), (5, 3), (7, 4), (8, 4), (6, 5), (9, 5)];

/// Launch spots, one per grid corner plus the center for vehicle 3.
const LAUNCH_SPOTS: [[f64; 3]; 5] = [
    [20.0, 100.0, 30.0],
    [100.0, 100.0, 30.0],
    [60.0, 60.0, 30.0],
    [20.0, 20.0, 30.0],
    [100.0, 20.0, 30.0],
];

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    info!("Kestrel GCS starting up");
    let config = GCSConfig::default();
    let k = Keychain::new(&config);
    k.engine().add_observer(Arc::new(EventLogObserver));

    let task_ids = k.m_db().load_scenario(&surveillance_grid());

    let mut sims = Vec::new();
    for (i, spot) in LAUNCH_SPOTS.iter().enumerate() {
        let vehicle_id = i + 1;
        let sim = SimVehicle::new(Vec3D::from(*spot), 90.0, 1.5);
        k.f_mon()
            .register(vehicle_id, Box::new(sim.link()))
            .await
            .unwrap_or_else(|e| fatal!("Vehicle registration failed: {e}"));
        sims.push(sim);
    }

    for (task, vehicle) in INITIAL_ASSIGNMENTS {
        k.m_db().assign(task, vehicle).unwrap_or_else(|e| fatal!("Initial assignment failed: {e}"));
    }
    for (i, sim) in sims.iter().enumerate() {
        sim.set_active_tasks(k.m_db().tasks_of(i + 1));
    }
    info!("Mission loaded: {} task(s) across {} vehicle(s)", task_ids.len(), sims.len());

    let token = CancellationToken::new();
    let monitor = k.f_mon();
    let monitor_token = token.clone();
    let monitor_handle = tokio::spawn(async move {
        monitor.run(monitor_token).await;
    });
    let worker_handle = k.spawn_decision_worker(token.clone());

    tokio::time::sleep(Duration::from_secs(3)).await;
    info!("Scripting a battery anomaly on vehicle 3");
    sims[2].set_discharge_rate(DEMO_DISCHARGE_RATE);

    tokio::time::sleep(Duration::from_secs(12)).await;

    let (operational, failed) = k.f_mon().counts().await;
    info!("Fleet: {operational} operational / {failed} failed");
    info!("Mission: {}", k.m_db().stats());
    info!("Engine: {}", k.engine().performance_stats());

    token.cancel();
    monitor_handle.await.ok();
    worker_handle.await.ok();
    info!("Kestrel GCS shut down");
}
