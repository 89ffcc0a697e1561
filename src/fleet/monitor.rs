use super::VehicleID;
use super::state::FleetState;
use super::vehicle::{FailureMode, VehicleStatus};
use crate::config::GCSConfig;
use crate::telemetry::{TelemetryTransport, TransportError};
use crate::util::Vec3D;
use crate::{error, event, info, warn};
use chrono::{DateTime, TimeDelta, Utc};
use std::{
    collections::HashMap,
    env,
    fmt::{Display, Formatter},
    sync::{Mutex, PoisonError},
    time::Duration,
};
use tokio::{sync::RwLock, time::Instant};
use tokio_util::sync::CancellationToken;

/// Input faults reported by the fleet monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorError {
    AlreadyRegistered(VehicleID),
    UnknownVehicle(VehicleID),
}

impl Display for MonitorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorError::AlreadyRegistered(id) => write!(f, "vehicle {id} already registered"),
            MonitorError::UnknownVehicle(id) => write!(f, "unknown vehicle {id}"),
        }
    }
}

impl std::error::Error for MonitorError {}

/// Callback invoked synchronously on each operational-to-failed transition.
pub type FailureCallback = Box<dyn Fn(VehicleID, FailureMode) + Send + Sync>;

/// Anomaly thresholds evaluated by the failure detectors.
#[derive(Debug, Clone, Copy)]
struct DetectorThresholds {
    battery_discharge_rate: f64,
    position_discontinuity: f64,
    altitude_deviation: f64,
}

struct VehicleEntry {
    status: VehicleStatus,
    link: Box<dyn TelemetryTransport>,
}

/// Periodic telemetry poller and four-mode failure detector over the
/// registered fleet.
///
/// The monitor is the sole owner of every [`VehicleStatus`]; consumers read
/// the value snapshot from [`snapshot`](Self::snapshot). Failure callbacks
/// run on the polling task and must not block long; the decision engine
/// offloads its cycle to a worker for exactly that reason.
pub struct FleetMonitor {
    vehicles: RwLock<HashMap<VehicleID, VehicleEntry>>,
    callbacks: Mutex<Vec<FailureCallback>>,
    poll_interval: Duration,
    timeout_threshold: Duration,
    thresholds: DetectorThresholds,
}

impl FleetMonitor {
    /// Maximum plausible ground speed used to bound the position-jump check.
    const MAX_EXPECTED_SPEED: f64 = 15.0;
    /// Safe altitude envelope in meters.
    const ALTITUDE_MAX: f64 = 120.0;
    const ALTITUDE_MIN: f64 = 5.0;
    /// Span of battery samples evaluated by the discharge detector.
    const BATTERY_WINDOW: TimeDelta = TimeDelta::seconds(30);
    /// Minimum history depth before the discharge detector engages.
    const MIN_BATTERY_SAMPLES: usize = 5;
    const TRACK_POS_ENV: &'static str = "TRACK_FLEET_POS";

    pub fn new(config: &GCSConfig) -> Self {
        Self {
            vehicles: RwLock::new(HashMap::new()),
            callbacks: Mutex::new(Vec::new()),
            poll_interval: Duration::from_secs_f64(1.0 / config.ooda.telemetry_rate_hz),
            timeout_threshold: Duration::from_secs_f64(config.ooda.timeout_threshold_sec),
            thresholds: DetectorThresholds {
                battery_discharge_rate: config.constraints.battery_discharge_rate,
                position_discontinuity: config.constraints.position_discontinuity,
                altitude_deviation: config.constraints.altitude_deviation,
            },
        }
    }

    /// Registers a new vehicle with its telemetry channel.
    pub async fn register(
        &self,
        id: VehicleID,
        link: Box<dyn TelemetryTransport>,
    ) -> Result<(), MonitorError> {
        let mut vehicles = self.vehicles.write().await;
        if vehicles.contains_key(&id) {
            return Err(MonitorError::AlreadyRegistered(id));
        }
        vehicles.insert(id, VehicleEntry { status: VehicleStatus::new(id, Utc::now()), link });
        info!("Vehicle {id} registered");
        Ok(())
    }

    /// Closes the transport and drops the record.
    pub async fn unregister(&self, id: VehicleID) -> Result<(), MonitorError> {
        let mut vehicles = self.vehicles.write().await;
        let mut entry = vehicles.remove(&id).ok_or(MonitorError::UnknownVehicle(id))?;
        entry.link.close().await;
        info!("Vehicle {id} unregistered");
        Ok(())
    }

    /// Grants the per-vehicle permission to operate outside the grid.
    pub async fn grant_exit_grid(&self, id: VehicleID) -> Result<(), MonitorError> {
        let mut vehicles = self.vehicles.write().await;
        let entry = vehicles.get_mut(&id).ok_or(MonitorError::UnknownVehicle(id))?;
        entry.status.permissions.may_exit_grid = true;
        Ok(())
    }

    /// Adds a callback invoked on every failure event.
    pub fn subscribe_failures(
        &self,
        callback: impl Fn(VehicleID, FailureMode) + Send + Sync + 'static,
    ) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(callback));
    }

    /// Returns `(operational, failed)` vehicle counts.
    pub async fn counts(&self) -> (usize, usize) {
        let vehicles = self.vehicles.read().await;
        let operational = vehicles.values().filter(|e| e.status.operational).count();
        (operational, vehicles.len() - operational)
    }

    /// Builds a consistent, self-contained copy of the current fleet.
    pub async fn snapshot(&self) -> FleetState {
        let vehicles = self.vehicles.read().await;
        let mut operational = Vec::new();
        let mut failed = Vec::new();
        let mut positions = HashMap::new();
        let mut battery = HashMap::new();
        let mut payloads = HashMap::new();
        let mut permissions = HashMap::new();
        let mut lost_tasks = Vec::new();

        for (&id, entry) in vehicles.iter() {
            let status = &entry.status;
            if status.operational {
                operational.push(id);
            } else {
                failed.push(id);
                lost_tasks.extend_from_slice(&status.active_tasks);
            }
            positions.insert(id, status.position);
            battery.insert(id, status.battery_soc);
            payloads.insert(id, status.payload_capacity);
            permissions.insert(id, status.permissions);
        }

        FleetState::new(
            Utc::now(),
            operational,
            failed,
            positions,
            battery,
            payloads,
            lost_tasks,
            permissions,
        )
    }

    /// Runs the polling loop until the token is cancelled.
    pub async fn run(&self, token: CancellationToken) {
        let mut pos_csv = if env::var(Self::TRACK_POS_ENV).is_ok() {
            info!("Activated fleet position tracking!");
            csv::Writer::from_path("fleet_pos.csv").ok()
        } else {
            None
        };
        info!("Starting fleet monitor loop!");
        loop {
            let tick_start = Instant::now();
            self.poll_once().await;
            if let Some(writer) = pos_csv.as_mut() {
                self.track_positions(writer).await;
            }
            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep_until(tick_start + self.poll_interval) => {}
            }
        }
        info!("Fleet monitor loop stopped!");
    }

    /// Executes one polling tick over every registered vehicle.
    pub async fn poll_once(&self) {
        let mut ids: Vec<VehicleID> = { self.vehicles.read().await.keys().copied().collect() };
        ids.sort_unstable();

        for id in ids {
            let fired = {
                let mut vehicles = self.vehicles.write().await;
                let Some(entry) = vehicles.get_mut(&id) else {
                    continue; // unregistered mid-tick
                };
                let result = entry.link.request_telemetry(self.timeout_threshold).await;
                let now = Utc::now();
                match result {
                    Ok(record) => {
                        entry.status.update_telemetry(&record, now);
                        self.check_failures(&mut entry.status, now)
                    }
                    Err(TransportError::Timeout) => {
                        warn!("Timeout receiving telemetry from vehicle {id}");
                        self.check_failures(&mut entry.status, now)
                    }
                    Err(err) => {
                        error!("Telemetry channel fault on vehicle {id}: {err}");
                        Self::fail(&mut entry.status, FailureMode::Timeout)
                    }
                }
            };
            // the vehicle lock is released before subscribers run
            if let Some(mode) = fired {
                self.dispatch_failure(id, mode);
            }
        }
    }

    /// Evaluates the four detectors in order; the first match takes the
    /// vehicle out of the operational set. Already-failed vehicles never
    /// re-fire.
    pub(crate) fn check_failures(
        &self,
        status: &mut VehicleStatus,
        now: DateTime<Utc>,
    ) -> Option<FailureMode> {
        if !status.operational {
            return None;
        }
        if self.detect_comm_timeout(status, now) {
            return Self::fail(status, FailureMode::Timeout);
        }
        if self.detect_battery_anomaly(status, now) {
            return Self::fail(status, FailureMode::BatteryAnomaly);
        }
        if self.detect_position_anomaly(status) {
            return Self::fail(status, FailureMode::PositionAnomaly);
        }
        if self.detect_altitude_violation(status) {
            return Self::fail(status, FailureMode::AltitudeViolation);
        }
        None
    }

    fn detect_comm_timeout(&self, status: &VehicleStatus, now: DateTime<Utc>) -> bool {
        let stale = now - status.last_telemetry;
        stale.num_milliseconds() as f64 / 1000.0 > self.timeout_threshold.as_secs_f64()
    }

    /// Fires when the state of charge drained faster than the configured
    /// percent-per-30-seconds threshold, judged over the oldest and newest
    /// samples inside the trailing 30 s window.
    fn detect_battery_anomaly(&self, status: &VehicleStatus, now: DateTime<Utc>) -> bool {
        if status.battery_history.len() < Self::MIN_BATTERY_SAMPLES {
            return false;
        }
        let window_start = now - Self::BATTERY_WINDOW;
        let mut newest: Option<(DateTime<Utc>, f64)> = None;
        let mut oldest: Option<(DateTime<Utc>, f64)> = None;
        for &(t, soc) in status.battery_history.iter() {
            if t < window_start {
                break;
            }
            if newest.is_none() {
                newest = Some((t, soc));
            }
            oldest = Some((t, soc));
        }
        let (Some((t_new, soc_new)), Some((t_old, soc_old))) = (newest, oldest) else {
            return false;
        };
        let dt = (t_new - t_old).num_milliseconds() as f64 / 1000.0;
        if dt <= 0.0 {
            return false;
        }
        let discharge_rate = (soc_old - soc_new) / dt * 30.0;
        if discharge_rate > self.thresholds.battery_discharge_rate {
            warn!("Vehicle {} abnormal discharge: {discharge_rate:.1}%/30s", status.id);
            return true;
        }
        false
    }

    /// Fires on a jump between consecutive samples larger than both the
    /// configured threshold and the farthest feasible step per poll.
    fn detect_position_anomaly(&self, status: &VehicleStatus) -> bool {
        let (Some(last), Some(prev)) =
            (status.position_history.nth_latest(0), status.position_history.nth_latest(1))
        else {
            return false;
        };
        let jump = last.distance_to(prev);
        let max_expected = Self::MAX_EXPECTED_SPEED * self.poll_interval.as_secs_f64();
        if jump > self.thresholds.position_discontinuity.min(max_expected) {
            warn!("Vehicle {} position discontinuity: {jump:.1}m", status.id);
            return true;
        }
        false
    }

    fn detect_altitude_violation(&self, status: &VehicleStatus) -> bool {
        let altitude = status.position.z();
        let tolerance = self.thresholds.altitude_deviation;
        if altitude > Self::ALTITUDE_MAX + tolerance || altitude < Self::ALTITUDE_MIN - tolerance {
            warn!("Vehicle {} altitude violation: {altitude:.1}m", status.id);
            return true;
        }
        false
    }

    fn fail(status: &mut VehicleStatus, mode: FailureMode) -> Option<FailureMode> {
        if !status.operational {
            return None;
        }
        status.mark_failed(mode);
        error!("Vehicle {} FAILED: {mode}", status.id);
        Some(mode)
    }

    fn dispatch_failure(&self, id: VehicleID, mode: FailureMode) {
        let callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
        event!("Dispatching failure event ({id}, {mode}) to {} subscriber(s)", callbacks.len());
        for callback in callbacks.iter() {
            callback(id, mode);
        }
    }

    async fn track_positions(&self, writer: &mut csv::Writer<std::fs::File>) {
        let vehicles = self.vehicles.read().await;
        let stamp = Utc::now().timestamp_millis().to_string();
        for (id, entry) in vehicles.iter() {
            let pos: Vec3D<f64> = entry.status.position;
            let row = [
                stamp.clone(),
                id.to_string(),
                pos.x().to_string(),
                pos.y().to_string(),
                pos.z().to_string(),
            ];
            if writer.write_record(&row).is_err() {
                warn!("Could not write fleet position record!");
                return;
            }
        }
        writer.flush().ok();
    }
}
