use super::messages::TelemetryRecord;
use super::transport::{TelemetryTransport, TransportError};
use crate::mission::TaskID;
use crate::util::Vec3D;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

#[derive(Debug)]
struct SimState {
    position: Vec3D<f64>,
    attitude: [f64; 4],
    battery_soc: f64,
    /// Battery drain applied between polls, percent per second.
    discharge_rate: f64,
    payload_capacity: f64,
    active_tasks: Vec<TaskID>,
    responsive: bool,
    last_poll: Option<DateTime<Utc>>,
}

/// Scriptable in-process stand-in for a vehicle-side telemetry endpoint.
///
/// The handle is shared with the scenario driver, which can script battery
/// drain, GPS jumps, altitude excursions and comm blackouts while the fleet
/// monitor polls the matching [`SimVehicleLink`]. Kinematics only; there is
/// no flight dynamics model behind it.
#[derive(Clone, Debug)]
pub struct SimVehicle {
    state: Arc<Mutex<SimState>>,
}

impl SimVehicle {
    pub fn new(position: Vec3D<f64>, battery_soc: f64, payload_capacity: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                position,
                attitude: [1.0, 0.0, 0.0, 0.0],
                battery_soc,
                discharge_rate: 0.0,
                payload_capacity,
                active_tasks: Vec::new(),
                responsive: true,
                last_poll: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates the transport half the fleet monitor polls.
    pub fn link(&self) -> SimVehicleLink { SimVehicleLink { vehicle: self.clone() } }

    /// Teleports the vehicle, e.g. to script a GPS discontinuity.
    pub fn set_position(&self, position: Vec3D<f64>) { self.lock().position = position; }

    /// Moves only the altitude component.
    pub fn set_altitude(&self, z: f64) {
        let mut state = self.lock();
        state.position = Vec3D::new(state.position.x(), state.position.y(), z);
    }

    pub fn set_battery(&self, soc: f64) { self.lock().battery_soc = soc; }

    /// Scripts a continuous drain in percent per second, applied lazily on
    /// each poll.
    pub fn set_discharge_rate(&self, percent_per_sec: f64) {
        self.lock().discharge_rate = percent_per_sec;
    }

    pub fn set_payload_capacity(&self, kg: f64) { self.lock().payload_capacity = kg; }

    pub fn set_active_tasks(&self, tasks: Vec<TaskID>) { self.lock().active_tasks = tasks; }

    /// Scripts a comm blackout: polls run into the caller's timeout.
    pub fn set_responsive(&self, responsive: bool) { self.lock().responsive = responsive; }

    pub fn battery_soc(&self) -> f64 { self.lock().battery_soc }
}

/// Transport half of a [`SimVehicle`].
pub struct SimVehicleLink {
    vehicle: SimVehicle,
}

#[async_trait]
impl TelemetryTransport for SimVehicleLink {
    async fn request_telemetry(
        &mut self,
        timeout: Duration,
    ) -> Result<TelemetryRecord, TransportError> {
        let responsive = self.vehicle.lock().responsive;
        if !responsive {
            // mimic a dead link: the caller's timeout elapses in full
            tokio::time::sleep(timeout).await;
            return Err(TransportError::Timeout);
        }
        let mut state = self.vehicle.lock();
        let now = Utc::now();
        if let Some(last) = state.last_poll {
            let dt = (now - last).num_milliseconds() as f64 / 1000.0;
            if dt > 0.0 {
                state.battery_soc = (state.battery_soc - state.discharge_rate * dt).max(0.0);
            }
        }
        state.last_poll = Some(now);
        Ok(TelemetryRecord::new(
            state.position.to_array(),
            Some(state.attitude),
            state.battery_soc,
            Some(state.payload_capacity),
            Some(state.active_tasks.clone()),
        ))
    }

    async fn close(&mut self) {}
}
