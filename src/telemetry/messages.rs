use crate::mission::TaskID;
use crate::util::Vec3D;

/// Protocol revision stamped on every request.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Method name of the periodic telemetry poll.
pub const METHOD_GET_TELEMETRY: &str = "get_telemetry";

/// Method name of the post-reallocation mission push.
pub const METHOD_UPDATE_MISSION: &str = "update_mission";

/// One telemetry poll (core to vehicle), framed as a single JSON line.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct TelemetryRequest {
    jsonrpc: String,
    method: String,
    id: u64,
}

impl TelemetryRequest {
    pub fn new(id: u64) -> Self {
        Self {
            jsonrpc: PROTOCOL_VERSION.to_string(),
            method: METHOD_GET_TELEMETRY.to_string(),
            id,
        }
    }

    pub fn id(&self) -> u64 { self.id }

    pub fn method(&self) -> &str { &self.method }
}

/// Vehicle-side telemetry sample.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct TelemetryRecord {
    position: [f64; 3],
    attitude: Option<[f64; 4]>,
    battery_soc: f64,
    payload_capacity: Option<f64>,
    active_tasks: Option<Vec<TaskID>>,
}

impl TelemetryRecord {
    pub fn new(
        position: [f64; 3],
        attitude: Option<[f64; 4]>,
        battery_soc: f64,
        payload_capacity: Option<f64>,
        active_tasks: Option<Vec<TaskID>>,
    ) -> Self {
        Self { position, attitude, battery_soc, payload_capacity, active_tasks }
    }

    pub fn position(&self) -> Vec3D<f64> { Vec3D::from(self.position) }

    /// Reported attitude quaternion `[w, x, y, z]`, level flight when absent.
    pub fn attitude(&self) -> [f64; 4] { self.attitude.unwrap_or([1.0, 0.0, 0.0, 0.0]) }

    /// Battery state of charge in `[0, 100]`.
    pub fn battery_soc(&self) -> f64 { self.battery_soc }

    /// Spare payload capacity in kg, zero when not reported.
    pub fn payload_capacity(&self) -> f64 { self.payload_capacity.unwrap_or(0.0) }

    pub fn active_tasks(&self) -> &[TaskID] {
        self.active_tasks.as_deref().unwrap_or(&[])
    }
}

/// Reply envelope around one telemetry record.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct TelemetryResponse {
    jsonrpc: Option<String>,
    id: Option<u64>,
    result: Option<TelemetryRecord>,
    error: Option<String>,
}

impl TelemetryResponse {
    pub fn success(id: u64, record: TelemetryRecord) -> Self {
        Self {
            jsonrpc: Some(PROTOCOL_VERSION.to_string()),
            id: Some(id),
            result: Some(record),
            error: None,
        }
    }

    pub fn id(&self) -> Option<u64> { self.id }

    pub fn result(&self) -> Option<&TelemetryRecord> { self.result.as_ref() }

    pub fn error(&self) -> Option<&str> { self.error.as_deref() }
}

/// Mission command pushed by the external dispatcher after a committed
/// reallocation. The core only produces the shape; delivery is the
/// dispatcher's responsibility.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct MissionUpdate {
    jsonrpc: String,
    method: String,
    id: u64,
    params: MissionUpdateParams,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct MissionUpdateParams {
    task_ids: Vec<TaskID>,
    waypoints: Vec<[f64; 3]>,
}

impl MissionUpdate {
    pub fn new(id: u64, task_ids: Vec<TaskID>, waypoints: Vec<[f64; 3]>) -> Self {
        Self {
            jsonrpc: PROTOCOL_VERSION.to_string(),
            method: METHOD_UPDATE_MISSION.to_string(),
            id,
            params: MissionUpdateParams { task_ids, waypoints },
        }
    }

    pub fn task_ids(&self) -> &[TaskID] { &self.params.task_ids }

    pub fn waypoints(&self) -> &[[f64; 3]] { &self.params.waypoints }
}
