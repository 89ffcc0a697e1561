use crate::fleet::VehicleID;
use crate::util::Vec3D;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Stable unique identifier of one unit of mission work.
pub type TaskID = usize;

/// The mission profile a task belongs to.
#[derive(Serialize, Deserialize, Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskKind {
    Surveillance,
    SearchRescue,
    Delivery,
}

/// Lifecycle state of a task.
///
/// `Completed` and `Failed` are terminal; a task never re-enters the
/// assigned set once terminal.
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// One unit of mission work.
///
/// `assigned_vehicle` is set iff the status is `Assigned` or `InProgress`,
/// and `payload_kg` is carried only by delivery tasks.
#[derive(Debug, Clone)]
pub struct Task {
    pub(crate) id: TaskID,
    pub(crate) kind: TaskKind,
    pub(crate) position: Vec3D<f64>,
    pub(crate) priority: f64,
    pub(crate) status: TaskStatus,
    pub(crate) assigned_vehicle: Option<VehicleID>,
    pub(crate) deadline: Option<DateTime<Utc>>,
    pub(crate) duration: TimeDelta,
    pub(crate) payload_kg: Option<f64>,
    pub(crate) zone_id: Option<usize>,
}

impl Task {
    pub fn id(&self) -> TaskID { self.id }

    pub fn kind(&self) -> TaskKind { self.kind }

    pub fn position(&self) -> Vec3D<f64> { self.position }

    /// Configured priority score in `[0, 100]`.
    pub fn priority(&self) -> f64 { self.priority }

    pub fn status(&self) -> TaskStatus { self.status }

    pub fn assigned_vehicle(&self) -> Option<VehicleID> { self.assigned_vehicle }

    pub fn deadline(&self) -> Option<DateTime<Utc>> { self.deadline }

    /// Nominal on-site execution time.
    pub fn duration(&self) -> TimeDelta { self.duration }

    pub fn payload_kg(&self) -> Option<f64> { self.payload_kg }

    pub fn zone_id(&self) -> Option<usize> { self.zone_id }
}

/// Optional attributes accepted when creating a task.
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    pub deadline: Option<DateTime<Utc>>,
    pub duration: Option<TimeDelta>,
    pub payload_kg: Option<f64>,
    pub zone_id: Option<usize>,
}
