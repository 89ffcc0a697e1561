use super::database::MissionDatabase;
use super::task::{TaskID, TaskKind, TaskOptions};
use crate::util::Vec3D;
use chrono::{DateTime, TimeDelta, Utc};
use itertools::Itertools;
use serde::Deserialize;

/// Ordered list of task specs describing a mission on load.
///
/// The wire format (YAML, JSON, ...) is the embedder's concern; this is the
/// shape the core consumes.
#[derive(Deserialize, Debug, Clone)]
pub struct ScenarioSpec {
    tasks: Vec<TaskSpec>,
}

impl ScenarioSpec {
    pub fn new(tasks: Vec<TaskSpec>) -> Self { Self { tasks } }

    pub fn tasks(&self) -> &[TaskSpec] { &self.tasks }
}

/// One task description inside a scenario.
#[derive(Deserialize, Debug, Clone)]
pub struct TaskSpec {
    kind: TaskKind,
    position: [f64; 3],
    priority: f64,
    /// Absolute deadline, seconds since the Unix epoch.
    #[serde(default)]
    deadline: Option<f64>,
    #[serde(default)]
    duration_sec: Option<f64>,
    #[serde(default)]
    payload_kg: Option<f64>,
    #[serde(default)]
    zone_id: Option<usize>,
}

impl TaskSpec {
    pub fn new(kind: TaskKind, position: [f64; 3], priority: f64) -> Self {
        Self {
            kind,
            position,
            priority,
            deadline: None,
            duration_sec: None,
            payload_kg: None,
            zone_id: None,
        }
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline.timestamp_millis() as f64 / 1000.0);
        self
    }

    pub fn with_duration_sec(mut self, duration_sec: f64) -> Self {
        self.duration_sec = Some(duration_sec);
        self
    }

    pub fn with_payload_kg(mut self, payload_kg: f64) -> Self {
        self.payload_kg = Some(payload_kg);
        self
    }

    pub fn with_zone(mut self, zone_id: usize) -> Self {
        self.zone_id = Some(zone_id);
        self
    }
}

fn epoch_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
}

impl MissionDatabase {
    /// Loads every task of a scenario in order and returns the created ids.
    pub fn load_scenario(&self, scenario: &ScenarioSpec) -> Vec<TaskID> {
        let ids = scenario
            .tasks
            .iter()
            .map(|spec| {
                let options = TaskOptions {
                    deadline: spec.deadline.and_then(epoch_to_datetime),
                    duration: spec
                        .duration_sec
                        .map(|s| TimeDelta::milliseconds((s * 1000.0) as i64)),
                    payload_kg: spec.payload_kg,
                    zone_id: spec.zone_id,
                };
                self.add_task(spec.kind, Vec3D::from(spec.position), spec.priority, options)
            })
            .collect::<Vec<_>>();
        crate::info!("Loaded mission scenario: {} task(s)", ids.len());
        ids
    }
}

/// Ground-track centers of the canonical 3x3 patrol grid, row-major from the
/// top row, paired with their zone ids 1..=9.
fn grid_centers() -> Vec<(usize, f64, f64)> {
    [100.0, 60.0, 20.0]
        .into_iter()
        .cartesian_product([20.0, 60.0, 100.0])
        .enumerate()
        .map(|(i, (y, x))| (i + 1, x, y))
        .collect()
}

/// Nine-zone persistent surveillance scenario over the 3x3 grid, top row
/// prioritized highest.
pub fn surveillance_grid() -> ScenarioSpec {
    let tasks = grid_centers()
        .into_iter()
        .map(|(zone, x, y)| {
            let priority = match zone {
                1..=3 => 90.0,
                4..=6 => 60.0,
                _ => 40.0,
            };
            TaskSpec::new(TaskKind::Surveillance, [x, y, 30.0], priority)
                .with_zone(zone)
                .with_duration_sec(90.0)
        })
        .collect();
    ScenarioSpec::new(tasks)
}

/// Nine-zone search-and-rescue sweep over the same grid geometry.
pub fn sar_grid() -> ScenarioSpec {
    let priorities = [80.0, 85.0, 90.0, 55.0, 65.0, 75.0, 30.0, 35.0, 40.0];
    let tasks = grid_centers()
        .into_iter()
        .map(|(zone, x, y)| {
            TaskSpec::new(TaskKind::SearchRescue, [x, y, 30.0], priorities[zone - 1])
                .with_zone(zone)
                .with_duration_sec(120.0)
        })
        .collect();
    ScenarioSpec::new(tasks)
}

/// Five-package priority-ordered delivery run with per-package deadlines.
pub fn delivery_run(now: DateTime<Utc>) -> ScenarioSpec {
    let packages = [
        // (x, y, priority, payload_kg, deadline_sec)
        (40.0, 30.0, 70.0, 0.5, 900.0),
        (90.0, 70.0, 85.0, 2.0, 600.0),
        (15.0, 95.0, 60.0, 0.4, 1200.0),
        (70.0, 15.0, 55.0, 0.3, 1500.0),
        (110.0, 40.0, 65.0, 0.6, 1800.0),
    ];
    let tasks = packages
        .into_iter()
        .map(|(x, y, priority, payload, deadline_sec)| {
            TaskSpec::new(TaskKind::Delivery, [x, y, 25.0], priority)
                .with_payload_kg(payload)
                .with_deadline(now + TimeDelta::seconds(deadline_sec as i64))
                .with_duration_sec(60.0)
        })
        .collect();
    ScenarioSpec::new(tasks)
}
