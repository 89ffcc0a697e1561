use super::task::{Task, TaskID, TaskKind, TaskOptions, TaskStatus};
use crate::fleet::VehicleID;
use crate::util::Vec3D;
use crate::{event, info};
use chrono::{DateTime, TimeDelta, Utc};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt::{Display, Formatter},
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// A reallocation decision: vehicle id to the ordered task ids it newly
/// receives. Empty plans are legal and commit as a no-op.
pub type ReallocationPlan = BTreeMap<VehicleID, Vec<TaskID>>;

/// Input faults reported by the mission database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionError {
    /// The referenced task id does not exist.
    UnknownTask(TaskID),
    /// The referenced task already reached a terminal status.
    TerminalTask(TaskID),
}

impl Display for MissionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MissionError::UnknownTask(id) => write!(f, "unknown task {id}"),
            MissionError::TerminalTask(id) => write!(f, "task {id} is terminal"),
        }
    }
}

impl std::error::Error for MissionError {}

/// Per-status task counts and completion percentage.
#[derive(Debug, Clone, Copy, Default)]
pub struct MissionStats {
    total: usize,
    pending: usize,
    assigned: usize,
    in_progress: usize,
    completed: usize,
    failed: usize,
    completion_percent: f64,
}

impl MissionStats {
    pub fn total(&self) -> usize { self.total }

    pub fn pending(&self) -> usize { self.pending }

    pub fn assigned(&self) -> usize { self.assigned }

    pub fn in_progress(&self) -> usize { self.in_progress }

    pub fn completed(&self) -> usize { self.completed }

    pub fn failed(&self) -> usize { self.failed }

    pub fn completion_percent(&self) -> f64 { self.completion_percent }
}

impl Display for MissionStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} tasks ({} pending, {} assigned, {} in progress, {} completed, {} failed, {:.1}% complete)",
            self.total,
            self.pending,
            self.assigned,
            self.in_progress,
            self.completed,
            self.failed,
            self.completion_percent
        )
    }
}

#[derive(Debug, Default)]
struct MissionStore {
    tasks: HashMap<TaskID, Task>,
    assignments: HashMap<VehicleID, Vec<TaskID>>,
    next_task_id: TaskID,
}

impl MissionStore {
    fn assign_locked(&mut self, task_id: TaskID, vehicle: VehicleID) -> Result<(), MissionError> {
        let task = self.tasks.get_mut(&task_id).ok_or(MissionError::UnknownTask(task_id))?;
        if task.status.is_terminal() {
            return Err(MissionError::TerminalTask(task_id));
        }
        let listed = self
            .assignments
            .get(&vehicle)
            .is_some_and(|list| list.contains(&task_id));
        if task.assigned_vehicle == Some(vehicle) && listed {
            return Ok(());
        }
        if let Some(prev) = task.assigned_vehicle {
            if let Some(list) = self.assignments.get_mut(&prev) {
                list.retain(|t| *t != task_id);
            }
        }
        task.assigned_vehicle = Some(vehicle);
        task.status = TaskStatus::Assigned;
        self.assignments.entry(vehicle).or_default().push(task_id);
        Ok(())
    }
}

/// Authoritative store of tasks, per-vehicle assignment lists and task
/// lifecycle transitions.
///
/// All state lives behind one `RwLock`; `commit_plan` takes the write lock
/// for the whole plan, so concurrent readers observe either the pre-commit
/// or the full post-commit state, never a partial plan.
#[derive(Debug, Default)]
pub struct MissionDatabase {
    store: RwLock<MissionStore>,
}

impl MissionDatabase {
    /// Fallback execution time for tasks created without one.
    const DEFAULT_TASK_DURATION: TimeDelta = TimeDelta::seconds(60);

    pub fn new() -> Self {
        Self {
            store: RwLock::new(MissionStore { next_task_id: 1, ..MissionStore::default() }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, MissionStore> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MissionStore> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a new pending task and returns its monotonically increasing id.
    ///
    /// A payload mass is retained only for delivery tasks.
    pub fn add_task(
        &self,
        kind: TaskKind,
        position: Vec3D<f64>,
        priority: f64,
        options: TaskOptions,
    ) -> TaskID {
        let mut store = self.write();
        let id = store.next_task_id;
        store.next_task_id += 1;
        let payload_kg = if kind == TaskKind::Delivery { options.payload_kg } else { None };
        store.tasks.insert(
            id,
            Task {
                id,
                kind,
                position,
                priority,
                status: TaskStatus::Pending,
                assigned_vehicle: None,
                deadline: options.deadline,
                duration: options.duration.unwrap_or(Self::DEFAULT_TASK_DURATION),
                payload_kg,
                zone_id: options.zone_id,
            },
        );
        event!("Added task {id}: {kind} at {position}");
        id
    }

    /// Retrieves a copy of the task, if it exists.
    pub fn get_task(&self, id: TaskID) -> Option<Task> { self.read().tasks.get(&id).cloned() }

    /// Assigns a task to a vehicle, detaching it from any prior vehicle.
    ///
    /// Idempotent when the pair already matches.
    pub fn assign(&self, task_id: TaskID, vehicle: VehicleID) -> Result<(), MissionError> {
        self.write().assign_locked(task_id, vehicle)
    }

    /// Returns the ordered task ids currently listed for a vehicle.
    pub fn tasks_of(&self, vehicle: VehicleID) -> Vec<TaskID> {
        self.read().assignments.get(&vehicle).cloned().unwrap_or_default()
    }

    /// Atomically applies a reallocation plan.
    ///
    /// Every task id is pre-checked; an unknown or terminal id fails the
    /// whole commit and leaves the database untouched.
    pub fn commit_plan(&self, plan: &ReallocationPlan) -> Result<(), MissionError> {
        let mut store = self.write();
        for &task_id in plan.values().flatten() {
            let task =
                store.tasks.get(&task_id).ok_or(MissionError::UnknownTask(task_id))?;
            if task.status.is_terminal() {
                return Err(MissionError::TerminalTask(task_id));
            }
        }
        let mut applied = 0;
        for (&vehicle, task_ids) in plan {
            for &task_id in task_ids {
                store.assign_locked(task_id, vehicle)?;
                applied += 1;
            }
        }
        if applied > 0 {
            info!("Committed reallocation: {applied} task(s) across {} vehicle(s)", plan.len());
        }
        Ok(())
    }

    /// Marks a task completed. The owning vehicle's list keeps the id so the
    /// historical assignment is preserved.
    pub fn mark_completed(&self, id: TaskID) -> Result<(), MissionError> {
        let mut store = self.write();
        let task = store.tasks.get_mut(&id).ok_or(MissionError::UnknownTask(id))?;
        task.status = TaskStatus::Completed;
        task.assigned_vehicle = None;
        Ok(())
    }

    /// Marks a task failed, keeping the historical assignment.
    pub fn mark_failed(&self, id: TaskID) -> Result<(), MissionError> {
        let mut store = self.write();
        let task = store.tasks.get_mut(&id).ok_or(MissionError::UnknownTask(id))?;
        task.status = TaskStatus::Failed;
        task.assigned_vehicle = None;
        Ok(())
    }

    /// Returns the sorted, deduplicated zone ids touched by the given tasks.
    /// Tasks without a zone are skipped.
    pub fn affected_zones(&self, task_ids: &[TaskID]) -> Vec<usize> {
        let store = self.read();
        let zones: BTreeSet<usize> = task_ids
            .iter()
            .filter_map(|id| store.tasks.get(id))
            .filter_map(|task| task.zone_id)
            .collect();
        zones.into_iter().collect()
    }

    /// Earliest deadline across all tasks, if any carries one.
    pub fn nearest_deadline(&self) -> Option<DateTime<Utc>> {
        self.read().tasks.values().filter_map(|task| task.deadline).min()
    }

    pub fn task_count(&self) -> usize { self.read().tasks.len() }

    /// Snapshot of per-status counts and completion percentage.
    pub fn stats(&self) -> MissionStats {
        let store = self.read();
        let mut stats = MissionStats { total: store.tasks.len(), ..MissionStats::default() };
        for task in store.tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Assigned => stats.assigned += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        if stats.total > 0 {
            stats.completion_percent = stats.completed as f64 / stats.total as f64 * 100.0;
        }
        stats
    }
}
