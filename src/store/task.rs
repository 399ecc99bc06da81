//! Task store: scheduled sampling tasks, their status and persistence.
//!
//! A task owns an ordered list of valves; `valve_offset_start` points at
//! the next valve it has not yet used.  Each run consumes one valve.
//!
//! ```text
//!  INACTIVE ──[schedule]──▶ ACTIVE ──[last valve used / missed / stopped]──▶ COMPLETED
//!      ▲                       │
//!      └────[unschedule]───────┘
//! ```

use std::collections::BTreeMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{ConfigError, StoragePort};
use crate::error::{Result, ValidationError};
use crate::store::valve::{ValveId, ValveStatus, ValveStore};

pub type TaskId = u32;

/// A task must be scheduled at least this far ahead (seconds).
pub const MIN_SCHEDULE_MARGIN_SECS: i64 = 3;

/// Longest gap between two runs of a multi-valve task (30 days).
pub const MAX_TIME_BETWEEN_SECS: i64 = 30 * 24 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Draft; invisible to the scheduler.
    Inactive,
    /// Scheduled or running.
    Active,
    /// Finished, missed or cancelled.
    Completed,
}

/// Per-task parameters bound into the sampling procedure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskParams {
    /// Main-line flush before sampling (seconds)
    pub flush_secs: u32,
    /// Sampling time limit (seconds)
    pub sample_secs: u32,
    /// Sampling stops once line pressure reaches this
    pub sample_pressure: f32,
    /// Sampling stops once this volume has passed the filter (mL)
    pub sample_volume: f32,
}

impl Default for TaskParams {
    fn default() -> Self {
        Self {
            flush_secs: 150,
            sample_secs: 300,
            sample_pressure: 8.0,
            sample_volume: 1000.0,
        }
    }
}

impl TaskParams {
    pub fn validate(&self) -> core::result::Result<(), ConfigError> {
        if !(1..=3600).contains(&self.flush_secs) {
            return Err(ConfigError::ValidationFailed("flush_secs must be 1–3600"));
        }
        if !(1..=7200).contains(&self.sample_secs) {
            return Err(ConfigError::ValidationFailed("sample_secs must be 1–7200"));
        }
        if !(self.sample_pressure > 0.0 && self.sample_pressure <= 100.0) {
            return Err(ConfigError::ValidationFailed("sample_pressure must be in (0, 100]"));
        }
        if !(self.sample_volume > 0.0 && self.sample_volume <= 10_000.0) {
            return Err(ConfigError::ValidationFailed("sample_volume must be in (0, 10000]"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(default)]
    pub name: String,
    pub status: TaskStatus,
    /// Absolute start time, seconds since the Unix epoch.
    pub schedule: i64,
    /// Gap between consecutive runs of a multi-valve task (seconds).
    #[serde(default)]
    pub time_between_secs: i64,
    #[serde(default)]
    pub valves: Vec<ValveId>,
    #[serde(default)]
    pub valve_offset_start: usize,
    #[serde(default)]
    pub params: TaskParams,
}

impl Task {
    pub fn new(id: TaskId, name: &str, params: TaskParams) -> Self {
        Self {
            id,
            name: name.to_owned(),
            status: TaskStatus::Inactive,
            schedule: 0,
            time_between_secs: 0,
            valves: Vec::new(),
            valve_offset_start: 0,
            params,
        }
    }

    pub fn number_of_valves(&self) -> usize {
        self.valves.len()
    }

    /// The valve the next run will claim.
    pub fn current_valve(&self) -> Option<ValveId> {
        self.valves.get(self.valve_offset_start).copied()
    }

    /// Valves from the claim offset onward.
    pub fn unclaimed_valves(&self) -> &[ValveId] {
        self.valves.get(self.valve_offset_start..).unwrap_or(&[])
    }

    pub fn is_active(&self) -> bool {
        self.status == TaskStatus::Active
    }

    /// Range check for the fields an operator edits besides `params`.
    pub fn validate_timing(&self) -> core::result::Result<(), ConfigError> {
        if !(0..=MAX_TIME_BETWEEN_SECS).contains(&self.time_between_secs) {
            return Err(ConfigError::ValidationFailed("time_between_secs must be 0–2592000"));
        }
        Ok(())
    }
}

/// All known tasks, keyed by id.
#[derive(Default)]
pub struct TaskStore {
    tasks: BTreeMap<TaskId, Task>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        Self {
            tasks: tasks.into_iter().map(|t| (t.id, t)).collect(),
        }
    }

    /// Load every `*.json` task file in `folder`.  Unreadable files are
    /// skipped with a warning; a listing failure is an error.
    pub fn load_from_directory(storage: &dyn StoragePort, folder: &str) -> Result<Self> {
        let mut store = Self::new();
        for name in storage.list(folder)? {
            if !name.ends_with(".json") {
                continue;
            }
            let path = format!("{folder}/{name}");
            let decoded = storage
                .read(&path)
                .map_err(crate::error::Error::from)
                .and_then(|bytes| serde_json::from_slice::<Task>(&bytes).map_err(Into::into));
            match decoded {
                Ok(task) => {
                    store.tasks.insert(task.id, task);
                }
                Err(e) => warn!("Task file {} skipped: {}", path, e),
            }
        }
        info!(
            "TaskStore: loaded {} tasks ({} active) from '{}'",
            store.tasks.len(),
            store.tasks.values().filter(|t| t.is_active()).count(),
            folder
        );
        Ok(store)
    }

    pub fn find(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn find_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> + '_ {
        self.tasks.values()
    }

    /// Create an inactive task with the next free id.
    pub fn create(&mut self, name: &str, params: TaskParams) -> TaskId {
        let id = self.tasks.keys().next_back().map_or(1, |last| last + 1);
        self.tasks.insert(id, Task::new(id, name, params));
        info!("Task {} '{}' created", id, name);
        id
    }

    /// Active task ids, soonest schedule first, ties by id.
    pub fn active_sorted_ids(&self) -> Vec<TaskId> {
        let mut active: Vec<(i64, TaskId)> = self
            .tasks
            .values()
            .filter(|t| t.is_active())
            .map(|t| (t.schedule, t.id))
            .collect();
        active.sort_unstable();
        active.into_iter().map(|(_, id)| id).collect()
    }

    /// Returns `true` if the status changed.
    pub fn mark_completed(&mut self, id: TaskId) -> bool {
        match self.tasks.get_mut(&id) {
            Some(task) if task.status != TaskStatus::Completed => {
                task.status = TaskStatus::Completed;
                info!("Task {} completed", id);
                true
            }
            _ => false,
        }
    }

    /// Checks for accepting an edited task.  `current` is the task the
    /// scheduler is running, if any.
    pub fn validate_for_saving(
        &self,
        task: &Task,
        current: Option<TaskId>,
    ) -> core::result::Result<(), ValidationError> {
        if current == Some(task.id) {
            return Err(ValidationError::TaskExecuting(task.id));
        }
        let Some(stored) = self.find(task.id) else {
            return Err(ValidationError::TaskNotFound(task.id));
        };
        if stored.is_active() {
            return Err(ValidationError::TaskActive(task.id));
        }
        Ok(())
    }

    /// Checks before a task may become active.
    pub fn validate_for_scheduling(
        &self,
        id: TaskId,
        valves: &ValveStore,
        now: i64,
    ) -> core::result::Result<(), ValidationError> {
        let Some(task) = self.find(id) else {
            return Err(ValidationError::TaskNotFound(id));
        };
        if task.number_of_valves() == 0 {
            return Err(ValidationError::NoValves);
        }
        if task.schedule <= now + MIN_SCHEDULE_MARGIN_SECS {
            return Err(ValidationError::NotInFuture);
        }
        for &v in &task.valves {
            match valves.status(v) {
                None => return Err(ValidationError::ValveUnknown(v)),
                Some(ValveStatus::Unavailable) => return Err(ValidationError::ValveUnavailable(v)),
                Some(ValveStatus::Sampled) => return Err(ValidationError::ValveSampled(v)),
                Some(ValveStatus::Operating) => return Err(ValidationError::ValveOperating(v)),
                Some(ValveStatus::Available) => {}
            }
        }
        Ok(())
    }

    /// Replace a stored task after [`validate_for_saving`](Self::validate_for_saving).
    /// The stored status is kept; edits never activate a task.
    pub fn update(&mut self, mut task: Task) -> bool {
        match self.tasks.get_mut(&task.id) {
            Some(stored) => {
                task.status = stored.status;
                *stored = task;
                true
            }
            None => false,
        }
    }

    /// Remove a task from memory and storage.
    pub fn delete(&mut self, id: TaskId, storage: &mut dyn StoragePort, folder: &str) -> Result<bool> {
        if !self.tasks.contains_key(&id) {
            return Ok(false);
        }
        storage.remove(&Self::path(folder, id))?;
        self.tasks.remove(&id);
        info!("Task {} deleted", id);
        Ok(true)
    }

    /// Write every task back to `folder`.
    pub fn persist_all(&self, storage: &mut dyn StoragePort, folder: &str) -> Result<()> {
        for task in self.tasks.values() {
            let bytes = serde_json::to_vec(task)?;
            storage.write(&Self::path(folder, task.id), &bytes)?;
        }
        Ok(())
    }

    fn path(folder: &str, id: TaskId) -> String {
        format!("{folder}/{id}.json")
    }
}
