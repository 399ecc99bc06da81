//! Inbound commands to the application service.
//!
//! These represent actions requested by the outside world (serial
//! console, companion app) that the
//! [`SamplerService`](super::service::SamplerService) validates and acts
//! upon.

use crate::store::task::{Task, TaskId};
use crate::store::valve::{ValveId, ValveStatus};

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone)]
pub enum AppCommand {
    /// Create an inactive task with the configured default parameters.
    CreateTask { name: String },

    /// Replace an inactive task's fields.
    SaveTask(Task),

    /// Activate a task so the scheduler will run it.
    ScheduleTask(TaskId),

    /// Return an active task to draft.
    UnscheduleTask(TaskId),

    /// Remove a task from memory and storage.
    DeleteTask(TaskId),

    /// Abort the running task and free its valves.
    StopCurrentTask,

    /// Flush, clean and preload every offshoot (maintenance mode only).
    BeginHyperFlush,

    /// Prefill every sample bag (maintenance mode only).
    BeginPrefill,

    /// Hold the device awake regardless of tasks.
    SetMaintenanceMode(bool),

    /// Administrative valve status change (e.g. take a valve out of service).
    SetValveStatus { id: ValveId, status: ValveStatus },
}

/// Successful command result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandReply {
    Done,
    Created(TaskId),
}
