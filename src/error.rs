//! Unified error types for the sampler control core.
//!
//! Three families, matching how each is handled:
//!
//! - **Recoverable domain errors** ([`ValidationError`], [`CommandError`])
//!   are returned to the caller untouched; nothing is mutated when one is
//!   produced.  Their `Display` output is the reason string handed back to
//!   the command/API layer.
//! - **Port errors** ([`StorageError`], [`ConfigError`]) come from the
//!   persistence collaborator and funnel into [`Error`].
//! - **Fatal programming errors** (an unregistered state transition, a
//!   tick after power-off) never return: [`halt`] logs a trace and panics.

use core::fmt;

use crate::app::ports::{ConfigError, StorageError};
use crate::store::task::TaskId;
use crate::store::valve::ValveId;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible non-fatal operation in the crate funnels into this type.
#[derive(Debug)]
pub enum Error {
    /// The persistence collaborator failed.
    Storage(StorageError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// A persisted entity could not be encoded or decoded.
    Codec(serde_json::Error),
    /// A task or scheduling request was rejected.
    Validation(ValidationError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Codec(e) => write!(f, "codec: {e}"),
            Self::Validation(e) => write!(f, "validation: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(e)
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

// ---------------------------------------------------------------------------
// Task validation
// ---------------------------------------------------------------------------

/// Why a task edit or scheduling request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// The task is the one the scheduler is currently running.
    TaskExecuting(TaskId),
    /// The task is scheduled; it must be unscheduled before editing.
    TaskActive(TaskId),
    /// No task with this id exists in the store.
    TaskNotFound(TaskId),
    /// A task needs at least one assigned valve to be scheduled.
    NoValves,
    /// Schedule time is not far enough in the future.
    NotInFuture,
    /// An assigned valve id has no entry in the valve store.
    ValveUnknown(ValveId),
    /// An assigned valve is administratively unavailable.
    ValveUnavailable(ValveId),
    /// An assigned valve already holds a sample.
    ValveSampled(ValveId),
    /// An assigned valve is claimed by a running task.
    ValveOperating(ValveId),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TaskExecuting(id) => write!(f, "Task {id} is currently executing"),
            Self::TaskActive(id) => write!(f, "Task {id} is currently active"),
            Self::TaskNotFound(id) => write!(f, "Task not found: invalid task id {id}"),
            Self::NoValves => write!(f, "Cannot schedule a task without an assigned valve"),
            Self::NotInFuture => write!(f, "Must be in the future"),
            Self::ValveUnknown(v) => write!(f, "Valve {v} does not exist"),
            Self::ValveUnavailable(v) => write!(f, "Valve {v} is not available"),
            Self::ValveSampled(v) => write!(f, "Valve {v} has already been sampled"),
            Self::ValveOperating(v) => write!(f, "Valve {v} is operating"),
        }
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Operator commands
// ---------------------------------------------------------------------------

/// Why an operator command was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Manual procedures only run with the device held awake.
    MaintenanceModeRequired,
    /// Another procedure is already running on the actuators.
    ProcedureBusy,
    /// There is no running task to stop.
    NoCurrentTask,
    /// Task parameters are out of range.
    BadParams(&'static str),
    /// The change could not be written; nothing was applied.
    StorageFailed,
    /// The underlying task request failed validation.
    Invalid(ValidationError),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaintenanceModeRequired => write!(f, "Maintenance mode required"),
            Self::ProcedureBusy => write!(f, "Another procedure is running"),
            Self::NoCurrentTask => write!(f, "No task is currently running"),
            Self::BadParams(msg) => write!(f, "Invalid task parameters: {msg}"),
            Self::StorageFailed => write!(f, "Storage failure, change not applied"),
            Self::Invalid(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<ValidationError> for CommandError {
    fn from(e: ValidationError) -> Self {
        Self::Invalid(e)
    }
}

// ---------------------------------------------------------------------------
// Fatal trap
// ---------------------------------------------------------------------------

/// Stop the device on an inconsistent build or a power-module fault.
///
/// Never retried: reaching this means the procedure graph or the power
/// hardware is wrong, not that the field conditions were unusual.
#[track_caller]
pub fn halt(reason: &str) -> ! {
    let location = core::panic::Location::caller();
    log::error!("HALT at {}:{}: {}", location.file(), location.line(), reason);
    panic!("halt: {reason}");
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
