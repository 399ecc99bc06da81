//! Outbound application events.
//!
//! The [`SamplerService`](super::service::SamplerService) emits these
//! through the [`EventSink`](super::ports::EventSink) port.  Adapters on
//! the other side decide what to do with them: log to serial, append to
//! an SD-card journal, forward to a host.

use crate::fsm::{ControllerKind, StateId};
use crate::scheduler::ScheduleOutcome;
use crate::store::task::TaskId;
use crate::store::valve::ValveId;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Stores loaded, service ready.
    Started { tasks: usize, valves: usize },

    /// A procedure controller moved between states.
    StateChanged {
        procedure: ControllerKind,
        from: StateId,
        to: StateId,
    },

    /// The scheduler's verdict changed since the previous tick.
    ScheduleChanged {
        outcome: ScheduleOutcome,
        task: Option<TaskId>,
    },

    /// The delayed start fired and sampling began.
    RunStarted { task: TaskId, valve: Option<ValveId> },

    /// A sample was taken into `valve`.
    SampleTaken { task: TaskId, valve: ValveId, volume: f32 },

    /// A sensor anomaly cut the run short.
    RunInterrupted {
        task: TaskId,
        valve: Option<ValveId>,
        trigger: Option<&'static str>,
    },

    /// The run ended; `completed` when the task has no valves left.
    RunFinished { task: TaskId, completed: bool },

    /// The running task was stopped by an operator.
    TaskStopped(TaskId),

    /// Actuators off, stores persisted, power about to be cut.
    PowerDown,
}
