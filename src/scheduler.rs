//! Task scheduler: picks the next task to run each tick.
//!
//! ```text
//!  active tasks, soonest first
//!        │
//!        ▼
//!  ┌─────────────┐ yes ┌──────────────────────────────────────────┐
//!  │ is current? ├────▶│ stop requested? cancel timer, next task   │
//!  └──────┬──────┘     │ else            → OPERATING               │
//!         │ no         └──────────────────────────────────────────┘
//!         ▼
//!  ┌─────────────┐ yes
//!  │ now ≥ due?  ├────▶ missed: free valves, complete, next task
//!  └──────┬──────┘
//!         │ no
//!         ▼
//!  ┌─────────────┐ yes
//!  │ due ≤ 10s?  ├────▶ arm BeginSampling, claim valve → OPERATING
//!  └──────┬──────┘
//!         │ no
//!         ▼
//!  RTC alarm at due − 8s → SCHEDULED
//!
//!  nothing left → UNAVAILABLE
//! ```
//!
//! The scheduler owns the notion of "current task" and the per-tick
//! prevent-shutdown flag.  Everything else it touches is borrowed through
//! [`SchedulingContext`] for the duration of one call.

use log::{info, warn};

use crate::app::ports::{PowerPort, StoragePort};
use crate::fsm::Controller;
use crate::store::task::{Task, TaskId, TaskStore};
use crate::store::valve::{ValveStatus, ValveStore};
use crate::timer::{ActionScheduler, BEGIN_SAMPLING, DeferredAction};

/// A task due within this many seconds is started from the timer rather
/// than from a wake alarm.
pub const LEAD_WINDOW_SECS: i64 = 10;

/// Wake alarms are programmed this many seconds ahead of the due time.
pub const ALARM_LEAD_SECS: i64 = 8;

// ═══════════════════════════════════════════════════════════════
//  Outcome
// ═══════════════════════════════════════════════════════════════

/// Result of one scheduler evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Unavailable,
    Operating,
    Scheduled,
    Interrupted,
}

impl ScheduleOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::Operating => "operating",
            Self::Scheduled => "scheduled",
            Self::Interrupted => "interrupted",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Unavailable => "No active task",
            Self::Operating => "Task is being executed",
            Self::Scheduled => "Task scheduled for execution",
            Self::Interrupted => "Task was interrupted due to temperature",
        }
    }
}

impl core::fmt::Display for ScheduleOutcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler
// ═══════════════════════════════════════════════════════════════

/// Collaborators borrowed for one evaluation.
pub struct SchedulingContext<'a> {
    pub tasks: &'a mut TaskStore,
    pub valves: &'a mut ValveStore,
    pub timers: &'a mut ActionScheduler,
    pub controller: &'a mut Controller,
    pub power: &'a mut dyn PowerPort,
    pub storage: &'a mut dyn StoragePort,
    pub task_folder: &'a str,
    pub valve_folder: &'a str,
    /// Monotonic clock, for arming the delayed start.
    pub now_ms: u64,
}

impl SchedulingContext<'_> {
    /// Write back tasks and changed valves.  Failures are logged; the
    /// next persist retries.
    pub fn persist(&mut self) {
        if let Err(e) = self.tasks.persist_all(self.storage, self.task_folder) {
            warn!("Scheduler: task persist failed: {}", e);
        }
        if let Err(e) = self.valves.persist_dirty(self.storage, self.valve_folder) {
            warn!("Scheduler: valve persist failed: {}", e);
        }
    }
}

#[derive(Debug, Default)]
pub struct TaskScheduler {
    current_task: Option<TaskId>,
    prevent_shutdown: bool,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_task(&self) -> Option<TaskId> {
        self.current_task
    }

    /// Set by the last evaluation when a task is running or imminent.
    pub fn prevent_shutdown(&self) -> bool {
        self.prevent_shutdown
    }

    /// Forget the current task once its run has been finalised.
    pub fn clear_current(&mut self) {
        self.current_task = None;
    }

    /// Decide what to run next.
    pub fn schedule_next(&mut self, stop_current: bool, ctx: &mut SchedulingContext<'_>) -> ScheduleOutcome {
        self.prevent_shutdown = false;
        let now = ctx.power.now();

        // The current task holds the controller until it completes or is
        // stopped, whatever else became due in the meantime.
        let stopped = match self.current_task {
            Some(id) if stop_current => {
                ctx.timers.cancel(BEGIN_SAMPLING);
                Some(id)
            }
            Some(id) if ctx.tasks.find(id).is_some_and(Task::is_active) => {
                self.prevent_shutdown = true;
                return self.report(ScheduleOutcome::Operating, id);
            }
            _ => None,
        };

        for id in ctx.tasks.active_sorted_ids() {
            if stopped == Some(id) {
                continue;
            }

            let Some(task) = ctx.tasks.find(id) else {
                continue;
            };
            let schedule = task.schedule;

            if now >= schedule {
                warn!(
                    "Scheduler: task {} missed its window ({}s late)",
                    id,
                    now.saturating_sub(schedule)
                );
                Self::abandon(id, ctx);
                continue;
            }

            if now >= schedule - LEAD_WINDOW_SECS {
                let params = task.params;
                let Some(v) = task.current_valve() else {
                    warn!("Scheduler: task {} has no valve left to sample into, task dropped", id);
                    Self::abandon(id, ctx);
                    continue;
                };
                match ctx.valves.status(v) {
                    Some(ValveStatus::Available) => {
                        ctx.valves.claim(v);
                    }
                    Some(ValveStatus::Operating) => {}
                    other => {
                        warn!("Scheduler: task {} valve {} is {:?}, task dropped", id, v, other);
                        Self::abandon(id, ctx);
                        continue;
                    }
                }

                let delay_ms = (schedule - now) as u64 * 1000;
                ctx.timers.run(DeferredAction::BeginSampling { task_id: id }, delay_ms, ctx.now_ms);
                ctx.controller.configure(&params, Some(v));
                self.current_task = Some(id);
                self.prevent_shutdown = true;
                ctx.persist();
                return self.report(ScheduleOutcome::Operating, id);
            }

            ctx.power.schedule_alarm(schedule - ALARM_LEAD_SECS);
            return self.report(ScheduleOutcome::Scheduled, id);
        }

        self.current_task = None;
        info!("Scheduler: {}", ScheduleOutcome::Unavailable.description());
        ScheduleOutcome::Unavailable
    }

    /// Free the task's unclaimed valves, clear its assignment and complete it.
    fn abandon(id: TaskId, ctx: &mut SchedulingContext<'_>) {
        if let Some(task) = ctx.tasks.find_mut(id) {
            for &v in task.unclaimed_valves() {
                ctx.valves.set_free_if_not_yet_sampled(v);
            }
            task.valves.clear();
            task.valve_offset_start = 0;
        }
        ctx.tasks.mark_completed(id);
        ctx.persist();
    }

    fn report(&self, outcome: ScheduleOutcome, id: TaskId) -> ScheduleOutcome {
        info!("Scheduler: task {}: {}", id, outcome.description());
        outcome
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
