//! Application service: the hexagonal core.
//!
//! [`SamplerService`] owns the stores, the procedure controllers, the
//! deferred-action timer and the task scheduler.  All I/O flows through
//! port traits injected at call sites, making the entire service
//! testable with mock adapters.
//!
//! ```text
//!  SensorPort ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!                 │        SamplerService         │
//! ActuatorPort ◀──│ timers · controllers · sched  │ ──▶ PowerPort
//!                 │ valves · tasks · shutdown gate│ ◀─▶ StoragePort
//!                 └──────────────────────────────┘
//! ```
//!
//! One [`tick`](SamplerService::tick):
//! 1. run due deferred actions (delayed sampling start)
//! 2. tick every procedure controller; book valve outcomes of the run
//! 3. finalise the run once the sampling procedure is back in Idle
//! 4. let the scheduler pick the next task
//! 5. shutdown gate: power down unless held awake

use log::{info, warn};

use crate::config::SystemConfig;
use crate::error::{CommandError, Result, ValidationError, halt};
use crate::fsm::context::ProcedureContext;
use crate::fsm::{Controller, ControllerKind, Exit, StateId, Step};
use crate::scheduler::{ScheduleOutcome, SchedulingContext, TaskScheduler};
use crate::store::task::{Task, TaskId, TaskStatus, TaskStore};
use crate::store::valve::{ValveId, ValveStatus, ValveStore};
use crate::timer::{ActionScheduler, DeferredAction};

use super::commands::{AppCommand, CommandReply};
use super::events::AppEvent;
use super::ports::{ActuatorPort, ConfigError, EventSink, PowerPort, SensorPort, StoragePort};

// ───────────────────────────────────────────────────────────────
// Run record
// ───────────────────────────────────────────────────────────────

/// Book-keeping for the sampling run in progress.
#[derive(Debug, Clone, Copy)]
struct Run {
    task: TaskId,
    valve: Option<ValveId>,
    sampled: bool,
    interrupted: bool,
}

// ───────────────────────────────────────────────────────────────
// SamplerService
// ───────────────────────────────────────────────────────────────

pub struct SamplerService {
    config: SystemConfig,
    tasks: TaskStore,
    valves: ValveStore,
    timers: ActionScheduler,
    scheduler: TaskScheduler,
    sampling: Controller,
    hyperflush: Controller,
    prefill: Controller,
    run: Option<Run>,
    maintenance: bool,
    powered_off: bool,
    last_outcome: Option<ScheduleOutcome>,
    tick_count: u64,
    alarm_wakes: u32,
}

impl SamplerService {
    /// Construct the service from configuration and loaded stores.
    pub fn new(config: SystemConfig, tasks: TaskStore, valves: ValveStore) -> Self {
        let sampling = Controller::new(ControllerKind::Sampling, &config);
        let hyperflush = Controller::new(ControllerKind::HyperFlush, &config);
        let prefill = Controller::new(ControllerKind::Prefill, &config);
        Self {
            maintenance: config.maintenance_mode,
            config,
            tasks,
            valves,
            timers: ActionScheduler::new(),
            scheduler: TaskScheduler::new(),
            sampling,
            hyperflush,
            prefill,
            run: None,
            powered_off: false,
            last_outcome: None,
            tick_count: 0,
            alarm_wakes: 0,
        }
    }

    /// Boot: configuration, then valves and tasks from their folders.
    pub fn load(storage: &impl StoragePort, sink: &mut impl EventSink) -> Result<Self> {
        let config = SystemConfig::load_or_default(storage);
        let valves = ValveStore::load_from_directory(storage, &config.valve_folder)?;
        let tasks = TaskStore::load_from_directory(storage, &config.task_folder)?;
        sink.emit(&AppEvent::Started {
            tasks: tasks.len(),
            valves: valves.iter().count(),
        });
        Ok(Self::new(config, tasks, valves))
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one control cycle and return the scheduler's verdict.
    ///
    /// The `hw` parameter satisfies **both** [`SensorPort`] and
    /// [`ActuatorPort`]; this avoids a double mutable borrow while
    /// keeping the port boundary explicit.
    pub fn tick(
        &mut self,
        hw: &mut (impl SensorPort + ActuatorPort),
        power: &mut impl PowerPort,
        storage: &mut impl StoragePort,
        sink: &mut impl EventSink,
        now_ms: u64,
    ) -> ScheduleOutcome {
        if self.powered_off {
            halt("power module fault: still running after power-off");
        }
        self.tick_count += 1;

        // 1. Deferred actions
        for action in self.timers.poll(now_ms) {
            self.dispatch(action, hw, sink, now_ms);
        }

        // 2. Procedure controllers
        for kind in [ControllerKind::Sampling, ControllerKind::HyperFlush, ControllerKind::Prefill] {
            let step = {
                let (controller, valves) = self.controller_with_valves(kind);
                controller.tick(&mut ProcedureContext::new(&mut *hw, valves), now_ms)
            };
            if let Some(step) = step {
                self.on_step(kind, step, hw.flow_volume(), &mut *storage, sink);
            }
        }

        // 3. Run finalisation
        let interrupted = if self.run.is_some() && self.sampling.is_idle() {
            self.finish_run(power.now(), storage, sink)
        } else {
            false
        };

        // 4. Scheduler
        let mut outcome = self.schedule_next(false, power, storage, now_ms);
        if interrupted {
            outcome = ScheduleOutcome::Interrupted;
        }
        self.report(outcome, sink);

        // 5. Shutdown gate
        if !self.stay_awake() {
            self.power_down(hw, power, storage, sink);
        }
        outcome
    }

    /// RTC alarm interrupt.  The wake itself is the point: the next
    /// [`tick`](Self::tick) re-evaluates the schedule.
    pub fn on_alarm(&mut self) {
        self.alarm_wakes += 1;
        info!("RTC alarm wake #{}", self.alarm_wakes);
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an external command.  Rejected commands leave every store
    /// untouched.
    pub fn handle_command(
        &mut self,
        cmd: AppCommand,
        hw: &mut (impl SensorPort + ActuatorPort),
        power: &mut impl PowerPort,
        storage: &mut impl StoragePort,
        sink: &mut impl EventSink,
        now_ms: u64,
    ) -> core::result::Result<CommandReply, CommandError> {
        match cmd {
            AppCommand::CreateTask { name } => {
                let id = self.tasks.create(&name, self.config.default_task_params);
                self.persist(storage);
                Ok(CommandReply::Created(id))
            }
            AppCommand::SaveTask(task) => {
                self.validate_task_for_saving(&task)?;
                task.params.validate().and_then(|()| task.validate_timing()).map_err(|e| match e {
                    ConfigError::ValidationFailed(msg) => CommandError::BadParams(msg),
                    _ => CommandError::BadParams("unreadable parameters"),
                })?;
                if let Some(&v) = task.valves.iter().find(|&&v| self.valves.get(v).is_none()) {
                    return Err(ValidationError::ValveUnknown(v).into());
                }
                info!("Task {} saved", task.id);
                self.tasks.update(task);
                self.persist(storage);
                Ok(CommandReply::Done)
            }
            AppCommand::ScheduleTask(id) => {
                self.validate_task_for_scheduling(id, power.now())?;
                if let Some(task) = self.tasks.find_mut(id) {
                    task.status = TaskStatus::Active;
                }
                info!("Task {} scheduled", id);
                self.persist(storage);
                let outcome = self.schedule_next(false, power, storage, now_ms);
                self.report(outcome, sink);
                Ok(CommandReply::Done)
            }
            AppCommand::UnscheduleTask(id) => {
                if self.scheduler.current_task() == Some(id) {
                    return Err(ValidationError::TaskExecuting(id).into());
                }
                let Some(task) = self.tasks.find_mut(id) else {
                    return Err(ValidationError::TaskNotFound(id).into());
                };
                if task.status != TaskStatus::Active {
                    return Ok(CommandReply::Done);
                }
                task.status = TaskStatus::Inactive;
                if let Some(v) = task.current_valve() {
                    self.valves.set_free_if_not_yet_sampled(v);
                }
                info!("Task {} unscheduled", id);
                self.persist(storage);
                let outcome = self.schedule_next(false, power, storage, now_ms);
                self.report(outcome, sink);
                Ok(CommandReply::Done)
            }
            AppCommand::DeleteTask(id) => {
                if self.scheduler.current_task() == Some(id) {
                    return Err(ValidationError::TaskExecuting(id).into());
                }
                match self.tasks.delete(id, storage, &self.config.task_folder) {
                    Ok(true) => Ok(CommandReply::Done),
                    Ok(false) => Err(ValidationError::TaskNotFound(id).into()),
                    Err(e) => {
                        warn!("Task {} delete: storage failed: {}", id, e);
                        Err(CommandError::StorageFailed)
                    }
                }
            }
            AppCommand::StopCurrentTask => {
                let Some(id) = self.scheduler.current_task() else {
                    return Err(CommandError::NoCurrentTask);
                };
                self.stop_current(id, hw, power, storage, sink, now_ms);
                Ok(CommandReply::Done)
            }
            AppCommand::BeginHyperFlush => {
                self.begin_maintenance(ControllerKind::HyperFlush, hw, sink, now_ms)?;
                Ok(CommandReply::Done)
            }
            AppCommand::BeginPrefill => {
                self.begin_maintenance(ControllerKind::Prefill, hw, sink, now_ms)?;
                Ok(CommandReply::Done)
            }
            AppCommand::SetMaintenanceMode(on) => {
                if !on && self.maintenance_busy() {
                    return Err(CommandError::ProcedureBusy);
                }
                self.maintenance = on;
                info!("Maintenance mode {}", if on { "on" } else { "off" });
                Ok(CommandReply::Done)
            }
            AppCommand::SetValveStatus { id, status } => {
                match self.valves.status(id) {
                    None => return Err(ValidationError::ValveUnknown(id).into()),
                    Some(ValveStatus::Operating) => return Err(ValidationError::ValveOperating(id).into()),
                    Some(_) if status == ValveStatus::Operating => {
                        return Err(ValidationError::ValveOperating(id).into());
                    }
                    Some(_) => {}
                }
                self.valves.set_status(id, status);
                self.persist(storage);
                Ok(CommandReply::Done)
            }
        }
    }

    /// Whether an edited task may replace the stored one.
    pub fn validate_task_for_saving(&self, task: &Task) -> core::result::Result<(), ValidationError> {
        self.tasks.validate_for_saving(task, self.scheduler.current_task())
    }

    /// Whether a stored task may be activated at `now`.
    pub fn validate_task_for_scheduling(&self, id: TaskId, now: i64) -> core::result::Result<(), ValidationError> {
        self.tasks.validate_for_scheduling(id, &self.valves, now)
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    pub fn valves(&self) -> &ValveStore {
        &self.valves
    }

    pub fn current_task(&self) -> Option<TaskId> {
        self.scheduler.current_task()
    }

    /// Active state of a procedure controller.
    pub fn state(&self, kind: ControllerKind) -> StateId {
        self.controller(kind).current_state()
    }

    pub fn maintenance_mode(&self) -> bool {
        self.maintenance
    }

    pub fn is_powered_off(&self) -> bool {
        self.powered_off
    }

    pub fn pending_actions(&self) -> usize {
        self.timers.pending_count()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    // ── Internal ──────────────────────────────────────────────

    fn controller(&self, kind: ControllerKind) -> &Controller {
        match kind {
            ControllerKind::Sampling => &self.sampling,
            ControllerKind::HyperFlush => &self.hyperflush,
            ControllerKind::Prefill => &self.prefill,
        }
    }

    /// A controller plus the valve view its states read.
    fn controller_with_valves(&mut self, kind: ControllerKind) -> (&mut Controller, &ValveStore) {
        let controller = match kind {
            ControllerKind::Sampling => &mut self.sampling,
            ControllerKind::HyperFlush => &mut self.hyperflush,
            ControllerKind::Prefill => &mut self.prefill,
        };
        (controller, &self.valves)
    }

    fn maintenance_busy(&self) -> bool {
        !self.hyperflush.is_idle() || !self.prefill.is_idle()
    }

    fn stay_awake(&self) -> bool {
        self.maintenance || self.scheduler.prevent_shutdown()
    }

    fn schedule_next(
        &mut self,
        stop_current: bool,
        power: &mut dyn PowerPort,
        storage: &mut dyn StoragePort,
        now_ms: u64,
    ) -> ScheduleOutcome {
        let mut ctx = SchedulingContext {
            tasks: &mut self.tasks,
            valves: &mut self.valves,
            timers: &mut self.timers,
            controller: &mut self.sampling,
            power,
            storage,
            task_folder: &self.config.task_folder,
            valve_folder: &self.config.valve_folder,
            now_ms,
        };
        self.scheduler.schedule_next(stop_current, &mut ctx)
    }

    fn report(&mut self, outcome: ScheduleOutcome, sink: &mut impl EventSink) {
        if self.last_outcome != Some(outcome) {
            self.last_outcome = Some(outcome);
            sink.emit(&AppEvent::ScheduleChanged {
                outcome,
                task: self.scheduler.current_task(),
            });
        }
    }

    fn dispatch(
        &mut self,
        action: DeferredAction,
        hw: &mut (impl SensorPort + ActuatorPort),
        sink: &mut impl EventSink,
        now_ms: u64,
    ) {
        match action {
            DeferredAction::BeginSampling { task_id } => {
                if self.scheduler.current_task() != Some(task_id) || self.run.is_some() {
                    warn!("Delayed start for task {} is stale, ignored", task_id);
                    return;
                }
                for kind in [ControllerKind::HyperFlush, ControllerKind::Prefill] {
                    if !self.controller(kind).is_idle() {
                        warn!("Task {} preempts the {} procedure", task_id, kind.name());
                        let (controller, valves) = self.controller_with_valves(kind);
                        controller.stop(&mut ProcedureContext::new(&mut *hw, valves), now_ms);
                    }
                }
                let valve = self.sampling.params().valve;
                let from = self.sampling.current_state();
                {
                    let mut ctx = ProcedureContext::new(&mut *hw, &self.valves);
                    self.sampling.begin(&mut ctx, now_ms);
                }
                self.run = Some(Run {
                    task: task_id,
                    valve,
                    sampled: false,
                    interrupted: false,
                });
                sink.emit(&AppEvent::RunStarted { task: task_id, valve });
                sink.emit(&AppEvent::StateChanged {
                    procedure: ControllerKind::Sampling,
                    from,
                    to: self.sampling.current_state(),
                });
            }
        }
    }

    /// Book the valve consequences of a guard-fired transition.
    fn on_step(
        &mut self,
        kind: ControllerKind,
        step: Step,
        volume: f32,
        storage: &mut dyn StoragePort,
        sink: &mut impl EventSink,
    ) {
        sink.emit(&AppEvent::StateChanged {
            procedure: kind,
            from: step.from,
            to: self.controller(kind).current_state(),
        });
        if kind != ControllerKind::Sampling {
            return;
        }
        let Some(run) = self.run.as_mut() else {
            return;
        };
        match (step.from, step.exit) {
            (StateId::Sample, Exit::Continue) => {
                run.sampled = true;
                if let Some(v) = run.valve {
                    self.valves.mark_sampled(v);
                    sink.emit(&AppEvent::SampleTaken {
                        task: run.task,
                        valve: v,
                        volume,
                    });
                }
            }
            (_, Exit::Interrupt) if !run.sampled => {
                run.interrupted = true;
                if let Some(v) = run.valve {
                    self.valves.set_free_if_not_yet_sampled(v);
                }
                sink.emit(&AppEvent::RunInterrupted {
                    task: run.task,
                    valve: run.valve,
                    trigger: self.sampling.last_trigger(),
                });
            }
            _ => return,
        }
        if let Err(e) = self.valves.persist_dirty(storage, &self.config.valve_folder) {
            warn!("Valve persist failed: {}", e);
        }
    }

    /// Close the run: advance the task, reschedule or complete it.
    /// Returns whether the run was interrupted.
    fn finish_run(&mut self, now: i64, storage: &mut dyn StoragePort, sink: &mut impl EventSink) -> bool {
        let Some(run) = self.run.take() else {
            return false;
        };
        let mut completed = true;
        if let Some(task) = self.tasks.find_mut(run.task) {
            task.valve_offset_start += 1;
            if task.valve_offset_start < task.number_of_valves() {
                task.schedule = now.saturating_add(task.time_between_secs.max(1));
                completed = false;
                info!(
                    "Task {}: {} of {} valves used, next run at {}",
                    run.task,
                    task.valve_offset_start,
                    task.number_of_valves(),
                    task.schedule
                );
            }
        }
        if completed {
            self.tasks.mark_completed(run.task);
        }
        self.scheduler.clear_current();
        self.persist(storage);
        sink.emit(&AppEvent::RunFinished {
            task: run.task,
            completed,
        });
        run.interrupted
    }

    fn stop_current(
        &mut self,
        id: TaskId,
        hw: &mut (impl SensorPort + ActuatorPort),
        power: &mut impl PowerPort,
        storage: &mut impl StoragePort,
        sink: &mut impl EventSink,
        now_ms: u64,
    ) {
        info!("Stopping task {}", id);
        let outcome = self.schedule_next(true, power, storage, now_ms);
        {
            let mut ctx = ProcedureContext::new(&mut *hw, &self.valves);
            self.sampling.stop(&mut ctx, now_ms);
        }
        self.run = None;

        if let Some(task) = self.tasks.find_mut(id) {
            for &v in task.unclaimed_valves() {
                self.valves.set_free_if_not_yet_sampled(v);
            }
            task.valves.clear();
            task.valve_offset_start = 0;
        }
        self.tasks.mark_completed(id);
        if self.scheduler.current_task() == Some(id) {
            self.scheduler.clear_current();
        }
        self.persist(storage);
        sink.emit(&AppEvent::TaskStopped(id));
        self.report(outcome, sink);
    }

    fn begin_maintenance(
        &mut self,
        kind: ControllerKind,
        hw: &mut (impl SensorPort + ActuatorPort),
        sink: &mut impl EventSink,
        now_ms: u64,
    ) -> core::result::Result<(), CommandError> {
        if !self.maintenance {
            return Err(CommandError::MaintenanceModeRequired);
        }
        if self.scheduler.current_task().is_some() || !self.sampling.is_idle() || self.maintenance_busy() {
            return Err(CommandError::ProcedureBusy);
        }
        let (controller, valves) = self.controller_with_valves(kind);
        controller.begin(&mut ProcedureContext::new(&mut *hw, valves), now_ms);
        let to = controller.current_state();
        sink.emit(&AppEvent::StateChanged {
            procedure: kind,
            from: StateId::Idle,
            to,
        });
        Ok(())
    }

    fn persist(&mut self, storage: &mut dyn StoragePort) {
        if let Err(e) = self.tasks.persist_all(storage, &self.config.task_folder) {
            warn!("Task persist failed: {}", e);
        }
        if let Err(e) = self.valves.persist_dirty(storage, &self.config.valve_folder) {
            warn!("Valve persist failed: {}", e);
        }
    }

    fn power_down(
        &mut self,
        hw: &mut impl ActuatorPort,
        power: &mut impl PowerPort,
        storage: &mut impl StoragePort,
        sink: &mut impl EventSink,
    ) {
        info!("Shutdown gate: nothing to keep awake, powering down");
        hw.pump_off();
        hw.write_all_low();
        hw.intake_off();
        if let Err(e) = self.tasks.persist_all(storage, &self.config.task_folder) {
            warn!("Task persist failed: {}", e);
        }
        if let Err(e) = self.valves.persist_all(storage, &self.config.valve_folder) {
            warn!("Valve persist failed: {}", e);
        }
        sink.emit(&AppEvent::PowerDown);
        self.powered_off = true;
        power.power_off();
    }
}
