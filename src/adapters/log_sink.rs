//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the `log` facade (serial console in the field).  A journal or uplink
//! adapter would implement the same trait.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { tasks, valves } => {
                info!("START | tasks={} valves={}", tasks, valves);
            }
            AppEvent::StateChanged { procedure, from, to } => {
                info!("STATE | {} | {:?} -> {:?}", procedure.name(), from, to);
            }
            AppEvent::ScheduleChanged { outcome, task } => match task {
                Some(id) => info!("SCHED | {} | task={}", outcome, id),
                None => info!("SCHED | {}", outcome),
            },
            AppEvent::RunStarted { task, valve } => {
                info!("RUN   | task={} valve={:?} started", task, valve);
            }
            AppEvent::SampleTaken { task, valve, volume } => {
                info!("RUN   | task={} valve={} sampled {:.0}mL", task, valve, volume);
            }
            AppEvent::RunInterrupted { task, valve, trigger } => {
                warn!(
                    "RUN   | task={} valve={:?} interrupted by {}",
                    task,
                    valve,
                    trigger.unwrap_or("unknown")
                );
            }
            AppEvent::RunFinished { task, completed } => {
                info!(
                    "RUN   | task={} finished{}",
                    task,
                    if *completed { ", all valves used" } else { "" }
                );
            }
            AppEvent::TaskStopped(id) => {
                info!("RUN   | task={} stopped by operator", id);
            }
            AppEvent::PowerDown => {
                info!("POWER | shutting down");
            }
        }
    }
}
