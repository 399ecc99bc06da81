//! Function-pointer procedure state machine.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  StateTable                                                    │
//! │  ┌──────────────┬─────────────────────────────┬─────────────┐  │
//! │  │ StateId      │ on_enter                    │ on_exit     │  │
//! │  ├──────────────┼─────────────────────────────┼─────────────┤  │
//! │  │ Idle         │ fn(ctx, params, guards)     │ -           │  │
//! │  │ Stop         │ fn(...) -> Some(Continue)   │ -           │  │
//! │  │ Sample       │ fn(...)                     │ fn(ctx)     │  │
//! │  │ …            │                             │             │  │
//! │  └──────────────┴─────────────────────────────┴─────────────┘  │
//! │                                                                │
//! │  Route table (per ControllerKind): (StateId, Exit) → StateId   │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the controller evaluates the active state's [`GuardSet`].
//! When a guard fires, the route table picks the next state: `on_exit`
//! for the current state runs, then `on_enter` for the next.  A state
//! whose `on_enter` returns an exit is left in the same call.  A
//! `(state, exit)` pair missing from the route table halts the device.

pub mod context;
pub mod guard;
pub mod states;

use context::{ProcedureContext, ProcedureParams};
use guard::GuardSet;
use log::{info, warn};

use crate::config::SystemConfig;
use crate::error::halt;
use crate::store::task::TaskParams;
use crate::store::valve::ValveId;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Every procedure state.  Must stay in sync with
/// [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Idle = 0,
    Stop = 1,
    ArgonFlush = 2,
    Flush = 3,
    Sample = 4,
    AirFlush = 5,
    OffshootClean = 6,
    OffshootPreload = 7,
    BagPrefill = 8,
}

impl StateId {
    pub const COUNT: usize = 9;
}

/// The two ways out of a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exit {
    /// Normal completion.
    Continue,
    /// Sensor anomaly; leave early and safely.
    Interrupt,
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Entry action: actuate, register guards, optionally exit at once.
pub type StateEnterFn =
    fn(&mut ProcedureContext<'_>, &ProcedureParams, &mut GuardSet) -> Option<Exit>;

/// Exit action.  Runs exactly once when the state is left.
pub type StateExitFn = fn(&mut ProcedureContext<'_>);

/// One row in the state table.
pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: StateEnterFn,
    pub on_exit: Option<StateExitFn>,
}

// ---------------------------------------------------------------------------
// Procedure graphs
// ---------------------------------------------------------------------------

/// Which procedure a controller runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    /// Argon flush, flush, sample, air flush.
    Sampling,
    /// Maintenance: flush, clean and preload every offshoot.
    HyperFlush,
    /// Maintenance: prefill every bag.
    Prefill,
}

impl ControllerKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sampling => "sampling",
            Self::HyperFlush => "hyperflush",
            Self::Prefill => "prefill",
        }
    }

    /// State entered by `begin()`.
    pub const fn first_state(self) -> StateId {
        match self {
            Self::Sampling => StateId::ArgonFlush,
            Self::HyperFlush => StateId::Flush,
            Self::Prefill => StateId::BagPrefill,
        }
    }

    /// Route table.  `None` is an unregistered transition.
    pub const fn route(self, from: StateId, exit: Exit) -> Option<StateId> {
        use Exit::{Continue, Interrupt};
        use StateId::*;
        match (self, from, exit) {
            (_, Stop, Continue) => Some(Idle),

            (Self::Sampling, ArgonFlush, Continue) => Some(Flush),
            (Self::Sampling, Flush, Continue) => Some(Sample),
            (Self::Sampling, Sample, Continue) => Some(AirFlush),
            (Self::Sampling, ArgonFlush | Flush | AirFlush, Interrupt) => Some(Stop),
            (Self::Sampling, AirFlush, Continue) => Some(Stop),

            (Self::HyperFlush, Flush, Continue) => Some(OffshootClean),
            (Self::HyperFlush, OffshootClean, Continue) => Some(OffshootPreload),
            (Self::HyperFlush, OffshootPreload, Continue) => Some(Stop),
            (Self::HyperFlush, Flush | OffshootClean, Interrupt) => Some(Stop),

            (Self::Prefill, BagPrefill, Continue) => Some(Stop),

            _ => None,
        }
    }
}

/// A guard-fired transition, as reported by [`Controller::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub from: StateId,
    pub exit: Exit,
    pub to: StateId,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Owns the active procedure state of one procedure graph.
pub struct Controller {
    kind: ControllerKind,
    table: [StateDescriptor; StateId::COUNT],
    params: ProcedureParams,
    current: StateId,
    guards: GuardSet,
    entered_at_ms: u64,
    last_trigger: Option<&'static str>,
}

impl Controller {
    /// A controller resting in Idle, timings taken from `config`.
    pub fn new(kind: ControllerKind, config: &SystemConfig) -> Self {
        let mut params = ProcedureParams::from_config(config);
        if kind == ControllerKind::HyperFlush {
            params.flush_secs = config.hyperflush_flush_secs;
        }
        Self {
            kind,
            table: states::build_state_table(),
            params,
            current: StateId::Idle,
            guards: GuardSet::new(),
            entered_at_ms: 0,
            last_trigger: None,
        }
    }

    /// Bind task parameters and the target valve.  Takes effect on the
    /// next `begin()`.
    pub fn configure(&mut self, params: &TaskParams, valve: Option<ValveId>) {
        self.params.bind_task(params, valve);
        info!(
            "Controller[{}]: configured valve={:?} flush={}s sample={}s",
            self.kind.name(),
            valve,
            params.flush_secs,
            params.sample_secs
        );
    }

    /// Enter the first state of the procedure.
    pub fn begin(&mut self, ctx: &mut ProcedureContext<'_>, now_ms: u64) {
        info!("Controller[{}]: begin", self.kind.name());
        self.transition_to(self.kind.first_state(), ctx, now_ms);
    }

    /// Force the Stop state (which chains on to Idle).
    pub fn stop(&mut self, ctx: &mut ProcedureContext<'_>, now_ms: u64) {
        info!("Controller[{}]: stop requested", self.kind.name());
        self.transition_to(StateId::Stop, ctx, now_ms);
    }

    /// Force Idle without cleanup.
    pub fn idle(&mut self, ctx: &mut ProcedureContext<'_>, now_ms: u64) {
        self.transition_to(StateId::Idle, ctx, now_ms);
    }

    /// Evaluate the active state's guards.  Returns the transition that
    /// fired, if any.
    pub fn tick(&mut self, ctx: &mut ProcedureContext<'_>, now_ms: u64) -> Option<Step> {
        let elapsed = now_ms.saturating_sub(self.entered_at_ms);
        let exit = self.guards.evaluate(elapsed, ctx)?;
        self.last_trigger = self.guards.trigger();
        let from = self.current;
        let to = self.advance(exit, ctx, now_ms);
        Some(Step { from, exit, to })
    }

    pub fn is_stop(&self) -> bool {
        self.current == StateId::Stop
    }

    pub fn is_idle(&self) -> bool {
        self.current == StateId::Idle
    }

    pub fn current_state(&self) -> StateId {
        self.current
    }

    pub fn state_name(&self) -> &'static str {
        self.table[self.current as usize].name
    }

    pub fn kind(&self) -> ControllerKind {
        self.kind
    }

    pub fn params(&self) -> &ProcedureParams {
        &self.params
    }

    /// Label of the sub-condition behind the last guard-fired transition.
    pub fn last_trigger(&self) -> Option<&'static str> {
        self.last_trigger
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    /// Follow `exit` out of the current state.  Returns the state entered.
    fn advance(&mut self, exit: Exit, ctx: &mut ProcedureContext<'_>, now_ms: u64) -> StateId {
        let from = self.current;
        let Some(next) = self.kind.route(from, exit) else {
            halt("Unhandled state transition");
        };
        if self.kind == ControllerKind::Sampling
            && exit == Exit::Interrupt
            && matches!(from, StateId::ArgonFlush | StateId::Flush)
        {
            warn!(
                "Controller[sampling]: sample interrupted in {} ({})",
                self.table[from as usize].name,
                self.last_trigger.unwrap_or("unknown")
            );
        }
        self.transition_to(next, ctx, now_ms);
        next
    }

    fn transition_to(&mut self, next: StateId, ctx: &mut ProcedureContext<'_>, now_ms: u64) {
        let mut next = next;
        // Bounded by the longest chain of immediate exits (Stop → Idle).
        for _ in 0..StateId::COUNT {
            info!(
                "Controller[{}]: {} -> {}",
                self.kind.name(),
                self.table[self.current as usize].name,
                self.table[next as usize].name
            );
            if let Some(exit) = self.table[self.current as usize].on_exit {
                exit(ctx);
            }

            self.current = next;
            self.guards.clear();
            self.entered_at_ms = now_ms;

            let enter = self.table[next as usize].on_enter;
            match enter(ctx, &self.params, &mut self.guards) {
                None => return,
                Some(exit) => match self.kind.route(next, exit) {
                    Some(after) => next = after,
                    None => halt("Unhandled state transition"),
                },
            }
        }
        halt("State entry loop");
    }
}
