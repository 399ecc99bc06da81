//! Guard engine.
//!
//! A procedure state registers its exit conditions into a [`GuardSet`] on
//! entry.  Every tick the controller evaluates the set:
//!
//! ```text
//!   guards (registration order)
//!   ┌──────────────────────────┬──────────────────────────┐
//!   │ condition                │ effect                   │
//!   ├──────────────────────────┼──────────────────────────┤
//!   │ Elapsed(0)               │ Carousel { pin 8 }       │  action: fires once, keeps going
//!   │ Elapsed(5000)            │ Carousel { 8 → 9 }       │
//!   │ Elapsed(10000)           │ Transition(Continue)     │  first true transition latches
//!   │ Anomaly                  │ Transition(Interrupt)    │
//!   └──────────────────────────┴──────────────────────────┘
//! ```
//!
//! Action guards run at most once each.  The first transition guard seen
//! true latches the set: nothing is evaluated again until the controller
//! clears it on the next state entry.

use log::debug;

use super::Exit;
use super::context::ProcedureContext;

/// Line pressure at or above this is an anomaly.
pub const PRESSURE_LIMIT: f32 = 20.0;

/// Water temperature below this is an anomaly (only with the barometric
/// sensor fitted).
pub const TEMPERATURE_FLOOR: f32 = 1.0;

/// What a guard waits for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Condition {
    /// Time since state entry reached the given milliseconds.
    Elapsed(u64),
    /// Pressure at/above [`PRESSURE_LIMIT`], or temperature below
    /// [`TEMPERATURE_FLOOR`] while the pressure sensor is enabled.
    Anomaly,
    /// Any of: flow volume reached `volume`, pressure reached `pressure`,
    /// time in state reached `time_ms`.
    SampleComplete { volume: f32, pressure: f32, time_ms: u64 },
}

impl Condition {
    /// Evaluate against the current readings.  Returns the label of the
    /// matching sub-condition.  When several match, the last one in
    /// declared order names the firing; the transition is the same.
    fn check(&self, elapsed_ms: u64, ctx: &ProcedureContext<'_>) -> Option<&'static str> {
        match *self {
            Self::Elapsed(ms) => (elapsed_ms >= ms).then_some("time"),
            Self::Anomaly => {
                let mut label = None;
                if ctx.io.pressure() >= PRESSURE_LIMIT {
                    label = Some("pressure");
                }
                if ctx.io.temperature() < TEMPERATURE_FLOOR && ctx.io.pressure_sensor_enabled() {
                    label = Some("temperature");
                }
                label
            }
            Self::SampleComplete {
                volume,
                pressure,
                time_ms,
            } => {
                let mut label = None;
                if ctx.io.flow_volume() >= volume {
                    label = Some("volume");
                }
                if ctx.io.pressure() >= pressure {
                    label = Some("pressure");
                }
                if elapsed_ms >= time_ms {
                    label = Some("time");
                }
                label
            }
        }
    }
}

/// What happens when a guard's condition holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Leave the state through this exit.
    Transition(Exit),
    /// Carousel step: drop `previous` (if any), raise `pin`, latch.
    Carousel { previous: Option<u8>, pin: u8 },
}

#[derive(Debug, Clone, Copy)]
struct Guard {
    condition: Condition,
    effect: Effect,
    fired: bool,
}

/// The guards of one state activation.
#[derive(Debug, Default)]
pub struct GuardSet {
    guards: Vec<Guard>,
    latched: bool,
    trigger: Option<&'static str>,
}

impl GuardSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every guard and unlatch.  Called on each state entry.
    pub fn clear(&mut self) {
        self.guards.clear();
        self.latched = false;
        self.trigger = None;
    }

    /// Register a guard.  Order of registration is order of evaluation.
    pub fn register(&mut self, condition: Condition, effect: Effect) {
        self.guards.push(Guard {
            condition,
            effect,
            fired: false,
        });
    }

    /// Time guard leading to `exit`.
    pub fn after(&mut self, ms: u64, exit: Exit) {
        self.register(Condition::Elapsed(ms), Effect::Transition(exit));
    }

    /// Predicate guard leading to `exit`.
    pub fn when(&mut self, condition: Condition, exit: Exit) {
        self.register(condition, Effect::Transition(exit));
    }

    /// Timed carousel step.
    pub fn at(&mut self, ms: u64, previous: Option<u8>, pin: u8) {
        self.register(Condition::Elapsed(ms), Effect::Carousel { previous, pin });
    }

    /// Whether a transition has already fired for this activation.
    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Label of the sub-condition that fired the latched transition.
    pub fn trigger(&self) -> Option<&'static str> {
        self.trigger
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Evaluate every guard in order.  Returns the exit of the first
    /// transition guard that holds, at most once per activation.
    pub fn evaluate(&mut self, elapsed_ms: u64, ctx: &mut ProcedureContext<'_>) -> Option<Exit> {
        if self.latched {
            return None;
        }
        for guard in self.guards.iter_mut() {
            if guard.fired {
                continue;
            }
            let Some(label) = guard.condition.check(elapsed_ms, ctx) else {
                continue;
            };
            guard.fired = true;
            match guard.effect {
                Effect::Carousel { previous, pin } => {
                    if let Some(prev) = previous {
                        ctx.io.set_pin(prev, false);
                    }
                    ctx.io.set_pin(pin, true);
                    ctx.io.write();
                    debug!("Carousel: pin {} on at {}ms", pin, elapsed_ms);
                }
                Effect::Transition(exit) => {
                    self.latched = true;
                    self.trigger = Some(label);
                    debug!("Guard fired: {:?} ({}) at {}ms", exit, label, elapsed_ms);
                    return Some(exit);
                }
            }
        }
        None
    }
}
