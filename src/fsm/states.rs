//! Procedure state library: entry actuation and guard registration.
//!
//! Each state is a pair of plain `fn` pointers.  `on_enter` drives the
//! plant into the state's fixed configuration and registers the guards
//! that decide how it leaves; it may also return an exit immediately
//! (Stop does, to chain straight into Idle).
//!
//! ```text
//!  sampling:    ARGON_FLUSH ─▶ FLUSH ─▶ SAMPLE ─▶ AIR_FLUSH ─▶ STOP ─▶ IDLE
//!  hyper-flush: FLUSH ─▶ OFFSHOOT_CLEAN ─▶ OFFSHOOT_PRELOAD ─▶ STOP ─▶ IDLE
//!  prefill:     BAG_PREFILL ─▶ STOP ─▶ IDLE
//!
//!  any timed flush ──[pressure ≥ 20 | cold water]──▶ STOP (interrupt)
//! ```

use log::{info, warn};

use super::context::{ProcedureContext, ProcedureParams, secs_to_ms};
use super::guard::{Condition, GuardSet};
use super::{Exit, StateDescriptor, StateId};
use crate::app::ports::PumpDirection;
use crate::pins::{AIR_VALVE, FLUSH_VALVE, valve_pin};
use crate::store::valve::ValveStatus;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the state table.  Indexed by `StateId as usize`.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: idle_enter,
            on_exit: None,
        },
        StateDescriptor {
            id: StateId::Stop,
            name: "Stop",
            on_enter: stop_enter,
            on_exit: None,
        },
        StateDescriptor {
            id: StateId::ArgonFlush,
            name: "ArgonFlush",
            on_enter: argon_flush_enter,
            on_exit: None,
        },
        StateDescriptor {
            id: StateId::Flush,
            name: "Flush",
            on_enter: flush_enter,
            on_exit: None,
        },
        StateDescriptor {
            id: StateId::Sample,
            name: "Sample",
            on_enter: sample_enter,
            on_exit: Some(sample_exit),
        },
        StateDescriptor {
            id: StateId::AirFlush,
            name: "AirFlush",
            on_enter: air_flush_enter,
            on_exit: None,
        },
        StateDescriptor {
            id: StateId::OffshootClean,
            name: "OffshootClean",
            on_enter: offshoot_clean_enter,
            on_exit: None,
        },
        StateDescriptor {
            id: StateId::OffshootPreload,
            name: "OffshootPreload",
            on_enter: offshoot_preload_enter,
            on_exit: None,
        },
        StateDescriptor {
            id: StateId::BagPrefill,
            name: "BagPrefill",
            on_enter: bag_prefill_enter,
            on_exit: None,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Shared guard patterns
// ═══════════════════════════════════════════════════════════════════════════

/// Timed flush: continue after `secs`, interrupt on a sensor anomaly.
fn timed_with_anomaly(guards: &mut GuardSet, secs: u32) {
    guards.after(secs_to_ms(secs), Exit::Continue);
    guards.when(Condition::Anomaly, Exit::Interrupt);
}

/// Walk every fitted valve in store order, `dwell_secs` each, then continue.
fn carousel(ctx: &ProcedureContext<'_>, guards: &mut GuardSet, dwell_secs: u32) -> usize {
    let dwell_ms = secs_to_ms(dwell_secs);
    let mut previous = None;
    let mut counter: u64 = 0;
    for valve in ctx.valves.iter() {
        if valve.status == ValveStatus::Unavailable {
            continue;
        }
        let pin = valve_pin(valve.id);
        guards.at(counter * dwell_ms, previous, pin);
        previous = Some(pin);
        counter += 1;
    }
    guards.after(counter * dwell_ms, Exit::Continue);
    counter as usize
}

fn raise_task_valve(ctx: &mut ProcedureContext<'_>, params: &ProcedureParams, state: &str) {
    match params.valve {
        Some(id) => ctx.io.set_pin(valve_pin(id), true),
        None => warn!("{}: no valve bound, manifold left closed", state),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE / STOP
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(_: &mut ProcedureContext<'_>, _: &ProcedureParams, _: &mut GuardSet) -> Option<Exit> {
    info!("IDLE: quiescent");
    None
}

fn stop_enter(ctx: &mut ProcedureContext<'_>, _: &ProcedureParams, _: &mut GuardSet) -> Option<Exit> {
    ctx.io.pump_off();
    ctx.io.write_all_low();
    ctx.io.intake_off();
    info!("STOP: pump off, outputs low, intake closed");
    Some(Exit::Continue)
}

// ═══════════════════════════════════════════════════════════════════════════
//  Timed flushes
// ═══════════════════════════════════════════════════════════════════════════

fn argon_flush_enter(
    ctx: &mut ProcedureContext<'_>,
    params: &ProcedureParams,
    guards: &mut GuardSet,
) -> Option<Exit> {
    ctx.io.set_all_low();
    raise_task_valve(ctx, params, "ARGON_FLUSH");
    ctx.io.write();
    ctx.io.pump_on(PumpDirection::Reverse);
    timed_with_anomaly(guards, params.argon_flush_secs);
    info!("ARGON_FLUSH: {}s reverse through valve {:?}", params.argon_flush_secs, params.valve);
    None
}

fn flush_enter(ctx: &mut ProcedureContext<'_>, params: &ProcedureParams, guards: &mut GuardSet) -> Option<Exit> {
    ctx.io.set_all_low();
    ctx.io.intake_on();
    ctx.io.set_pin(FLUSH_VALVE, true);
    ctx.io.write();
    ctx.io.pump_on(PumpDirection::Normal);
    timed_with_anomaly(guards, params.flush_secs);
    info!("FLUSH: main line for {}s", params.flush_secs);
    None
}

fn air_flush_enter(
    ctx: &mut ProcedureContext<'_>,
    params: &ProcedureParams,
    guards: &mut GuardSet,
) -> Option<Exit> {
    ctx.io.set_all_low();
    ctx.io.set_pin(AIR_VALVE, true);
    ctx.io.set_pin(FLUSH_VALVE, true);
    ctx.io.write();
    ctx.io.pump_on(PumpDirection::Normal);
    timed_with_anomaly(guards, params.air_flush_secs);
    info!("AIR_FLUSH: {}s", params.air_flush_secs);
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  SAMPLE
// ═══════════════════════════════════════════════════════════════════════════

fn sample_enter(ctx: &mut ProcedureContext<'_>, params: &ProcedureParams, guards: &mut GuardSet) -> Option<Exit> {
    ctx.io.set_all_low();
    ctx.io.intake_on();
    raise_task_valve(ctx, params, "SAMPLE");
    ctx.io.write();
    ctx.io.pump_on(PumpDirection::Normal);

    ctx.io.reset_flow_volume();
    ctx.io.start_flow_measurement();

    // No interrupt path: a started sample runs until one target is met.
    guards.when(
        Condition::SampleComplete {
            volume: params.sample_volume,
            pressure: params.sample_pressure,
            time_ms: secs_to_ms(params.sample_secs),
        },
        Exit::Continue,
    );
    info!(
        "SAMPLE: valve {:?}, until {:.0}mL / {:.1} pressure / {}s",
        params.valve, params.sample_volume, params.sample_pressure, params.sample_secs
    );
    None
}

fn sample_exit(ctx: &mut ProcedureContext<'_>) {
    ctx.io.stop_flow_measurement();
    info!("SAMPLE: done, {:.1}mL filtered", ctx.io.flow_volume());
}

// ═══════════════════════════════════════════════════════════════════════════
//  Valve carousels
// ═══════════════════════════════════════════════════════════════════════════

fn offshoot_clean_enter(
    ctx: &mut ProcedureContext<'_>,
    params: &ProcedureParams,
    guards: &mut GuardSet,
) -> Option<Exit> {
    ctx.io.set_all_low();
    ctx.io.intake_on();
    ctx.io.set_pin(FLUSH_VALVE, true);
    ctx.io.write();
    ctx.io.pump_on(PumpDirection::Reverse);
    let n = carousel(ctx, guards, params.clean_secs);
    guards.when(Condition::Anomaly, Exit::Interrupt);
    info!("OFFSHOOT_CLEAN: {} valves, {}s each", n, params.clean_secs);
    None
}

fn offshoot_preload_enter(
    ctx: &mut ProcedureContext<'_>,
    params: &ProcedureParams,
    guards: &mut GuardSet,
) -> Option<Exit> {
    ctx.io.set_pin(FLUSH_VALVE, false);
    ctx.io.intake_on();
    ctx.io.pump_on(PumpDirection::Normal);
    let n = carousel(ctx, guards, params.preload_secs);
    info!("OFFSHOOT_PRELOAD: {} valves, {}s each", n, params.preload_secs);
    None
}

fn bag_prefill_enter(
    ctx: &mut ProcedureContext<'_>,
    params: &ProcedureParams,
    guards: &mut GuardSet,
) -> Option<Exit> {
    ctx.io.set_all_low();
    ctx.io.intake_on();
    ctx.io.pump_on(PumpDirection::Normal);
    let n = carousel(ctx, guards, params.prefill_secs);
    info!("BAG_PREFILL: {} valves, {}s each", n, params.prefill_secs);
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════
