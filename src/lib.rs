//! Control core for an autonomous environmental sampler.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │  HardwareAdapter   DirectoryStore   LogEventSink             │
//! │  (Sensor+Actuator) (Storage)        (EventSink)              │
//! │  ─────────────── Port Trait Boundary ───────────────         │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │            SamplerService (pure logic)                 │  │
//! │  │  Controllers · Guards · Scheduler · Stores · Timers    │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The board support layer owns the main loop: it calls
//! [`SamplerService::tick`](app::service::SamplerService::tick) as fast
//! as it likes, routes the RTC alarm into `on_alarm` and operator
//! requests into `handle_command`.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod fsm;
pub mod pins;
pub mod scheduler;
pub mod sensors;
pub mod store;
pub mod timer;
