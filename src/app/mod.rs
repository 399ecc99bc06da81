//! Application core: domain orchestration, zero direct I/O.
//!
//! [`service::SamplerService`] runs the per-tick loop: deferred actions,
//! procedure controllers, the task scheduler and the shutdown gate.  All
//! interaction with hardware, storage and the power module happens
//! through the **port traits** in [`ports`].

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
