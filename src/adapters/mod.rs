//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements         | Connects to                  |
//! |----------------|--------------------|------------------------------|
//! | `hardware`     | SensorPort         | Flow meter, barometer        |
//! |                | ActuatorPort       | Shift registers, pump bridge |
//! | `fs_store`     | StoragePort        | SD card filesystem           |
//! | `memory_store` | StoragePort        | RAM (tests, bench runs)      |
//! | `log_sink`     | EventSink          | Serial log output            |

pub mod fs_store;
pub mod hardware;
pub mod log_sink;
pub mod memory_store;
