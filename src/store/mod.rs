//! Persistent domain stores.
//!
//! | Store    | Entity  | On-disk layout            |
//! |----------|---------|---------------------------|
//! | `valve`  | [`Valve`](valve::Valve) | `<valve_folder>/<id>.json` |
//! | `task`   | [`Task`](task::Task)    | `<task_folder>/<id>.json`  |

pub mod task;
pub mod valve;
