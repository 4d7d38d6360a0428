//! Cron-driven job emitter. Jobs are persisted as a single
//! JSON file and evaluated against real cron + timezone on a 1-minute
//! wall-clock-aligned tick; fired jobs are forwarded as synthetic messages
//! for the Runtime Orchestrator to re-enter with `source = "schedule:<id>"`.

pub mod engine;
pub mod schedule;
pub mod types;

pub use engine::{SchedulerEngine, SchedulerHandle};
pub use types::{Delivery, DeliveryMode, FiredJob, Job};
