//! `reportor-scheduler`: dependency- and lock-aware scheduling loop.
//!
//! # Overview
//!
//! A [`Scheduler`] takes a [`reportor_manifest::Manifest`] and drives it to
//! completion with a fixed-interval poll loop:
//!
//! 1. **Admit** every pending job whose `requires` are all finished and whose
//!    `locks` are all free; start it and take its locks.
//! 2. **Sleep** one tick (100 ms by default).
//! 3. **Reap** exited jobs (releasing their locks), and kill jobs that have
//!    exceeded `max_time_seconds`; they are reaped on a later tick.
//!
//! The pass ends when nothing is pending or running. If pending jobs remain
//! while nothing runs, the pass fails with [`SchedulerError::Deadlock`]
//! instead of spinning forever.

pub mod engine;
pub mod error;
pub mod state;
pub mod types;

pub use engine::Scheduler;
pub use error::{Result, SchedulerError};
pub use types::{BlockedJob, JobRecord, RunReport, SchedulerEvent};
