//! Background Tasks Module
//!
//! Contains background tasks that run for the lifetime of the cache store.
//!
//! # Tasks
//! - Sweep: removes expired and corrupt cache entries at a fixed interval

mod sweep;

pub use sweep::spawn_sweep_task;
