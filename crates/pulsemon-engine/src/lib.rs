//! Engine assembly: scheduling, configuration, and the monitor facade.
//!
//! [`monitor::HealthMonitor`] wires the rule set, metric source, report
//! builder, deduplicator, and notification batcher together, runs them on
//! the [`scheduler::Scheduler`]'s shared worker pool, and exposes the
//! read-only query surface consumed by dashboard-style collaborators.

pub mod config;
pub mod error;
pub mod monitor;
pub mod scheduler;


pub use monitor::HealthMonitor;
