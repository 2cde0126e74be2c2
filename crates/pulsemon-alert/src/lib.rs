//! Health-monitoring rule engine.
//!
//! Rules sample named in-process metrics (counters and stopwatches) on
//! their own cadence and are evaluated against configured thresholds each
//! report pass. The pass assembles an immutable
//! [`HealthReport`](pulsemon_common::types::HealthReport) which is then
//! fed through the [`dedup::Deduplicator`] for throttled history
//! bookkeeping. Custom health checks participate through the
//! [`HealthPlugin`] trait as synthetic zero-threshold rules.

pub mod dedup;
pub mod evaluator;
pub mod plugin;
pub mod report;
pub mod rule;

#[cfg(test)]
mod tests;

use pulsemon_common::types::MetricSample;
use report::ReportDraft;

/// Read access to the external metric registry.
///
/// The registry itself lives elsewhere in the process and is assumed to be
/// thread-safe; the engine only reads named samples from it.
pub trait MetricSource: Send + Sync {
    /// Takes the sample accumulated since the last call and resets the
    /// interval. `None` means the metric has never been produced.
    fn sample(&self, id: &str) -> Option<MetricSample>;

    /// Peeks at the current, not-yet-reset sample without consuming it.
    /// Used by the look-ahead check to surface problems before the
    /// collection interval closes.
    fn peek(&self, id: &str) -> Option<MetricSample>;
}

/// A pluggable external health check, invoked once per report pass.
///
/// Plugins are registered once at startup (see [`plugin::PluginRegistry`])
/// and wrapped in a synthetic rule named `<component>.failed` so they
/// participate uniformly in enable/disable toggling and throttling.
pub trait HealthPlugin: Send + Sync {
    /// Component name used to tag failures (e.g. `"connection-pool"`).
    fn component_name(&self) -> &str;

    /// Returns whether the component is healthy, given the in-progress
    /// report. An `Err` is treated the same as unhealthy and converted
    /// into a `CustomFailure` violation; it never aborts the pass.
    fn is_healthy(&self, draft: &ReportDraft) -> anyhow::Result<bool>;
}
