//! One evaluation pass: run every rule and plugin, assemble an immutable
//! [`HealthReport`].

use crate::evaluator;
use crate::rule::RuleSet;
use crate::MetricSource;
use chrono::{DateTime, Utc};
use pulsemon_common::types::{HealthReport, Origin, Violation, ViolationKind};
use std::sync::atomic::{AtomicU64, Ordering};

/// The in-progress report handed to custom health plugins while a pass is
/// running. Only the finished, immutable [`HealthReport`] is ever published
/// to readers.
pub struct ReportDraft {
    collection_count: u64,
    started_at: DateTime<Utc>,
    pending: Vec<String>,
    undefined: Vec<String>,
    violations: Vec<Violation>,
    /// Set when any violation came from a rule with `enabled = true`.
    enabled_violation: bool,
}

impl ReportDraft {
    fn new(collection_count: u64, now: DateTime<Utc>) -> Self {
        Self {
            collection_count,
            started_at: now,
            pending: Vec::new(),
            undefined: Vec::new(),
            violations: Vec::new(),
            enabled_violation: false,
        }
    }

    pub fn undefined(&self) -> &[String] {
        &self.undefined
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Disabled rules still contribute violations for visibility, but only
    /// enabled rules can make the report unhealthy.
    fn add_violations(&mut self, violations: Vec<Violation>, rule_enabled: bool) {
        if rule_enabled && !violations.is_empty() {
            self.enabled_violation = true;
        }
        self.violations.extend(violations);
    }

    fn into_report(self) -> HealthReport {
        HealthReport {
            collection_count: self.collection_count,
            last_collected_at: self.started_at,
            healthy: !self.enabled_violation,
            pending: self.pending,
            undefined: self.undefined,
            violations: self.violations,
        }
    }
}

/// Orchestrates evaluation passes.
///
/// The builder is the single writer of reports; publication (the atomic
/// reference swap) is handled by the caller so readers never observe a
/// half-built pass.
pub struct HealthReportBuilder {
    origin: Origin,
    collection_count: AtomicU64,
}

impl HealthReportBuilder {
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            collection_count: AtomicU64::new(0),
        }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Runs one full pass over all rules and plugins.
    pub fn run_pass(&self, rules: &RuleSet, source: &dyn MetricSource, now: DateTime<Utc>) -> HealthReport {
        let count = self.collection_count.fetch_add(1, Ordering::Relaxed) + 1;
        let mut draft = ReportDraft::new(count, now);

        for rule in rules.iter().filter(|r| !r.is_plugin_binding()) {
            let outcome = evaluator::evaluate(
                rule,
                rule.last_sample(),
                source.peek(rule.id()),
                &self.origin,
                now,
            );
            if outcome.pending {
                draft.pending.push(rule.id().to_string());
            }
            if outcome.undefined {
                draft.undefined.push(rule.id().to_string());
            }
            draft.add_violations(outcome.violations, rule.is_enabled());
        }

        for rule in rules.iter().filter(|r| r.is_plugin_binding()) {
            let plugin = match rule.plugin() {
                Some(plugin) => plugin,
                None => continue,
            };
            let failure = match plugin.is_healthy(&draft) {
                Ok(true) => None,
                Ok(false) => Some(format!(
                    "{} reported unhealthy",
                    plugin.component_name()
                )),
                Err(e) => {
                    tracing::warn!(
                        component = plugin.component_name(),
                        error = %e,
                        "Custom health check failed"
                    );
                    Some(format!(
                        "{} health check failed: {e}",
                        plugin.component_name()
                    ))
                }
            };
            if let Some(description) = failure {
                let violation = Violation::new(
                    rule.id(),
                    ViolationKind::CustomFailure,
                    0.0,
                    0.0,
                    description,
                    &self.origin,
                    now,
                );
                draft.add_violations(vec![violation], rule.is_enabled());
            }
        }

        draft.into_report()
    }

    /// Fallback report for a pass that failed as a whole (not a single rule
    /// or plugin). The previous report is still replaced so the engine
    /// never silently stalls. Pass failures are surfaced through
    /// `violations[]` but do not flip `healthy`; only rule and plugin
    /// checks do that.
    pub fn failed_run_report(&self, reason: &str, now: DateTime<Utc>) -> HealthReport {
        let count = self.collection_count.load(Ordering::Relaxed);
        let violation = Violation::new(
            "health.report",
            ViolationKind::CustomFailure,
            0.0,
            0.0,
            format!("evaluation pass failed: {reason}"),
            &self.origin,
            now,
        );
        HealthReport {
            collection_count: count,
            last_collected_at: now,
            healthy: true,
            pending: Vec::new(),
            undefined: Vec::new(),
            violations: vec![violation],
        }
    }
}
