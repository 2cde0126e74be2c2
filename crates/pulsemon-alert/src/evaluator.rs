//! Pure threshold evaluation: rule + latest samples in, violations out.
//!
//! Checks run in a fixed order: pending short-circuits everything, an
//! absent metric yields `Undefined` (unless suppressed), then occurrence
//! and timing thresholds against the full-interval sample, and finally the
//! look-ahead peek at the in-flight sample.

use crate::rule::AlertRule;
use chrono::{DateTime, Utc};
use pulsemon_common::types::{format_nanos, MetricSample, Origin, Violation, ViolationKind};

/// Outcome of evaluating one rule for one pass.
#[derive(Debug, Default)]
pub struct Evaluation {
    /// Rule has not had its first scheduled sampling attempt yet.
    pub pending: bool,
    /// The metric has never been produced.
    pub undefined: bool,
    pub violations: Vec<Violation>,
}

pub fn evaluate(
    rule: &AlertRule,
    interval: Option<MetricSample>,
    in_flight: Option<MetricSample>,
    origin: &Origin,
    now: DateTime<Utc>,
) -> Evaluation {
    let mut out = Evaluation::default();

    if rule.is_pending() {
        out.pending = true;
        return out;
    }

    let sample = match interval {
        Some(sample) => sample,
        None => {
            out.undefined = true;
            if !rule.ignore_null() {
                out.violations.push(Violation::new(
                    rule.id(),
                    ViolationKind::Undefined,
                    0.0,
                    0.0,
                    format!(
                        "{} has never been recorded; the instrumented code may not have run",
                        rule.id()
                    ),
                    origin,
                    now,
                ));
            }
            return out;
        }
    };

    check_occurrences(rule, &sample, origin, now, &mut out.violations);

    if let MetricSample::Stopwatch(sw) = &sample {
        if let Some(limit) = rule.mean_limit_nanos() {
            if sw.mean_nanos > limit as f64 {
                out.violations.push(Violation::new(
                    rule.id(),
                    ViolationKind::MeanTime,
                    sw.mean_nanos,
                    limit as f64,
                    format!(
                        "{} mean time {} exceeds the limit of {}",
                        rule.id(),
                        format_nanos(sw.mean_nanos),
                        format_nanos(limit as f64),
                    ),
                    origin,
                    now,
                ));
            }
        }
        if let Some(limit) = rule.max_limit_nanos() {
            if sw.max_nanos > limit {
                out.violations.push(Violation::new(
                    rule.id(),
                    ViolationKind::MaxTime,
                    sw.max_nanos as f64,
                    limit as f64,
                    format!(
                        "{} max time {} exceeds the limit of {}",
                        rule.id(),
                        format_nanos(sw.max_nanos as f64),
                        format_nanos(limit as f64),
                    ),
                    origin,
                    now,
                ));
            }
        }
    }

    // Look-ahead: the in-flight sample alone may already breach the
    // occurrence-max or max-time limit before the interval closes. Skipped
    // when the full-interval check already fired occurrence-max, to avoid
    // double reporting.
    let occurrence_max_fired = out
        .violations
        .iter()
        .any(|v| v.kind == ViolationKind::OccurrenceMax);
    if !occurrence_max_fired {
        if let Some(peek) = in_flight {
            check_look_ahead(rule, &peek, origin, now, &mut out.violations);
        }
    }

    out
}

/// Occurrence thresholds apply to both counters and stopwatches.
fn check_occurrences(
    rule: &AlertRule,
    sample: &MetricSample,
    origin: &Origin,
    now: DateTime<Utc>,
    violations: &mut Vec<Violation>,
) {
    let count = sample.count();

    if let Some(min) = rule.occurrences_min() {
        if count < min {
            violations.push(Violation::new(
                rule.id(),
                ViolationKind::OccurrenceMin,
                count as f64,
                min as f64,
                format!(
                    "{} fired {} times in the last interval, below the minimum of {}",
                    rule.id(),
                    count,
                    min,
                ),
                origin,
                now,
            ));
        }
    }

    if let Some(max) = rule.occurrences_max() {
        if count > max {
            violations.push(Violation::new(
                rule.id(),
                ViolationKind::OccurrenceMax,
                count as f64,
                max as f64,
                format!(
                    "{} fired {} times in the last interval, above the maximum of {}",
                    rule.id(),
                    count,
                    max,
                ),
                origin,
                now,
            ));
        }
    }
}

fn check_look_ahead(
    rule: &AlertRule,
    peek: &MetricSample,
    origin: &Origin,
    now: DateTime<Utc>,
    violations: &mut Vec<Violation>,
) {
    if let Some(max) = rule.occurrences_max() {
        let count = peek.count();
        if count > max {
            violations.push(Violation::new(
                rule.id(),
                ViolationKind::OccurrenceMax,
                count as f64,
                max as f64,
                format!(
                    "{} already fired {} times in the current, unfinished interval (maximum {})",
                    rule.id(),
                    count,
                    max,
                ),
                origin,
                now,
            ));
        }
    }

    if let (Some(limit), Some(peek_max)) = (rule.max_limit_nanos(), peek.max_nanos()) {
        if peek_max > limit {
            violations.push(Violation::new(
                rule.id(),
                ViolationKind::MaxTime,
                peek_max as f64,
                limit as f64,
                format!(
                    "{} max time {} in the current, unfinished interval exceeds the limit of {}",
                    rule.id(),
                    format_nanos(peek_max as f64),
                    format_nanos(limit as f64),
                ),
                origin,
                now,
            ));
        }
    }
}
