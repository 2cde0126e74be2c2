use crate::dedup::{DedupSettings, Deduplicator};
use crate::evaluator;
use crate::plugin::PluginRegistry;
use crate::report::{HealthReportBuilder, ReportDraft};
use crate::rule::{AlertRule, RuleSet, RuleSpec};
use crate::{HealthPlugin, MetricSource};
use chrono::{Duration, Utc};
use pulsemon_common::types::{
    CounterSample, MetricSample, Origin, StopwatchSample, TimeUnit, Violation, ViolationKind,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn stopwatch(count: u64, mean_nanos: f64, max_nanos: u64) -> MetricSample {
    let now = Utc::now();
    MetricSample::Stopwatch(StopwatchSample {
        count,
        mean_nanos,
        max_nanos,
        min_nanos: 0,
        total_nanos: (mean_nanos * count as f64) as u64,
        first_seen: now,
        last_seen: now,
    })
}

fn counter(count: u64) -> MetricSample {
    let now = Utc::now();
    MetricSample::Counter(CounterSample {
        count,
        first_seen: now,
        last_seen: now,
    })
}

fn violation(rule_id: &str, kind: ViolationKind) -> Violation {
    Violation::new(rule_id, kind, 1.0, 0.0, "test".into(), &Origin::default(), Utc::now())
}

/// Metric source backed by a map of peek samples; `sample()` is unused by
/// the evaluator-level tests.
struct FakeSource {
    peeks: HashMap<String, MetricSample>,
}

impl FakeSource {
    fn empty() -> Self {
        Self {
            peeks: HashMap::new(),
        }
    }
}

impl MetricSource for FakeSource {
    fn sample(&self, id: &str) -> Option<MetricSample> {
        self.peeks.get(id).copied()
    }

    fn peek(&self, id: &str) -> Option<MetricSample> {
        self.peeks.get(id).copied()
    }
}

// ── Evaluator ──

#[test]
fn occurrence_max_fires_with_collected_and_limit_values() {
    let mut spec = RuleSpec::new("db.query");
    spec.occurrences_max = Some(10);
    let rule = AlertRule::from_spec(spec);
    rule.mark_attempted();

    let out = evaluator::evaluate(
        &rule,
        Some(stopwatch(11, 1_000.0, 2_000)),
        None,
        &Origin::default(),
        Utc::now(),
    );

    assert_eq!(out.violations.len(), 1);
    let v = &out.violations[0];
    assert_eq!(v.kind, ViolationKind::OccurrenceMax);
    assert_eq!(v.collected_value, 11.0);
    assert_eq!(v.limit_value, 10.0);
}

#[test]
fn pending_rule_never_reported_undefined() {
    for ignore_null in [false, true] {
        let mut spec = RuleSpec::new("never.sampled");
        spec.ignore_null = ignore_null;
        let rule = AlertRule::from_spec(spec);

        let out = evaluator::evaluate(&rule, None, None, &Origin::default(), Utc::now());
        assert!(out.pending);
        assert!(!out.undefined);
        assert!(out.violations.is_empty());
    }
}

#[test]
fn absent_metric_fires_undefined_after_first_attempt() {
    let rule = AlertRule::from_spec(RuleSpec::new("missing.metric"));
    rule.mark_attempted();

    let out = evaluator::evaluate(&rule, None, None, &Origin::default(), Utc::now());
    assert!(out.undefined);
    assert_eq!(out.violations.len(), 1);
    assert_eq!(out.violations[0].kind, ViolationKind::Undefined);
}

#[test]
fn ignore_null_suppresses_undefined_violation() {
    let mut spec = RuleSpec::new("optional.metric");
    spec.ignore_null = true;
    let rule = AlertRule::from_spec(spec);
    rule.mark_attempted();

    let out = evaluator::evaluate(&rule, None, None, &Origin::default(), Utc::now());
    assert!(out.undefined);
    assert!(out.violations.is_empty());
}

#[test]
fn mean_and_max_time_checked_in_nanoseconds() {
    let mut spec = RuleSpec::new("svc.call");
    spec.mean_limit = Some(5);
    spec.max_limit = Some(20);
    spec.time_unit = TimeUnit::Millis;
    let rule = AlertRule::from_spec(spec);
    rule.mark_attempted();

    assert_eq!(rule.mean_limit_nanos(), Some(5_000_000));
    assert_eq!(rule.max_limit_nanos(), Some(20_000_000));

    let out = evaluator::evaluate(
        &rule,
        Some(stopwatch(3, 6_000_000.0, 25_000_000)),
        None,
        &Origin::default(),
        Utc::now(),
    );

    let kinds: Vec<_> = out.violations.iter().map(|v| v.kind).collect();
    assert_eq!(kinds, vec![ViolationKind::MeanTime, ViolationKind::MaxTime]);
}

#[test]
fn counter_sample_only_checks_occurrences() {
    let mut spec = RuleSpec::new("error.count");
    spec.occurrences_max = Some(5);
    spec.mean_limit = Some(1);
    spec.max_limit = Some(1);
    spec.time_unit = TimeUnit::Nanos;
    let rule = AlertRule::from_spec(spec);
    rule.mark_attempted();

    let out = evaluator::evaluate(
        &rule,
        Some(counter(7)),
        None,
        &Origin::default(),
        Utc::now(),
    );

    assert_eq!(out.violations.len(), 1);
    assert_eq!(out.violations[0].kind, ViolationKind::OccurrenceMax);
}

#[test]
fn occurrence_min_fires_when_too_quiet() {
    let mut spec = RuleSpec::new("heartbeat");
    spec.occurrences_min = Some(3);
    let rule = AlertRule::from_spec(spec);
    rule.mark_attempted();

    let out = evaluator::evaluate(
        &rule,
        Some(counter(1)),
        None,
        &Origin::default(),
        Utc::now(),
    );
    assert_eq!(out.violations.len(), 1);
    assert_eq!(out.violations[0].kind, ViolationKind::OccurrenceMin);
}

#[test]
fn look_ahead_fires_from_in_flight_sample() {
    let mut spec = RuleSpec::new("spiky.metric");
    spec.occurrences_max = Some(10);
    let rule = AlertRule::from_spec(spec);
    rule.mark_attempted();

    // Interval sample is fine, but the unfinished interval already breached.
    let out = evaluator::evaluate(
        &rule,
        Some(counter(4)),
        Some(counter(15)),
        &Origin::default(),
        Utc::now(),
    );
    assert_eq!(out.violations.len(), 1);
    assert_eq!(out.violations[0].kind, ViolationKind::OccurrenceMax);
    assert_eq!(out.violations[0].collected_value, 15.0);
}

#[test]
fn look_ahead_max_time_fires_from_in_flight_sample() {
    let mut spec = RuleSpec::new("slow.call");
    spec.max_limit = Some(10);
    spec.time_unit = TimeUnit::Millis;
    let rule = AlertRule::from_spec(spec);
    rule.mark_attempted();

    // Interval sample is under the limit; the unfinished interval already
    // recorded a 15ms worst case against a 10ms limit.
    let out = evaluator::evaluate(
        &rule,
        Some(stopwatch(3, 1_000_000.0, 2_000_000)),
        Some(stopwatch(1, 15_000_000.0, 15_000_000)),
        &Origin::default(),
        Utc::now(),
    );
    assert_eq!(out.violations.len(), 1);
    assert_eq!(out.violations[0].kind, ViolationKind::MaxTime);
    assert_eq!(out.violations[0].collected_value, 15_000_000.0);
}

#[test]
fn look_ahead_skipped_when_interval_already_fired_occurrence_max() {
    let mut spec = RuleSpec::new("spiky.metric");
    spec.occurrences_max = Some(10);
    let rule = AlertRule::from_spec(spec);
    rule.mark_attempted();

    let out = evaluator::evaluate(
        &rule,
        Some(counter(12)),
        Some(counter(99)),
        &Origin::default(),
        Utc::now(),
    );
    // One violation from the interval check, none from the look-ahead.
    assert_eq!(out.violations.len(), 1);
    assert_eq!(out.violations[0].collected_value, 12.0);
}

// ── Deduplicator ──

fn dedup_settings(remember: usize, window_secs: i64, throttle_count: usize) -> DedupSettings {
    DedupSettings {
        remember_count: remember,
        throttle_interval: Duration::seconds(window_secs),
        throttle_count,
    }
}

#[test]
fn duplicate_violations_merge_within_window() {
    let dedup = Deduplicator::new(dedup_settings(10, 600, 1));
    let now = Utc::now();

    dedup.ingest(&[violation("db.query", ViolationKind::OccurrenceMax)], now);
    dedup.ingest(
        &[violation("db.query", ViolationKind::OccurrenceMax)],
        now + Duration::seconds(5),
    );

    let all = dedup.all_violations();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].occurrence_count, 2);
}

#[test]
fn different_kinds_are_not_merged() {
    let dedup = Deduplicator::new(dedup_settings(10, 600, 1));
    let now = Utc::now();

    dedup.ingest(&[violation("db.query", ViolationKind::OccurrenceMax)], now);
    dedup.ingest(&[violation("db.query", ViolationKind::MaxTime)], now);

    assert_eq!(dedup.all_violations().len(), 2);
}

#[test]
fn host_mismatch_is_not_merged() {
    let dedup = Deduplicator::new(dedup_settings(10, 600, 1));
    let now = Utc::now();

    let mut a = violation("db.query", ViolationKind::OccurrenceMax);
    a.host = Some("web-01".into());
    let mut b = violation("db.query", ViolationKind::OccurrenceMax);
    b.host = Some("web-02".into());

    dedup.ingest(&[a, b], now);
    assert_eq!(dedup.all_violations().len(), 2);
}

#[test]
fn window_expiry_flushes_bucket_to_history() {
    let dedup = Deduplicator::new(dedup_settings(10, 60, 1));
    let now = Utc::now();

    dedup.ingest(&[violation("a", ViolationKind::Undefined)], now);
    assert_eq!(dedup.history_len(), 0);

    // Next ingest after the window moves the bucket into history.
    dedup.ingest(
        &[violation("b", ViolationKind::Undefined)],
        now + Duration::seconds(61),
    );
    assert_eq!(dedup.history_len(), 1);

    let all = dedup.all_violations();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].rule_id, "a");
    assert_eq!(all[1].rule_id, "b");
}

#[test]
fn history_evicts_oldest_beyond_remember_count() {
    let remember = 3;
    let dedup = Deduplicator::new(dedup_settings(remember, 60, 1));
    let mut now = Utc::now();

    for i in 0..remember + 1 {
        dedup.ingest(&[violation(&format!("rule-{i}"), ViolationKind::Undefined)], now);
        now += Duration::seconds(61); // expire the window each time
    }
    // Flush the last bucket too.
    dedup.ingest(&[], now + Duration::seconds(61));

    let all = dedup.all_violations();
    assert_eq!(all.len(), remember);
    assert_eq!(all[0].rule_id, "rule-1"); // rule-0 evicted
}

// ── Report builder and plugins ──

struct FlakyPlugin {
    name: String,
    healthy: bool,
    fail: bool,
    calls: AtomicUsize,
}

impl FlakyPlugin {
    fn new(name: &str, healthy: bool, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            healthy,
            fail,
            calls: AtomicUsize::new(0),
        })
    }
}

impl HealthPlugin for FlakyPlugin {
    fn component_name(&self) -> &str {
        &self.name
    }

    fn is_healthy(&self, _draft: &ReportDraft) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("probe timed out");
        }
        Ok(self.healthy)
    }
}

#[test]
fn disabled_rule_violations_are_visible_but_do_not_flip_healthy() {
    let mut spec = RuleSpec::new("noisy.metric");
    spec.occurrences_max = Some(1);
    let rules = RuleSet::new(vec![spec]);
    let rule = rules.get("noisy.metric").unwrap();
    rule.mark_attempted();
    rule.record_sample(counter(5));
    rule.set_enabled(false, "admin");

    let builder = HealthReportBuilder::new(Origin::default());
    let report = builder.run_pass(&rules, &FakeSource::empty(), Utc::now());

    assert_eq!(report.violations.len(), 1);
    assert!(report.healthy);
    assert_eq!(rule.user_id().as_deref(), Some("admin"));
}

#[test]
fn enabled_rule_violation_flips_healthy() {
    let mut spec = RuleSpec::new("noisy.metric");
    spec.occurrences_max = Some(1);
    let rules = RuleSet::new(vec![spec]);
    let rule = rules.get("noisy.metric").unwrap();
    rule.mark_attempted();
    rule.record_sample(counter(5));

    let builder = HealthReportBuilder::new(Origin::default());
    let report = builder.run_pass(&rules, &FakeSource::empty(), Utc::now());

    assert!(!report.healthy);
    assert_eq!(report.collection_count, 1);
}

#[test]
fn failing_plugin_is_isolated_from_the_rest_of_the_pass() {
    let broken = FlakyPlugin::new("ldap", true, true);
    let fine = FlakyPlugin::new("pool", true, false);

    let mut registry = PluginRegistry::new();
    registry.register(broken.clone());
    registry.register(fine.clone());

    let mut spec = RuleSpec::new("noisy.metric");
    spec.occurrences_max = Some(1);
    let rules = RuleSet::with_plugins(vec![spec], &registry);
    let rule = rules.get("noisy.metric").unwrap();
    rule.mark_attempted();
    rule.record_sample(counter(5));

    let builder = HealthReportBuilder::new(Origin::default());
    let report = builder.run_pass(&rules, &FakeSource::empty(), Utc::now());

    // Both plugins were invoked despite the first one failing.
    assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fine.calls.load(Ordering::SeqCst), 1);

    let kinds: Vec<_> = report.violations.iter().map(|v| v.kind).collect();
    assert_eq!(
        kinds,
        vec![ViolationKind::OccurrenceMax, ViolationKind::CustomFailure]
    );
    assert_eq!(report.violations[1].rule_id, "ldap.failed");
}

#[test]
fn unhealthy_plugin_produces_custom_failure() {
    let plugin = FlakyPlugin::new("cache", false, false);
    let mut registry = PluginRegistry::new();
    registry.register(plugin);

    let rules = RuleSet::with_plugins(Vec::new(), &registry);
    let builder = HealthReportBuilder::new(Origin::default());
    let report = builder.run_pass(&rules, &FakeSource::empty(), Utc::now());

    assert!(!report.healthy);
    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].kind, ViolationKind::CustomFailure);
    assert_eq!(report.violations[0].rule_id, "cache.failed");
}

#[test]
fn pending_rules_listed_in_report() {
    let rules = RuleSet::new(vec![RuleSpec::new("not.yet")]);
    let builder = HealthReportBuilder::new(Origin::default());
    let report = builder.run_pass(&rules, &FakeSource::empty(), Utc::now());

    assert_eq!(report.pending, vec!["not.yet".to_string()]);
    assert!(report.undefined.is_empty());
    assert!(report.healthy);
}

#[test]
fn failed_run_report_carries_synthetic_violation() {
    let builder = HealthReportBuilder::new(Origin::default());
    let report = builder.failed_run_report("worker panicked", Utc::now());

    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].rule_id, "health.report");
    assert!(report.violations[0].description.contains("worker panicked"));
}

#[test]
fn origin_is_stamped_on_violations() {
    let mut spec = RuleSpec::new("tagged.metric");
    spec.occurrences_max = Some(0);
    let rules = RuleSet::new(vec![spec]);
    let rule = rules.get("tagged.metric").unwrap();
    rule.mark_attempted();
    rule.record_sample(counter(1));

    let origin = Origin {
        host: Some("web-01".into()),
        service: Some("checkout".into()),
    };
    let builder = HealthReportBuilder::new(origin);
    let report = builder.run_pass(&rules, &FakeSource::empty(), Utc::now());

    assert_eq!(report.violations[0].host.as_deref(), Some("web-01"));
    assert_eq!(report.violations[0].service.as_deref(), Some("checkout"));
}
