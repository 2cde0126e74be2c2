//! The monitor facade: owns the rule set and the background jobs, and
//! exposes the read-only query surface.

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::scheduler::Scheduler;
use arc_swap::ArcSwap;
use chrono::Utc;
use pulsemon_alert::dedup::Deduplicator;
use pulsemon_alert::plugin::PluginRegistry;
use pulsemon_alert::report::HealthReportBuilder;
use pulsemon_alert::rule::RuleSet;
use pulsemon_alert::MetricSource;
use pulsemon_common::types::{HealthReport, Violation};
use pulsemon_notify::batcher::NotificationBatcher;
use pulsemon_notify::NotificationTransport;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Runtime health monitor.
///
/// Construction wires every collaborator; [`start`](Self::start) registers
/// one sampling job per rule plus the report job on the scheduler. All
/// state lives in memory and is rebuilt fresh on restart: rules reload from
/// configuration, history starts empty, and every rule begins pending.
pub struct HealthMonitor {
    rules: Arc<RuleSet>,
    source: Arc<dyn MetricSource>,
    builder: Arc<HealthReportBuilder>,
    dedup: Arc<Deduplicator>,
    batcher: Option<Arc<NotificationBatcher>>,
    report: Arc<ArcSwap<HealthReport>>,
    scheduler: Scheduler,
    report_interval: std::time::Duration,
    started: AtomicBool,
}

impl HealthMonitor {
    pub fn new(
        config: &MonitorConfig,
        plugins: PluginRegistry,
        source: Arc<dyn MetricSource>,
        transport: Option<Arc<dyn NotificationTransport>>,
    ) -> Self {
        let rules = Arc::new(RuleSet::with_plugins(config.rule_specs(), &plugins));
        let initial = HealthReport::initial(rules.pending_ids());
        Self {
            rules: rules.clone(),
            source,
            builder: Arc::new(HealthReportBuilder::new(config.origin())),
            dedup: Arc::new(Deduplicator::new(config.dedup_settings())),
            batcher: transport
                .map(|t| Arc::new(NotificationBatcher::new(config.batcher_settings(), t))),
            report: Arc::new(ArcSwap::from_pointee(initial)),
            scheduler: Scheduler::new(),
            report_interval: config.report_interval(),
            started: AtomicBool::new(false),
        }
    }

    /// Builds the monitor with the SMTP transport from configuration.
    pub fn from_config(
        config: &MonitorConfig,
        plugins: PluginRegistry,
        source: Arc<dyn MetricSource>,
    ) -> Result<Self, MonitorError> {
        let transport = config
            .email_transport()?
            .map(|t| Arc::new(t) as Arc<dyn NotificationTransport>);
        Ok(Self::new(config, plugins, source, transport))
    }

    /// Registers all background jobs. Sampling and report building run as
    /// independent tasks; nothing is shared between unrelated rules beyond
    /// the worker pool itself.
    pub fn start(&self) -> Result<(), MonitorError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(MonitorError::AlreadyStarted);
        }

        for rule in self.rules.iter().filter(|r| !r.is_plugin_binding()) {
            let rule = rule.clone();
            let source = self.source.clone();
            self.scheduler.schedule(rule.collection_interval(), move || {
                let rule = rule.clone();
                let source = source.clone();
                async move {
                    if let Some(sample) = source.sample(rule.id()) {
                        rule.record_sample(sample);
                    }
                    // The attempt itself, successful or not, ends the
                    // pending state; only then may the rule be reported
                    // as undefined.
                    rule.mark_attempted();
                }
            });
        }

        let rules = self.rules.clone();
        let source = self.source.clone();
        let builder = self.builder.clone();
        let dedup = self.dedup.clone();
        let batcher = self.batcher.clone();
        let report_slot = self.report.clone();
        self.scheduler.schedule(self.report_interval, move || {
            let rules = rules.clone();
            let source = source.clone();
            let builder = builder.clone();
            let dedup = dedup.clone();
            let batcher = batcher.clone();
            let report_slot = report_slot.clone();
            async move {
                run_report_pass(&rules, &*source, &builder, &dedup, batcher.as_deref(), &report_slot)
                    .await;
            }
        });

        tracing::info!(
            rules = self.rules.len(),
            report_interval_secs = self.report_interval.as_secs(),
            "Health monitor started"
        );
        Ok(())
    }

    /// Stops all jobs. In-flight task bodies finish; nothing new starts.
    /// Calling this more than once is a no-op.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }

    /// The latest published report. Lock-free snapshot read.
    pub fn current_report(&self) -> Arc<HealthReport> {
        self.report.load_full()
    }

    /// Retained violations, oldest first: flushed history followed by the
    /// current throttle bucket.
    pub fn all_violations(&self) -> Vec<Violation> {
        self.dedup.all_violations()
    }

    /// Admin toggle. Disabling suppresses reporting but keeps sampling.
    pub fn set_rule_enabled(
        &self,
        rule_id: &str,
        enabled: bool,
        user_id: &str,
    ) -> Result<(), MonitorError> {
        match self.rules.get(rule_id) {
            Some(rule) => {
                rule.set_enabled(enabled, user_id);
                tracing::info!(rule_id, enabled, user_id, "Rule toggled");
                Ok(())
            }
            None => Err(MonitorError::RuleNotFound(rule_id.to_string())),
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }
}

/// One scheduled report pass: build, publish, dedup, batch. A panic inside
/// the pass is converted into a failed-run report so the previous report is
/// still replaced and the engine never silently stalls.
async fn run_report_pass(
    rules: &RuleSet,
    source: &dyn MetricSource,
    builder: &HealthReportBuilder,
    dedup: &Deduplicator,
    batcher: Option<&NotificationBatcher>,
    report_slot: &ArcSwap<HealthReport>,
) {
    let now = Utc::now();
    let report = match std::panic::catch_unwind(AssertUnwindSafe(|| {
        builder.run_pass(rules, source, now)
    })) {
        Ok(report) => report,
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            tracing::error!(reason = %reason, "Evaluation pass failed");
            builder.failed_run_report(&reason, now)
        }
    };

    let published = Arc::new(report);
    report_slot.store(published.clone());

    dedup.ingest(&published.violations, now);
    if let Some(batcher) = batcher {
        batcher.offer(&published, &published.violations, now).await;
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
