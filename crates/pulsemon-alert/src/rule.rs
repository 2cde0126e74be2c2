use crate::plugin::{binding_id, PluginRegistry};
use crate::HealthPlugin;
use pulsemon_common::types::{MetricSample, TimeUnit};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Threshold definition for one rule, as it comes out of configuration.
///
/// Duration limits are expressed in `time_unit` here and normalized to
/// nanoseconds exactly once, when the spec is turned into an [`AlertRule`].
#[derive(Debug, Clone)]
pub struct RuleSpec {
    /// Globally unique id, also the metric-source lookup key.
    pub id: String,
    pub occurrences_min: Option<u64>,
    pub occurrences_max: Option<u64>,
    pub mean_limit: Option<u64>,
    pub max_limit: Option<u64>,
    pub time_unit: TimeUnit,
    pub collection_interval: Duration,
    pub enabled: bool,
    /// Suppress the `Undefined` violation when the metric has never been
    /// produced (e.g. a code path that legitimately may not run).
    pub ignore_null: bool,
}

impl RuleSpec {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            occurrences_min: None,
            occurrences_max: None,
            mean_limit: None,
            max_limit: None,
            time_unit: TimeUnit::Millis,
            collection_interval: Duration::from_secs(60),
            enabled: true,
            ignore_null: false,
        }
    }
}

/// One configured alert rule plus its runtime sampling state.
///
/// Thresholds are immutable after construction. `enabled`/`user_id` may be
/// flipped at any time by an admin action concurrently with sampling; the
/// per-rule sample slot is written only by the rule's own sampling task and
/// read only by the report pass, so unrelated rules never contend.
pub struct AlertRule {
    id: String,
    occurrences_min: Option<u64>,
    occurrences_max: Option<u64>,
    mean_limit_nanos: Option<u64>,
    max_limit_nanos: Option<u64>,
    collection_interval: Duration,
    ignore_null: bool,
    plugin: Option<Arc<dyn HealthPlugin>>,
    enabled: AtomicBool,
    user_id: Mutex<Option<String>>,
    last_sample: Mutex<Option<MetricSample>>,
    /// True until the first scheduled sampling attempt. While set, the rule
    /// is reported as pending and never as undefined, even if its metric is
    /// absent.
    pending_first_collection: AtomicBool,
}

impl AlertRule {
    pub fn from_spec(spec: RuleSpec) -> Self {
        let unit = spec.time_unit;
        Self {
            id: spec.id,
            occurrences_min: spec.occurrences_min,
            occurrences_max: spec.occurrences_max,
            mean_limit_nanos: spec.mean_limit.map(|v| unit.to_nanos(v)),
            max_limit_nanos: spec.max_limit.map(|v| unit.to_nanos(v)),
            collection_interval: spec.collection_interval,
            ignore_null: spec.ignore_null,
            plugin: None,
            enabled: AtomicBool::new(spec.enabled),
            user_id: Mutex::new(None),
            last_sample: Mutex::new(None),
            pending_first_collection: AtomicBool::new(true),
        }
    }

    /// Synthetic zero-threshold rule wrapping a custom health plugin. It is
    /// evaluated by invocation rather than sampling, so it starts out
    /// non-pending.
    pub fn for_plugin(plugin: Arc<dyn HealthPlugin>) -> Self {
        Self {
            id: binding_id(plugin.component_name()),
            occurrences_min: None,
            occurrences_max: None,
            mean_limit_nanos: None,
            max_limit_nanos: None,
            collection_interval: Duration::from_secs(60),
            ignore_null: true,
            plugin: Some(plugin),
            enabled: AtomicBool::new(true),
            user_id: Mutex::new(None),
            last_sample: Mutex::new(None),
            pending_first_collection: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn occurrences_min(&self) -> Option<u64> {
        self.occurrences_min
    }

    pub fn occurrences_max(&self) -> Option<u64> {
        self.occurrences_max
    }

    pub fn mean_limit_nanos(&self) -> Option<u64> {
        self.mean_limit_nanos
    }

    pub fn max_limit_nanos(&self) -> Option<u64> {
        self.max_limit_nanos
    }

    pub fn collection_interval(&self) -> Duration {
        self.collection_interval
    }

    pub fn ignore_null(&self) -> bool {
        self.ignore_null
    }

    pub fn plugin(&self) -> Option<&Arc<dyn HealthPlugin>> {
        self.plugin.as_ref()
    }

    pub fn is_plugin_binding(&self) -> bool {
        self.plugin.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Toggling suppresses reporting but keeps sampling.
    pub fn set_enabled(&self, enabled: bool, user_id: &str) {
        self.enabled.store(enabled, Ordering::Relaxed);
        let mut user = self.user_id.lock().unwrap_or_else(|p| p.into_inner());
        *user = Some(user_id.to_string());
    }

    pub fn user_id(&self) -> Option<String> {
        self.user_id
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn is_pending(&self) -> bool {
        self.pending_first_collection.load(Ordering::Relaxed)
    }

    /// Called by the sampling task after every scheduled attempt, whether
    /// or not the metric existed. Only after this can the rule be reported
    /// as undefined.
    pub fn mark_attempted(&self) {
        self.pending_first_collection.store(false, Ordering::Relaxed);
    }

    pub fn record_sample(&self, sample: MetricSample) {
        let mut slot = self.last_sample.lock().unwrap_or_else(|p| p.into_inner());
        *slot = Some(sample);
    }

    pub fn last_sample(&self) -> Option<MetricSample> {
        *self.last_sample.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// The full set of configured rules, constructed once at startup.
///
/// Owns every rule instance; the scheduler and the report builder are
/// handed clones of the inner `Arc`s rather than reaching into any shared
/// global list.
pub struct RuleSet {
    rules: Vec<Arc<AlertRule>>,
}

impl RuleSet {
    pub fn new(specs: Vec<RuleSpec>) -> Self {
        Self {
            rules: specs
                .into_iter()
                .map(|s| Arc::new(AlertRule::from_spec(s)))
                .collect(),
        }
    }

    /// Builds the rule set and appends one synthetic binding per registered
    /// plugin.
    pub fn with_plugins(specs: Vec<RuleSpec>, registry: &PluginRegistry) -> Self {
        let mut set = Self::new(specs);
        for plugin in registry.iter() {
            set.rules.push(Arc::new(AlertRule::for_plugin(plugin.clone())));
        }
        set
    }

    pub fn get(&self, id: &str) -> Option<&Arc<AlertRule>> {
        self.rules.iter().find(|r| r.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<AlertRule>> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule ids still awaiting their first sampling attempt.
    pub fn pending_ids(&self) -> Vec<String> {
        self.rules
            .iter()
            .filter(|r| r.is_pending())
            .map(|r| r.id().to_string())
            .collect()
    }
}
