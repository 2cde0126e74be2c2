use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Incremental counter readout: how many times the metric fired since the
/// last interval reset, plus first/last occurrence timestamps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CounterSample {
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Incremental stopwatch readout. All durations are in nanoseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StopwatchSample {
    pub count: u64,
    pub mean_nanos: f64,
    pub max_nanos: u64,
    pub min_nanos: u64,
    pub total_nanos: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// A point-in-time readout of a named metric.
///
/// Counters only carry an occurrence count; stopwatches additionally carry
/// timing statistics. The evaluator matches on the variant exhaustively, so
/// timing thresholds can never be applied to a plain counter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MetricSample {
    Counter(CounterSample),
    Stopwatch(StopwatchSample),
}

impl MetricSample {
    /// Occurrence count, regardless of variant.
    pub fn count(&self) -> u64 {
        match self {
            MetricSample::Counter(c) => c.count,
            MetricSample::Stopwatch(s) => s.count,
        }
    }

    pub fn max_nanos(&self) -> Option<u64> {
        match self {
            MetricSample::Counter(_) => None,
            MetricSample::Stopwatch(s) => Some(s.max_nanos),
        }
    }
}

/// Unit used for duration thresholds in configuration. Thresholds are
/// normalized to nanoseconds once at rule-load time; oversized values
/// saturate at `u64::MAX` instead of overflowing.
///
/// # Examples
///
/// ```
/// use pulsemon_common::types::TimeUnit;
///
/// let unit: TimeUnit = "ms".parse().unwrap();
/// assert_eq!(unit, TimeUnit::Millis);
/// assert_eq!(unit.to_nanos(2), 2_000_000);
/// assert_eq!(TimeUnit::Hours.to_nanos(u64::MAX), u64::MAX);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Nanos,
    Millis,
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    pub fn to_nanos(self, value: u64) -> u64 {
        match self {
            TimeUnit::Nanos => value,
            TimeUnit::Millis => value.saturating_mul(1_000_000),
            TimeUnit::Seconds => value.saturating_mul(1_000_000_000),
            TimeUnit::Minutes => value.saturating_mul(60_000_000_000),
            TimeUnit::Hours => value.saturating_mul(3_600_000_000_000),
        }
    }
}

impl std::str::FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ns" | "nanos" => Ok(TimeUnit::Nanos),
            "ms" | "millis" => Ok(TimeUnit::Millis),
            "s" | "seconds" => Ok(TimeUnit::Seconds),
            "m" | "minutes" => Ok(TimeUnit::Minutes),
            "h" | "hours" => Ok(TimeUnit::Hours),
            _ => Err(format!("unknown time unit: {s}")),
        }
    }
}

/// Which check a violation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    OccurrenceMin,
    OccurrenceMax,
    MeanTime,
    MaxTime,
    Undefined,
    CustomFailure,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationKind::OccurrenceMin => write!(f, "occurrence_min"),
            ViolationKind::OccurrenceMax => write!(f, "occurrence_max"),
            ViolationKind::MeanTime => write!(f, "mean_time"),
            ViolationKind::MaxTime => write!(f, "max_time"),
            ViolationKind::Undefined => write!(f, "undefined"),
            ViolationKind::CustomFailure => write!(f, "custom_failure"),
        }
    }
}

/// Identity of the process the engine runs in, stamped on every violation
/// so digests from different hosts/services can be told apart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Origin {
    pub host: Option<String>,
    pub service: Option<String>,
}

/// One instance of a rule or plugin failing its check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    pub kind: ViolationKind,
    pub collected_value: f64,
    pub limit_value: f64,
    pub description: String,
    pub host: Option<String>,
    pub service: Option<String>,
    pub first_seen: DateTime<Utc>,
    /// How many identical violations were merged into this entry.
    pub occurrence_count: u32,
}

impl Violation {
    pub fn new(
        rule_id: &str,
        kind: ViolationKind,
        collected_value: f64,
        limit_value: f64,
        description: String,
        origin: &Origin,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            kind,
            collected_value,
            limit_value,
            description,
            host: origin.host.clone(),
            service: origin.service.clone(),
            first_seen: now,
            occurrence_count: 1,
        }
    }

    /// Dedup identity: `(rule_id, kind, host, service)`. Absent host or
    /// service compares as absent on both sides.
    pub fn same_identity(&self, other: &Violation) -> bool {
        self.rule_id == other.rule_id
            && self.kind == other.kind
            && self.host == other.host
            && self.service == other.service
    }
}

/// Immutable snapshot produced by one evaluation pass.
///
/// A fresh report replaces the previous one atomically; readers never see a
/// partially built report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub collection_count: u64,
    pub last_collected_at: DateTime<Utc>,
    pub healthy: bool,
    /// Rule ids still awaiting their first scheduled sampling attempt.
    pub pending: Vec<String>,
    /// Rule ids whose metric has never been produced.
    pub undefined: Vec<String>,
    pub violations: Vec<Violation>,
}

impl HealthReport {
    /// The report published before any pass has run.
    pub fn initial(pending: Vec<String>) -> Self {
        Self {
            collection_count: 0,
            last_collected_at: Utc::now(),
            healthy: true,
            pending,
            undefined: Vec::new(),
            violations: Vec::new(),
        }
    }
}

/// Format a nanosecond duration for display.
///
/// # Examples
///
/// ```
/// use pulsemon_common::types::format_nanos;
///
/// assert_eq!(format_nanos(850.0), "850ns");
/// assert_eq!(format_nanos(2_500_000.0), "2.50ms");
/// assert_eq!(format_nanos(3_200_000_000.0), "3.20s");
/// ```
pub fn format_nanos(nanos: f64) -> String {
    if nanos < 1_000.0 {
        format!("{nanos:.0}ns")
    } else if nanos < 1_000_000.0 {
        format!("{:.2}µs", nanos / 1_000.0)
    } else if nanos < 1_000_000_000.0 {
        format!("{:.2}ms", nanos / 1_000_000.0)
    } else {
        format!("{:.2}s", nanos / 1_000_000_000.0)
    }
}
