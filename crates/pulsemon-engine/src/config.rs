use crate::error::MonitorError;
use pulsemon_alert::dedup::DedupSettings;
use pulsemon_alert::rule::RuleSpec;
use pulsemon_common::types::{Origin, TimeUnit};
use pulsemon_notify::batcher::BatcherSettings;
use pulsemon_notify::email::EmailTransport;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Host name stamped on violations (e.g. `"web-01"`).
    #[serde(default)]
    pub host: Option<String>,
    /// Service name stamped on violations (e.g. `"checkout"`).
    #[serde(default)]
    pub service: Option<String>,
    /// Cadence of the report-building pass.
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
    /// Capacity of the violation history ring.
    #[serde(default = "default_remember_count")]
    pub remember_count: usize,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default = "default_throttle_interval_secs")]
    pub interval_secs: u64,
    /// Identity matches the bucket must hold before merging kicks in.
    #[serde(default = "default_throttle_count")]
    pub count: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_throttle_interval_secs(),
            count: default_throttle_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_interval_secs")]
    pub interval_secs: u64,
    /// Backlog cap for the digest batcher.
    #[serde(default = "default_email_max_alerts")]
    pub max_alerts: usize,
    /// Empty list disables digests entirely.
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_notify_interval_secs(),
            max_alerts: default_email_max_alerts(),
            recipients: Vec::new(),
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            from: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Metric-source lookup key, globally unique.
    pub id: String,
    #[serde(default)]
    pub occurrences_min: Option<u64>,
    #[serde(default)]
    pub occurrences_max: Option<u64>,
    /// Duration limits expressed in `time_unit`.
    #[serde(default)]
    pub mean_limit: Option<u64>,
    #[serde(default)]
    pub max_limit: Option<u64>,
    #[serde(default = "default_time_unit")]
    pub time_unit: TimeUnit,
    #[serde(default = "default_collection_interval_secs")]
    pub collection_interval_secs: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub ignore_null: bool,
}

fn default_report_interval_secs() -> u64 {
    60
}

fn default_remember_count() -> usize {
    100
}

fn default_throttle_interval_secs() -> u64 {
    600
}

fn default_throttle_count() -> usize {
    1
}

fn default_notify_interval_secs() -> u64 {
    1800
}

fn default_email_max_alerts() -> usize {
    50
}

fn default_smtp_port() -> u16 {
    25
}

fn default_time_unit() -> TimeUnit {
    TimeUnit::Millis
}

fn default_collection_interval_secs() -> u64 {
    60
}

fn default_enabled() -> bool {
    true
}

impl MonitorConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn origin(&self) -> Origin {
        Origin {
            host: self.host.clone(),
            service: self.service.clone(),
        }
    }

    pub fn rule_specs(&self) -> Vec<RuleSpec> {
        self.rules
            .iter()
            .map(|r| RuleSpec {
                id: r.id.clone(),
                occurrences_min: r.occurrences_min,
                occurrences_max: r.occurrences_max,
                mean_limit: r.mean_limit,
                max_limit: r.max_limit,
                time_unit: r.time_unit,
                collection_interval: Duration::from_secs(r.collection_interval_secs),
                enabled: r.enabled,
                ignore_null: r.ignore_null,
            })
            .collect()
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn dedup_settings(&self) -> DedupSettings {
        DedupSettings {
            remember_count: self.remember_count,
            throttle_interval: chrono::Duration::seconds(self.throttle.interval_secs as i64),
            throttle_count: self.throttle.count,
        }
    }

    pub fn batcher_settings(&self) -> BatcherSettings {
        BatcherSettings {
            notify_interval: chrono::Duration::seconds(self.notify.interval_secs as i64),
            max_alerts: self.notify.max_alerts,
            recipients: self.notify.recipients.clone(),
            origin: self.origin(),
        }
    }

    /// Builds the SMTP transport when digests are configured. Returns
    /// `None` when there are no recipients.
    pub fn email_transport(&self) -> Result<Option<EmailTransport>, MonitorError> {
        if self.notify.recipients.is_empty() {
            return Ok(None);
        }
        let host = self.notify.smtp_host.as_deref().ok_or_else(|| {
            MonitorError::InvalidConfig("notify recipients set but smtp_host missing".into())
        })?;
        let from = self.notify.from.as_deref().ok_or_else(|| {
            MonitorError::InvalidConfig("notify recipients set but from address missing".into())
        })?;
        let transport = EmailTransport::new(
            host,
            self.notify.smtp_port,
            self.notify.smtp_username.as_deref(),
            self.notify.smtp_password.as_deref(),
            from,
        )
        .map_err(|e| MonitorError::InvalidConfig(e.to_string()))?;
        Ok(Some(transport))
    }
}
