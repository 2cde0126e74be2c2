/// Errors surfaced by the monitor facade.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// No rule with the given id exists in the rule set.
    #[error("Monitor: rule not found: {0}")]
    RuleNotFound(String),

    /// `start()` was called on an already-running monitor.
    #[error("Monitor: already started")]
    AlreadyStarted,

    /// Configuration is inconsistent (e.g. notify recipients without an
    /// SMTP host).
    #[error("Monitor: invalid configuration: {0}")]
    InvalidConfig(String),
}
