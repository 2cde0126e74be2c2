/// Errors that can occur within the notification subsystem.
///
/// # Examples
///
/// ```rust
/// use pulsemon_notify::error::NotifyError;
///
/// let err = NotifyError::InvalidConfig("missing smtp_host".to_string());
/// assert!(err.to_string().contains("smtp_host"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Transport configuration is missing a required field or contains an
    /// invalid value.
    #[error("Notify: invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// A recipient or sender address failed to parse.
    #[error("Notify: invalid address: {0}")]
    InvalidAddress(String),

    /// Building the MIME message failed.
    #[error("Notify: message build error: {0}")]
    MessageBuild(String),

    /// SMTP transport error when sending the digest.
    #[error("Notify: SMTP error: {0}")]
    Smtp(String),

    /// JSON serialization failed (e.g. rendering the report attachment).
    #[error("Notify: JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
