//! Digest notification delivery for the health-monitoring engine.
//!
//! Violations accumulate in the [`batcher::NotificationBatcher`] and are
//! flushed as a single email digest at most once per notify interval. The
//! transport seam is the [`NotificationTransport`] trait; the built-in
//! implementation is SMTP via lettre.

pub mod batcher;
pub mod digest;
pub mod email;
pub mod error;


use async_trait::async_trait;
use error::Result;

/// Sends one rendered digest to a set of recipients.
///
/// Implementations never panic on delivery problems; failures come back as
/// an error result and the caller decides whether to retry.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Delivers the digest. `body_text` and `body_html` are alternative
    /// renderings of the same summary; `attachment` is the raw JSON health
    /// report.
    ///
    /// # Errors
    ///
    /// Returns an error when the message cannot be built or the transport
    /// rejects it.
    async fn send_digest(
        &self,
        recipients: &[String],
        subject: &str,
        body_text: &str,
        body_html: &str,
        attachment: &str,
    ) -> Result<()>;

    /// Transport type name (e.g. `"smtp"`), used in logs.
    fn transport_name(&self) -> &str;
}
