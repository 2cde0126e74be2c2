//! Accumulates violations and flushes them as one rate-limited digest.

use crate::{digest, NotificationTransport};
use chrono::{DateTime, Duration, Utc};
use pulsemon_common::types::{HealthReport, Origin, Violation};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct BatcherSettings {
    /// Minimum spacing between two digests.
    pub notify_interval: Duration,
    /// Backlog cap; oldest entries are dropped when exceeded.
    pub max_alerts: usize,
    /// Empty list turns the batcher into a no-op consumer.
    pub recipients: Vec<String>,
    /// Stamped into the digest subject line.
    pub origin: Origin,
}

impl Default for BatcherSettings {
    fn default() -> Self {
        Self {
            notify_interval: Duration::minutes(30),
            max_alerts: 50,
            recipients: Vec::new(),
            origin: Origin::default(),
        }
    }
}

struct BatchState {
    backlog: VecDeque<Violation>,
    last_sent_at: Option<DateTime<Utc>>,
}

/// Collects violations across passes and sends at most one digest per
/// notify interval. A failed send keeps the backlog for the next attempt
/// and never propagates out of the evaluation pass.
pub struct NotificationBatcher {
    settings: BatcherSettings,
    transport: Arc<dyn NotificationTransport>,
    state: Mutex<BatchState>,
}

impl NotificationBatcher {
    pub fn new(settings: BatcherSettings, transport: Arc<dyn NotificationTransport>) -> Self {
        Self {
            settings,
            transport,
            state: Mutex::new(BatchState {
                backlog: VecDeque::new(),
                last_sent_at: None,
            }),
        }
    }

    /// Hands one pass worth of violations to the batcher, sending a digest
    /// if the notify interval has elapsed.
    pub async fn offer(
        &self,
        report: &HealthReport,
        new_violations: &[Violation],
        now: DateTime<Utc>,
    ) {
        let mut state = self.state.lock().await;

        for violation in new_violations {
            state.backlog.push_back(violation.clone());
            while state.backlog.len() > self.settings.max_alerts {
                state.backlog.pop_front();
            }
        }

        if self.settings.recipients.is_empty() || state.backlog.is_empty() {
            return;
        }

        let expired = match state.last_sent_at {
            Some(last) => now - last >= self.settings.notify_interval,
            None => true,
        };
        if !expired {
            return;
        }

        let violations: Vec<Violation> = state.backlog.iter().cloned().collect();
        let subject = digest::subject(
            self.settings.origin.service.as_deref(),
            self.settings.origin.host.as_deref(),
            violations.len(),
        );
        let body_text = digest::render_text(&violations);
        let body_html = digest::render_html(&violations);
        let attachment = match digest::render_attachment(report) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "Failed to render digest attachment");
                return;
            }
        };

        match self
            .transport
            .send_digest(
                &self.settings.recipients,
                &subject,
                &body_text,
                &body_html,
                &attachment,
            )
            .await
        {
            Ok(()) => {
                tracing::info!(
                    transport = self.transport.transport_name(),
                    alerts = violations.len(),
                    "Digest sent"
                );
                state.backlog.clear();
                state.last_sent_at = Some(now);
            }
            Err(e) => {
                // Backlog is retained; the next expired pass retries.
                tracing::error!(
                    transport = self.transport.transport_name(),
                    error = %e,
                    "Failed to send digest"
                );
            }
        }
    }

    pub async fn backlog_len(&self) -> usize {
        self.state.lock().await.backlog.len()
    }
}
