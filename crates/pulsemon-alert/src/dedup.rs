//! Sliding-window deduplication of violations and the bounded history they
//! flush into.
//!
//! Violations from each pass land in a throttle bucket first. Duplicates
//! (same rule, kind, host, service) are merged once the bucket already
//! holds the configured number of matches. When the throttle window
//! expires the bucket is flushed into a FIFO history ring capped at
//! `remember_count`. Expiry is checked lazily on ingest, never by a timer,
//! so a quiet period leaves the bucket untouched until the next event.

use chrono::{DateTime, Duration, Utc};
use pulsemon_common::types::Violation;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct DedupSettings {
    /// Capacity of the history ring; oldest entries are evicted first.
    pub remember_count: usize,
    /// Length of the throttle window.
    pub throttle_interval: Duration,
    /// Number of identity matches the bucket must already hold before a
    /// newcomer is merged instead of appended.
    pub throttle_count: usize,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            remember_count: 100,
            throttle_interval: Duration::minutes(10),
            throttle_count: 1,
        }
    }
}

struct DedupState {
    history: VecDeque<Violation>,
    bucket: Vec<Violation>,
    window_opened_at: DateTime<Utc>,
}

/// Owns the throttle bucket and the history ring. Both structures are
/// updated as one transaction under a single mutex; status queries read
/// them through the same lock.
pub struct Deduplicator {
    settings: DedupSettings,
    state: Mutex<DedupState>,
}

impl Deduplicator {
    pub fn new(settings: DedupSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(DedupState {
                history: VecDeque::new(),
                bucket: Vec::new(),
                window_opened_at: Utc::now(),
            }),
        }
    }

    /// Feeds one pass worth of violations through the throttle.
    pub fn ingest(&self, violations: &[Violation], now: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());

        if now - state.window_opened_at >= self.settings.throttle_interval {
            self.flush_bucket(&mut state, now);
        }

        for violation in violations {
            let matches = state
                .bucket
                .iter()
                .filter(|v| v.same_identity(violation))
                .count();
            if matches >= self.settings.throttle_count {
                // Merge into the oldest match; the newcomer's own detail is
                // dropped.
                if let Some(oldest) = state
                    .bucket
                    .iter_mut()
                    .find(|v| v.same_identity(violation))
                {
                    oldest.occurrence_count += violation.occurrence_count;
                    continue;
                }
            }
            state.bucket.push(violation.clone());
        }
    }

    /// All retained violations, oldest first: flushed history followed by
    /// the current bucket.
    pub fn all_violations(&self) -> Vec<Violation> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state
            .history
            .iter()
            .chain(state.bucket.iter())
            .cloned()
            .collect()
    }

    pub fn history_len(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.history.len()
    }

    fn flush_bucket(&self, state: &mut DedupState, now: DateTime<Utc>) {
        if !state.bucket.is_empty() {
            tracing::debug!(
                count = state.bucket.len(),
                "Throttle window expired, flushing bucket to history"
            );
        }
        for violation in state.bucket.drain(..) {
            while state.history.len() >= self.settings.remember_count {
                if state.history.pop_front().is_none() {
                    break;
                }
            }
            state.history.push_back(violation);
        }
        state.window_opened_at = now;
    }
}
