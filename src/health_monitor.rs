use crate::feed::FeedSource;
use serde::{Deserialize, Serialize};

/// Feed connection summary exposed in the status snapshot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionMeta {
    pub source: Option<FeedSource>,
    pub last_sample_ms: Option<i64>,
    pub samples_received: u64,
    pub samples_accepted: u64,
    pub feed_healthy: bool,
    pub silence_ms: Option<i64>,
}

/// Tracks liveness of the location feed
#[derive(Clone, Debug)]
pub struct FeedHealth {
    silence_threshold_ms: i64,
    source: Option<FeedSource>,
    last_sample_ms: Option<i64>,
    samples_received: u64,
    samples_accepted: u64,
}

impl FeedHealth {
    pub fn new(silence_threshold_ms: i64) -> Self {
        FeedHealth {
            silence_threshold_ms,
            source: None,
            last_sample_ms: None,
            samples_received: 0,
            samples_accepted: 0,
        }
    }

    /// Record that an event arrived, whatever happens to it afterwards
    pub fn record_received(&mut self, source: FeedSource, timestamp_ms: i64) {
        if self.source != Some(source) {
            log::info!("Location feed source: {:?}", source);
            self.source = Some(source);
        }
        self.last_sample_ms = Some(match self.last_sample_ms {
            Some(last) => last.max(timestamp_ms),
            None => timestamp_ms,
        });
        self.samples_received += 1;
    }

    pub fn record_accepted(&mut self) {
        self.samples_accepted += 1;
    }

    pub fn time_since_last_sample(&self, now_ms: i64) -> Option<i64> {
        self.last_sample_ms.map(|last| now_ms.saturating_sub(last).max(0))
    }

    /// Silent once nothing arrived for longer than the threshold.
    /// A feed that never delivered anything is not silent yet.
    pub fn is_silent(&self, now_ms: i64) -> bool {
        self.time_since_last_sample(now_ms)
            .map(|d| d > self.silence_threshold_ms)
            .unwrap_or(false)
    }

    pub fn report(&self, now_ms: i64) -> ConnectionMeta {
        ConnectionMeta {
            source: self.source,
            last_sample_ms: self.last_sample_ms,
            samples_received: self.samples_received,
            samples_accepted: self.samples_accepted,
            feed_healthy: !self.is_silent(now_ms),
            silence_ms: self.time_since_last_sample(now_ms),
        }
    }

    /// Format feed status for logging
    pub fn format_status(&self, now_ms: i64) -> String {
        let state = if self.is_silent(now_ms) {
            format!(
                "⚠ (silent {:.1}s)",
                self.time_since_last_sample(now_ms).unwrap_or(0) as f64 / 1000.0
            )
        } else {
            "✓".to_string()
        };
        format!(
            "GPS: {} | {}/{} accepted",
            state, self.samples_accepted, self.samples_received
        )
    }
}
