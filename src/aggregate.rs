/// Per-second request buckets and summary statistics.
///
/// The aggregator is owned by a single run. Batch mode calls `finalize()`
/// once input is exhausted; follow mode repeatedly calls
/// `drain_ready_buckets()` to emit seconds that can no longer change.
use chrono::{DateTime, DurationRound, FixedOffset, TimeDelta};
use serde::Serialize;
use std::collections::BTreeMap;

/// Request count for one whole second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub second: DateTime<FixedOffset>,
    pub count: u64,
}

impl Bucket {
    /// Wall-clock label in the log's offset, e.g. `2025-11-08 00:13:23`.
    pub fn label(&self) -> String {
        self.second.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Summary statistics over seconds that had at least one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total_requests: u64,
    pub active_seconds: u64,
    pub average_rps: f64,
    pub max_rps: u64,
    pub min_rps: u64,
}

impl Summary {
    pub fn is_empty(&self) -> bool {
        self.active_seconds == 0
    }
}

/// Compute the summary for a set of buckets.
///
/// The average is over active seconds only, not elapsed wall-clock time.
pub fn summarize(buckets: &[Bucket]) -> Summary {
    let mut running = RunningSummary::default();
    for bucket in buckets {
        running.record(bucket);
    }
    running.snapshot()
}

/// Incrementally maintained summary, fed with buckets as they are finalized.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningSummary {
    total: u64,
    seconds: u64,
    max: u64,
    min: Option<u64>,
}

impl RunningSummary {
    pub fn record(&mut self, bucket: &Bucket) {
        if bucket.count == 0 {
            return;
        }
        self.total += bucket.count;
        self.seconds += 1;
        self.max = self.max.max(bucket.count);
        self.min = Some(self.min.map_or(bucket.count, |m| m.min(bucket.count)));
    }

    pub fn snapshot(&self) -> Summary {
        let average_rps = if self.seconds == 0 {
            0.0
        } else {
            self.total as f64 / self.seconds as f64
        };
        Summary {
            total_requests: self.total,
            active_seconds: self.seconds,
            average_rps,
            max_rps: self.max,
            min_rps: self.min.unwrap_or(0),
        }
    }
}

/// Buckets requests by second.
#[derive(Debug, Default)]
pub struct RpsAggregator {
    buckets: BTreeMap<DateTime<FixedOffset>, u64>,
    latest: Option<DateTime<FixedOffset>>,
    /// Newest second handed out by `drain_ready_buckets`.
    drained_through: Option<DateTime<FixedOffset>>,
    observed: u64,
    late: u64,
}

impl RpsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request in the bucket for `floor(timestamp, 1s)`.
    ///
    /// Returns false when the second was already drained: its bucket has been
    /// reported, so the request is counted as late instead of reopening it.
    /// Out-of-order timestamps for seconds that are still open are accepted.
    pub fn observe(&mut self, timestamp: DateTime<FixedOffset>) -> bool {
        let second = truncate_to_second(timestamp);
        if self.drained_through.is_some_and(|drained| second <= drained) {
            self.late += 1;
            tracing::debug!(%second, "dropping request for an already reported second");
            return false;
        }
        if self.latest.is_some_and(|latest| second < latest) {
            tracing::debug!(%second, "out-of-order timestamp");
        }
        *self.buckets.entry(second).or_insert(0) += 1;
        self.observed += 1;
        if self.latest.map_or(true, |latest| second > latest) {
            self.latest = Some(second);
        }
        true
    }

    /// Remove and return every bucket strictly older than the newest second seen.
    ///
    /// Those seconds are final: input is append-only, so once a later second
    /// shows up their counts cannot change.
    pub fn drain_ready_buckets(&mut self) -> Vec<Bucket> {
        let Some(latest) = self.latest else {
            return Vec::new();
        };
        let pending = self.buckets.split_off(&latest);
        let ready = std::mem::replace(&mut self.buckets, pending);
        if let Some((&last, _)) = ready.last_key_value() {
            self.drained_through = Some(last);
        }
        ready
            .into_iter()
            .map(|(second, count)| Bucket { second, count })
            .collect()
    }

    /// Consume the aggregator and return all buckets in chronological order.
    pub fn finalize(self) -> Vec<Bucket> {
        self.buckets
            .into_iter()
            .map(|(second, count)| Bucket { second, count })
            .collect()
    }

    /// Buckets still open (not yet drained), oldest first.
    pub fn pending(&self) -> Vec<Bucket> {
        self.buckets
            .iter()
            .map(|(&second, &count)| Bucket { second, count })
            .collect()
    }

    /// Number of timestamps observed over the aggregator's lifetime.
    pub fn observed(&self) -> u64 {
        self.observed
    }

    /// Requests dropped because their second had already been drained.
    pub fn late(&self) -> u64 {
        self.late
    }
}

fn truncate_to_second(timestamp: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    timestamp
        .duration_trunc(TimeDelta::seconds(1))
        .unwrap_or(timestamp)
}
