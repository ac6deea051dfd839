//! Sample consolidation.
//!
//! Turns unordered, duplicated, multi-record sample lists into maximal
//! continuous intervals per identity:
//! 1. drop heartbeat records
//! 2. partition by identity, unioning colliding sample lists
//! 3. keep one sample per timestamp (highest rank wins)
//! 4. sort ascending and split wherever the gap exceeds the threshold

use incident_timeline_core::{
    series::TimelineRecord,
    types::{Sample, SeverityCode},
    TimelineConfig,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// A maximal run of samples for one identity with no internal gap above
/// the threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval<K> {
    pub identity: K,
    pub values: Vec<Sample>,
}

impl<K> Interval<K> {
    /// First sample timestamp
    pub fn start(&self) -> Option<i64> {
        self.values.first().map(|s| s.timestamp)
    }

    /// Last sample timestamp
    pub fn end(&self) -> Option<i64> {
        self.values.last().map(|s| s.timestamp)
    }
}

/// Deduplicate and sort samples.
///
/// Literal duplicates collapse; when one timestamp carries different codes
/// the highest-ranked code is kept (first seen wins between equal ranks).
pub fn dedup_samples(samples: impl IntoIterator<Item = Sample>) -> Vec<Sample> {
    let mut by_timestamp: BTreeMap<i64, SeverityCode> = BTreeMap::new();

    for sample in samples {
        match by_timestamp.get_mut(&sample.timestamp) {
            Some(existing) => {
                if sample.code.outranks(existing) {
                    *existing = sample.code;
                }
            }
            None => {
                by_timestamp.insert(sample.timestamp, sample.code);
            }
        }
    }

    by_timestamp
        .into_iter()
        .map(|(timestamp, code)| Sample { timestamp, code })
        .collect()
}

/// Split sorted samples wherever `next - current > gap_secs`.
///
/// A gap exactly equal to the threshold does not split. Empty input yields
/// no runs.
pub fn split_on_gaps(samples: &[Sample], gap_secs: i64) -> Vec<Vec<Sample>> {
    let mut runs: Vec<Vec<Sample>> = Vec::new();
    let mut current: Vec<Sample> = Vec::new();

    for sample in samples {
        if let Some(prev) = current.last() {
            if sample.timestamp.saturating_sub(prev.timestamp) > gap_secs {
                runs.push(std::mem::take(&mut current));
            }
        }
        current.push(sample.clone());
    }

    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// Sample consolidator
#[derive(Debug, Clone)]
pub struct SampleConsolidator {
    gap_threshold_secs: i64,
    heartbeat_alert_name: String,
}

impl SampleConsolidator {
    /// Create a consolidator from pipeline configuration
    pub fn new(config: &TimelineConfig) -> Self {
        Self {
            gap_threshold_secs: config.gap_threshold_secs,
            heartbeat_alert_name: config.heartbeat_alert_name.clone(),
        }
    }

    /// Gap threshold in seconds
    pub fn gap_threshold_secs(&self) -> i64 {
        self.gap_threshold_secs
    }

    /// Whether a record is the liveness ping
    pub fn is_heartbeat<R: TimelineRecord>(&self, record: &R) -> bool {
        record.alert_name() == self.heartbeat_alert_name
    }

    /// Remove heartbeat records
    pub fn drop_heartbeats<R: TimelineRecord>(&self, records: Vec<R>) -> Vec<R> {
        let before = records.len();
        let kept: Vec<R> = records
            .into_iter()
            .filter(|r| !self.is_heartbeat(r))
            .collect();

        if kept.len() != before {
            debug!(
                dropped = before - kept.len(),
                heartbeat = %self.heartbeat_alert_name,
                "Dropped heartbeat records"
            );
        }
        kept
    }

    /// Consolidate records into maximal continuous intervals
    pub fn consolidate<R: TimelineRecord>(&self, records: &[R]) -> Vec<Interval<R::Key>> {
        self.consolidate_samples(
            records
                .iter()
                .filter(|r| !self.is_heartbeat(*r))
                .map(|r| (r.identity(), r.samples().to_vec())),
        )
    }

    /// Consolidate `(identity, samples)` pairs.
    ///
    /// Pairs sharing an identity are unioned first. A partition without
    /// samples yields one empty interval. Output is ordered by identity,
    /// then by time.
    pub fn consolidate_samples<K: Ord + Clone>(
        &self,
        items: impl IntoIterator<Item = (K, Vec<Sample>)>,
    ) -> Vec<Interval<K>> {
        let mut partitions: BTreeMap<K, Vec<Sample>> = BTreeMap::new();
        for (identity, samples) in items {
            partitions.entry(identity).or_default().extend(samples);
        }

        let partition_count = partitions.len();
        let mut intervals = Vec::new();

        for (identity, samples) in partitions {
            let samples = dedup_samples(samples);
            if samples.is_empty() {
                intervals.push(Interval {
                    identity,
                    values: samples,
                });
                continue;
            }

            for values in split_on_gaps(&samples, self.gap_threshold_secs) {
                intervals.push(Interval {
                    identity: identity.clone(),
                    values,
                });
            }
        }

        debug!(
            partitions = partition_count,
            intervals = intervals.len(),
            gap_threshold_secs = self.gap_threshold_secs,
            "Consolidated samples"
        );
        intervals
    }
}
