//! Lifecycle state derivation.
//!
//! Takes merged records and the current time, clips them to the visible
//! window, splits them into intervals and decides firing/resolved for each.
//! "Now" is always an explicit argument.

use crate::consolidator::{Interval, SampleConsolidator};
use crate::segmenter::ChartSegmenter;
use chrono::{DateTime, Utc};
use incident_timeline_core::{
    records::{Alert, Incident, TimeWindow},
    series::{AlertSeries, IncidentSeries, TimelineRecord},
    types::Sample,
    TimelineConfig,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Whether a condition whose last real sample is `last_sample_secs` has
/// been quiet for at least `threshold_ms` at `now`.
///
/// Must be called with an un-padded sample.
pub fn is_resolved(last_sample_secs: i64, now: DateTime<Utc>, threshold_ms: i64) -> bool {
    now.timestamp_millis()
        .saturating_sub(last_sample_secs.saturating_mul(1000))
        >= threshold_ms
}

/// Keep only samples inside the window
pub fn clip_to_window(samples: &[Sample], window: &TimeWindow) -> Vec<Sample> {
    samples
        .iter()
        .filter(|s| window.contains_secs(s.timestamp))
        .cloned()
        .collect()
}

/// Sort ascending by start and number `x = count - index`.
///
/// The earliest record gets the largest `x`, the most recent gets 1.
/// The sort is stable, so equal starts keep their incoming order.
pub fn assign_ordinals<T>(
    items: &mut [T],
    start_of: impl Fn(&T) -> i64,
    mut set_x: impl FnMut(&mut T, usize),
) {
    items.sort_by_key(|item| start_of(item));
    let count = items.len();
    for (index, item) in items.iter_mut().enumerate() {
        set_x(item, count - index);
    }
}

/// Lifecycle state derivator
#[derive(Debug, Clone)]
pub struct LifecycleDeriver {
    consolidator: SampleConsolidator,
    segmenter: ChartSegmenter,
    window_days: u32,
    padding_offset_secs: i64,
    resolved_threshold_ms: i64,
}

impl LifecycleDeriver {
    /// Create a derivator from pipeline configuration
    pub fn new(config: &TimelineConfig) -> Self {
        Self {
            consolidator: SampleConsolidator::new(config),
            segmenter: ChartSegmenter::new(config),
            window_days: config.window_days,
            padding_offset_secs: config.padding_offset_secs,
            resolved_threshold_ms: config.resolved_threshold_millis(),
        }
    }

    /// Visible window ending at `now`
    pub fn window(&self, now: DateTime<Utc>) -> TimeWindow {
        TimeWindow::last_days(now, self.window_days)
    }

    /// Clip merged records to the window and split them into intervals.
    ///
    /// Records with nothing inside the window disappear here.
    fn windowed_intervals<R: TimelineRecord>(
        &self,
        merged: &[R],
        window: &TimeWindow,
    ) -> Vec<Interval<R::Key>> {
        let intervals: Vec<Interval<R::Key>> = self
            .consolidator
            .consolidate_samples(
                merged
                    .iter()
                    .map(|r| (r.identity(), clip_to_window(r.samples(), window))),
            )
            .into_iter()
            .filter(|i| !i.values.is_empty())
            .collect();

        debug!(
            records = merged.len(),
            intervals = intervals.len(),
            window_start = %window.start,
            "Windowed records into intervals"
        );
        intervals
    }

    /// Turn merged incident records into incident intervals.
    ///
    /// `first_timestamp` is the identity's first sample over the full,
    /// unclipped data minus the padding offset, so a condition that began
    /// before the window still reports its origin.
    pub fn derive_incidents(&self, merged: &[IncidentSeries], now: DateTime<Utc>) -> Vec<Incident> {
        let window = self.window(now);
        let by_key: BTreeMap<_, &IncidentSeries> = merged.iter().map(|r| (r.identity(), r)).collect();

        let mut incidents: Vec<Incident> = self
            .windowed_intervals(merged, &window)
            .into_iter()
            .filter_map(|interval| {
                let record = by_key.get(&interval.identity)?;
                let last = interval.end()?;
                let origin = record.first_timestamp()?;

                Some(Incident {
                    group_id: record.group_id.clone(),
                    component: record.component.clone(),
                    component_list: record.component_list.clone(),
                    layer: record.layer.clone(),
                    src_alertname: record.src_alertname.clone(),
                    src_namespace: record.src_namespace.clone(),
                    src_severity: record.src_severity.clone(),
                    silenced: record.silenced,
                    labels: record.labels.clone(),
                    first_timestamp: origin.saturating_sub(self.padding_offset_secs),
                    resolved: is_resolved(last, now, self.resolved_threshold_ms),
                    values: interval.values,
                    x: 0,
                })
            })
            .collect();

        assign_ordinals(
            &mut incidents,
            |i| i.start().unwrap_or_default(),
            |i, x| i.x = x,
        );
        incidents
    }

    /// Turn merged alert records into alert intervals.
    ///
    /// Each alert must match an incident by source alert name, namespace and
    /// severity; unmatched alerts are dropped. A matched alert inherits the
    /// incident's `silenced` flag, and its component/layer when it has none
    /// of its own. Values are padded for rendering while `resolved` looks at
    /// the last real sample.
    pub fn derive_alerts(
        &self,
        merged: &[AlertSeries],
        incidents: &[Incident],
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        let window = self.window(now);

        let matched: Vec<(AlertSeries, &Incident)> = merged
            .iter()
            .filter_map(|alert| {
                let incident = find_incident(alert, incidents)?;
                let mut alert = alert.clone();
                if alert.component.is_empty() {
                    alert.component = incident.component.clone();
                }
                if alert.layer.is_empty() {
                    alert.layer = incident.layer.clone();
                }
                alert.silenced = incident.silenced;
                Some((alert, incident))
            })
            .collect();

        if matched.len() != merged.len() {
            debug!(
                dropped = merged.len() - matched.len(),
                "Dropped alerts without a matching incident"
            );
        }

        let records: Vec<AlertSeries> = matched.into_iter().map(|(a, _)| a).collect();
        let by_key: BTreeMap<_, &AlertSeries> = records.iter().map(|r| (r.identity(), r)).collect();

        let mut alerts: Vec<Alert> = self
            .windowed_intervals(&records, &window)
            .into_iter()
            .filter_map(|interval| {
                let record = by_key.get(&interval.identity)?;
                let last = interval.end()?;
                let values = self.segmenter.pad(&interval.values);
                let start = values.first().map(|s| s.timestamp)?;

                Some(Alert {
                    alertname: record.alertname.clone(),
                    namespace: record.namespace.clone(),
                    severity: record.severity.clone(),
                    component: record.component.clone(),
                    layer: record.layer.clone(),
                    values,
                    alerts_start_firing: start,
                    alerts_end_firing: last,
                    resolved: is_resolved(last, now, self.resolved_threshold_ms),
                    silenced: record.silenced,
                    x: 0,
                })
            })
            .collect();

        assign_ordinals(&mut alerts, |a| a.alerts_start_firing, |a, x| a.x = x);
        alerts
    }
}

fn find_incident<'a>(alert: &AlertSeries, incidents: &'a [Incident]) -> Option<&'a Incident> {
    incidents.iter().find(|i| {
        i.src_alertname == alert.alertname
            && i.src_namespace == alert.namespace
            && i.src_severity == alert.severity
    })
}
