//! Chart segmentation.
//!
//! Two steps, both purely visual:
//! - padding inserts a synthetic sample one offset before the start of the
//!   series and before the first sample after every gap
//! - run-length encoding turns samples into severity spans over a viewport,
//!   filling uncovered regions with explicit nodata spans
//!
//! Nothing here feeds back into resolved/firing state.

use crate::consolidator::dedup_samples;
use chrono::{DateTime, Duration, Utc};
use incident_timeline_core::{
    records::{Alert, ChartRow, ChartSpan, FillKey, Incident, TimeWindow},
    types::{Sample, Severity, SeverityCode},
    TimelineConfig,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Insert padding points.
///
/// A copy of the sample shifted back by `offset_secs` is placed before the
/// first sample and before every sample that follows a gap greater than
/// `gap_secs`. Input must be sorted ascending.
pub fn pad_values(samples: &[Sample], gap_secs: i64, offset_secs: i64) -> Vec<Sample> {
    let mut padded = Vec::with_capacity(samples.len() + 1);
    let mut prev: Option<i64> = None;

    for sample in samples {
        let opens_run = match prev {
            None => true,
            Some(p) => sample.timestamp.saturating_sub(p) > gap_secs,
        };
        if opens_run {
            padded.push(sample.shifted_back(offset_secs));
        }
        padded.push(sample.clone());
        prev = Some(sample.timestamp);
    }
    padded
}

fn at_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Run-length span builder over one viewport
#[derive(Debug)]
struct SpanWriter<'a> {
    name: &'a str,
    spans: Vec<ChartSpan>,
}

impl<'a> SpanWriter<'a> {
    fn new(name: &'a str) -> Self {
        Self {
            name,
            spans: Vec::new(),
        }
    }

    fn run(&mut self, y0: DateTime<Utc>, y: DateTime<Utc>, severity: Option<Severity>) {
        self.spans.push(ChartSpan {
            y0,
            y,
            severity,
            nodata: false,
            fill: FillKey::from(severity),
            name: self.name.to_string(),
        });
    }

    fn nodata(&mut self, y0: DateTime<Utc>, y: DateTime<Utc>) {
        self.spans.push(ChartSpan {
            y0,
            y,
            severity: None,
            nodata: true,
            fill: FillKey::Nodata,
            name: self.name.to_string(),
        });
    }
}

/// Chart segmenter
#[derive(Debug, Clone)]
pub struct ChartSegmenter {
    gap_threshold_secs: i64,
    padding_offset_secs: i64,
    nodata_gap_secs: i64,
}

impl ChartSegmenter {
    /// Create a segmenter from pipeline configuration
    pub fn new(config: &TimelineConfig) -> Self {
        Self {
            gap_threshold_secs: config.gap_threshold_secs,
            padding_offset_secs: config.padding_offset_secs,
            nodata_gap_secs: config.nodata_gap_secs,
        }
    }

    /// Pad with the configured gap threshold and offset
    pub fn pad(&self, samples: &[Sample]) -> Vec<Sample> {
        pad_values(samples, self.gap_threshold_secs, self.padding_offset_secs)
    }

    /// Segment samples into spans covering `window` exactly.
    ///
    /// Samples are deduplicated and clipped to the window first. A change of
    /// code closes the current span 1ms before the next sample; a gap above
    /// the nodata threshold closes it at the last sample and inserts a
    /// nodata span up to 1ms before the next one. Uncovered lead and tail
    /// regions become nodata spans touching the window edges.
    pub fn segment<F>(
        &self,
        samples: &[Sample],
        window: &TimeWindow,
        name: &str,
        severity_of: F,
    ) -> Vec<ChartSpan>
    where
        F: Fn(&SeverityCode) -> Option<Severity>,
    {
        let mut writer = SpanWriter::new(name);
        if window.end < window.start {
            return writer.spans;
        }

        let visible: Vec<Sample> = dedup_samples(
            samples
                .iter()
                .filter(|s| window.contains_secs(s.timestamp))
                .cloned(),
        );

        let (first, last) = match (visible.first(), visible.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                writer.nodata(window.start, window.end);
                return writer.spans;
            }
        };

        let one_ms = Duration::milliseconds(1);
        let nodata_gap_ms = self.nodata_gap_secs.saturating_mul(1000);

        let first_at = at_millis(first.timestamp_millis());
        if first_at > window.start {
            writer.nodata(window.start, first_at - one_ms);
        }

        let mut run_start = first_at.max(window.start);
        let mut run_code = &first.code;

        for pair in visible.windows(2) {
            let (prev, cur) = (&pair[0], &pair[1]);
            let cur_at = at_millis(cur.timestamp_millis());

            if cur.timestamp_millis().saturating_sub(prev.timestamp_millis()) > nodata_gap_ms {
                let prev_at = at_millis(prev.timestamp_millis());
                writer.run(run_start, prev_at, severity_of(run_code));
                writer.nodata(prev_at + one_ms, cur_at - one_ms);
            } else if cur.code != *run_code {
                writer.run(run_start, cur_at - one_ms, severity_of(run_code));
            } else {
                continue;
            }
            run_start = cur_at;
            run_code = &cur.code;
        }

        let last_at = at_millis(last.timestamp_millis());
        if last_at < window.end {
            writer.run(run_start, last_at, severity_of(run_code));
            writer.nodata(last_at + one_ms, window.end);
        } else {
            writer.run(run_start, window.end, severity_of(run_code));
        }

        writer.spans
    }

    /// One row per incident group.
    ///
    /// Each member interval is padded, then all intervals of a group share
    /// one timeline (highest severity per timestamp). The incidents
    /// themselves are left unpadded. The row takes the smallest `x` of its
    /// members. Rows keep the order in which groups first appear.
    pub fn incident_rows(&self, incidents: &[Incident], window: &TimeWindow) -> Vec<ChartRow> {
        let mut order: Vec<&str> = Vec::new();
        let mut groups: BTreeMap<&str, Vec<&Incident>> = BTreeMap::new();
        for incident in incidents {
            let members = groups.entry(incident.group_id.as_str()).or_default();
            if members.is_empty() {
                order.push(incident.group_id.as_str());
            }
            members.push(incident);
        }

        let rows: Vec<ChartRow> = order
            .into_iter()
            .filter_map(|group_id| {
                let members = groups.get(group_id)?;
                let samples: Vec<Sample> = members.iter().flat_map(|i| self.pad(&i.values)).collect();
                let component_list: BTreeSet<String> = members
                    .iter()
                    .flat_map(|i| i.component_list.iter().cloned())
                    .collect();
                let x = members.iter().map(|i| i.x).min().unwrap_or_default();

                Some(ChartRow {
                    name: group_id.to_string(),
                    x,
                    component_list,
                    spans: self.segment(&samples, window, group_id, SeverityCode::rank),
                })
            })
            .collect();

        debug!(rows = rows.len(), "Built incident chart rows");
        rows
    }

    /// One row per alert interval, coloured by the alert's severity label
    pub fn alert_rows(&self, alerts: &[Alert], window: &TimeWindow) -> Vec<ChartRow> {
        let rows: Vec<ChartRow> = alerts
            .iter()
            .map(|alert| {
                let severity = alert.severity_rank();
                ChartRow {
                    name: alert.alertname.clone(),
                    x: alert.x,
                    component_list: BTreeSet::from([alert.component.clone()]),
                    spans: self.segment(&alert.values, window, &alert.alertname, |_| severity),
                }
            })
            .collect();

        debug!(rows = rows.len(), "Built alert chart rows");
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn samples(pairs: &[(i64, &str)]) -> Vec<Sample> {
        pairs.iter().map(|(t, c)| Sample::new(*t, *c)).collect()
    }

    fn secs(t: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(t, 0).unwrap()
    }

    fn millis(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn window(start: i64, end: i64) -> TimeWindow {
        TimeWindow::new(secs(start), secs(end))
    }

    fn segmenter() -> ChartSegmenter {
        ChartSegmenter::new(&TimelineConfig::default())
    }

    fn incident(group_id: &str, x: usize, values: Vec<Sample>) -> Incident {
        Incident {
            group_id: group_id.into(),
            component: "etcd".into(),
            component_list: BTreeSet::from(["etcd".to_string()]),
            layer: "core".into(),
            src_alertname: "EtcdNoLeader".into(),
            src_namespace: "openshift-etcd".into(),
            src_severity: "critical".into(),
            silenced: false,
            labels: BTreeMap::new(),
            values,
            first_timestamp: 0,
            resolved: false,
            x,
        }
    }

    #[test]
    fn test_padding_single_sample() {
        let padded = pad_values(&samples(&[(1000, "critical")]), 300, 300);
        assert_eq!(padded, samples(&[(700, "critical"), (1000, "critical")]));
    }

    #[test]
    fn test_padding_after_gap() {
        let padded = pad_values(&samples(&[(1000, "1"), (1300, "1"), (2000, "2")]), 300, 300);
        assert_eq!(
            padded,
            samples(&[(700, "1"), (1000, "1"), (1300, "1"), (1700, "2"), (2000, "2")])
        );
    }

    #[test]
    fn test_padding_empty() {
        assert!(pad_values(&[], 300, 300).is_empty());
    }

    #[test]
    fn test_no_samples_is_single_nodata_span() {
        let spans = segmenter().segment(&[], &window(0, 1000), "g", SeverityCode::rank);
        assert_eq!(spans.len(), 1);
        assert!(spans[0].nodata);
        assert_eq!(spans[0].y0, secs(0));
        assert_eq!(spans[0].y, secs(1000));
    }

    #[test]
    fn test_severity_change_closes_one_ms_early() {
        let values = samples(&[(1000, "1"), (1060, "1"), (1120, "2"), (1180, "2")]);
        let spans = segmenter().segment(&values, &window(1000, 1180), "g", SeverityCode::rank);

        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].severity, Some(Severity::Warning));
        assert_eq!(spans[0].y0, secs(1000));
        assert_eq!(spans[0].y, millis(1_119_999));
        assert_eq!(spans[1].severity, Some(Severity::Critical));
        assert_eq!(spans[1].fill, FillKey::Critical);
        assert_eq!(spans[1].y0, secs(1120));
        assert_eq!(spans[1].y, secs(1180));
    }

    #[test]
    fn test_gaps_and_edges_become_nodata() {
        let values = samples(&[(1000, "2"), (1060, "2"), (2000, "2")]);
        let spans = segmenter().segment(&values, &window(500, 3000), "g", SeverityCode::rank);

        let kinds: Vec<bool> = spans.iter().map(|s| s.nodata).collect();
        assert_eq!(kinds, vec![true, false, true, false, true]);

        assert_eq!(spans[0].y0, secs(500));
        assert_eq!(spans[0].y, millis(999_999));
        assert_eq!(spans[1].y, secs(1060));
        assert_eq!(spans[2].y0, millis(1_060_001));
        assert_eq!(spans[2].y, millis(1_999_999));
        assert_eq!(spans[3].y0, secs(2000));
        assert_eq!(spans[3].y, secs(2000));
        assert_eq!(spans[4].y0, millis(2_000_001));
        assert_eq!(spans.last().unwrap().y, secs(3000));
    }

    #[test]
    fn test_gap_at_nodata_threshold_is_continuous() {
        let values = samples(&[(1000, "0"), (1300, "0")]);
        let spans = segmenter().segment(&values, &window(1000, 1300), "g", SeverityCode::rank);
        assert_eq!(spans.len(), 1);
        assert!(!spans[0].nodata);
        assert_eq!(spans[0].fill, FillKey::Info);
    }

    #[test]
    fn test_samples_outside_window_ignored() {
        let values = samples(&[(100, "2"), (1000, "1"), (9000, "2")]);
        let spans = segmenter().segment(&values, &window(1000, 1000), "g", SeverityCode::rank);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].severity, Some(Severity::Warning));
        assert_eq!(spans[0].y0, secs(1000));
        assert_eq!(spans[0].y, secs(1000));
    }

    #[test]
    fn test_inverted_window_yields_nothing() {
        let spans = segmenter().segment(&samples(&[(1000, "2")]), &window(2000, 1000), "g", SeverityCode::rank);
        assert!(spans.is_empty());
    }

    #[test]
    fn test_incident_rows_merge_group_members() {
        let mut other = incident("g-1", 1, samples(&[(1060, "2")]));
        other.component_list = BTreeSet::from(["network".to_string()]);
        let incidents = vec![
            incident("g-1", 3, samples(&[(1000, "1"), (1060, "1")])),
            incident("g-2", 2, samples(&[(1000, "0")])),
            other,
        ];

        let rows = segmenter().incident_rows(&incidents, &window(1000, 1060));

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "g-1");
        assert_eq!(rows[0].x, 1);
        assert_eq!(rows[0].component_list.len(), 2);
        // 1060 carries both "1" and "2"; the critical code wins
        assert_eq!(rows[0].spans.last().unwrap().severity, Some(Severity::Critical));
        assert_eq!(rows[1].name, "g-2");
    }

    #[test]
    fn test_single_sample_incident_row_is_padded() {
        let incidents = vec![incident("g-1", 1, samples(&[(1000, "2")]))];

        let rows = segmenter().incident_rows(&incidents, &window(0, 1100));

        let bars: Vec<&ChartSpan> = rows[0].spans.iter().filter(|s| !s.nodata).collect();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].y0, secs(700));
        assert_eq!(bars[0].y, secs(1000));
        assert_eq!(bars[0].severity, Some(Severity::Critical));
        assert_eq!(incidents[0].values, samples(&[(1000, "2")]));
    }

    #[test]
    fn test_alert_rows_use_severity_label() {
        let alert = Alert {
            alertname: "X".into(),
            namespace: "ns".into(),
            severity: "warning".into(),
            component: "compute".into(),
            layer: "compute".into(),
            values: samples(&[(700, "firing"), (1000, "firing")]),
            alerts_start_firing: 700,
            alerts_end_firing: 1000,
            resolved: false,
            silenced: false,
            x: 1,
        };

        let rows = segmenter().alert_rows(&[alert], &window(700, 1000));

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].spans.len(), 1);
        assert_eq!(rows[0].spans[0].fill, FillKey::Warning);
        assert_eq!(rows[0].spans[0].name, "X");
    }
}
