//! End-to-end pipeline.
//!
//! Raw backend series go in, processed incidents, alerts, chart rows and
//! table rows come out. Every pass rebuilds its output from scratch; nothing
//! is carried over between invocations.

use crate::aggregator::group_alerts_for_table;
use crate::consolidator::SampleConsolidator;
use crate::lifecycle::LifecycleDeriver;
use crate::merger::merge_records;
use crate::segmenter::ChartSegmenter;
use chrono::{DateTime, Utc};
use incident_timeline_core::{
    records::{Alert, ChartRow, GroupedAlert, Incident, TimeWindow},
    series::{AlertSeries, IncidentSeries, RawSeries},
    TimelineConfig,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Everything one refresh cycle produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSnapshot {
    /// Time the snapshot was computed for
    pub now: DateTime<Utc>,
    pub window: TimeWindow,
    pub incidents: Vec<Incident>,
    pub alerts: Vec<Alert>,
    pub incident_chart: Vec<ChartRow>,
    pub alert_chart: Vec<ChartRow>,
    pub table: Vec<GroupedAlert>,
}

/// Incident timeline pipeline
#[derive(Debug, Clone)]
pub struct TimelinePipeline {
    config: TimelineConfig,
    consolidator: SampleConsolidator,
    deriver: LifecycleDeriver,
    segmenter: ChartSegmenter,
}

impl Default for TimelinePipeline {
    fn default() -> Self {
        Self::new(TimelineConfig::default())
    }
}

impl TimelinePipeline {
    /// Create a pipeline
    pub fn new(config: TimelineConfig) -> Self {
        Self {
            consolidator: SampleConsolidator::new(&config),
            deriver: LifecycleDeriver::new(&config),
            segmenter: ChartSegmenter::new(&config),
            config,
        }
    }

    /// Get configuration
    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// Visible window ending at `now`
    pub fn window(&self, now: DateTime<Utc>) -> TimeWindow {
        self.deriver.window(now)
    }

    /// Raw incident series to processed incident intervals
    #[instrument(skip_all, fields(series = raw.len(), now = %now))]
    pub fn process_incidents(&self, raw: Vec<RawSeries>, now: DateTime<Utc>) -> Vec<Incident> {
        let records: Vec<IncidentSeries> = raw.into_iter().map(IncidentSeries::from_raw).collect();
        let records = self.consolidator.drop_heartbeats(records);
        let merged = merge_records(records);
        let incidents = self.deriver.derive_incidents(&merged, now);

        info!(
            merged = merged.len(),
            incidents = incidents.len(),
            "Processed incidents"
        );
        incidents
    }

    /// Raw alert series to processed alert intervals.
    ///
    /// Alerts are tied to `incidents`; those without a match are dropped.
    #[instrument(skip_all, fields(series = raw.len(), incidents = incidents.len(), now = %now))]
    pub fn process_alerts(
        &self,
        raw: Vec<RawSeries>,
        incidents: &[Incident],
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        let records: Vec<AlertSeries> = raw.into_iter().map(AlertSeries::from_raw).collect();
        let records = self.consolidator.drop_heartbeats(records);
        let merged = merge_records(records);
        let alerts = self.deriver.derive_alerts(&merged, incidents, now);

        info!(
            merged = merged.len(),
            alerts = alerts.len(),
            "Processed alerts"
        );
        alerts
    }

    /// One chart row per incident group
    pub fn incident_chart(&self, incidents: &[Incident], now: DateTime<Utc>) -> Vec<ChartRow> {
        self.segmenter.incident_rows(incidents, &self.window(now))
    }

    /// One chart row per alert
    pub fn alert_chart(&self, alerts: &[Alert], now: DateTime<Utc>) -> Vec<ChartRow> {
        self.segmenter.alert_rows(alerts, &self.window(now))
    }

    /// Alerts grouped by component
    pub fn alert_table(&self, alerts: &[Alert]) -> Vec<GroupedAlert> {
        group_alerts_for_table(alerts)
    }

    /// Run a whole refresh cycle
    #[instrument(skip_all, fields(now = %now))]
    pub fn run(
        &self,
        incident_series: Vec<RawSeries>,
        alert_series: Vec<RawSeries>,
        now: DateTime<Utc>,
    ) -> TimelineSnapshot {
        let incidents = self.process_incidents(incident_series, now);
        let alerts = self.process_alerts(alert_series, &incidents, now);

        TimelineSnapshot {
            now,
            window: self.window(now),
            incident_chart: self.incident_chart(&incidents, now),
            alert_chart: self.alert_chart(&alerts, now),
            table: self.alert_table(&alerts),
            incidents,
            alerts,
        }
    }
}
