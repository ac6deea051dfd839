//! Raw series as produced by the fetch layer, and their typed views.
//!
//! A [`RawSeries`] is a label set plus an unordered sample list. The typed
//! views [`IncidentSeries`] and [`AlertSeries`] pull out the labels the
//! pipeline understands and expose an identity key through
//! [`TimelineRecord`].

use crate::types::{Sample, Severity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

/// Prefix marking labels copied from the source alert of an incident
pub const SOURCE_LABEL_PREFIX: &str = "src_";

/// Strip `src_` from pass-through labels and add the interpreted source fields
pub(crate) fn source_labels(
    labels: &BTreeMap<String, String>,
    alertname: &str,
    namespace: &str,
    severity: &str,
) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = labels
        .iter()
        .filter_map(|(k, v)| {
            k.strip_prefix(SOURCE_LABEL_PREFIX)
                .map(|name| (name.to_string(), v.clone()))
        })
        .collect();
    out.insert("alertname".into(), alertname.to_string());
    out.insert("namespace".into(), namespace.to_string());
    out.insert("severity".into(), severity.to_string());
    out
}

/// One series from the metrics backend: `{ metric: {...}, values: [[ts, code], ...] }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSeries {
    /// Label set, including labels the pipeline does not interpret
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    /// Samples in arrival order, possibly duplicated
    #[serde(default)]
    pub values: Vec<Sample>,
}

impl RawSeries {
    /// Create a series from labels and samples
    pub fn new<K, V>(labels: impl IntoIterator<Item = (K, V)>, values: Vec<Sample>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            metric: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            values,
        }
    }

    /// Label value, empty when absent
    pub fn label(&self, name: &str) -> &str {
        self.metric.get(name).map(String::as_str).unwrap_or_default()
    }

    fn flag(&self, name: &str) -> bool {
        self.metric
            .get(name)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

/// A record that carries one identity's timeline.
///
/// Records with equal [`identity`](TimelineRecord::identity) describe the
/// same logical timeline and are merged by the pipeline.
pub trait TimelineRecord: Clone + Debug {
    /// Immutable discriminating fields
    type Key: Ord + Clone + Debug;

    /// Identity key of this record
    fn identity(&self) -> Self::Key;

    /// Alert name used for heartbeat filtering
    fn alert_name(&self) -> &str;

    /// Silenced flag, taken last-writer-wins on merge
    fn silenced(&self) -> bool;

    /// Samples in their current order
    fn samples(&self) -> &[Sample];

    /// Replace the sample list
    fn set_samples(&mut self, samples: Vec<Sample>);

    /// Fold non-timeseries data from a same-identity record that lost the
    /// last-writer-wins election. The default keeps nothing.
    fn absorb(&mut self, _other: &Self) {}

    /// Latest sample timestamp, if any
    fn last_timestamp(&self) -> Option<i64> {
        self.samples().iter().map(|s| s.timestamp).max()
    }

    /// Earliest sample timestamp, if any
    fn first_timestamp(&self) -> Option<i64> {
        self.samples().iter().map(|s| s.timestamp).min()
    }
}

/// Identity of an incident-level record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IncidentKey {
    pub group_id: String,
    pub src_alertname: String,
    pub src_namespace: String,
    pub src_severity: String,
}

/// Identity of an alert-level record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AlertKey {
    pub alertname: String,
    pub namespace: String,
    pub component: String,
    pub severity: String,
}

/// Incident-level series: one source alert's contribution to an incident group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentSeries {
    pub group_id: String,
    pub component: String,
    /// Every component seen for this identity across merged records
    pub component_list: BTreeSet<String>,
    pub layer: String,
    pub src_alertname: String,
    pub src_namespace: String,
    pub src_severity: String,
    pub silenced: bool,
    /// Labels outside the interpreted set, passed through untouched
    pub labels: BTreeMap<String, String>,
    pub values: Vec<Sample>,
}

impl IncidentSeries {
    /// Labels interpreted directly; everything else lands in `labels`
    const KNOWN_LABELS: &'static [&'static str] = &[
        "group_id",
        "component",
        "layer",
        "src_alertname",
        "src_namespace",
        "src_severity",
        "silenced",
    ];

    /// Build from a raw series
    pub fn from_raw(raw: RawSeries) -> Self {
        let component = raw.label("component").to_string();
        let component_list = if component.is_empty() {
            BTreeSet::new()
        } else {
            BTreeSet::from([component.clone()])
        };

        Self {
            group_id: raw.label("group_id").to_string(),
            layer: raw.label("layer").to_string(),
            src_alertname: raw.label("src_alertname").to_string(),
            src_namespace: raw.label("src_namespace").to_string(),
            src_severity: raw.label("src_severity").to_string(),
            silenced: raw.flag("silenced"),
            labels: raw
                .metric
                .iter()
                .filter(|(k, _)| !Self::KNOWN_LABELS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            component,
            component_list,
            values: raw.values,
        }
    }

    /// Source-alert labels with the `src_` prefix stripped.
    ///
    /// Includes the interpreted `src_*` fields as well as any pass-through
    /// labels carrying the prefix.
    pub fn source_labels(&self) -> BTreeMap<String, String> {
        source_labels(
            &self.labels,
            &self.src_alertname,
            &self.src_namespace,
            &self.src_severity,
        )
    }

    /// Severity of the source alert, if it parses
    pub fn severity(&self) -> Option<Severity> {
        Severity::from_code(&self.src_severity)
    }
}

impl TimelineRecord for IncidentSeries {
    type Key = IncidentKey;

    fn identity(&self) -> IncidentKey {
        IncidentKey {
            group_id: self.group_id.clone(),
            src_alertname: self.src_alertname.clone(),
            src_namespace: self.src_namespace.clone(),
            src_severity: self.src_severity.clone(),
        }
    }

    fn alert_name(&self) -> &str {
        &self.src_alertname
    }

    fn silenced(&self) -> bool {
        self.silenced
    }

    fn samples(&self) -> &[Sample] {
        &self.values
    }

    fn set_samples(&mut self, samples: Vec<Sample>) {
        self.values = samples;
    }

    fn absorb(&mut self, other: &Self) {
        self.component_list
            .extend(other.component_list.iter().cloned());
        for (k, v) in &other.labels {
            self.labels.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
}

/// Alert-level series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSeries {
    pub alertname: String,
    pub namespace: String,
    pub severity: String,
    pub component: String,
    pub layer: String,
    pub silenced: bool,
    pub values: Vec<Sample>,
}

impl AlertSeries {
    /// Build from a raw series
    pub fn from_raw(raw: RawSeries) -> Self {
        Self {
            alertname: raw.label("alertname").to_string(),
            namespace: raw.label("namespace").to_string(),
            severity: raw.label("severity").to_string(),
            component: raw.label("component").to_string(),
            layer: raw.label("layer").to_string(),
            silenced: raw.flag("silenced"),
            values: raw.values,
        }
    }
}

impl TimelineRecord for AlertSeries {
    type Key = AlertKey;

    fn identity(&self) -> AlertKey {
        AlertKey {
            alertname: self.alertname.clone(),
            namespace: self.namespace.clone(),
            component: self.component.clone(),
            severity: self.severity.clone(),
        }
    }

    fn alert_name(&self) -> &str {
        &self.alertname
    }

    fn silenced(&self) -> bool {
        self.silenced
    }

    fn samples(&self) -> &[Sample] {
        &self.values
    }

    fn set_samples(&mut self, samples: Vec<Sample>) {
        self.values = samples;
    }
}
