//! Finalized records handed to renderers.
//!
//! Every value here is rebuilt from raw input on each refresh and never
//! mutated incrementally afterwards.

use crate::series::source_labels;
use crate::types::{Sample, Severity};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Closed viewport `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// `[now - days, now]`
    pub fn last_days(now: DateTime<Utc>, days: u32) -> Self {
        Self {
            start: now - Duration::days(i64::from(days)),
            end: now,
        }
    }

    /// Whether a sample timestamp (epoch seconds) falls inside the window
    pub fn contains_secs(&self, timestamp: i64) -> bool {
        let ms = timestamp.saturating_mul(1000);
        ms >= self.start.timestamp_millis() && ms <= self.end.timestamp_millis()
    }
}

/// A processed incident interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub group_id: String,
    pub component: String,
    #[serde(rename = "componentList")]
    pub component_list: BTreeSet<String>,
    pub layer: String,
    pub src_alertname: String,
    pub src_namespace: String,
    pub src_severity: String,
    pub silenced: bool,
    /// Extra labels carried through from the backend
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Window-clipped samples of this interval
    pub values: Vec<Sample>,
    /// Absolute first sample of the identity minus the padding offset (epoch seconds)
    #[serde(rename = "firstTimestamp")]
    pub first_timestamp: i64,
    pub resolved: bool,
    pub x: usize,
}

impl Incident {
    /// Earliest sample of this interval
    pub fn start(&self) -> Option<i64> {
        self.values.first().map(|s| s.timestamp)
    }

    /// Source-alert labels with the `src_` prefix stripped
    pub fn source_labels(&self) -> BTreeMap<String, String> {
        source_labels(
            &self.labels,
            &self.src_alertname,
            &self.src_namespace,
            &self.src_severity,
        )
    }
}

/// Per-alert lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Firing,
    Resolved,
    Silenced,
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Firing => write!(f, "firing"),
            Self::Resolved => write!(f, "resolved"),
            Self::Silenced => write!(f, "silenced"),
        }
    }
}

/// A processed alert interval, tied to exactly one incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alertname: String,
    pub namespace: String,
    pub severity: String,
    pub component: String,
    pub layer: String,
    /// Window-clipped samples, including padding points
    pub values: Vec<Sample>,
    /// First padded sample (epoch seconds)
    #[serde(rename = "alertsStartFiring")]
    pub alerts_start_firing: i64,
    /// Last real sample (epoch seconds)
    #[serde(rename = "alertsEndFiring")]
    pub alerts_end_firing: i64,
    pub resolved: bool,
    pub silenced: bool,
    pub x: usize,
}

impl Alert {
    /// Silenced wins over firing/resolved
    pub fn state(&self) -> AlertState {
        if self.silenced {
            AlertState::Silenced
        } else if self.resolved {
            AlertState::Resolved
        } else {
            AlertState::Firing
        }
    }

    /// Parsed severity label
    pub fn severity_rank(&self) -> Option<Severity> {
        Severity::from_code(&self.severity)
    }
}

/// Table row: all alerts of one component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedAlert {
    pub component: String,
    pub alertstate: AlertState,
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
    #[serde(rename = "alertsExpandedRowData")]
    pub alerts_expanded_row_data: Vec<Alert>,
}

/// Colour slot a renderer should use for a span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillKey {
    Critical,
    Warning,
    Info,
    /// Code with no severity rank
    Neutral,
    Nodata,
}

impl From<Option<Severity>> for FillKey {
    fn from(severity: Option<Severity>) -> Self {
        match severity {
            Some(Severity::Critical) => Self::Critical,
            Some(Severity::Warning) => Self::Warning,
            Some(Severity::Info) => Self::Info,
            None => Self::Neutral,
        }
    }
}

/// One renderable bar segment `[y0, y]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpan {
    pub y0: DateTime<Utc>,
    pub y: DateTime<Utc>,
    pub severity: Option<Severity>,
    pub nodata: bool,
    pub fill: FillKey,
    /// Group id or alert name the span belongs to
    pub name: String,
}

/// All spans for one chart row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRow {
    pub name: String,
    pub x: usize,
    #[serde(rename = "componentList")]
    pub component_list: BTreeSet<String>,
    pub spans: Vec<ChartSpan>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn alert(silenced: bool, resolved: bool) -> Alert {
        Alert {
            alertname: "X".into(),
            namespace: "ns".into(),
            severity: "critical".into(),
            component: "etcd".into(),
            layer: "core".into(),
            values: vec![],
            alerts_start_firing: 0,
            alerts_end_firing: 0,
            resolved,
            silenced,
            x: 1,
        }
    }

    #[test]
    fn test_alert_state_precedence() {
        assert_eq!(alert(true, false).state(), AlertState::Silenced);
        assert_eq!(alert(true, true).state(), AlertState::Silenced);
        assert_eq!(alert(false, true).state(), AlertState::Resolved);
        assert_eq!(alert(false, false).state(), AlertState::Firing);
    }

    #[test]
    fn test_window_contains_is_inclusive() {
        let now = Utc.timestamp_opt(100_000, 0).unwrap();
        let window = TimeWindow::last_days(now, 1);

        assert!(window.contains_secs(100_000));
        assert!(window.contains_secs(100_000 - 86_400));
        assert!(!window.contains_secs(100_000 - 86_401));
        assert!(!window.contains_secs(100_001));
        assert!(!window.contains_secs(i64::MAX));
        assert!(!window.contains_secs(i64::MIN));
    }

    #[test]
    fn test_fill_key_from_severity() {
        assert_eq!(FillKey::from(Some(Severity::Warning)), FillKey::Warning);
        assert_eq!(FillKey::from(None), FillKey::Neutral);
    }

    #[test]
    fn test_grouped_alert_serializes_expected_names() {
        let row = GroupedAlert {
            component: "etcd".into(),
            alertstate: AlertState::Firing,
            critical: 1,
            warning: 0,
            info: 0,
            alerts_expanded_row_data: vec![alert(false, false)],
        };
        let json = serde_json::to_value(&row).unwrap();

        assert_eq!(json["alertstate"], "firing");
        assert!(json["alertsExpandedRowData"].is_array());
        assert!(json["alertsExpandedRowData"][0]["alertsStartFiring"].is_number());
    }
}
