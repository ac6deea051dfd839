//! Table aggregation: alerts grouped by component with a rolled-up state.

use incident_timeline_core::{
    records::{Alert, AlertState, GroupedAlert},
    types::Severity,
};
use tracing::debug;

/// Roll up a component's state.
///
/// All silenced → silenced; otherwise any unresolved alert → firing, even
/// a silenced one; otherwise resolved. An empty group counts as resolved.
pub fn aggregate_state(alerts: &[Alert]) -> AlertState {
    if !alerts.is_empty() && alerts.iter().all(|a| a.silenced) {
        AlertState::Silenced
    } else if alerts.iter().any(|a| !a.resolved) {
        AlertState::Firing
    } else {
        AlertState::Resolved
    }
}

/// Group alerts by component for the alerts table.
///
/// Rows keep the order in which each component first appears; alerts keep
/// their incoming order inside a row.
pub fn group_alerts_for_table(alerts: &[Alert]) -> Vec<GroupedAlert> {
    let mut rows: Vec<GroupedAlert> = Vec::new();

    for alert in alerts {
        let position = match rows.iter().position(|r| r.component == alert.component) {
            Some(position) => position,
            None => {
                rows.push(GroupedAlert {
                    component: alert.component.clone(),
                    alertstate: AlertState::Resolved,
                    critical: 0,
                    warning: 0,
                    info: 0,
                    alerts_expanded_row_data: Vec::new(),
                });
                rows.len() - 1
            }
        };

        let row = &mut rows[position];
        match alert.severity_rank() {
            Some(Severity::Critical) => row.critical += 1,
            Some(Severity::Warning) => row.warning += 1,
            Some(Severity::Info) => row.info += 1,
            None => {}
        }
        row.alerts_expanded_row_data.push(alert.clone());
    }

    for row in &mut rows {
        row.alertstate = aggregate_state(&row.alerts_expanded_row_data);
    }

    debug!(
        alerts = alerts.len(),
        components = rows.len(),
        "Grouped alerts for table"
    );
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(component: &str, severity: &str, silenced: bool, resolved: bool) -> Alert {
        Alert {
            alertname: "X".into(),
            namespace: "ns".into(),
            severity: severity.into(),
            component: component.into(),
            layer: "core".into(),
            values: Vec::new(),
            alerts_start_firing: 0,
            alerts_end_firing: 0,
            resolved,
            silenced,
            x: 1,
        }
    }

    #[test]
    fn test_all_silenced_is_silenced() {
        let alerts = vec![alert("a", "critical", true, false), alert("a", "info", true, true)];
        assert_eq!(aggregate_state(&alerts), AlertState::Silenced);
    }

    #[test]
    fn test_any_firing_is_firing() {
        let alerts = vec![
            alert("a", "critical", true, false),
            alert("a", "warning", false, false),
            alert("a", "info", false, true),
        ];
        assert_eq!(aggregate_state(&alerts), AlertState::Firing);
    }

    #[test]
    fn test_unresolved_silenced_alert_keeps_group_firing() {
        let alerts = vec![alert("a", "critical", true, false), alert("a", "info", false, true)];
        assert_eq!(aggregate_state(&alerts), AlertState::Firing);
    }

    #[test]
    fn test_all_resolved_is_resolved() {
        let alerts = vec![alert("a", "critical", true, true), alert("a", "info", false, true)];
        assert_eq!(aggregate_state(&alerts), AlertState::Resolved);
    }

    #[test]
    fn test_empty_is_resolved() {
        assert_eq!(aggregate_state(&[]), AlertState::Resolved);
    }

    #[test]
    fn test_grouping_counts_and_order() {
        let rows = group_alerts_for_table(&[
            alert("storage", "critical", false, false),
            alert("network", "warning", false, true),
            alert("storage", "info", false, true),
            alert("storage", "critical", false, true),
        ]);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].component, "storage");
        assert_eq!((rows[0].critical, rows[0].warning, rows[0].info), (2, 0, 1));
        assert_eq!(rows[0].alertstate, AlertState::Firing);
        assert_eq!(rows[0].alerts_expanded_row_data.len(), 3);

        assert_eq!(rows[1].component, "network");
        assert_eq!(rows[1].warning, 1);
        assert_eq!(rows[1].alertstate, AlertState::Resolved);
    }

    #[test]
    fn test_unknown_severity_is_not_counted() {
        let rows = group_alerts_for_table(&[alert("a", "page", false, false)]);
        assert_eq!((rows[0].critical, rows[0].warning, rows[0].info), (0, 0, 0));
        assert_eq!(rows[0].alerts_expanded_row_data.len(), 1);
    }
}
