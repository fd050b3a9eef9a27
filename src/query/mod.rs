use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{Alert, AlertPriority, AlertStatus, AlertType};

/// Filter parameters for listing alerts. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertFilter {
    pub status: Option<AlertStatus>,
    /// Excludes one status; the dashboard uses this to hide resolved alerts.
    pub exclude_status: Option<AlertStatus>,
    pub priority: Option<AlertPriority>,
    pub alert_type: Option<AlertType>,
    pub shelf_id: Option<String>,
    pub assigned_staff: Option<String>,
}

impl AlertFilter {
    /// The per-staff dashboard: assigned to `staff_id` and not yet resolved.
    pub fn dashboard(staff_id: &str) -> Self {
        Self {
            assigned_staff: Some(staff_id.to_string()),
            exclude_status: Some(AlertStatus::Resolved),
            ..Default::default()
        }
    }
}

/// Requested page. `limit: None` means the configured default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: Option<usize>,
    pub offset: usize,
}

/// One page of matching alerts, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPage {
    pub alerts: Vec<Alert>,
    pub total_matching: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Dashboard order: most urgent priority first, oldest first within a tier.
pub fn sort_for_dashboard(alerts: &mut [Alert]) {
    alerts.sort_by(|a, b| {
        a.priority
            .rank()
            .cmp(&b.priority.rank())
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub active: usize,
    pub acknowledged: usize,
    pub resolved: usize,
    pub total: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: AlertStatus, count: usize) {
        match status {
            AlertStatus::Pending => self.pending += count,
            AlertStatus::Active => self.active += count,
            AlertStatus::Acknowledged => self.acknowledged += count,
            AlertStatus::Resolved => self.resolved += count,
        }
        self.total += count;
    }
}

/// Point-in-time counts over the whole alert store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertStatistics {
    pub total: usize,
    pub by_status: StatusCounts,
    pub by_priority: BTreeMap<AlertPriority, usize>,
    pub by_type: BTreeMap<AlertType, usize>,
    pub by_shelf: BTreeMap<String, StatusCounts>,
}

impl AlertStatistics {
    /// Fold one grouped row (shelf, type, priority, status, count) into the totals.
    pub fn record(
        &mut self,
        shelf_id: &str,
        alert_type: AlertType,
        priority: AlertPriority,
        status: AlertStatus,
        count: usize,
    ) {
        self.total += count;
        self.by_status.add(status, count);
        *self.by_priority.entry(priority).or_default() += count;
        *self.by_type.entry(alert_type).or_default() += count;
        self.by_shelf.entry(shelf_id.to_string()).or_default().add(status, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn make_alert(id: i64, priority: AlertPriority, status: AlertStatus, staff: Option<&str>) -> Alert {
        let created = Utc::now() - Duration::minutes(100 - id);
        Alert {
            id,
            shelf_id: if id % 2 == 0 { "A1".into() } else { "B2".into() },
            alert_type: AlertType::OutOfStock,
            priority,
            status,
            title: "t".into(),
            message: "m".into(),
            product: None,
            correct_location: None,
            empty_percentage: None,
            assigned_staff: staff.map(Into::into),
            created_by: "system".into(),
            created_at: created,
            updated_at: created,
            acknowledged_at: None,
            resolved_at: None,
        }
    }

    #[test]
    fn dashboard_filter_hides_resolved_for_one_staff_member() {
        let f = AlertFilter::dashboard("EMP001");
        assert_eq!(f.assigned_staff.as_deref(), Some("EMP001"));
        assert_eq!(f.exclude_status, Some(AlertStatus::Resolved));
        assert!(f.status.is_none() && f.priority.is_none() && f.shelf_id.is_none());
    }

    #[test]
    fn dashboard_order_priority_then_oldest() {
        let mut alerts = vec![
            make_alert(5, AlertPriority::Low, AlertStatus::Active, None),
            make_alert(4, AlertPriority::Critical, AlertStatus::Active, None),
            make_alert(3, AlertPriority::Medium, AlertStatus::Active, None),
            make_alert(2, AlertPriority::Critical, AlertStatus::Active, None),
        ];
        sort_for_dashboard(&mut alerts);
        let ids: Vec<i64> = alerts.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![2, 4, 3, 5]);
    }

    fn fold(alerts: &[Alert]) -> AlertStatistics {
        let mut stats = AlertStatistics::default();
        for a in alerts {
            stats.record(&a.shelf_id, a.alert_type, a.priority, a.status, 1);
        }
        stats
    }

    #[test]
    fn statistics_record_grouped_rows() {
        let mut stats = AlertStatistics::default();
        stats.record("A1", AlertType::OutOfStock, AlertPriority::Critical, AlertStatus::Active, 3);
        stats.record("A1", AlertType::MisplacedItem, AlertPriority::Medium, AlertStatus::Resolved, 2);
        stats.record("B2", AlertType::OutOfStock, AlertPriority::Critical, AlertStatus::Acknowledged, 1);
        assert_eq!(stats.total, 6);
        assert_eq!(stats.by_status.active, 3);
        assert_eq!(stats.by_status.resolved, 2);
        assert_eq!(stats.by_priority[&AlertPriority::Critical], 4);
        assert_eq!(stats.by_type[&AlertType::OutOfStock], 4);
        assert_eq!(stats.by_shelf["A1"].total, 5);
        assert_eq!(stats.by_shelf["B2"].acknowledged, 1);
    }

    #[test]
    fn statistics_serialize_with_string_keys() {
        let stats = fold(&[make_alert(1, AlertPriority::High, AlertStatus::Active, None)]);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["by_priority"]["high"], 1);
        assert_eq!(json["by_shelf"]["B2"]["active"], 1);
    }
}
