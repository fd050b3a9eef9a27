pub mod history;
pub mod pipeline;
pub mod validate;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type AlertId = i64;

/// What a shelf alert is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    LowStock,
    MediumStock,
    HighStock,
    CriticalStock,
    OutOfStock,
    MisplacedItem,
}

impl AlertType {
    pub const ALL: [AlertType; 6] = [
        AlertType::LowStock,
        AlertType::MediumStock,
        AlertType::HighStock,
        AlertType::CriticalStock,
        AlertType::OutOfStock,
        AlertType::MisplacedItem,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::LowStock => "low_stock",
            AlertType::MediumStock => "medium_stock",
            AlertType::HighStock => "high_stock",
            AlertType::CriticalStock => "critical_stock",
            AlertType::OutOfStock => "out_of_stock",
            AlertType::MisplacedItem => "misplaced_item",
        }
    }

    /// Stock-level types are deduplicated per shelf; misplacement is not.
    pub fn is_stock_level(self) -> bool {
        !matches!(self, AlertType::MisplacedItem)
    }

    pub fn label(self) -> &'static str {
        match self {
            AlertType::LowStock => "LOW STOCK",
            AlertType::MediumStock => "MEDIUM STOCK",
            AlertType::HighStock => "HIGH STOCK",
            AlertType::CriticalStock => "CRITICAL STOCK",
            AlertType::OutOfStock => "OUT OF STOCK",
            AlertType::MisplacedItem => "MISPLACED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl AlertPriority {
    pub const ALL: [AlertPriority; 4] = [
        AlertPriority::Critical,
        AlertPriority::High,
        AlertPriority::Medium,
        AlertPriority::Low,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AlertPriority::Critical => "critical",
            AlertPriority::High => "high",
            AlertPriority::Medium => "medium",
            AlertPriority::Low => "low",
        }
    }

    /// 0 is most urgent.
    pub fn rank(self) -> u8 {
        match self {
            AlertPriority::Critical => 0,
            AlertPriority::High => 1,
            AlertPriority::Medium => 2,
            AlertPriority::Low => 3,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            AlertPriority::Critical => "🚨",
            AlertPriority::High => "🔴",
            AlertPriority::Medium => "🟡",
            AlertPriority::Low => "🟢",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    /// Candidate built during batch generation, never persisted.
    Pending,
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub const ALL: [AlertStatus; 4] = [
        AlertStatus::Pending,
        AlertStatus::Active,
        AlertStatus::Acknowledged,
        AlertStatus::Resolved,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Pending => "pending",
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }

    /// Status after applying `transition`, or `None` if it is illegal from here.
    pub fn apply(self, transition: Transition) -> Option<AlertStatus> {
        match (self, transition) {
            (AlertStatus::Active, Transition::Acknowledge) => Some(AlertStatus::Acknowledged),
            (AlertStatus::Active | AlertStatus::Acknowledged, Transition::Resolve) => {
                Some(AlertStatus::Resolved)
            }
            (AlertStatus::Active | AlertStatus::Acknowledged, Transition::Assign) => Some(self),
            _ => None,
        }
    }
}

/// A state-machine operation requested on an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Acknowledge,
    Resolve,
    Assign,
}

impl Transition {
    pub fn as_str(self) -> &'static str {
        match self {
            Transition::Acknowledge => "acknowledge",
            Transition::Resolve => "resolve",
            Transition::Assign => "assign",
        }
    }

    pub fn history_action(self) -> HistoryAction {
        match self {
            Transition::Acknowledge => HistoryAction::Acknowledged,
            Transition::Resolve => HistoryAction::Resolved,
            Transition::Assign => HistoryAction::Assigned,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Acknowledged,
    Resolved,
    Assigned,
    Note,
}

impl HistoryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::Acknowledged => "acknowledged",
            HistoryAction::Resolved => "resolved",
            HistoryAction::Assigned => "assigned",
            HistoryAction::Note => "note",
        }
    }
}

macro_rules! impl_text_enum {
    ($($ty:ident),* $(,)?) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }

            impl FromStr for $ty {
                type Err = String;

                /// Case-insensitive; `-` and `_` are interchangeable.
                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
                    Self::variants()
                        .iter()
                        .copied()
                        .find(|v| v.as_str() == wanted)
                        .ok_or_else(|| format!("unknown {}: {s}", stringify!($ty)))
                }
            }
        )*
    };
}

impl AlertType {
    fn variants() -> &'static [Self] {
        &Self::ALL
    }
}

impl AlertPriority {
    fn variants() -> &'static [Self] {
        &Self::ALL
    }
}

impl AlertStatus {
    fn variants() -> &'static [Self] {
        &Self::ALL
    }
}

impl Transition {
    fn variants() -> &'static [Self] {
        &[Transition::Acknowledge, Transition::Resolve, Transition::Assign]
    }
}

impl HistoryAction {
    fn variants() -> &'static [Self] {
        &[
            HistoryAction::Created,
            HistoryAction::Acknowledged,
            HistoryAction::Resolved,
            HistoryAction::Assigned,
            HistoryAction::Note,
        ]
    }
}

impl_text_enum!(AlertType, AlertPriority, AlertStatus, Transition, HistoryAction);

/// One item the vision model saw on the shelf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedItem {
    pub name: String,
    pub quantity: u32,
    /// Where on the shelf the item was seen (rack/slot), if reported.
    pub location: Option<String>,
    pub confidence: Option<f64>,
}

/// A validated detection report for one shelf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub shelf_id: String,
    pub empty_percentage: f64, // 0-100
    pub items: Vec<DetectedItem>,
    pub timestamp: DateTime<Utc>,
}

/// A persisted alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub shelf_id: String,
    pub alert_type: AlertType,
    pub priority: AlertPriority,
    pub status: AlertStatus,
    pub title: String,
    pub message: String,
    /// Product a misplacement alert is about.
    pub product: Option<String>,
    /// Where a misplaced product belongs, when the catalog knows.
    pub correct_location: Option<String>,
    pub empty_percentage: Option<f64>,
    /// Weak reference into the external staff directory.
    pub assigned_staff: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// An alert candidate produced by the rule engine, not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub shelf_id: String,
    pub alert_type: AlertType,
    pub priority: AlertPriority,
    pub status: AlertStatus,
    pub title: String,
    pub message: String,
    pub product: Option<String>,
    pub correct_location: Option<String>,
    pub empty_percentage: Option<f64>,
    pub assigned_staff: Option<String>,
}

/// One immutable row of an alert's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertHistoryEntry {
    pub id: i64,
    pub alert_id: AlertId,
    pub action: HistoryAction,
    pub actor: String,
    pub note: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Result of ingesting one detection report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub created: Vec<Alert>,
    /// Stock alerts closed because the report showed the shelf healthy again.
    #[serde(default)]
    pub resolved: Vec<Alert>,
    pub warnings: Vec<String>,
}

impl IngestOutcome {
    pub fn created_count(&self) -> usize {
        self.created.len()
    }
}
