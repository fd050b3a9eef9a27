use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::core::{AlertPriority, AlertType};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub thresholds: StockThresholds,
    pub misplacement: MisplacementConfig,
    pub query: QueryConfig,
    pub pipeline: PipelineConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    /// How long a storage call waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    pub shelves_csv: Option<String>,
    pub inventory_csv: Option<String>,
    pub staff_csv: Option<String>,
}

/// Empty-space breakpoints mapping a detection report to a stock-level alert.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StockThresholds {
    pub tiers: Vec<StockTier>,
    /// Resolve a shelf's active stock alerts when a report falls below every tier.
    pub auto_resolve: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StockTier {
    /// Minimum empty-space percentage (inclusive) for this tier to apply.
    pub min_empty: f64,
    pub alert_type: AlertType,
    pub priority: AlertPriority,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MisplacementConfig {
    pub default_priority: AlertPriority,
    /// Product name (case-insensitive) → priority for misplaced-item alerts.
    pub priority_overrides: HashMap<String, AlertPriority>,
    /// Items reported below this confidence produce a warning.
    pub min_item_confidence: f64,
    /// Priority of the per-shelf alert listing expected products that were not detected.
    pub missing_items_priority: AlertPriority,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QueryConfig {
    pub default_limit: usize,
    pub max_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_in_flight: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub min_priority: AlertPriority,
    pub cooldown_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/shelfwatch.db".into(),
            busy_timeout_ms: 5_000,
            shelves_csv: Some("data/shelves.csv".into()),
            inventory_csv: Some("data/inventory.csv".into()),
            staff_csv: Some("data/staff.csv".into()),
        }
    }
}

impl Default for StockThresholds {
    fn default() -> Self {
        Self {
            tiers: vec![
                StockTier {
                    min_empty: 90.0,
                    alert_type: AlertType::OutOfStock,
                    priority: AlertPriority::Critical,
                },
                StockTier {
                    min_empty: 70.0,
                    alert_type: AlertType::CriticalStock,
                    priority: AlertPriority::High,
                },
                StockTier {
                    min_empty: 40.0,
                    alert_type: AlertType::MediumStock,
                    priority: AlertPriority::Medium,
                },
            ],
            auto_resolve: true,
        }
    }
}

impl StockThresholds {
    /// Tiers ordered from the highest breakpoint down, so the first match wins.
    pub fn ordered(&self) -> Vec<StockTier> {
        let mut tiers = self.tiers.clone();
        tiers.sort_by(|a, b| b.min_empty.total_cmp(&a.min_empty));
        tiers
    }

    /// True when `empty_percentage` is below every tier's breakpoint.
    pub fn is_healthy(&self, empty_percentage: f64) -> bool {
        self.tiers.iter().all(|t| empty_percentage < t.min_empty)
    }
}

impl Default for MisplacementConfig {
    fn default() -> Self {
        Self {
            default_priority: AlertPriority::Medium,
            priority_overrides: HashMap::new(),
            min_item_confidence: 0.5,
            missing_items_priority: AlertPriority::Low,
        }
    }
}

impl MisplacementConfig {
    pub fn priority_for(&self, product: &str) -> AlertPriority {
        self.priority_overrides
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(product))
            .map(|(_, priority)| *priority)
            .unwrap_or(self.default_priority)
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: 500,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { max_in_flight: 8 }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_priority: AlertPriority::High,
            cooldown_seconds: 30,
        }
    }
}

impl Config {
    /// Load config from a TOML file. Falls back to defaults if file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("Config file {} not found, using defaults", path.display());
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Config loaded from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", path.display());
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tiers_match_documented_breakpoints() {
        let tiers = StockThresholds::default().ordered();
        assert_eq!(tiers.len(), 3);
        assert_eq!(tiers[0].alert_type, AlertType::OutOfStock);
        assert_eq!(tiers[0].priority, AlertPriority::Critical);
        assert_eq!(tiers[2].min_empty, 40.0);
    }

    #[test]
    fn healthy_means_below_every_tier() {
        let thresholds = StockThresholds::default();
        assert!(thresholds.is_healthy(39.9));
        assert!(!thresholds.is_healthy(40.0));
        assert!(!thresholds.is_healthy(95.0));
        assert!(thresholds.auto_resolve);
    }

    #[test]
    fn ordered_sorts_descending() {
        let thresholds = StockThresholds {
            tiers: vec![
                StockTier { min_empty: 25.0, alert_type: AlertType::LowStock, priority: AlertPriority::Low },
                StockTier { min_empty: 95.0, alert_type: AlertType::OutOfStock, priority: AlertPriority::Critical },
                StockTier { min_empty: 60.0, alert_type: AlertType::HighStock, priority: AlertPriority::High },
            ],
            auto_resolve: true,
        };
        let mins: Vec<f64> = thresholds.ordered().iter().map(|t| t.min_empty).collect();
        assert_eq!(mins, vec![95.0, 60.0, 25.0]);
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [thresholds]
            tiers = [
                { min_empty = 80.0, alert_type = "out_of_stock", priority = "critical" },
                { min_empty = 30.0, alert_type = "low_stock", priority = "low" },
            ]

            [misplacement]
            default_priority = "low"
            priority_overrides = { "Milk" = "high" }

            [query]
            max_limit = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.thresholds.tiers.len(), 2);
        assert_eq!(config.thresholds.tiers[1].alert_type, AlertType::LowStock);
        assert_eq!(config.misplacement.priority_for("milk"), AlertPriority::High);
        assert_eq!(config.misplacement.priority_for("bread"), AlertPriority::Low);
        assert_eq!(config.misplacement.missing_items_priority, AlertPriority::Low);
        assert!(config.thresholds.auto_resolve);
        assert_eq!(config.query.max_limit, 50);
        assert_eq!(config.query.default_limit, 100);
        assert_eq!(config.database.busy_timeout_ms, 5_000);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = Config::load("/nonexistent/shelfwatch.toml");
        assert_eq!(config.query.max_limit, 500);
        assert!(config.notifications.enabled);
    }
}
