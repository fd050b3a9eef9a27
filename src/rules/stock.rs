use super::{Rule, RuleContext, RuleOutput};
use crate::config::{StockThresholds, StockTier};
use crate::core::{AlertStatus, AlertType, DetectionReport, NewAlert};
use crate::error::EngineError;

/// Maps empty-space percentage to at most one stock-level alert.
pub struct StockLevelRule {
    tiers: Vec<StockTier>,
}

impl StockLevelRule {
    pub fn new(thresholds: &StockThresholds) -> Self {
        Self {
            tiers: thresholds.ordered(),
        }
    }

    /// The highest tier whose breakpoint the percentage reaches.
    pub fn classify(&self, empty_percentage: f64) -> Option<&StockTier> {
        self.tiers.iter().find(|t| empty_percentage >= t.min_empty)
    }
}

impl Rule for StockLevelRule {
    fn name(&self) -> &str {
        "stock_level"
    }

    fn evaluate(&self, report: &DetectionReport, _ctx: &RuleContext<'_>) -> Result<RuleOutput, EngineError> {
        let Some(tier) = self.classify(report.empty_percentage) else {
            return Ok(RuleOutput::default());
        };

        let shelf = &report.shelf_id;
        let fill = 100.0 - report.empty_percentage;
        let title = format!("{} {}: Shelf {shelf}", tier.priority.emoji(), tier.alert_type.label());
        let message = if tier.alert_type == AlertType::OutOfStock {
            format!(
                "URGENT: Shelf {shelf} is {:.1}% empty. Immediate restocking required!",
                report.empty_percentage
            )
        } else {
            format!(
                "Shelf {shelf} has {} stock levels. Current fill: {fill:.1}%",
                tier.priority
            )
        };

        Ok(RuleOutput {
            candidates: vec![NewAlert {
                shelf_id: shelf.clone(),
                alert_type: tier.alert_type,
                priority: tier.priority,
                status: AlertStatus::Pending,
                title,
                message,
                product: None,
                correct_location: None,
                empty_percentage: Some(report.empty_percentage),
                assigned_staff: None,
            }],
            warnings: Vec::new(),
        })
    }
}
