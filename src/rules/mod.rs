pub mod misplaced;
pub mod missing;
pub mod stock;

use tracing::debug;

use crate::catalog::{ShelfCatalog, ShelfConfig};
use crate::config::{Config, StockThresholds};
use crate::core::{Alert, AlertStatus, AlertType, DetectionReport, NewAlert};
use crate::error::EngineError;

/// Everything a rule may consult besides the report itself.
pub struct RuleContext<'a> {
    /// `None` when the catalog has no record of the reported shelf.
    pub shelf: Option<&'a ShelfConfig>,
    pub catalog: &'a dyn ShelfCatalog,
}

/// Candidates and non-fatal anomalies produced by one or more rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleOutput {
    pub candidates: Vec<NewAlert>,
    pub warnings: Vec<String>,
}

impl RuleOutput {
    fn absorb(&mut self, other: RuleOutput) {
        self.candidates.extend(other.candidates);
        self.warnings.extend(other.warnings);
    }
}

/// A rule that turns a detection report into alert candidates.
pub trait Rule {
    fn name(&self) -> &str;
    fn evaluate(&self, report: &DetectionReport, ctx: &RuleContext<'_>) -> Result<RuleOutput, EngineError>;
}

/// Applies every rule to a report, then drops candidates that would duplicate
/// an alert that is still active on the shelf.
pub struct AlertRuleEngine {
    rules: Vec<Box<dyn Rule + Send + Sync>>,
    thresholds: StockThresholds,
}

impl AlertRuleEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            rules: vec![
                Box::new(stock::StockLevelRule::new(&config.thresholds)),
                Box::new(misplaced::MisplacementRule::new(&config.misplacement)),
                Box::new(missing::MissingItemsRule::new(&config.misplacement)),
            ],
            thresholds: config.thresholds.clone(),
        }
    }

    /// True when the report should close the shelf's active stock alerts.
    pub fn clears_stock_alerts(&self, report: &DetectionReport) -> bool {
        self.thresholds.auto_resolve && self.thresholds.is_healthy(report.empty_percentage)
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// `active` must be the shelf's current alerts in `active` status.
    pub fn evaluate(
        &self,
        report: &DetectionReport,
        ctx: &RuleContext<'_>,
        active: &[Alert],
    ) -> Result<RuleOutput, EngineError> {
        let mut output = RuleOutput::default();
        for rule in &self.rules {
            let produced = rule.evaluate(report, ctx)?;
            debug!(
                "Rule {} produced {} candidates for shelf {}",
                rule.name(),
                produced.candidates.len(),
                report.shelf_id
            );
            output.absorb(produced);
        }

        let assigned = ctx.shelf.and_then(|s| s.assigned_staff.clone());
        for candidate in &mut output.candidates {
            candidate.assigned_staff.clone_from(&assigned);
        }

        let (kept, suppressed) = deduplicate(output.candidates, active);
        output.candidates = kept;
        output.warnings.extend(suppressed);
        Ok(output)
    }
}

/// Drop candidates whose (shelf, type) already has an active alert.
///
/// Covers stock-level candidates and the per-shelf missing-items summary (a
/// misplaced-item candidate without a product). The existing alert is left
/// untouched. Per-product misplaced-item candidates always pass.
pub fn deduplicate(candidates: Vec<NewAlert>, active: &[Alert]) -> (Vec<NewAlert>, Vec<String>) {
    let mut kept = Vec::with_capacity(candidates.len());
    let mut warnings = Vec::new();
    for candidate in candidates {
        let summary = candidate.alert_type == AlertType::MisplacedItem && candidate.product.is_none();
        if !candidate.alert_type.is_stock_level() && !summary {
            kept.push(candidate);
            continue;
        }
        let existing = active.iter().find(|a| {
            a.status == AlertStatus::Active
                && a.shelf_id == candidate.shelf_id
                && a.alert_type == candidate.alert_type
                && (!summary || a.product.is_none())
        });
        match existing {
            Some(alert) => warnings.push(format!(
                "duplicate active alert suppressed: {} on shelf {} (alert #{})",
                candidate.alert_type, candidate.shelf_id, alert.id
            )),
            None => kept.push(candidate),
        }
    }
    (kept, warnings)
}
