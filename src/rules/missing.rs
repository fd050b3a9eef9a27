use std::collections::HashSet;

use super::{Rule, RuleContext, RuleOutput};
use crate::config::MisplacementConfig;
use crate::core::{AlertPriority, AlertStatus, AlertType, DetectionReport, NewAlert};
use crate::error::EngineError;

/// Names listed in the message before it is cut short.
const LISTED: usize = 5;

/// One summary alert per report listing products the shelf should hold but
/// the report did not mention.
///
/// Skipped for empty detections (those are the stock rule's concern) and for
/// shelves with no configuration.
pub struct MissingItemsRule {
    priority: AlertPriority,
}

impl MissingItemsRule {
    pub fn new(config: &MisplacementConfig) -> Self {
        Self {
            priority: config.missing_items_priority,
        }
    }
}

impl Rule for MissingItemsRule {
    fn name(&self) -> &str {
        "missing_items"
    }

    fn evaluate(&self, report: &DetectionReport, ctx: &RuleContext<'_>) -> Result<RuleOutput, EngineError> {
        let Some(shelf) = ctx.shelf else {
            return Ok(RuleOutput::default());
        };
        if report.items.is_empty() {
            return Ok(RuleOutput::default());
        }

        let detected: HashSet<String> = report.items.iter().map(|i| i.name.to_lowercase()).collect();
        let mut missing: Vec<&str> = shelf
            .expected_locations
            .keys()
            .filter(|product| !detected.contains(product.as_str()))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            return Ok(RuleOutput::default());
        }
        missing.sort_unstable();

        let shelf_id = &report.shelf_id;
        let mut message = format!(
            "Expected items not detected on shelf {shelf_id}: {}",
            missing.iter().take(LISTED).copied().collect::<Vec<_>>().join(", ")
        );
        if missing.len() > LISTED {
            message.push_str(&format!(" (and {} more)", missing.len() - LISTED));
        }

        Ok(RuleOutput {
            candidates: vec![NewAlert {
                shelf_id: shelf_id.clone(),
                alert_type: AlertType::MisplacedItem,
                priority: self.priority,
                status: AlertStatus::Pending,
                title: format!("❌ MISSING ITEMS: Shelf {shelf_id}"),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogSnapshot, ShelfConfig};
    use crate::rules::tests::{item, report};

    fn evaluate(shelf: Option<&ShelfConfig>, items: Vec<crate::core::DetectedItem>) -> RuleOutput {
        let catalog = CatalogSnapshot::empty();
        let ctx = RuleContext { shelf, catalog: &catalog };
        MissingItemsRule::new(&MisplacementConfig::default())
            .evaluate(&report("A1", 20.0, items), &ctx)
            .unwrap()
    }

    #[test]
    fn lists_expected_products_not_detected() {
        let shelf = ShelfConfig::new("A1", 40)
            .with_product("Milk", "R1")
            .with_product("Eggs", "R2")
            .with_product("Butter", "R3");
        let out = evaluate(Some(&shelf), vec![item("MILK", Some("R1"))]);
        assert_eq!(out.candidates.len(), 1);
        let alert = &out.candidates[0];
        assert_eq!(alert.alert_type, AlertType::MisplacedItem);
        assert_eq!(alert.priority, AlertPriority::Low);
        assert!(alert.product.is_none());
        assert_eq!(alert.message, "Expected items not detected on shelf A1: butter, eggs");
    }

    #[test]
    fn long_lists_are_truncated() {
        let mut shelf = ShelfConfig::new("A1", 40);
        for (i, product) in ["a", "b", "c", "d", "e", "f", "g"].iter().enumerate() {
            shelf = shelf.with_product(product, format!("R{i}"));
        }
        let out = evaluate(Some(&shelf), vec![item("Soap", None)]);
        assert_eq!(
            out.candidates[0].message,
            "Expected items not detected on shelf A1: a, b, c, d, e (and 2 more)"
        );
    }

    #[test]
    fn nothing_when_all_present_or_nothing_detected() {
        let shelf = ShelfConfig::new("A1", 40).with_product("Milk", "R1");
        assert!(evaluate(Some(&shelf), vec![item("Milk", Some("R9"))]).candidates.is_empty());
        assert!(evaluate(Some(&shelf), vec![]).candidates.is_empty());
        assert!(evaluate(None, vec![item("Soap", None)]).candidates.is_empty());
    }
}
