use std::collections::HashSet;

use tracing::warn;

use super::{Rule, RuleContext, RuleOutput};
use crate::catalog::ProductLocation;
use crate::config::MisplacementConfig;
use crate::core::{AlertStatus, AlertType, DetectedItem, DetectionReport, NewAlert};
use crate::error::EngineError;

/// Flags detected items that are not where the shelf configuration expects them.
///
/// An item is misplaced when the shelf does not stock it at all, or when it
/// was seen at a location other than its configured one.
pub struct MisplacementRule {
    config: MisplacementConfig,
}

impl MisplacementRule {
    pub fn new(config: &MisplacementConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn candidate(
        &self,
        report: &DetectionReport,
        item: &DetectedItem,
        correct: Option<ProductLocation>,
    ) -> NewAlert {
        let shelf = &report.shelf_id;
        let seen_at = item.location.as_deref().unwrap_or("unknown location");
        let mut message = format!("Item '{}' found at {seen_at} on shelf {shelf}.", item.name);
        if let Some(ref correct) = correct {
            message.push_str(&format!(" Correct location: {correct}"));
        }
        NewAlert {
            shelf_id: shelf.clone(),
            alert_type: AlertType::MisplacedItem,
            priority: self.config.priority_for(&item.name),
            status: AlertStatus::Pending,
            title: format!("🔄 MISPLACED: {} on Shelf {shelf}", item.name),
            message,
            product: Some(item.name.clone()),
            correct_location: correct.map(|c| c.to_string()),
            empty_percentage: Some(report.empty_percentage),
            assigned_staff: None,
        }
    }
}

impl Rule for MisplacementRule {
    fn name(&self) -> &str {
        "misplacement"
    }

    fn evaluate(&self, report: &DetectionReport, ctx: &RuleContext<'_>) -> Result<RuleOutput, EngineError> {
        let mut output = RuleOutput::default();

        for item in &report.items {
            if let Some(confidence) = item.confidence
                && confidence < self.config.min_item_confidence
            {
                output.warnings.push(format!(
                    "low detection confidence ({confidence:.2}) for item '{}' on shelf {}",
                    item.name, report.shelf_id
                ));
            }
        }

        let Some(shelf) = ctx.shelf else {
            if !report.items.is_empty() {
                warn!("Shelf {} not found in catalog, skipping misplacement checks", report.shelf_id);
            }
            output.warnings.push(format!(
                "no configuration for shelf {}; misplacement checks skipped",
                report.shelf_id
            ));
            return Ok(output);
        };

        let mut seen = HashSet::new();
        for item in &report.items {
            let correct = match shelf.expected_location(&item.name) {
                Some(expected) => match item.location.as_deref() {
                    Some(actual) if !actual.eq_ignore_ascii_case(expected) => Some(ProductLocation {
                        shelf_id: shelf.shelf_id.clone(),
                        location: expected.to_string(),
                    }),
                    _ => continue,
                },
                None => ctx.catalog.locate_product(&item.name)?,
            };
            // one candidate per misplaced product, whichever occurrence came first
            if !seen.insert(item.name.to_lowercase()) {
                continue;
            }
            output.candidates.push(self.candidate(report, item, correct));
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogSnapshot, ShelfCatalog, ShelfConfig};
    use crate::core::AlertPriority;
    use crate::rules::tests::{item, report};
    use std::collections::HashMap;

    fn catalog() -> CatalogSnapshot {
        CatalogSnapshot::empty()
            .with_shelf(ShelfConfig::new("A1", 40).with_product("Milk", "R1").with_product("Eggs", "R2"))
            .with_shelf(ShelfConfig::new("B2", 20).with_product("Bread", "R3"))
    }

    fn run(rule: &MisplacementRule, items: Vec<DetectedItem>) -> RuleOutput {
        let catalog = catalog();
        let shelf = catalog.shelf_config("A1").unwrap().unwrap();
        let ctx = RuleContext { shelf: Some(&shelf), catalog: &catalog };
        rule.evaluate(&report("A1", 10.0, items), &ctx).unwrap()
    }

    #[test]
    fn items_in_place_raise_nothing() {
        let rule = MisplacementRule::new(&MisplacementConfig::default());
        let out = run(&rule, vec![item("Milk", Some("R1")), item("eggs", Some("r2")), item("Milk", None)]);
        assert!(out.candidates.is_empty());
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn wrong_location_on_own_shelf() {
        let rule = MisplacementRule::new(&MisplacementConfig::default());
        let out = run(&rule, vec![item("Milk", Some("R2"))]);
        assert_eq!(out.candidates.len(), 1);
        let alert = &out.candidates[0];
        assert_eq!(alert.priority, AlertPriority::Medium);
        assert_eq!(alert.product.as_deref(), Some("Milk"));
        assert_eq!(alert.correct_location.as_deref(), Some("shelf A1 / R1"));
    }

    #[test]
    fn product_from_another_shelf_points_home() {
        let rule = MisplacementRule::new(&MisplacementConfig::default());
        let out = run(&rule, vec![item("Bread", Some("R1"))]);
        assert_eq!(out.candidates.len(), 1);
        assert!(out.candidates[0].message.ends_with("Correct location: shelf B2 / R3"));
    }

    #[test]
    fn unknown_product_has_no_location_hint() {
        let rule = MisplacementRule::new(&MisplacementConfig::default());
        let out = run(&rule, vec![item("Caviar", None)]);
        assert_eq!(out.candidates.len(), 1);
        assert!(out.candidates[0].correct_location.is_none());
        assert_eq!(out.candidates[0].message, "Item 'Caviar' found at unknown location on shelf A1.");
    }

    #[test]
    fn one_candidate_per_distinct_item() {
        let rule = MisplacementRule::new(&MisplacementConfig::default());
        let out = run(
            &rule,
            vec![item("Soap", Some("R1")), item("soap", Some("R2")), item("Bread", None)],
        );
        assert_eq!(out.candidates.len(), 2);
    }

    #[test]
    fn misplaced_occurrence_found_regardless_of_item_order() {
        let rule = MisplacementRule::new(&MisplacementConfig::default());
        let in_place_first = run(&rule, vec![item("Milk", Some("R1")), item("Milk", Some("R2"))]);
        let misplaced_first = run(&rule, vec![item("Milk", Some("R2")), item("Milk", Some("R1"))]);
        assert_eq!(in_place_first.candidates.len(), 1);
        assert_eq!(misplaced_first.candidates.len(), 1);
        assert_eq!(in_place_first.candidates[0].message, misplaced_first.candidates[0].message);
    }

    #[test]
    fn priority_override_applies() {
        let config = MisplacementConfig {
            priority_overrides: HashMap::from([("bread".to_string(), AlertPriority::High)]),
            ..MisplacementConfig::default()
        };
        let rule = MisplacementRule::new(&config);
        let out = run(&rule, vec![item("Bread", None), item("Soap", None)]);
        assert_eq!(out.candidates[0].priority, AlertPriority::High);
        assert_eq!(out.candidates[1].priority, AlertPriority::Medium);
    }

    #[test]
    fn low_confidence_warns_but_still_evaluates() {
        let rule = MisplacementRule::new(&MisplacementConfig::default());
        let mut soap = item("Soap", None);
        soap.confidence = Some(0.2);
        let out = run(&rule, vec![soap]);
        assert_eq!(out.candidates.len(), 1);
        assert_eq!(out.warnings, vec!["low detection confidence (0.20) for item 'Soap' on shelf A1"]);
    }

    #[test]
    fn missing_shelf_skips_checks_with_warning() {
        let rule = MisplacementRule::new(&MisplacementConfig::default());
        let catalog = catalog();
        let ctx = RuleContext { shelf: None, catalog: &catalog };
        let out = rule.evaluate(&report("Z9", 10.0, vec![item("Soap", None)]), &ctx).unwrap();
        assert!(out.candidates.is_empty());
        assert_eq!(out.warnings, vec!["no configuration for shelf Z9; misplacement checks skipped"]);
    }
}
