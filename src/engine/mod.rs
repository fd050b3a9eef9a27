mod locks;

use std::sync::{Arc, PoisonError};

use chrono::{DateTime, SubsecRound, Utc};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogSnapshot, ShelfCatalog, StaffDirectory};
use crate::config::{Config, QueryConfig};
use crate::core::validate::validate_report;
use crate::core::{Alert, AlertHistoryEntry, AlertId, AlertStatus, DetectionReport, IngestOutcome, Transition};
use crate::db::{SharedDatabase, TransitionResult};
use crate::error::EngineError;
use crate::query::{AlertFilter, AlertPage, AlertStatistics, Pagination};
use crate::rules::{AlertRuleEngine, RuleContext};

pub use locks::ShelfLocks;

/// Actor recorded on alerts the rule engine creates or auto-resolves.
pub const SYSTEM_ACTOR: &str = "system";

const AUTO_RESOLVE_NOTE: &str = "stock level returned to normal";

/// Per-id result of a bulk transition.
#[derive(Debug)]
pub struct BulkOutcome {
    pub id: AlertId,
    pub result: Result<Alert, EngineError>,
}

impl BulkOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

impl Serialize for BulkOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("BulkOutcome", 3)?;
        s.serialize_field("id", &self.id)?;
        match &self.result {
            Ok(alert) => {
                s.serialize_field("outcome", "success")?;
                s.serialize_field("alert", alert)?;
            }
            Err(e) => {
                s.serialize_field("outcome", e.kind())?;
                s.serialize_field("error", &e.to_string())?;
            }
        }
        s.end()
    }
}

/// Entry point for everything callers do with alerts.
///
/// Ingestion serializes per shelf; status transitions are check-and-set in
/// the store. Everything else runs unsynchronized.
pub struct AlertEngine {
    db: SharedDatabase,
    rules: AlertRuleEngine,
    catalog: Arc<dyn ShelfCatalog>,
    staff: Arc<dyn StaffDirectory>,
    query: QueryConfig,
    shelf_locks: ShelfLocks,
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn require_actor(actor: &str) -> Result<(), EngineError> {
    if actor.trim().is_empty() {
        return Err(EngineError::InvalidRequest("actor id must not be empty".into()));
    }
    Ok(())
}

impl AlertEngine {
    pub fn new(
        config: &Config,
        db: SharedDatabase,
        catalog: Arc<dyn ShelfCatalog>,
        staff: Arc<dyn StaffDirectory>,
    ) -> Self {
        let rules = AlertRuleEngine::new(config);
        debug!("Alert engine rules: {:?}", rules.rule_names());
        Self {
            db,
            rules,
            catalog,
            staff,
            query: config.query.clone(),
            shelf_locks: ShelfLocks::new(),
        }
    }

    /// Build an engine whose shelf catalog and staff directory are one snapshot.
    pub fn with_snapshot(config: &Config, db: SharedDatabase, snapshot: CatalogSnapshot) -> Self {
        let snapshot = Arc::new(snapshot);
        Self::new(config, db, snapshot.clone(), snapshot)
    }

    /// Validate a raw payload, then ingest it.
    pub fn ingest(&self, payload: &Value) -> Result<IngestOutcome, EngineError> {
        let report = validate_report(payload, now())?;
        self.ingest_report(&report)
    }

    /// Evaluate rules against a validated report and persist surviving alerts.
    ///
    /// The shelf's lock is held from reading its active alerts until the new
    /// ones are committed, so concurrent reports cannot both pass the
    /// duplicate check.
    pub fn ingest_report(&self, report: &DetectionReport) -> Result<IngestOutcome, EngineError> {
        let handle = self.shelf_locks.handle(&report.shelf_id);
        let _guard = handle.lock().unwrap_or_else(PoisonError::into_inner);

        let shelf = self.catalog.shelf_config(&report.shelf_id)?;
        let active = self.db.active_alerts_for_shelf(&report.shelf_id)?;
        let ctx = RuleContext {
            shelf: shelf.as_ref(),
            catalog: self.catalog.as_ref(),
        };
        let output = self.rules.evaluate(report, &ctx, &active)?;
        let resolved = if self.rules.clears_stock_alerts(report) {
            self.resolve_stock_alerts(&active)?
        } else {
            Vec::new()
        };

        for warning in &output.warnings {
            warn!("{warning}");
        }

        let created = if output.candidates.is_empty() {
            Vec::new()
        } else {
            self.db.insert_alerts(&output.candidates, SYSTEM_ACTOR, now())?
        };
        for alert in &created {
            info!(
                "Alert #{} created: {} {} on shelf {}",
                alert.id, alert.priority, alert.alert_type, alert.shelf_id
            );
        }

        Ok(IngestOutcome {
            created,
            resolved,
            warnings: output.warnings,
        })
    }

    /// Close the shelf's active stock alerts on behalf of the system.
    ///
    /// Acknowledged alerts stay open for the staff member handling them. An
    /// alert another caller resolves first is skipped.
    fn resolve_stock_alerts(&self, active: &[Alert]) -> Result<Vec<Alert>, EngineError> {
        let mut resolved = Vec::new();
        for alert in active
            .iter()
            .filter(|a| a.status == AlertStatus::Active && a.alert_type.is_stock_level())
        {
            match self.transition(alert.id, Transition::Resolve, SYSTEM_ACTOR, Some(AUTO_RESOLVE_NOTE), None) {
                Ok(alert) => resolved.push(alert),
                Err(EngineError::InvalidTransition { .. } | EngineError::AlertNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if !resolved.is_empty() {
            info!(
                "Auto-resolved {} stock alerts on shelf {}",
                resolved.len(),
                resolved[0].shelf_id
            );
        }
        Ok(resolved)
    }

    pub fn acknowledge(&self, id: AlertId, actor: &str, note: Option<&str>) -> Result<Alert, EngineError> {
        self.transition(id, Transition::Acknowledge, actor, note, None)
    }

    pub fn resolve(&self, id: AlertId, actor: &str, note: Option<&str>) -> Result<Alert, EngineError> {
        self.transition(id, Transition::Resolve, actor, note, None)
    }

    /// Point an unresolved alert at an active staff member.
    pub fn assign(&self, id: AlertId, staff_id: &str, actor: &str) -> Result<Alert, EngineError> {
        require_actor(actor)?;
        self.require_active_staff(staff_id)?;
        self.transition(id, Transition::Assign, actor, None, Some(staff_id))
    }

    pub fn add_note(&self, id: AlertId, actor: &str, note: &str) -> Result<AlertHistoryEntry, EngineError> {
        require_actor(actor)?;
        if note.trim().is_empty() {
            return Err(EngineError::InvalidRequest("note must not be empty".into()));
        }
        let entry = self
            .db
            .add_note(id, actor, note, now())?
            .ok_or(EngineError::AlertNotFound(id))?;
        debug!("Note added to alert #{id} by {actor}");
        Ok(entry)
    }

    pub fn acknowledge_many(&self, ids: &[AlertId], actor: &str) -> Result<Vec<BulkOutcome>, EngineError> {
        self.transition_many(ids, Transition::Acknowledge, actor)
    }

    pub fn resolve_many(&self, ids: &[AlertId], actor: &str) -> Result<Vec<BulkOutcome>, EngineError> {
        self.transition_many(ids, Transition::Resolve, actor)
    }

    /// Each id is transitioned independently; one failure does not stop the rest.
    fn transition_many(
        &self,
        ids: &[AlertId],
        transition: Transition,
        actor: &str,
    ) -> Result<Vec<BulkOutcome>, EngineError> {
        require_actor(actor)?;
        if ids.is_empty() {
            return Err(EngineError::InvalidRequest("alert id list must not be empty".into()));
        }
        let outcomes: Vec<BulkOutcome> = ids
            .iter()
            .map(|&id| BulkOutcome {
                id,
                result: self.transition(id, transition, actor, None, None),
            })
            .collect();
        let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
        info!(
            "Bulk {transition}: {succeeded} succeeded, {} failed",
            outcomes.len() - succeeded
        );
        Ok(outcomes)
    }

    fn transition(
        &self,
        id: AlertId,
        transition: Transition,
        actor: &str,
        note: Option<&str>,
        assign_to: Option<&str>,
    ) -> Result<Alert, EngineError> {
        require_actor(actor)?;
        match self
            .db
            .apply_transition(id, transition, actor, note, assign_to, now())?
        {
            TransitionResult::Applied(alert) => {
                info!("Alert #{id} {} by {actor}", transition.history_action());
                Ok(alert)
            }
            TransitionResult::NotFound => Err(EngineError::AlertNotFound(id)),
            TransitionResult::Rejected(current) => {
                warn!("Rejected {transition} on alert #{id}: status is {current}");
                Err(EngineError::InvalidTransition {
                    id,
                    current,
                    attempted: transition,
                })
            }
        }
    }

    fn require_active_staff(&self, staff_id: &str) -> Result<(), EngineError> {
        match self.staff.staff_member(staff_id)? {
            None => Err(EngineError::StaffNotFound(staff_id.to_string())),
            Some(member) if !member.active => Err(EngineError::StaffInactive(staff_id.to_string())),
            Some(_) => Ok(()),
        }
    }

    pub fn get_alert(&self, id: AlertId) -> Result<Alert, EngineError> {
        self.db.get_alert(id)?.ok_or(EngineError::AlertNotFound(id))
    }

    /// Entries oldest first.
    pub fn history(&self, id: AlertId) -> Result<Vec<AlertHistoryEntry>, EngineError> {
        if !self.db.alert_exists(id)? {
            return Err(EngineError::AlertNotFound(id));
        }
        Ok(self.db.history(id)?)
    }

    /// A limit of zero or an offset beyond the store's integer range is
    /// rejected. Limits above the configured maximum are clamped.
    pub fn list_alerts(&self, filter: &AlertFilter, page: Pagination) -> Result<AlertPage, EngineError> {
        if i64::try_from(page.offset).is_err() {
            return Err(EngineError::InvalidRequest("offset out of range".into()));
        }
        let limit = match page.limit {
            Some(0) => return Err(EngineError::InvalidRequest("limit must be at least 1".into())),
            Some(limit) => limit.min(self.query.max_limit),
            None => self.query.default_limit.min(self.query.max_limit),
        };
        let (alerts, total_matching) = self.db.query_alerts(filter, limit, page.offset)?;
        Ok(AlertPage {
            alerts,
            total_matching,
            limit,
            offset: page.offset,
        })
    }

    /// Unresolved alerts assigned to a known staff member, most urgent first.
    pub fn dashboard(&self, staff_id: &str) -> Result<Vec<Alert>, EngineError> {
        if self.staff.staff_member(staff_id)?.is_none() {
            return Err(EngineError::StaffNotFound(staff_id.to_string()));
        }
        Ok(self.db.dashboard(staff_id)?)
    }

    pub fn statistics(&self) -> Result<AlertStatistics, EngineError> {
        Ok(self.db.statistics()?)
    }
}
