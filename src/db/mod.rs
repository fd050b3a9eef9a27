pub mod schema;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, Value, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::catalog::{ShelfConfig, StaffMember};
use crate::core::{
    Alert, AlertHistoryEntry, AlertId, AlertPriority, AlertStatus, AlertType, HistoryAction, NewAlert, Transition,
};
use crate::query::{sort_for_dashboard, AlertFilter, AlertStatistics};

const ALERT_COLUMNS: &str = "id, shelf_id, alert_type, priority, status, title, message, product, \
     correct_location, empty_percentage, assigned_staff, created_by, created_at, updated_at, \
     acknowledged_at, resolved_at";

/// Outcome of a check-and-set status change.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    Applied(Alert),
    NotFound,
    /// The transition is illegal from the carried status; nothing was written.
    Rejected(AlertStatus),
}

pub struct Database {
    conn: Connection,
}

/// Thread-safe wrapper around Database.
#[derive(Clone)]
pub struct SharedDatabase {
    inner: Arc<Mutex<Database>>,
}

impl SharedDatabase {
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, rusqlite::Error> {
        let db = Database::open(path, busy_timeout)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(db)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Database> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist a batch of candidates as active alerts, all or nothing.
    pub fn insert_alerts(
        &self,
        batch: &[NewAlert],
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Alert>, rusqlite::Error> {
        self.lock().insert_alerts(batch, actor, now)
    }

    pub fn get_alert(&self, id: AlertId) -> Result<Option<Alert>, rusqlite::Error> {
        self.lock().get_alert(id)
    }

    /// Alerts on a shelf whose status is exactly `active`.
    pub fn active_alerts_for_shelf(&self, shelf_id: &str) -> Result<Vec<Alert>, rusqlite::Error> {
        self.lock().active_alerts_for_shelf(shelf_id)
    }

    pub fn apply_transition(
        &self,
        id: AlertId,
        transition: Transition,
        actor: &str,
        note: Option<&str>,
        assign_to: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TransitionResult, rusqlite::Error> {
        self.lock().apply_transition(id, transition, actor, note, assign_to, now)
    }

    /// Append a free-text note. `None` if the alert does not exist.
    pub fn add_note(
        &self,
        id: AlertId,
        actor: &str,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AlertHistoryEntry>, rusqlite::Error> {
        self.lock().add_note(id, actor, note, now)
    }

    pub fn history(&self, id: AlertId) -> Result<Vec<AlertHistoryEntry>, rusqlite::Error> {
        self.lock().history(id)
    }

    pub fn alert_exists(&self, id: AlertId) -> Result<bool, rusqlite::Error> {
        self.lock().alert_exists(id)
    }

    /// One page of matching alerts, newest first, plus the total match count.
    pub fn query_alerts(
        &self,
        filter: &AlertFilter,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Alert>, usize), rusqlite::Error> {
        self.lock().query_alerts(filter, limit, offset)
    }

    pub fn dashboard(&self, staff_id: &str) -> Result<Vec<Alert>, rusqlite::Error> {
        self.lock().dashboard(staff_id)
    }

    pub fn statistics(&self) -> Result<AlertStatistics, rusqlite::Error> {
        self.lock().statistics()
    }

    pub fn upsert_shelf(&self, shelf: &ShelfConfig) -> Result<(), rusqlite::Error> {
        self.lock().upsert_shelf(shelf)
    }

    pub fn upsert_staff(&self, member: &StaffMember) -> Result<(), rusqlite::Error> {
        self.lock().upsert_staff(member)
    }

    /// Every configured shelf with its inventory placements.
    pub fn all_shelves(&self) -> Result<Vec<ShelfConfig>, rusqlite::Error> {
        self.lock().all_shelves()
    }

    pub fn all_staff(&self) -> Result<Vec<StaffMember>, rusqlite::Error> {
        self.lock().all_staff()
    }

    /// Bulk-load shelves from a CSV file (`shelf_id,capacity,assigned_staff`).
    pub fn load_shelves_from_csv(&self, path: &Path) -> Result<usize, Box<dyn std::error::Error>> {
        self.lock().load_shelves_from_csv(path)
    }

    /// Bulk-load inventory placements (`shelf_id,product_name,location,category`).
    pub fn load_inventory_from_csv(&self, path: &Path) -> Result<usize, Box<dyn std::error::Error>> {
        self.lock().load_inventory_from_csv(path)
    }

    /// Bulk-load staff (`staff_id,name,role,active`).
    pub fn load_staff_from_csv(&self, path: &Path) -> Result<usize, Box<dyn std::error::Error>> {
        self.lock().load_staff_from_csv(path)
    }
}

macro_rules! sql_text_enum {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::from(self.as_str()))
                }
            }

            impl FromSql for $ty {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    value
                        .as_str()?
                        .parse()
                        .map_err(|e: String| FromSqlError::Other(e.into()))
                }
            }
        )*
    };
}

sql_text_enum!(AlertType, AlertPriority, AlertStatus, HistoryAction);

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn get_ts(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(idx, &raw)
}

fn get_opt_ts(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| parse_ts(idx, &r)).transpose()
}

fn row_to_alert(row: &Row) -> rusqlite::Result<Alert> {
    Ok(Alert {
        id: row.get(0)?,
        shelf_id: row.get(1)?,
        alert_type: row.get(2)?,
        priority: row.get(3)?,
        status: row.get(4)?,
        title: row.get(5)?,
        message: row.get(6)?,
        product: row.get(7)?,
        correct_location: row.get(8)?,
        empty_percentage: row.get(9)?,
        assigned_staff: row.get(10)?,
        created_by: row.get(11)?,
        created_at: get_ts(row, 12)?,
        updated_at: get_ts(row, 13)?,
        acknowledged_at: get_opt_ts(row, 14)?,
        resolved_at: get_opt_ts(row, 15)?,
    })
}

fn row_to_history(row: &Row) -> rusqlite::Result<AlertHistoryEntry> {
    Ok(AlertHistoryEntry {
        id: row.get(0)?,
        alert_id: row.get(1)?,
        action: row.get(2)?,
        actor: row.get(3)?,
        note: row.get(4)?,
        timestamp: get_ts(row, 5)?,
    })
}

fn fetch_alert(conn: &Connection, id: AlertId) -> rusqlite::Result<Option<Alert>> {
    conn.query_row(
        &format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1"),
        rusqlite::params![id],
        row_to_alert,
    )
    .optional()
}

fn append_history(
    conn: &Connection,
    alert_id: AlertId,
    action: HistoryAction,
    actor: &str,
    note: Option<&str>,
    at: DateTime<Utc>,
) -> rusqlite::Result<AlertHistoryEntry> {
    conn.execute(
        "INSERT INTO alert_history (alert_id, action, actor, note, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![alert_id, action, actor, note, ts(at)],
    )?;
    Ok(AlertHistoryEntry {
        id: conn.last_insert_rowid(),
        alert_id,
        action,
        actor: actor.to_string(),
        note: note.map(str::to_string),
        timestamp: at,
    })
}

/// `now`, or one microsecond past the alert's latest history timestamp when
/// `now` is not later than it. Timestamps within an alert's trail strictly
/// increase.
fn monotonic_stamp(conn: &Connection, alert_id: AlertId, now: DateTime<Utc>) -> rusqlite::Result<DateTime<Utc>> {
    let last: Option<String> = conn.query_row(
        "SELECT MAX(timestamp) FROM alert_history WHERE alert_id = ?1",
        rusqlite::params![alert_id],
        |row| row.get(0),
    )?;
    match last {
        Some(raw) => {
            let prev = parse_ts(0, &raw)?;
            if now > prev {
                Ok(now)
            } else {
                Ok(prev + chrono::Duration::microseconds(1))
            }
        }
        None => Ok(now),
    }
}

/// WHERE clause and bound values for a filter.
fn filter_clause(filter: &AlertFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    if let Some(status) = filter.status {
        clauses.push("status = ?");
        values.push(Value::Text(status.as_str().into()));
    }
    if let Some(status) = filter.exclude_status {
        clauses.push("status != ?");
        values.push(Value::Text(status.as_str().into()));
    }
    if let Some(priority) = filter.priority {
        clauses.push("priority = ?");
        values.push(Value::Text(priority.as_str().into()));
    }
    if let Some(alert_type) = filter.alert_type {
        clauses.push("alert_type = ?");
        values.push(Value::Text(alert_type.as_str().into()));
    }
    if let Some(ref shelf) = filter.shelf_id {
        clauses.push("shelf_id = ?");
        values.push(Value::Text(shelf.clone()));
    }
    if let Some(ref staff) = filter.assigned_staff {
        clauses.push("assigned_staff = ?");
        values.push(Value::Text(staff.clone()));
    }
    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

fn csv_fields(line: &str, n: usize) -> Vec<&str> {
    line.splitn(n, ',').map(str::trim).collect()
}

impl Database {
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    pub fn insert_alerts(
        &self,
        batch: &[NewAlert],
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Alert>, rusqlite::Error> {
        let now = now.trunc_subsecs(6);
        let stamp = ts(now);
        let tx = self.conn.unchecked_transaction()?;
        let mut created = Vec::with_capacity(batch.len());
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO alerts (shelf_id, alert_type, priority, status, title, message, product,
                     correct_location, empty_percentage, assigned_staff, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            )?;
            for candidate in batch {
                stmt.execute(rusqlite::params![
                    candidate.shelf_id,
                    candidate.alert_type,
                    candidate.priority,
                    AlertStatus::Active,
                    candidate.title,
                    candidate.message,
                    candidate.product,
                    candidate.correct_location,
                    candidate.empty_percentage,
                    candidate.assigned_staff,
                    actor,
                    stamp,
                ])?;
                let id = tx.last_insert_rowid();
                let note = candidate.assigned_staff.as_ref().map(|s| format!("assigned to {s}"));
                append_history(&tx, id, HistoryAction::Created, actor, note.as_deref(), now)?;
                created.push(Alert {
                    id,
                    shelf_id: candidate.shelf_id.clone(),
                    alert_type: candidate.alert_type,
                    priority: candidate.priority,
                    status: AlertStatus::Active,
                    title: candidate.title.clone(),
                    message: candidate.message.clone(),
                    product: candidate.product.clone(),
                    correct_location: candidate.correct_location.clone(),
                    empty_percentage: candidate.empty_percentage,
                    assigned_staff: candidate.assigned_staff.clone(),
                    created_by: actor.to_string(),
                    created_at: now,
                    updated_at: now,
                    acknowledged_at: None,
                    resolved_at: None,
                });
            }
        }
        tx.commit()?;
        Ok(created)
    }

    pub fn get_alert(&self, id: AlertId) -> Result<Option<Alert>, rusqlite::Error> {
        fetch_alert(&self.conn, id)
    }

    pub fn alert_exists(&self, id: AlertId) -> Result<bool, rusqlite::Error> {
        self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM alerts WHERE id = ?1)",
            rusqlite::params![id],
            |row| row.get(0),
        )
    }

    pub fn active_alerts_for_shelf(&self, shelf_id: &str) -> Result<Vec<Alert>, rusqlite::Error> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE shelf_id = ?1 AND status = ?2 ORDER BY id"
        ))?;
        let rows = stmt.query_map(rusqlite::params![shelf_id, AlertStatus::Active], row_to_alert)?;
        rows.collect()
    }

    /// Read the current status, check the transition, update the row and append
    /// history, all in one transaction.
    pub fn apply_transition(
        &self,
        id: AlertId,
        transition: Transition,
        actor: &str,
        note: Option<&str>,
        assign_to: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TransitionResult, rusqlite::Error> {
        let tx = self.conn.unchecked_transaction()?;
        let Some(alert) = fetch_alert(&tx, id)? else {
            return Ok(TransitionResult::NotFound);
        };
        let Some(next) = alert.status.apply(transition) else {
            return Ok(TransitionResult::Rejected(alert.status));
        };

        let stamp = monotonic_stamp(&tx, id, now.trunc_subsecs(6))?;
        let acknowledged_at = (transition == Transition::Acknowledge).then(|| ts(stamp));
        let resolved_at = (transition == Transition::Resolve).then(|| ts(stamp));
        tx.execute(
            "UPDATE alerts SET status = ?1, updated_at = ?2,
                 acknowledged_at = COALESCE(?3, acknowledged_at),
                 resolved_at = COALESCE(?4, resolved_at),
                 assigned_staff = COALESCE(?5, assigned_staff)
             WHERE id = ?6",
            rusqlite::params![next, ts(stamp), acknowledged_at, resolved_at, assign_to, id],
        )?;

        let note = match (assign_to, note) {
            (Some(staff), Some(n)) => Some(format!("assigned to {staff}: {n}")),
            (Some(staff), None) => Some(format!("assigned to {staff}")),
            (None, n) => n.map(str::to_string),
        };
        append_history(&tx, id, transition.history_action(), actor, note.as_deref(), stamp)?;

        let updated = fetch_alert(&tx, id)?;
        tx.commit()?;
        Ok(updated.map_or(TransitionResult::NotFound, TransitionResult::Applied))
    }

    pub fn add_note(
        &self,
        id: AlertId,
        actor: &str,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AlertHistoryEntry>, rusqlite::Error> {
        let tx = self.conn.unchecked_transaction()?;
        if !self.alert_exists(id)? {
            return Ok(None);
        }
        let stamp = monotonic_stamp(&tx, id, now.trunc_subsecs(6))?;
        let entry = append_history(&tx, id, HistoryAction::Note, actor, Some(note), stamp)?;
        tx.commit()?;
        Ok(Some(entry))
    }

    pub fn history(&self, id: AlertId) -> Result<Vec<AlertHistoryEntry>, rusqlite::Error> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, alert_id, action, actor, note, timestamp FROM alert_history WHERE alert_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(rusqlite::params![id], row_to_history)?;
        rows.collect()
    }

    pub fn query_alerts(
        &self,
        filter: &AlertFilter,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Alert>, usize), rusqlite::Error> {
        let (clause, mut values) = filter_clause(filter);
        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM alerts{clause}"),
            rusqlite::params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        values.push(Value::Integer(limit as i64));
        values.push(Value::Integer(offset as i64));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts{clause} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        ))?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), row_to_alert)?;
        let alerts = rows.collect::<Result<Vec<_>, _>>()?;
        Ok((alerts, total as usize))
    }

    /// Unresolved alerts assigned to `staff_id`, most urgent and oldest first.
    pub fn dashboard(&self, staff_id: &str) -> Result<Vec<Alert>, rusqlite::Error> {
        let (clause, values) = filter_clause(&AlertFilter::dashboard(staff_id));
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {ALERT_COLUMNS} FROM alerts{clause}"))?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), row_to_alert)?;
        let mut alerts = rows.collect::<Result<Vec<_>, _>>()?;
        sort_for_dashboard(&mut alerts);
        Ok(alerts)
    }

    /// All counts come from one grouped scan, so they are mutually consistent.
    pub fn statistics(&self) -> Result<AlertStatistics, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT shelf_id, alert_type, priority, status, COUNT(*) FROM alerts
             GROUP BY shelf_id, alert_type, priority, status",
        )?;
        let mut rows = stmt.query([])?;
        let mut stats = AlertStatistics::default();
        while let Some(row) = rows.next()? {
            let shelf: String = row.get(0)?;
            let count: i64 = row.get(4)?;
            stats.record(&shelf, row.get(1)?, row.get(2)?, row.get(3)?, count as usize);
        }
        Ok(stats)
    }

    pub fn upsert_shelf(&self, shelf: &ShelfConfig) -> Result<(), rusqlite::Error> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO shelves (shelf_id, capacity, assigned_staff) VALUES (?1, ?2, ?3)",
            rusqlite::params![shelf.shelf_id, shelf.capacity, shelf.assigned_staff],
        )?;
        for (product, location) in &shelf.expected_locations {
            tx.execute(
                "INSERT OR REPLACE INTO inventory (shelf_id, product_name, location) VALUES (?1, ?2, ?3)",
                rusqlite::params![shelf.shelf_id, product, location],
            )?;
        }
        tx.commit()
    }

    pub fn upsert_inventory(
        &self,
        shelf_id: &str,
        product: &str,
        location: &str,
        category: Option<&str>,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO inventory (shelf_id, product_name, location, category) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![shelf_id, product.to_lowercase(), location, category],
        )?;
        Ok(())
    }

    pub fn upsert_staff(&self, member: &StaffMember) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO staff (staff_id, name, role, active) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![member.staff_id, member.name, member.role, member.active],
        )?;
        Ok(())
    }

    /// Inventory rows for a shelf with no `shelves` row still produce a config
    /// (capacity 0) so their placements remain known.
    pub fn all_shelves(&self) -> Result<Vec<ShelfConfig>, rusqlite::Error> {
        let mut shelves = std::collections::BTreeMap::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT shelf_id, capacity, assigned_staff FROM shelves")?;
            let rows = stmt.query_map([], |row| {
                let mut shelf = ShelfConfig::new(row.get::<_, String>(0)?, row.get(1)?);
                shelf.assigned_staff = row.get(2)?;
                Ok(shelf)
            })?;
            for shelf in rows {
                let shelf = shelf?;
                shelves.insert(shelf.shelf_id.clone(), shelf);
            }
        }

        let mut stmt = self
            .conn
            .prepare("SELECT shelf_id, product_name, location FROM inventory")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let shelf_id: String = row.get(0)?;
            let product: String = row.get(1)?;
            let location: String = row.get(2)?;
            let shelf = shelves
                .entry(shelf_id.clone())
                .or_insert_with(|| ShelfConfig::new(shelf_id, 0));
            shelf.expected_locations.insert(product.to_lowercase(), location);
        }
        Ok(shelves.into_values().collect())
    }

    pub fn all_staff(&self) -> Result<Vec<StaffMember>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT staff_id, name, role, active FROM staff ORDER BY staff_id")?;
        let rows = stmt.query_map([], |row| {
            Ok(StaffMember {
                staff_id: row.get(0)?,
                name: row.get(1)?,
                role: row.get(2)?,
                active: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    pub fn load_shelves_from_csv(&self, path: &Path) -> Result<usize, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let mut count = 0;
        for line in content.lines().skip(1) {
            // skip header
            let parts = csv_fields(line, 3);
            if parts.len() < 2 || parts[0].is_empty() {
                continue;
            }
            let capacity = parts[1].parse().unwrap_or(0);
            self.conn.execute(
                "INSERT OR REPLACE INTO shelves (shelf_id, capacity, assigned_staff) VALUES (?1, ?2, ?3)",
                rusqlite::params![parts[0], capacity, parts.get(2).filter(|s| !s.is_empty())],
            )?;
            count += 1;
        }
        Ok(count)
    }

    pub fn load_inventory_from_csv(&self, path: &Path) -> Result<usize, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let mut count = 0;
        for line in content.lines().skip(1) {
            let parts = csv_fields(line, 4);
            if parts.len() < 3 || parts[0].is_empty() || parts[1].is_empty() {
                continue;
            }
            let category = parts.get(3).copied().filter(|s| !s.is_empty());
            self.upsert_inventory(parts[0], parts[1], parts[2], category)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn load_staff_from_csv(&self, path: &Path) -> Result<usize, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let mut count = 0;
        for line in content.lines().skip(1) {
            let parts = csv_fields(line, 4);
            if parts.len() < 3 || parts[0].is_empty() {
                continue;
            }
            let active = parts
                .get(3)
                .map(|s| !matches!(s.to_ascii_lowercase().as_str(), "false" | "0" | "no"))
                .unwrap_or(true);
            self.upsert_staff(&StaffMember {
                staff_id: parts[0].to_string(),
                name: parts[1].to_string(),
                role: parts[2].to_string(),
                active,
            })?;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    pub(crate) fn open_temp_db() -> (TempDir, SharedDatabase) {
        let dir = TempDir::new().unwrap();
        let db = SharedDatabase::open(&dir.path().join("alerts.db"), Duration::from_secs(5)).unwrap();
        (dir, db)
    }

    fn candidate(shelf: &str, alert_type: AlertType, priority: AlertPriority) -> NewAlert {
        NewAlert {
            shelf_id: shelf.into(),
            alert_type,
            priority,
            status: AlertStatus::Pending,
            title: format!("{alert_type} on {shelf}"),
            message: "m".into(),
            product: None,
            correct_location: None,
            empty_percentage: Some(92.0),
            assigned_staff: None,
        }
    }

    #[test]
    fn insert_persists_active_alert_with_created_history() {
        let (_dir, db) = open_temp_db();
        let mut c = candidate("A1", AlertType::OutOfStock, AlertPriority::Critical);
        c.assigned_staff = Some("EMP001".into());
        let created = db.insert_alerts(&[c], "system", Utc::now()).unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].status, AlertStatus::Active);

        let stored = db.get_alert(created[0].id).unwrap().unwrap();
        assert_eq!(stored, created[0]);

        let history = db.history(stored.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, HistoryAction::Created);
        assert_eq!(history[0].note.as_deref(), Some("assigned to EMP001"));
    }

    #[test]
    fn unique_index_rejects_second_active_stock_alert() {
        let (_dir, db) = open_temp_db();
        let c = candidate("A1", AlertType::OutOfStock, AlertPriority::Critical);
        db.insert_alerts(std::slice::from_ref(&c), "system", Utc::now()).unwrap();
        assert!(db.insert_alerts(&[c], "system", Utc::now()).is_err());
        // the failed batch rolled back
        assert_eq!(db.statistics().unwrap().total, 1);
    }

    #[test]
    fn misplaced_alerts_are_not_unique() {
        let (_dir, db) = open_temp_db();
        let c = candidate("A1", AlertType::MisplacedItem, AlertPriority::Medium);
        db.insert_alerts(&[c.clone(), c], "system", Utc::now()).unwrap();
        assert_eq!(db.active_alerts_for_shelf("A1").unwrap().len(), 2);
    }

    #[test]
    fn transition_check_and_set() {
        let (_dir, db) = open_temp_db();
        let now = Utc::now();
        let id = db
            .insert_alerts(&[candidate("A1", AlertType::OutOfStock, AlertPriority::Critical)], "system", now)
            .unwrap()[0]
            .id;

        let acked = db
            .apply_transition(id, Transition::Acknowledge, "EMP001", None, None, now)
            .unwrap();
        let TransitionResult::Applied(alert) = acked else {
            panic!("expected applied, got {acked:?}");
        };
        assert_eq!(alert.status, AlertStatus::Acknowledged);
        assert!(alert.acknowledged_at.is_some());

        let again = db
            .apply_transition(id, Transition::Acknowledge, "EMP001", None, None, now)
            .unwrap();
        assert_eq!(again, TransitionResult::Rejected(AlertStatus::Acknowledged));

        let missing = db
            .apply_transition(999, Transition::Resolve, "EMP001", None, None, now)
            .unwrap();
        assert_eq!(missing, TransitionResult::NotFound);

        assert_eq!(db.history(id).unwrap().len(), 2);
    }

    #[test]
    fn history_timestamps_never_go_backwards() {
        let (_dir, db) = open_temp_db();
        let now = Utc::now();
        let id = db
            .insert_alerts(&[candidate("A1", AlertType::OutOfStock, AlertPriority::Critical)], "system", now)
            .unwrap()[0]
            .id;
        let earlier = now - ChronoDuration::minutes(5);
        db.apply_transition(id, Transition::Resolve, "EMP001", Some("restocked"), None, earlier)
            .unwrap();
        let history = db.history(id).unwrap();
        assert!(history[1].timestamp > history[0].timestamp);
        assert_eq!(history[1].note.as_deref(), Some("restocked"));
    }

    #[test]
    fn same_instant_transitions_get_distinct_timestamps() {
        let (_dir, db) = open_temp_db();
        let now = Utc::now().trunc_subsecs(6);
        let id = db
            .insert_alerts(&[candidate("A1", AlertType::OutOfStock, AlertPriority::Critical)], "system", now)
            .unwrap()[0]
            .id;
        db.apply_transition(id, Transition::Acknowledge, "EMP001", None, None, now).unwrap();
        db.add_note(id, "EMP001", "checking stockroom", now).unwrap();
        db.apply_transition(id, Transition::Resolve, "EMP001", None, None, now).unwrap();

        let history = db.history(id).unwrap();
        assert_eq!(history.len(), 4);
        assert!(history.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        let actions: Vec<HistoryAction> = history.iter().map(|h| h.action).collect();
        assert_eq!(
            actions,
            vec![
                HistoryAction::Created,
                HistoryAction::Acknowledged,
                HistoryAction::Note,
                HistoryAction::Resolved
            ]
        );
    }

    #[test]
    fn assign_records_staff_and_keeps_status() {
        let (_dir, db) = open_temp_db();
        let now = Utc::now();
        let id = db
            .insert_alerts(&[candidate("A1", AlertType::OutOfStock, AlertPriority::Critical)], "system", now)
            .unwrap()[0]
            .id;
        let result = db
            .apply_transition(id, Transition::Assign, "manager", None, Some("EMP002"), now)
            .unwrap();
        let TransitionResult::Applied(alert) = result else {
            panic!("expected applied");
        };
        assert_eq!(alert.status, AlertStatus::Active);
        assert_eq!(alert.assigned_staff.as_deref(), Some("EMP002"));
        let history = db.history(id).unwrap();
        assert_eq!(history[1].action, HistoryAction::Assigned);
        assert_eq!(history[1].note.as_deref(), Some("assigned to EMP002"));
    }

    #[test]
    fn notes_append_without_changing_status() {
        let (_dir, db) = open_temp_db();
        let now = Utc::now();
        let id = db
            .insert_alerts(&[candidate("A1", AlertType::OutOfStock, AlertPriority::Critical)], "system", now)
            .unwrap()[0]
            .id;
        let entry = db.add_note(id, "EMP001", "pallet on the way", now).unwrap().unwrap();
        assert_eq!(entry.action, HistoryAction::Note);
        assert_eq!(db.get_alert(id).unwrap().unwrap().status, AlertStatus::Active);
        assert!(db.add_note(999, "EMP001", "x", now).unwrap().is_none());
    }

    #[test]
    fn history_rows_are_append_only() {
        let (_dir, db) = open_temp_db();
        let id = db
            .insert_alerts(&[candidate("A1", AlertType::OutOfStock, AlertPriority::Critical)], "system", Utc::now())
            .unwrap()[0]
            .id;
        let guard = db.lock();
        assert!(guard.conn.execute("DELETE FROM alert_history", []).is_err());
        assert!(guard
            .conn
            .execute("UPDATE alert_history SET actor = 'x'", [])
            .is_err());
        assert!(guard
            .conn
            .execute("DELETE FROM alerts WHERE id = ?1", [id])
            .is_err());
    }

    #[test]
    fn query_filters_paginates_and_counts() {
        let (_dir, db) = open_temp_db();
        let base = Utc::now();
        for (i, shelf) in ["A1", "A2", "A3", "A4", "A5"].iter().enumerate() {
            db.insert_alerts(
                &[candidate(shelf, AlertType::OutOfStock, AlertPriority::Critical)],
                "system",
                base + ChronoDuration::seconds(i as i64),
            )
            .unwrap();
        }
        db.insert_alerts(
            &[candidate("A1", AlertType::MediumStock, AlertPriority::Medium)],
            "system",
            base,
        )
        .unwrap();

        let filter = AlertFilter {
            priority: Some(AlertPriority::Critical),
            ..Default::default()
        };
        let (page, total) = db.query_alerts(&filter, 2, 0).unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].shelf_id, "A5");
        assert!(page.iter().all(|a| a.priority == AlertPriority::Critical));

        let (page, _) = db.query_alerts(&filter, 2, 4).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].shelf_id, "A1");

        let (page, total) = db.query_alerts(&filter, 2, 10).unwrap();
        assert!(page.is_empty());
        assert_eq!(total, 5);
    }

    #[test]
    fn dashboard_orders_by_priority_then_age() {
        let (_dir, db) = open_temp_db();
        let base = Utc::now();
        let mut batch = Vec::new();
        for (shelf, alert_type, priority) in [
            ("A1", AlertType::MediumStock, AlertPriority::Medium),
            ("A2", AlertType::OutOfStock, AlertPriority::Critical),
            ("A3", AlertType::OutOfStock, AlertPriority::Critical),
        ] {
            let mut c = candidate(shelf, alert_type, priority);
            c.assigned_staff = Some("EMP001".into());
            batch.push(c);
        }
        let created = db.insert_alerts(&batch[..1], "system", base).unwrap();
        db.insert_alerts(&batch[1..2], "system", base + ChronoDuration::seconds(2)).unwrap();
        db.insert_alerts(&batch[2..], "system", base + ChronoDuration::seconds(1)).unwrap();
        db.apply_transition(created[0].id, Transition::Resolve, "EMP001", None, None, base)
            .unwrap();

        let shelves: Vec<String> = db
            .dashboard("EMP001")
            .unwrap()
            .into_iter()
            .map(|a| a.shelf_id)
            .collect();
        assert_eq!(shelves, vec!["A3", "A2"]);
        assert!(db.dashboard("EMP404").unwrap().is_empty());
    }

    #[test]
    fn statistics_group_by_status_priority_and_shelf() {
        let (_dir, db) = open_temp_db();
        let now = Utc::now();
        let created = db
            .insert_alerts(
                &[
                    candidate("A1", AlertType::OutOfStock, AlertPriority::Critical),
                    candidate("B2", AlertType::MediumStock, AlertPriority::Medium),
                ],
                "system",
                now,
            )
            .unwrap();
        db.apply_transition(created[0].id, Transition::Resolve, "EMP001", None, None, now)
            .unwrap();
        let stats = db.statistics().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_status.resolved, 1);
        assert_eq!(stats.by_status.active, 1);
        assert_eq!(stats.by_shelf["A1"].resolved, 1);
        assert_eq!(stats.by_priority[&AlertPriority::Medium], 1);
    }

    #[test]
    fn catalog_tables_roundtrip() {
        let (_dir, db) = open_temp_db();
        db.upsert_shelf(&ShelfConfig::new("A1", 40).with_product("Milk", "R1").with_assigned_staff("EMP001"))
            .unwrap();
        db.lock().upsert_inventory("C3", "Soap", "R9", Some("household")).unwrap();
        db.upsert_staff(&StaffMember {
            staff_id: "EMP001".into(),
            name: "Dana".into(),
            role: "staff".into(),
            active: true,
        })
        .unwrap();

        let shelves = db.all_shelves().unwrap();
        assert_eq!(shelves.len(), 2);
        assert_eq!(shelves[0].expected_location("milk"), Some("R1"));
        assert_eq!(shelves[0].assigned_staff.as_deref(), Some("EMP001"));
        assert_eq!(shelves[1].shelf_id, "C3");
        assert_eq!(shelves[1].capacity, 0);
        assert_eq!(db.all_staff().unwrap().len(), 1);
    }

    #[test]
    fn csv_seeding() {
        let (dir, db) = open_temp_db();
        let shelves = dir.path().join("shelves.csv");
        std::fs::write(&shelves, "shelf_id,capacity,assigned_staff\nA1,40,EMP001\nB2,20,\n\n").unwrap();
        let inventory = dir.path().join("inventory.csv");
        std::fs::write(
            &inventory,
            "shelf_id,product_name,location,category\nA1,Milk,R1,dairy\nB2,Bread,R3\n",
        )
        .unwrap();
        let staff = dir.path().join("staff.csv");
        std::fs::write(&staff, "staff_id,name,role,active\nEMP001,Dana,staff,true\nEMP002,Lee,manager,false\n")
            .unwrap();

        assert_eq!(db.load_shelves_from_csv(&shelves).unwrap(), 2);
        assert_eq!(db.load_inventory_from_csv(&inventory).unwrap(), 2);
        assert_eq!(db.load_staff_from_csv(&staff).unwrap(), 2);

        let shelves = db.all_shelves().unwrap();
        assert_eq!(shelves[1].expected_location("bread"), Some("R3"));
        assert!(shelves[1].assigned_staff.is_none());
        let staff = db.all_staff().unwrap();
        assert!(staff[0].active);
        assert!(!staff[1].active);
    }
}
