use rusqlite::Connection;

pub fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS alerts (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            shelf_id         TEXT NOT NULL,
            alert_type       TEXT NOT NULL,
            priority         TEXT NOT NULL,
            status           TEXT NOT NULL,
            title            TEXT NOT NULL,
            message          TEXT NOT NULL,
            product          TEXT,
            correct_location TEXT,
            empty_percentage REAL,
            assigned_staff   TEXT,
            created_by       TEXT NOT NULL,
            created_at       TEXT NOT NULL,
            updated_at       TEXT NOT NULL,
            acknowledged_at  TEXT,
            resolved_at      TEXT
        );

        -- At most one active stock-level alert per (shelf, type).
        CREATE UNIQUE INDEX IF NOT EXISTS idx_alerts_active_stock
            ON alerts(shelf_id, alert_type)
            WHERE status = 'active' AND alert_type != 'misplaced_item';

        CREATE INDEX IF NOT EXISTS idx_alerts_shelf_status ON alerts(shelf_id, status);
        CREATE INDEX IF NOT EXISTS idx_alerts_assigned ON alerts(assigned_staff, status);

        CREATE TABLE IF NOT EXISTS alert_history (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            alert_id  INTEGER NOT NULL REFERENCES alerts(id),
            action    TEXT NOT NULL,
            actor     TEXT NOT NULL,
            note      TEXT,
            timestamp TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_alert_history_alert ON alert_history(alert_id, id);

        CREATE TRIGGER IF NOT EXISTS alert_history_no_update
            BEFORE UPDATE ON alert_history
            BEGIN SELECT RAISE(ABORT, 'alert history is append-only'); END;

        CREATE TRIGGER IF NOT EXISTS alert_history_no_delete
            BEFORE DELETE ON alert_history
            BEGIN SELECT RAISE(ABORT, 'alert history is append-only'); END;

        CREATE TRIGGER IF NOT EXISTS alerts_no_delete
            BEFORE DELETE ON alerts
            BEGIN SELECT RAISE(ABORT, 'alerts are never deleted'); END;

        CREATE TABLE IF NOT EXISTS shelves (
            shelf_id       TEXT PRIMARY KEY,
            capacity       INTEGER NOT NULL,
            assigned_staff TEXT
        );

        CREATE TABLE IF NOT EXISTS inventory (
            shelf_id     TEXT NOT NULL,
            product_name TEXT NOT NULL,
            location     TEXT NOT NULL,
            category     TEXT,
            PRIMARY KEY (shelf_id, product_name)
        );

        CREATE TABLE IF NOT EXISTS staff (
            staff_id TEXT PRIMARY KEY,
            name     TEXT NOT NULL,
            role     TEXT NOT NULL,
            active   INTEGER NOT NULL DEFAULT 1
        );
        ",
    )?;
    Ok(())
}
