//! Table layout. Table and column names stay compatible with databases
//! created by earlier releases of the harness.

/// Tables a supervisor cannot run without.
pub const REQUIRED_TABLES: &[&str] = &[
    "autorun_components",
    "component_lifecycle_log",
    "db_access_log",
];

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS autorun_components (
    component_id TEXT PRIMARY KEY,
    base_script_name TEXT NOT NULL,
    manager_affinity TEXT NOT NULL,
    desired_state TEXT NOT NULL DEFAULT 'active'
        CHECK (desired_state IN ('active', 'inactive')),
    launch_args_json TEXT DEFAULT '{}',
    run_type_on_boot TEXT DEFAULT 'PRIMARY_RUN',
    description TEXT,
    created_timestamp TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    modified_timestamp TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_ac_manager ON autorun_components (manager_affinity);
CREATE INDEX IF NOT EXISTS idx_ac_state ON autorun_components (desired_state);

CREATE TRIGGER IF NOT EXISTS update_autorun_timestamp
AFTER UPDATE ON autorun_components
FOR EACH ROW
BEGIN
    UPDATE autorun_components
    SET modified_timestamp = CURRENT_TIMESTAMP
    WHERE component_id = NEW.component_id;
END;

CREATE TABLE IF NOT EXISTS component_lifecycle_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_timestamp TIMESTAMP DEFAULT CURRENT_TIMESTAMP NOT NULL,
    component_id TEXT NOT NULL,
    process_pid INTEGER,
    event_type TEXT NOT NULL,
    run_type TEXT,
    message TEXT,
    manager_script TEXT,
    script_path TEXT
);

CREATE INDEX IF NOT EXISTS idx_cll_component_id ON component_lifecycle_log (component_id);
CREATE INDEX IF NOT EXISTS idx_cll_event_type ON component_lifecycle_log (event_type);
CREATE INDEX IF NOT EXISTS idx_cll_timestamp ON component_lifecycle_log (event_timestamp);

CREATE TABLE IF NOT EXISTS db_access_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TIMESTAMP DEFAULT CURRENT_TIMESTAMP NOT NULL,
    component_id TEXT NOT NULL,
    table_name TEXT NOT NULL,
    access_type TEXT NOT NULL CHECK (access_type IN ('READ', 'WRITE'))
);

CREATE INDEX IF NOT EXISTS idx_dal_component_id ON db_access_log (component_id);

CREATE TABLE IF NOT EXISTS system_metrics_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TIMESTAMP DEFAULT CURRENT_TIMESTAMP NOT NULL,
    cpu_temp REAL,
    cpu_usage REAL NOT NULL,
    mem_usage REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_metrics_timestamp ON system_metrics_log (timestamp);
"#;

pub(crate) fn create(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}

pub(crate) fn missing_tables(conn: &rusqlite::Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
    let mut missing = Vec::new();
    for table in REQUIRED_TABLES {
        if !stmt.exists([*table])? {
            missing.push(table.to_string());
        }
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_is_idempotent() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        assert_eq!(missing_tables(&conn).unwrap().len(), REQUIRED_TABLES.len());

        create(&conn).unwrap();
        create(&conn).unwrap();

        assert!(missing_tables(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_desired_state_is_constrained() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        create(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO autorun_components (component_id, base_script_name, manager_affinity, desired_state)
             VALUES ('x', 'x.py', 'daemon_manager', 'paused')",
            [],
        );
        assert!(result.is_err());
    }
}
