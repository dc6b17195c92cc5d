//! # n0m1 Store
//!
//! Shared SQLite state of the harness. Supervisors, the boot orchestrator
//! and the control tool all open the same database file; the registry and
//! the logs are the only state they share.
//!
//! Every operation is a single short statement (or transaction) on a
//! `tokio_rusqlite` connection. WAL mode plus a busy timeout let several
//! supervisor processes use the file at once.

pub mod access;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod registry;
pub mod schema;

use std::path::{Path, PathBuf};
use tokio_rusqlite::Connection;
use tracing::{debug, info};

pub use access::{AccessEntry, AccessLog, AccessType};
pub use error::{StoreError, StoreResult};
pub use lifecycle::{ComponentOverview, EventKind, EventRecord, LifecycleEvent, LifecycleLog};
pub use metrics::{MetricSample, MetricStat, MetricsLog, MetricsSummary};
pub use registry::{default_components, ManagedComponent, NewComponent, Registry};
pub use schema::REQUIRED_TABLES;

const BUSY_TIMEOUT_MS: i64 = 5000;

/// Handle to the shared database. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    path: PathBuf,
    conn: Connection,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish_non_exhaustive()
    }
}

impl Store {
    /// Open (creating if needed) the database file. The schema is not
    /// touched; call [`Store::ensure_schema`] for that.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path).await?;
        conn.call(|conn: &mut rusqlite::Connection| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS)?;
            Ok(())
        })
        .await?;

        debug!("Opened database {}", path.display());
        Ok(Self { path, conn })
    }

    /// Private in-memory database, used by tests and dry runs.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open(":memory:").await?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create every table, index and trigger that is missing.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        self.conn
            .call(|conn: &mut rusqlite::Connection| Ok(schema::create(conn)?))
            .await?;
        Ok(())
    }

    /// Required tables that do not exist yet.
    pub async fn missing_tables(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .conn
            .call(|conn: &mut rusqlite::Connection| Ok(schema::missing_tables(conn)?))
            .await?)
    }

    /// Insert the default component set, skipping ids that already exist.
    /// Returns how many rows were added.
    pub async fn seed_defaults(&self) -> StoreResult<usize> {
        let registry = self.registry();
        let mut added = 0;
        for component in default_components() {
            if registry.insert_component(&component).await? {
                info!("Added component: {} ({})", component.id, component.desired_state);
                added += 1;
            } else {
                debug!("Component already exists: {}", component.id);
            }
        }
        Ok(added)
    }

    pub fn registry(&self) -> Registry {
        Registry::new(self.conn.clone())
    }

    pub fn lifecycle(&self) -> LifecycleLog {
        LifecycleLog::new(self.conn.clone())
    }

    pub fn access(&self) -> AccessLog {
        AccessLog::new(self.conn.clone())
    }

    pub fn metrics(&self) -> MetricsLog {
        MetricsLog::new(self.conn.clone())
    }

    #[cfg(test)]
    pub(crate) async fn raw_execute(&self, sql: &'static str) -> StoreResult<()> {
        self.conn
            .call(move |conn: &mut rusqlite::Connection| {
                conn.execute_batch(sql)?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use n0m1_common::SupervisorId;

    #[tokio::test]
    async fn test_file_database_is_shared_between_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("n0m1_agi.db");

        let first = Store::open(&path).await.unwrap();
        assert_eq!(first.missing_tables().await.unwrap().len(), REQUIRED_TABLES.len());
        first.ensure_schema().await.unwrap();
        assert_eq!(first.seed_defaults().await.unwrap(), 6);

        let second = Store::open(&path).await.unwrap();
        assert!(second.missing_tables().await.unwrap().is_empty());
        assert_eq!(second.seed_defaults().await.unwrap(), 0);

        let nano = second
            .registry()
            .list_components_for(&SupervisorId::from("nano_manager"))
            .await
            .unwrap();
        assert_eq!(nano.len(), 2);
    }

    #[tokio::test]
    async fn test_debug_names_the_database() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("n0m1_agi.db")).await.unwrap();

        let printed = format!("{:?}", store);
        assert!(printed.starts_with("Store"));
        assert!(printed.contains("n0m1_agi.db"));

        let ok: StoreResult<Store> = Ok(store);
        assert!(format!("{:?}", ok).starts_with("Ok(Store"));
    }
}
