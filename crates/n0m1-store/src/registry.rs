//! Component registry: the durable desired-state table.
//!
//! Each supervisor only ever reads its own partition
//! (`manager_affinity = <supervisor id>`), which is what lets several
//! supervisors run side by side without talking to each other.

use n0m1_common::{ComponentId, DesiredState, SupervisorId, DEFAULT_RUN_CLASSIFICATION};
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::Connection;
use tracing::{debug, warn};

use crate::access::{AccessLog, AccessType};
use crate::error::{StoreError, StoreResult};

const TABLE: &str = "autorun_components";

const SELECT_COLUMNS: &str = "component_id, base_script_name, manager_affinity, desired_state, \
     launch_args_json, run_type_on_boot, description, created_timestamp, modified_timestamp";

/// One registry row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedComponent {
    pub id: ComponentId,
    /// Script or binary, relative to the supervisor's scripts directory.
    pub launch_command: String,
    pub supervisor: SupervisorId,
    pub desired_state: DesiredState,
    /// Serialized flag -> value mapping, kept raw; parsing is the launcher's job.
    pub launch_arguments: String,
    pub run_classification: String,
    pub description: Option<String>,
    pub created_at: Option<String>,
    pub modified_at: Option<String>,
}

/// A row to insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewComponent {
    pub id: ComponentId,
    pub launch_command: String,
    pub supervisor: SupervisorId,
    pub desired_state: DesiredState,
    #[serde(default = "default_launch_arguments")]
    pub launch_arguments: String,
    #[serde(default = "default_run_classification")]
    pub run_classification: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_launch_arguments() -> String {
    "{}".to_string()
}

fn default_run_classification() -> String {
    DEFAULT_RUN_CLASSIFICATION.to_string()
}

impl NewComponent {
    pub fn new(
        id: impl Into<ComponentId>,
        launch_command: impl Into<String>,
        supervisor: impl Into<SupervisorId>,
        desired_state: DesiredState,
    ) -> Self {
        Self {
            id: id.into(),
            launch_command: launch_command.into(),
            supervisor: supervisor.into(),
            desired_state,
            launch_arguments: default_launch_arguments(),
            run_classification: default_run_classification(),
            description: None,
        }
    }

    pub fn with_launch_arguments(mut self, serialized: impl Into<String>) -> Self {
        self.launch_arguments = serialized.into();
        self
    }

    pub fn with_run_classification(mut self, run_classification: impl Into<String>) -> Self {
        self.run_classification = run_classification.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Row as it comes out of SQLite, before the desired state is validated.
struct RawRow {
    id: String,
    launch_command: String,
    supervisor: String,
    desired_state: String,
    launch_arguments: Option<String>,
    run_classification: Option<String>,
    description: Option<String>,
    created_at: Option<String>,
    modified_at: Option<String>,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            launch_command: row.get(1)?,
            supervisor: row.get(2)?,
            desired_state: row.get(3)?,
            launch_arguments: row.get(4)?,
            run_classification: row.get(5)?,
            description: row.get(6)?,
            created_at: row.get(7)?,
            modified_at: row.get(8)?,
        })
    }

    fn into_component(self) -> StoreResult<ManagedComponent> {
        let desired_state = self.desired_state.parse::<DesiredState>().map_err(|_| {
            StoreError::InvalidValue {
                table: TABLE,
                column: "desired_state",
                key: self.id.clone(),
                value: self.desired_state.clone(),
            }
        })?;

        Ok(ManagedComponent {
            id: ComponentId::from(self.id),
            launch_command: self.launch_command,
            supervisor: SupervisorId::from(self.supervisor),
            desired_state,
            launch_arguments: self.launch_arguments.unwrap_or_else(default_launch_arguments),
            run_classification: self
                .run_classification
                .filter(|s| !s.is_empty())
                .unwrap_or_else(default_run_classification),
            description: self.description,
            created_at: self.created_at,
            modified_at: self.modified_at,
        })
    }
}

/// Typed access to `autorun_components`.
#[derive(Clone)]
pub struct Registry {
    conn: Connection,
    access: AccessLog,
}

impl Registry {
    pub(crate) fn new(conn: Connection) -> Self {
        let access = AccessLog::new(conn.clone());
        Self { conn, access }
    }

    /// Rows owned by `supervisor`, in insertion order.
    ///
    /// Rows with an unreadable desired state are skipped with a warning so
    /// one bad row cannot stall the rest of the partition. The read is
    /// recorded in the access log under the supervisor's id.
    pub async fn list_components_for(&self, supervisor: &SupervisorId) -> StoreResult<Vec<ManagedComponent>> {
        let owner = supervisor.as_str().to_string();
        let rows = self
            .conn
            .call(move |conn: &mut rusqlite::Connection| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM {} WHERE manager_affinity = ?1 ORDER BY rowid",
                    SELECT_COLUMNS, TABLE
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![owner], RawRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        self.access
            .record_access(supervisor.as_str(), TABLE, AccessType::Read)
            .await;

        let components = rows
            .into_iter()
            .filter_map(|row| match row.into_component() {
                Ok(component) => Some(component),
                Err(e) => {
                    warn!("Skipping registry row: {}", e);
                    None
                }
            })
            .collect::<Vec<_>>();

        debug!(
            "Registry returned {} component(s) for {}",
            components.len(),
            supervisor
        );
        Ok(components)
    }

    pub async fn get_component(&self, id: &ComponentId) -> StoreResult<Option<ManagedComponent>> {
        let key = id.as_str().to_string();
        let row = self
            .conn
            .call(move |conn: &mut rusqlite::Connection| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {} FROM {} WHERE component_id = ?1", SELECT_COLUMNS, TABLE),
                        rusqlite::params![key],
                        RawRow::from_row,
                    )
                    .optional()?)
            })
            .await?;

        row.map(RawRow::into_component).transpose()
    }

    /// Every row, grouped by owner.
    pub async fn list_all(&self) -> StoreResult<Vec<ManagedComponent>> {
        let rows = self
            .conn
            .call(|conn: &mut rusqlite::Connection| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM {} ORDER BY manager_affinity, component_id",
                    SELECT_COLUMNS, TABLE
                ))?;
                let rows = stmt
                    .query_map([], RawRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(RawRow::into_component).collect()
    }

    /// Update the desired state. The modification timestamp is maintained
    /// by the `update_autorun_timestamp` trigger.
    pub async fn set_desired_state(&self, id: &ComponentId, state: DesiredState) -> StoreResult<()> {
        let key = id.as_str().to_string();
        let updated = self
            .conn
            .call(move |conn: &mut rusqlite::Connection| {
                Ok(conn.execute(
                    &format!("UPDATE {} SET desired_state = ?1 WHERE component_id = ?2", TABLE),
                    rusqlite::params![state.as_str(), key],
                )?)
            })
            .await?;

        if updated == 0 {
            return Err(StoreError::ComponentNotFound(id.clone()));
        }
        debug!("Desired state of {} set to {}", id, state);
        Ok(())
    }

    /// Insert a row unless one with the same id exists. Returns whether a row
    /// was created.
    pub async fn insert_component(&self, component: &NewComponent) -> StoreResult<bool> {
        let c = component.clone();
        let inserted = self
            .conn
            .call(move |conn: &mut rusqlite::Connection| {
                Ok(conn.execute(
                    &format!(
                        "INSERT OR IGNORE INTO {} (component_id, base_script_name, manager_affinity, \
                         desired_state, launch_args_json, run_type_on_boot, description) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        TABLE
                    ),
                    rusqlite::params![
                        c.id.as_str(),
                        c.launch_command,
                        c.supervisor.as_str(),
                        c.desired_state.as_str(),
                        c.launch_arguments,
                        c.run_classification,
                        c.description,
                    ],
                )?)
            })
            .await?;

        Ok(inserted > 0)
    }
}

/// The component set a fresh installation starts with.
pub fn default_components() -> Vec<NewComponent> {
    vec![
        NewComponent::new("temp_main_daemon", "temp_main_daemon.py", "daemon_manager", DesiredState::Active)
            .with_description("CPU temperature monitoring daemon"),
        NewComponent::new(
            "system_metrics_daemon",
            "system_metrics_daemon.py",
            "daemon_manager",
            DesiredState::Active,
        )
        .with_description("Cross-platform system metrics collector"),
        NewComponent::new(
            "main_llm_processor",
            "llm_processor.py",
            "main_llm_manager",
            DesiredState::Inactive,
        )
        .with_launch_arguments(r#"{"--model": "default", "--threads": "4"}"#)
        .with_description("Main LLM processing component"),
        NewComponent::new("llm_config_daemon", "llm_config_daemon.py", "daemon_manager", DesiredState::Active)
            .with_description("Daemon that manages LLM configuration notifications"),
        NewComponent::new("nano_analyzer_01", "nano_instance.py", "nano_manager", DesiredState::Inactive)
            .with_launch_arguments(r#"{"--instance_id": "analyzer_01", "--mode": "analysis"}"#)
            .with_description("Nano instance for data analysis"),
        NewComponent::new("nano_collector_01", "nano_instance.py", "nano_manager", DesiredState::Inactive)
            .with_launch_arguments(r#"{"--instance_id": "collector_01", "--mode": "collection"}"#)
            .with_description("Nano instance for data collection"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    async fn store() -> Store {
        let store = Store::open_in_memory().await.unwrap();
        store.ensure_schema().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_partitioning_by_supervisor() {
        let store = store().await;
        let registry = store.registry();
        for component in default_components() {
            assert!(registry.insert_component(&component).await.unwrap());
        }

        let daemons = registry
            .list_components_for(&SupervisorId::from("daemon_manager"))
            .await
            .unwrap();
        let ids: Vec<_> = daemons.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["temp_main_daemon", "system_metrics_daemon", "llm_config_daemon"]);

        for supervisor in ["daemon_manager", "nano_manager", "main_llm_manager", "nobody"] {
            let owner = SupervisorId::from(supervisor);
            for component in registry.list_components_for(&owner).await.unwrap() {
                assert_eq!(component.supervisor, owner);
            }
        }
    }

    #[tokio::test]
    async fn test_listing_records_a_read_access() {
        let store = store().await;
        let owner = SupervisorId::from("nano_manager");
        store.registry().list_components_for(&owner).await.unwrap();

        let entries = store.access().entries_for("nano_manager").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].table_name, "autorun_components");
        assert_eq!(entries[0].access_type, AccessType::Read);
    }

    #[tokio::test]
    async fn test_insert_is_insert_or_ignore() {
        let store = store().await;
        let registry = store.registry();
        let component = NewComponent::new("tempd", "tempd.py", "daemon_mgr", DesiredState::Active);

        assert!(registry.insert_component(&component).await.unwrap());
        assert!(!registry
            .insert_component(&component.clone().with_description("again"))
            .await
            .unwrap());

        let row = registry.get_component(&ComponentId::from("tempd")).await.unwrap().unwrap();
        assert_eq!(row.description, None);
        assert_eq!(row.launch_arguments, "{}");
        assert_eq!(row.run_classification, DEFAULT_RUN_CLASSIFICATION);
    }

    #[tokio::test]
    async fn test_set_desired_state_updates_modified_timestamp() {
        let store = store().await;
        store
            .raw_execute(
                "INSERT INTO autorun_components (component_id, base_script_name, manager_affinity, \
                 desired_state, created_timestamp, modified_timestamp) \
                 VALUES ('tempd', 'tempd.py', 'daemon_mgr', 'active', '2000-01-01 00:00:00', '2000-01-01 00:00:00')",
            )
            .await
            .unwrap();

        let registry = store.registry();
        let id = ComponentId::from("tempd");
        registry.set_desired_state(&id, DesiredState::Inactive).await.unwrap();

        let row = registry.get_component(&id).await.unwrap().unwrap();
        assert_eq!(row.desired_state, DesiredState::Inactive);
        assert_eq!(row.created_at.as_deref(), Some("2000-01-01 00:00:00"));
        assert_ne!(row.modified_at.as_deref(), Some("2000-01-01 00:00:00"));
    }

    #[tokio::test]
    async fn test_set_desired_state_on_unknown_component() {
        let store = store().await;
        let err = store
            .registry()
            .set_desired_state(&ComponentId::from("ghost"), DesiredState::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ComponentNotFound(_)));
    }
}
