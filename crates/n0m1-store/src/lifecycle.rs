//! Append-only lifecycle event log (`component_lifecycle_log`).
//!
//! Rows are inserted once and never updated or deleted. Recording is
//! best-effort: [`LifecycleLog::record_event`] never returns an error, so a
//! broken database cannot take down the operation being logged.

use n0m1_common::ComponentId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio_rusqlite::Connection;
use tracing::{debug, warn};

use crate::error::StoreResult;

/// Kind of lifecycle transition. The column is free text, so unknown kinds
/// written by other tools round-trip through [`EventKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum EventKind {
    StartAttempt,
    StartedSuccessfully,
    StartFailed,
    StopRequested,
    StoppedSuccessfully,
    StoppedForcefully,
    StopFailed,
    ManagerStarted,
    ManagerCrashed,
    ManagerNotRestarted,
    ManagerShutdownRequested,
    ManagerStopped,
    Error,
    CriticalError,
    Other(String),
}

impl EventKind {
    /// Kinds reported as errors by status tooling.
    pub const ERROR_KINDS: &'static [&'static str] = &[
        "ERROR",
        "CRITICAL_ERROR",
        "START_FAILED",
        "STOP_FAILED",
        "MANAGER_CRASHED",
    ];

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::StartAttempt => "START_ATTEMPT",
            EventKind::StartedSuccessfully => "STARTED_SUCCESSFULLY",
            EventKind::StartFailed => "START_FAILED",
            EventKind::StopRequested => "STOP_REQUESTED",
            EventKind::StoppedSuccessfully => "STOPPED_SUCCESSFULLY",
            EventKind::StoppedForcefully => "STOPPED_FORCEFULLY",
            EventKind::StopFailed => "STOP_FAILED",
            EventKind::ManagerStarted => "MANAGER_STARTED",
            EventKind::ManagerCrashed => "MANAGER_CRASHED",
            EventKind::ManagerNotRestarted => "MANAGER_NOT_RESTARTED",
            EventKind::ManagerShutdownRequested => "MANAGER_SHUTDOWN_REQUESTED",
            EventKind::ManagerStopped => "MANAGER_STOPPED",
            EventKind::Error => "ERROR",
            EventKind::CriticalError => "CRITICAL_ERROR",
            EventKind::Other(kind) => kind,
        }
    }
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        match s {
            "START_ATTEMPT" => EventKind::StartAttempt,
            "STARTED_SUCCESSFULLY" => EventKind::StartedSuccessfully,
            "START_FAILED" => EventKind::StartFailed,
            "STOP_REQUESTED" => EventKind::StopRequested,
            "STOPPED_SUCCESSFULLY" => EventKind::StoppedSuccessfully,
            "STOPPED_FORCEFULLY" => EventKind::StoppedForcefully,
            "STOP_FAILED" => EventKind::StopFailed,
            "MANAGER_STARTED" => EventKind::ManagerStarted,
            "MANAGER_CRASHED" => EventKind::ManagerCrashed,
            "MANAGER_NOT_RESTARTED" => EventKind::ManagerNotRestarted,
            "MANAGER_SHUTDOWN_REQUESTED" => EventKind::ManagerShutdownRequested,
            "MANAGER_STOPPED" => EventKind::ManagerStopped,
            "ERROR" => EventKind::Error,
            "CRITICAL_ERROR" => EventKind::CriticalError,
            other => EventKind::Other(other.to_string()),
        }
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        EventKind::from(s.as_str())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// An event about to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleEvent {
    pub component_id: ComponentId,
    pub pid: Option<u32>,
    pub kind: EventKind,
    pub run_classification: Option<String>,
    pub message: Option<String>,
    /// Supervisor (or orchestrator) that observed the transition.
    pub supervisor: Option<String>,
    pub source_path: Option<String>,
}

impl LifecycleEvent {
    pub fn new(component_id: impl Into<ComponentId>, kind: EventKind) -> Self {
        Self {
            component_id: component_id.into(),
            pid: None,
            kind,
            run_classification: None,
            message: None,
            supervisor: None,
            source_path: None,
        }
    }

    pub fn pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    pub fn run_classification(mut self, run_classification: Option<&str>) -> Self {
        self.run_classification = run_classification.map(str::to_string);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn supervisor(mut self, supervisor: impl Into<String>) -> Self {
        self.supervisor = Some(supervisor.into());
        self
    }

    pub fn source_path(mut self, path: Option<String>) -> Self {
        self.source_path = path;
        self
    }
}

/// A stored event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub timestamp: String,
    pub component_id: String,
    pub pid: Option<u32>,
    pub kind: EventKind,
    pub run_classification: Option<String>,
    pub message: Option<String>,
    pub supervisor: Option<String>,
    pub source_path: Option<String>,
}

impl EventRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let pid: Option<i64> = row.get(3)?;
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            component_id: row.get(2)?,
            pid: pid.and_then(|p| u32::try_from(p).ok()),
            kind: EventKind::from(row.get::<_, String>(4)?),
            run_classification: row.get(5)?,
            message: row.get(6)?,
            supervisor: row.get(7)?,
            source_path: row.get(8)?,
        })
    }
}

const EVENT_COLUMNS: &str = "id, event_timestamp, component_id, process_pid, event_type, run_type, \
     message, manager_script, script_path";

/// Latest recent event of one registry row, joined with its registry state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentOverview {
    pub component_id: String,
    pub desired_state: String,
    pub supervisor: String,
    pub last_event: Option<EventKind>,
    pub last_event_time: Option<String>,
    pub pid: Option<u32>,
}

fn window_modifier(window: Duration) -> String {
    format!("-{} seconds", window.as_secs())
}

#[derive(Clone)]
pub struct LifecycleLog {
    conn: Connection,
}

impl LifecycleLog {
    pub(crate) fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Insert one event, surfacing storage errors.
    pub async fn try_record(&self, event: LifecycleEvent) -> StoreResult<()> {
        self.conn
            .call(move |conn: &mut rusqlite::Connection| {
                conn.execute(
                    "INSERT INTO component_lifecycle_log \
                     (component_id, process_pid, event_type, run_type, message, manager_script, script_path) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        event.component_id.as_str(),
                        event.pid,
                        event.kind.as_str(),
                        event.run_classification,
                        event.message,
                        event.supervisor,
                        event.source_path,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Insert one event. Storage failures are logged and swallowed; the
    /// return value only says whether the row was written.
    pub async fn record_event(&self, event: LifecycleEvent) -> bool {
        let summary = format!("{} {} (PID {:?})", event.component_id, event.kind, event.pid);
        match self.try_record(event).await {
            Ok(()) => {
                debug!("Lifecycle event recorded: {}", summary);
                true
            }
            Err(e) => {
                warn!("Failed to record lifecycle event {}: {}", summary, e);
                false
            }
        }
    }

    /// Full history of one component, oldest first.
    pub async fn events_for(&self, component_id: &ComponentId) -> StoreResult<Vec<EventRecord>> {
        let key = component_id.as_str().to_string();
        let events = self
            .conn
            .call(move |conn: &mut rusqlite::Connection| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM component_lifecycle_log WHERE component_id = ?1 ORDER BY id",
                    EVENT_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![key], EventRecord::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(events)
    }

    /// Most recent event per component id starting with `prefix`, within
    /// `window`. Used for the orchestrator's `boot_<name>` entries.
    pub async fn latest_with_prefix(&self, prefix: &str, window: Duration) -> StoreResult<Vec<EventRecord>> {
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let modifier = window_modifier(window);
        let events = self
            .conn
            .call(move |conn: &mut rusqlite::Connection| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {cols} FROM ( \
                         SELECT *, ROW_NUMBER() OVER ( \
                             PARTITION BY component_id ORDER BY event_timestamp DESC, id DESC) AS rn \
                         FROM component_lifecycle_log \
                         WHERE component_id LIKE ?1 ESCAPE '\\' \
                           AND event_timestamp > datetime('now', ?2) \
                     ) WHERE rn = 1 ORDER BY component_id",
                    cols = EVENT_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![pattern, modifier], EventRecord::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(events)
    }

    /// Every registry row with its latest event inside `window`.
    pub async fn component_overview(&self, window: Duration) -> StoreResult<Vec<ComponentOverview>> {
        let modifier = window_modifier(window);
        let rows = self
            .conn
            .call(move |conn: &mut rusqlite::Connection| {
                let mut stmt = conn.prepare(
                    "SELECT ac.component_id, ac.desired_state, ac.manager_affinity, \
                            cl.event_type, cl.event_timestamp, cl.process_pid \
                     FROM autorun_components ac \
                     LEFT JOIN ( \
                         SELECT component_id, event_type, event_timestamp, process_pid, \
                                ROW_NUMBER() OVER ( \
                                    PARTITION BY component_id ORDER BY event_timestamp DESC, id DESC) AS rn \
                         FROM component_lifecycle_log \
                         WHERE event_timestamp > datetime('now', ?1) \
                     ) cl ON ac.component_id = cl.component_id AND cl.rn = 1 \
                     ORDER BY ac.manager_affinity, ac.component_id",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![modifier], |row| {
                        let event: Option<String> = row.get(3)?;
                        let pid: Option<i64> = row.get(5)?;
                        Ok(ComponentOverview {
                            component_id: row.get(0)?,
                            desired_state: row.get(1)?,
                            supervisor: row.get(2)?,
                            last_event: event.map(EventKind::from),
                            last_event_time: row.get(4)?,
                            pid: pid.and_then(|p| u32::try_from(p).ok()),
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    /// Error-kind events inside `window`, newest first.
    pub async fn recent_errors(&self, window: Duration, limit: usize) -> StoreResult<Vec<EventRecord>> {
        let modifier = window_modifier(window);
        let kinds: Vec<String> = EventKind::ERROR_KINDS
            .iter()
            .map(|k| format!("'{}'", k))
            .collect();
        let sql = format!(
            "SELECT {} FROM component_lifecycle_log \
             WHERE event_type IN ({}) AND event_timestamp > datetime('now', ?1) \
             ORDER BY event_timestamp DESC, id DESC LIMIT ?2",
            EVENT_COLUMNS,
            kinds.join(", ")
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let events = self
            .conn
            .call(move |conn: &mut rusqlite::Connection| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params![modifier, limit], EventRecord::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::NewComponent;
    use crate::Store;
    use n0m1_common::DesiredState;

    const HOUR: Duration = Duration::from_secs(3600);

    async fn store() -> Store {
        let store = Store::open_in_memory().await.unwrap();
        store.ensure_schema().await.unwrap();
        store
    }

    #[test]
    fn test_event_kind_round_trip() {
        for kind in [
            EventKind::StartAttempt,
            EventKind::StoppedForcefully,
            EventKind::ManagerShutdownRequested,
        ] {
            assert_eq!(EventKind::from(kind.as_str()), kind);
        }
        assert_eq!(
            EventKind::from("CUSTOM_KIND"),
            EventKind::Other("CUSTOM_KIND".to_string())
        );
    }

    #[tokio::test]
    async fn test_record_and_read_history() {
        let store = store().await;
        let log = store.lifecycle();
        let id = ComponentId::from("tempd");

        assert!(
            log.record_event(
                LifecycleEvent::new(id.clone(), EventKind::StartAttempt)
                    .run_classification(Some("PRIMARY_RUN"))
                    .supervisor("daemon_mgr")
                    .source_path(Some("/opt/n0m1/tempd.py".to_string()))
            )
            .await
        );
        assert!(
            log.record_event(
                LifecycleEvent::new(id.clone(), EventKind::StartedSuccessfully)
                    .pid(Some(4242))
                    .message("Started")
            )
            .await
        );

        let events = log.events_for(&id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::StartAttempt);
        assert_eq!(events[0].pid, None);
        assert_eq!(events[0].supervisor.as_deref(), Some("daemon_mgr"));
        assert_eq!(events[1].pid, Some(4242));
        assert_eq!(events[1].message.as_deref(), Some("Started"));
    }

    #[tokio::test]
    async fn test_unavailable_storage_is_not_fatal() {
        let store = Store::open_in_memory().await.unwrap();
        let written = store
            .lifecycle()
            .record_event(LifecycleEvent::new("tempd", EventKind::StartAttempt))
            .await;
        assert!(!written);
    }

    #[tokio::test]
    async fn test_latest_with_prefix_keeps_one_row_per_component() {
        let store = store().await;
        let log = store.lifecycle();
        log.record_event(LifecycleEvent::new("boot_daemon_manager", EventKind::ManagerStarted).pid(Some(10)))
            .await;
        log.record_event(LifecycleEvent::new("boot_daemon_manager", EventKind::ManagerCrashed).pid(Some(10)))
            .await;
        log.record_event(LifecycleEvent::new("boot_nano_manager", EventKind::ManagerStarted).pid(Some(11)))
            .await;
        log.record_event(LifecycleEvent::new("bootleg", EventKind::StartAttempt)).await;

        let latest = log.latest_with_prefix("boot_", HOUR).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].component_id, "boot_daemon_manager");
        assert_eq!(latest[0].kind, EventKind::ManagerCrashed);
        assert_eq!(latest[1].kind, EventKind::ManagerStarted);
    }

    #[tokio::test]
    async fn test_component_overview_and_errors() {
        let store = store().await;
        let registry = store.registry();
        registry
            .insert_component(&NewComponent::new("a", "a.py", "daemon_mgr", DesiredState::Active))
            .await
            .unwrap();
        registry
            .insert_component(&NewComponent::new("b", "b.py", "daemon_mgr", DesiredState::Inactive))
            .await
            .unwrap();

        let log = store.lifecycle();
        log.record_event(LifecycleEvent::new("a", EventKind::StartAttempt)).await;
        log.record_event(LifecycleEvent::new("a", EventKind::StartFailed).message("boom"))
            .await;

        let overview = log.component_overview(HOUR).await.unwrap();
        assert_eq!(overview.len(), 2);
        assert_eq!(overview[0].last_event, Some(EventKind::StartFailed));
        assert_eq!(overview[1].component_id, "b");
        assert_eq!(overview[1].last_event, None);

        let errors = log.recent_errors(HOUR, 10).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message.as_deref(), Some("boom"));
    }
}
