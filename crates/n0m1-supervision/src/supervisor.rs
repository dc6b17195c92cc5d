use n0m1_common::{
    decide, ComponentId, Criticality, FailureKind, PolicyDecision, Snapshot, SupervisorId,
};
use n0m1_pid_file::{HandleStatus, PidDirectory};
use n0m1_process::{validate_component_id, validate_launch_target, ProcessPlatform};
use n0m1_store::{EventKind, LifecycleEvent, LifecycleLog, ManagedComponent, Registry, Store};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::SupervisorConfig;
use crate::error::{SupervisorError, SupervisorResult};
use crate::interpreter::{build_launch_spec, launch_target};
use crate::launch_args::parse_launch_args;
use crate::stop::{StopContext, StopOptions, StopOutcome};

/// Result of the START sequence for one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { pid: u32 },
    /// A live process already holds the handle; nothing was launched.
    AlreadyRunning { pid: u32 },
    /// The component is misconfigured (bad id, missing target). Never escalated.
    Skipped { reason: String },
    /// The spawn itself failed.
    Failed { reason: String, decision: PolicyDecision },
}

impl StartOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StartOutcome::Started { .. } | StartOutcome::AlreadyRunning { .. })
    }

    pub fn is_escalated(&self) -> bool {
        matches!(
            self,
            StartOutcome::Failed {
                decision: PolicyDecision::Escalate,
                ..
            }
        )
    }
}

impl fmt::Display for StartOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartOutcome::Started { pid } => write!(f, "started (PID {})", pid),
            StartOutcome::AlreadyRunning { pid } => write!(f, "already running (PID {})", pid),
            StartOutcome::Skipped { reason } => write!(f, "skipped: {}", reason),
            StartOutcome::Failed { reason, .. } => write!(f, "start failed: {}", reason),
        }
    }
}

/// One supervisor: owns the registry rows whose affinity is its id.
pub struct Supervisor {
    id: SupervisorId,
    config: Snapshot<SupervisorConfig>,
    registry: Registry,
    events: LifecycleLog,
    platform: Arc<dyn ProcessPlatform>,
    run_override: Option<String>,
}

impl Supervisor {
    pub fn new(
        id: SupervisorId,
        config: Snapshot<SupervisorConfig>,
        store: &Store,
        platform: Arc<dyn ProcessPlatform>,
    ) -> Self {
        Self {
            id,
            config,
            registry: store.registry(),
            events: store.lifecycle(),
            platform,
            run_override: None,
        }
    }

    /// Classification used for every start and stop of this invocation,
    /// replacing each row's own.
    pub fn with_run_override(mut self, run_type: Option<String>) -> Self {
        self.run_override = run_type;
        self
    }

    pub fn id(&self) -> &SupervisorId {
        &self.id
    }

    pub fn config(&self) -> &Snapshot<SupervisorConfig> {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn platform(&self) -> &dyn ProcessPlatform {
        self.platform.as_ref()
    }

    /// PID handle directory from the current configuration.
    pub fn pid_directory(&self) -> PidDirectory {
        PidDirectory::new(self.config.load().supervisor.pid_path())
    }

    fn run_classification<'a>(&'a self, component: &'a ManagedComponent) -> &'a str {
        self.run_override
            .as_deref()
            .unwrap_or(component.run_classification.as_str())
    }

    /// Rows owned by this supervisor, in registry order.
    pub async fn owned_components(&self) -> SupervisorResult<Vec<ManagedComponent>> {
        Ok(self.registry.list_components_for(&self.id).await?)
    }

    /// Look up `id` and check that this supervisor owns it.
    pub async fn owned_component(&self, id: &ComponentId) -> SupervisorResult<ManagedComponent> {
        let component = self
            .registry
            .get_component(id)
            .await?
            .ok_or_else(|| SupervisorError::NotFound(id.clone()))?;

        if component.supervisor != self.id {
            return Err(SupervisorError::NotOwned {
                component: id.clone(),
                owner: component.supervisor,
                supervisor: self.id.clone(),
            });
        }
        Ok(component)
    }

    /// Handle status of any component, owned or not.
    pub async fn status(&self, id: &ComponentId) -> HandleStatus {
        self.pid_directory().status(id, self.platform.as_ref()).await
    }

    async fn record(&self, component: &ManagedComponent, kind: EventKind, pid: Option<u32>, message: String) {
        let target = launch_target(&self.config.load().supervisor, component);
        let event = LifecycleEvent::new(component.id.clone(), kind)
            .pid(pid)
            .run_classification(Some(self.run_classification(component)))
            .message(message)
            .supervisor(self.id.as_str())
            .source_path(Some(target.display().to_string()));
        self.events.record_event(event).await;
    }

    /// START sequence. Idempotent: a live handle means nothing is launched,
    /// a stale one is cleared first.
    pub async fn start_component(&self, component: &ManagedComponent) -> StartOutcome {
        let config = self.config.load();
        let options = &config.supervisor;
        let pids = PidDirectory::new(options.pid_path());
        let id = &component.id;

        match pids.status(id, self.platform.as_ref()).await {
            HandleStatus::Running { pid } => {
                debug!("Component {} already running (PID {})", id, pid);
                return StartOutcome::AlreadyRunning { pid };
            }
            HandleStatus::StalePid { pid } => {
                debug!("Removing stale PID handle for {} (PID {})", id, pid);
                if let Err(e) = pids.remove(id).await {
                    warn!("Failed to remove stale PID handle for {}: {}", id, e);
                }
            }
            HandleStatus::Stopped => {}
        }

        let target = launch_target(options, component);
        if let Err(e) = validate_component_id(id.as_str())
            .and_then(|()| validate_launch_target(id.as_str(), &target))
        {
            let reason = e.to_string();
            error!("Cannot start {}: {}", id, reason);
            self.record(component, EventKind::StartFailed, None, reason.clone())
                .await;
            return StartOutcome::Skipped { reason };
        }

        self.record(
            component,
            EventKind::StartAttempt,
            None,
            format!("Attempting to start {}", component.launch_command),
        )
        .await;

        let extra_args = parse_launch_args(&component.launch_arguments).unwrap_or_else(|e| {
            warn!(
                "Could not parse launch arguments for '{}' ({}): {}",
                id, component.launch_arguments, e
            );
            Vec::new()
        });

        let run_classification = self.run_classification(component);
        let spec = build_launch_spec(options, component, extra_args, run_classification);
        info!("Starting {}: {}", id, spec.command_line());

        let pid = match self.platform.launch_detached(&spec) {
            Ok(pid) => pid,
            Err(e) => {
                let criticality = Criticality::from_flag(options.is_critical(id.as_str()));
                let decision = decide(criticality, FailureKind::ComponentStartFailed);
                let reason = e.to_string();
                error!("Failed to start {} ({}): {}", id, criticality, reason);
                self.record(component, EventKind::StartFailed, None, reason.clone())
                    .await;
                return StartOutcome::Failed { reason, decision };
            }
        };

        if let Err(e) = pids.write(id, pid).await {
            // An untracked process would be invisible to every later pass.
            let reason = format!("Started PID {} but could not write PID handle: {}", pid, e);
            error!("{}", reason);
            if let Err(kill_err) = self.platform.terminate_forceful(pid) {
                warn!("Failed to kill untracked process {}: {}", pid, kill_err);
            }
            self.record(component, EventKind::StartFailed, Some(pid), reason.clone())
                .await;
            return StartOutcome::Skipped { reason };
        }

        info!("Started {} with PID {}", id, pid);
        self.record(
            component,
            EventKind::StartedSuccessfully,
            Some(pid),
            format!("Started with PID {}", pid),
        )
        .await;
        StartOutcome::Started { pid }
    }

    /// Stop a component through the stop-with-timeout protocol.
    pub async fn stop_component(&self, component: &ManagedComponent, options: &StopOptions) -> StopOutcome {
        let pids = self.pid_directory();
        let pid = pids.read(&component.id).await;
        let ctx = StopContext {
            platform: self.platform.as_ref(),
            pids: &pids,
            events: &self.events,
            supervisor: &self.id,
            run_classification: Some(self.run_classification(component)),
        };
        ctx.stop_with_timeout(&component.id, pid, options).await
    }

    pub fn stop_options(&self) -> StopOptions {
        StopOptions::from_config(&self.config.load().supervisor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterpreterMode;
    use crate::testing::FakePlatform;
    use n0m1_common::DesiredState;
    use n0m1_store::NewComponent;
    use std::path::Path;

    struct Fixture {
        dir: tempfile::TempDir,
        store: Store,
        platform: Arc<FakePlatform>,
        supervisor: Supervisor,
    }

    async fn fixture(critical: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().await.unwrap();
        store.ensure_schema().await.unwrap();

        let mut config = SupervisorConfig::default();
        config.supervisor.project_dir = dir.path().to_path_buf();
        config.supervisor.interpreter = InterpreterMode::Direct;
        config.supervisor.critical_components = critical.iter().map(|s| s.to_string()).collect();

        let platform = Arc::new(FakePlatform::default());
        let supervisor = Supervisor::new(
            SupervisorId::from("daemon_manager"),
            Snapshot::new(config),
            &store,
            platform.clone(),
        );
        Fixture {
            dir,
            store,
            platform,
            supervisor,
        }
    }

    async fn add(store: &Store, root: &Path, id: &str, args: &str, with_target: bool) -> ManagedComponent {
        let script = format!("{}.sh", id);
        if with_target {
            std::fs::write(root.join(&script), "#!/bin/sh\n").unwrap();
        }
        let row = NewComponent::new(id, script, "daemon_manager", DesiredState::Active)
            .with_launch_arguments(args);
        store.registry().insert_component(&row).await.unwrap();
        store
            .registry()
            .get_component(&ComponentId::from(id))
            .await
            .unwrap()
            .unwrap()
    }

    async fn kinds(store: &Store, id: &str) -> Vec<String> {
        store
            .lifecycle()
            .events_for(&ComponentId::from(id))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.kind.to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_start_writes_handle_and_events() {
        let f = fixture(&[]).await;
        let component = add(&f.store, f.dir.path(), "tempd", r#"{"--interval": "5"}"#, true).await;

        let outcome = f.supervisor.start_component(&component).await;

        let pid = match outcome {
            StartOutcome::Started { pid } => pid,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(f.supervisor.pid_directory().read(&component.id).await, Some(pid));
        assert_eq!(kinds(&f.store, "tempd").await, vec!["START_ATTEMPT", "STARTED_SUCCESSFULLY"]);

        let launched = f.platform.launched();
        assert_eq!(
            launched[0].args,
            vec!["--interval", "5", "--run_type", "PRIMARY_RUN"]
        );

        let events = f.store.lifecycle().events_for(&component.id).await.unwrap();
        assert_eq!(events[1].pid, Some(pid));
        assert_eq!(events[1].run_classification.as_deref(), Some("PRIMARY_RUN"));
        assert_eq!(events[1].supervisor.as_deref(), Some("daemon_manager"));
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let f = fixture(&[]).await;
        let component = add(&f.store, f.dir.path(), "tempd", "{}", true).await;

        let first = f.supervisor.start_component(&component).await;
        let second = f.supervisor.start_component(&component).await;

        let StartOutcome::Started { pid } = first else {
            panic!("first start failed: {:?}", first);
        };
        assert_eq!(second, StartOutcome::AlreadyRunning { pid });
        assert_eq!(f.platform.launched().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_target_is_skipped_without_attempt() {
        let f = fixture(&[]).await;
        let component = add(&f.store, f.dir.path(), "ghost", "{}", false).await;

        let outcome = f.supervisor.start_component(&component).await;

        assert!(matches!(outcome, StartOutcome::Skipped { .. }));
        assert!(!outcome.is_escalated());
        assert_eq!(kinds(&f.store, "ghost").await, vec!["START_FAILED"]);
        assert!(f.platform.launched().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_args_still_start() {
        let f = fixture(&[]).await;
        let component = add(&f.store, f.dir.path(), "tempd", "{broken", true).await;

        let outcome = f.supervisor.start_component(&component).await;

        assert!(outcome.is_success());
        assert_eq!(f.platform.launched()[0].args, vec!["--run_type", "PRIMARY_RUN"]);
    }

    #[tokio::test]
    async fn test_spawn_failure_policy() {
        let f = fixture(&["critical_one"]).await;
        let critical = add(&f.store, f.dir.path(), "critical_one", "{}", true).await;
        let optional = add(&f.store, f.dir.path(), "optional_one", "{}", true).await;
        f.platform.fail_launch("critical_one");
        f.platform.fail_launch("optional_one");

        let critical_outcome = f.supervisor.start_component(&critical).await;
        let optional_outcome = f.supervisor.start_component(&optional).await;

        assert!(critical_outcome.is_escalated());
        assert!(matches!(
            optional_outcome,
            StartOutcome::Failed {
                decision: PolicyDecision::Absorb,
                ..
            }
        ));
        assert_eq!(kinds(&f.store, "critical_one").await, vec!["START_ATTEMPT", "START_FAILED"]);
        assert!(f.supervisor.pid_directory().read(&critical.id).await.is_none());
    }

    #[tokio::test]
    async fn test_run_override_is_propagated() {
        let f = fixture(&[]).await;
        let supervisor = f.supervisor.with_run_override(Some("MANUAL_RUN".to_string()));
        let component = add(&f.store, f.dir.path(), "tempd", "{}", true).await;

        supervisor.start_component(&component).await;
        supervisor
            .stop_component(&component, &StopOptions::default())
            .await;

        let events = f.store.lifecycle().events_for(&component.id).await.unwrap();
        assert_eq!(events.len(), 4);
        assert!(events
            .iter()
            .all(|e| e.run_classification.as_deref() == Some("MANUAL_RUN")));
    }

    #[tokio::test]
    async fn test_ownership_checks() {
        let f = fixture(&[]).await;
        f.store
            .registry()
            .insert_component(&NewComponent::new(
                "nano_x",
                "nano.py",
                "nano_manager",
                DesiredState::Active,
            ))
            .await
            .unwrap();

        let err = f
            .supervisor
            .owned_component(&ComponentId::from("nano_x"))
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::NotOwned { .. }));

        let err = f
            .supervisor
            .owned_component(&ComponentId::from("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::NotFound(_)));
    }
}
