use n0m1_common::{ComponentId, ProcessError, SupervisorId};
use n0m1_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("Component not found in registry: {0}")]
    NotFound(ComponentId),

    #[error("Component {component} is owned by {owner}, not {supervisor}")]
    NotOwned {
        component: ComponentId,
        owner: SupervisorId,
        supervisor: SupervisorId,
    },

    #[error("Critical component(s) failed to start: {}", format_ids(.0))]
    CriticalStartFailed(Vec<ComponentId>),

    #[error("Configuration error: {0}")]
    Config(String),
}

fn format_ids(ids: &[ComponentId]) -> String {
    ids.iter().map(ComponentId::as_str).collect::<Vec<_>>().join(", ")
}

pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = SupervisorError::CriticalStartFailed(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Critical component(s) failed to start: a, b");

        let err = SupervisorError::NotOwned {
            component: "tempd".into(),
            owner: "daemon_manager".into(),
            supervisor: "nano_manager".into(),
        };
        assert!(err.to_string().contains("owned by daemon_manager"));
    }
}
