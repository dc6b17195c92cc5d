//! Core domain types shared by supervisors, the boot orchestrator and tooling.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::Error;

/// Run classification used when a row does not carry one.
pub const DEFAULT_RUN_CLASSIFICATION: &str = "PRIMARY_RUN";

/// Component identifier - the registry primary key and the PID handle name.
///
/// # Example
/// ```
/// use n0m1_common::ComponentId;
///
/// let id = ComponentId::from("temp_main_daemon");
/// assert_eq!(id.as_str(), "temp_main_daemon");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ComponentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ComponentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Supervisor identity. Each registry row names exactly one owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupervisorId(String);

impl SupervisorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SupervisorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SupervisorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SupervisorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a component should be running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    Active,
    Inactive,
}

impl DesiredState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DesiredState::Active => "active",
            DesiredState::Inactive => "inactive",
        }
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DesiredState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(DesiredState::Active),
            "inactive" => Ok(DesiredState::Inactive),
            other => Err(Error::validation(format!(
                "desired state must be 'active' or 'inactive', got '{}'",
                other
            ))),
        }
    }
}
