//! Data-access provenance log (`db_access_log`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio_rusqlite::Connection;
use tracing::warn;

use crate::error::StoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessType {
    Read,
    Write,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Read => "READ",
            AccessType::Write => "WRITE",
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "READ" => Ok(AccessType::Read),
            "WRITE" => Ok(AccessType::Write),
            other => Err(format!("unknown access type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessEntry {
    pub timestamp: String,
    pub component_id: String,
    pub table_name: String,
    pub access_type: AccessType,
}

#[derive(Clone)]
pub struct AccessLog {
    conn: Connection,
}

impl AccessLog {
    pub(crate) fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub async fn try_record_access(
        &self,
        component_id: &str,
        table_name: &str,
        access_type: AccessType,
    ) -> StoreResult<()> {
        let component_id = component_id.to_string();
        let table_name = table_name.to_string();
        self.conn
            .call(move |conn: &mut rusqlite::Connection| {
                conn.execute(
                    "INSERT INTO db_access_log (component_id, table_name, access_type) VALUES (?1, ?2, ?3)",
                    rusqlite::params![component_id, table_name, access_type.as_str()],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Record which table a component touched. Failures are logged and
    /// swallowed; the return value only says whether the row was written.
    pub async fn record_access(&self, component_id: &str, table_name: &str, access_type: AccessType) -> bool {
        match self.try_record_access(component_id, table_name, access_type).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Failed to record {} access to {} by {}: {}",
                    access_type, table_name, component_id, e
                );
                false
            }
        }
    }

    pub async fn entries_for(&self, component_id: &str) -> StoreResult<Vec<AccessEntry>> {
        let component_id = component_id.to_string();
        let rows = self
            .conn
            .call(move |conn: &mut rusqlite::Connection| {
                let mut stmt = conn.prepare(
                    "SELECT timestamp, component_id, table_name, access_type FROM db_access_log \
                     WHERE component_id = ?1 ORDER BY id",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![component_id], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(timestamp, component_id, table_name, access_type)| {
                let access_type = access_type.parse().ok()?;
                Some(AccessEntry {
                    timestamp,
                    component_id,
                    table_name,
                    access_type,
                })
            })
            .collect())
    }
}
