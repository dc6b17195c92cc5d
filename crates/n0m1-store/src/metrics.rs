//! Read side of `system_metrics_log`, which metrics workers write.

use serde::{Deserialize, Serialize};
use tokio_rusqlite::Connection;

use crate::error::StoreResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: String,
    pub cpu_usage: Option<f64>,
    pub mem_usage: Option<f64>,
    pub cpu_temp: Option<f64>,
}

/// Last value and mean of one metric over a window of samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStat {
    pub last: Option<f64>,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub last_update: String,
    pub samples: usize,
    pub cpu_usage: Option<MetricStat>,
    pub mem_usage: Option<MetricStat>,
    pub cpu_temp: Option<MetricStat>,
}

impl MetricsSummary {
    /// Summarise samples ordered newest first. `None` for an empty slice.
    pub fn from_samples(samples: &[MetricSample]) -> Option<Self> {
        let newest = samples.first()?;
        Some(Self {
            last_update: newest.timestamp.clone(),
            samples: samples.len(),
            cpu_usage: stat(newest.cpu_usage, samples.iter().filter_map(|s| s.cpu_usage)),
            mem_usage: stat(newest.mem_usage, samples.iter().filter_map(|s| s.mem_usage)),
            cpu_temp: stat(newest.cpu_temp, samples.iter().filter_map(|s| s.cpu_temp)),
        })
    }
}

fn stat(last: Option<f64>, values: impl Iterator<Item = f64>) -> Option<MetricStat> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if count == 0 {
        return None;
    }
    Some(MetricStat {
        last,
        average: sum / count as f64,
    })
}

#[derive(Clone)]
pub struct MetricsLog {
    conn: Connection,
}

impl MetricsLog {
    pub(crate) fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// The `limit` newest samples, newest first.
    pub async fn recent(&self, limit: usize) -> StoreResult<Vec<MetricSample>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let samples = self
            .conn
            .call(move |conn: &mut rusqlite::Connection| {
                let mut stmt = conn.prepare(
                    "SELECT timestamp, cpu_usage, mem_usage, cpu_temp FROM system_metrics_log \
                     ORDER BY timestamp DESC, id DESC LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![limit], |row| {
                        Ok(MetricSample {
                            timestamp: row.get(0)?,
                            cpu_usage: row.get(1)?,
                            mem_usage: row.get(2)?,
                            cpu_temp: row.get(3)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(samples)
    }

    pub async fn insert(&self, cpu_usage: f64, mem_usage: f64, cpu_temp: Option<f64>) -> StoreResult<()> {
        self.conn
            .call(move |conn: &mut rusqlite::Connection| {
                conn.execute(
                    "INSERT INTO system_metrics_log (cpu_usage, mem_usage, cpu_temp) VALUES (?1, ?2, ?3)",
                    rusqlite::params![cpu_usage, mem_usage, cpu_temp],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    #[tokio::test]
    async fn test_summary_over_recent_samples() {
        let store = Store::open_in_memory().await.unwrap();
        store.ensure_schema().await.unwrap();
        let metrics = store.metrics();

        metrics.insert(10.0, 40.0, None).await.unwrap();
        metrics.insert(30.0, 60.0, Some(55.0)).await.unwrap();

        let samples = metrics.recent(10).await.unwrap();
        assert_eq!(samples.len(), 2);

        let summary = MetricsSummary::from_samples(&samples).unwrap();
        assert_eq!(summary.samples, 2);
        let cpu = summary.cpu_usage.unwrap();
        assert_eq!(cpu.last, Some(30.0));
        assert!((cpu.average - 20.0).abs() < f64::EPSILON);
        assert_eq!(summary.cpu_temp.unwrap().average, 55.0);
    }

    #[test]
    fn test_empty_summary() {
        assert!(MetricsSummary::from_samples(&[]).is_none());
    }
}
