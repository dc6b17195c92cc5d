//! Commands that read or edit the database directly.

use anyhow::{Context as _, Result};
use n0m1_common::{ComponentId, DesiredState};
use n0m1_store::{MetricStat, MetricsSummary, Store};

use crate::context::Context;

pub async fn set_enabled(ctx: &Context, id: &str, enabled: bool) -> Result<()> {
    let store = ctx.open_store().await?;
    let state = if enabled {
        DesiredState::Active
    } else {
        DesiredState::Inactive
    };

    store
        .registry()
        .set_desired_state(&ComponentId::from(id), state)
        .await?;
    println!("Component {} set to {}", id, state);
    Ok(())
}

pub async fn metrics(ctx: &Context, limit: usize) -> Result<()> {
    let store = ctx.open_store().await?;
    let samples = store.metrics().recent(limit).await?;

    let Some(summary) = MetricsSummary::from_samples(&samples) else {
        println!("No metrics recorded");
        return Ok(());
    };

    println!("Last update: {} ({} samples)", summary.last_update, summary.samples);
    print_stat("CPU usage", summary.cpu_usage, "%");
    print_stat("Memory usage", summary.mem_usage, "%");
    print_stat("CPU temperature", summary.cpu_temp, "°C");
    Ok(())
}

fn print_stat(label: &str, stat: Option<MetricStat>, unit: &str) {
    match stat {
        Some(MetricStat {
            last: Some(last),
            average,
        }) => println!("{:<16} {:.1}{} (avg {:.1}{})", label, last, unit, average, unit),
        Some(MetricStat { last: None, average }) => {
            println!("{:<16} - (avg {:.1}{})", label, average, unit)
        }
        None => println!("{:<16} n/a", label),
    }
}

pub async fn init(ctx: &Context) -> Result<()> {
    let path = ctx.database_path();
    let store = Store::open(&path)
        .await
        .with_context(|| format!("Failed to create database {}", path.display()))?;
    store.ensure_schema().await?;
    let added = store.seed_defaults().await?;

    println!("Database initialized at {}", path.display());
    println!("{} default components added", added);
    Ok(())
}
